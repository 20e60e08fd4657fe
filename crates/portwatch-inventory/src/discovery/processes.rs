//! Process metadata via `/proc`.

use procfs::process::Process;

use crate::error::Result;
use crate::provider::ProcessProvider;

/// Reads process name and executable path from `/proc/<pid>`.
///
/// Reading `exe` of another user's process needs privilege; `comm` usually
/// does not, so the two lookups fail independently.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcfsProcessProvider;

impl ProcessProvider for ProcfsProcessProvider {
    fn process_name(&self, pid: i32) -> Result<String> {
        let proc = Process::new(pid)?;
        Ok(proc.stat()?.comm)
    }

    fn executable_path(&self, pid: i32) -> Result<String> {
        let proc = Process::new(pid)?;
        Ok(proc.exe()?.display().to_string())
    }
}
