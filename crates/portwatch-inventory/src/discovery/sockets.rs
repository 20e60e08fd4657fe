//! Listening socket discovery via `/proc/net`.

use procfs::net::TcpState;
use procfs::process::FDTarget;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use tracing::debug;

use crate::error::{InventoryError, Result};
use crate::provider::{EndpointProvider, RawSocket};
use portwatch_core::Protocol;

const PROVIDER: &str = "procfs-sockets";

/// Enumerates TCP/UDP sockets from `/proc/net/{tcp,tcp6,udp,udp6}`.
///
/// Owning pids come from walking `/proc/<pid>/fd`; sockets owned by processes
/// the caller cannot inspect are reported without a pid.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcfsSocketProvider;

/// Socket row before pid lookup.
struct InodeSocket {
    local: SocketAddr,
    protocol: Protocol,
    listening: bool,
    inode: u64,
}

impl EndpointProvider for ProcfsSocketProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn sockets(&self) -> Result<Vec<RawSocket>> {
        let mut rows = Vec::new();
        let mut tables_read = 0usize;
        let mut last_error = None;

        for table in [procfs::net::tcp(), procfs::net::tcp6()] {
            match table {
                Ok(entries) => {
                    tables_read += 1;
                    rows.extend(entries.into_iter().map(|e| InodeSocket {
                        local: e.local_address,
                        protocol: Protocol::Tcp,
                        listening: matches!(e.state, TcpState::Listen),
                        inode: e.inode,
                    }));
                }
                Err(e) => {
                    debug!(error = %e, "skipping unreadable tcp table");
                    last_error = Some(e);
                }
            }
        }

        for table in [procfs::net::udp(), procfs::net::udp6()] {
            match table {
                Ok(entries) => {
                    tables_read += 1;
                    rows.extend(entries.into_iter().map(|e| InodeSocket {
                        local: e.local_address,
                        protocol: Protocol::Udp,
                        listening: is_unconnected(&e.remote_address),
                        inode: e.inode,
                    }));
                }
                Err(e) => {
                    debug!(error = %e, "skipping unreadable udp table");
                    last_error = Some(e);
                }
            }
        }

        // Every table failing means /proc/net itself is unavailable.
        if tables_read == 0 {
            let reason = last_error.map_or_else(|| "no socket tables".to_string(), |e| e.to_string());
            return Err(InventoryError::outage(PROVIDER, reason));
        }

        let wanted: HashSet<u64> = rows
            .iter()
            .filter(|r| r.listening && r.inode != 0)
            .map(|r| r.inode)
            .collect();
        let owners = socket_owners(&wanted);

        Ok(rows
            .into_iter()
            .map(|r| RawSocket {
                local: Some(r.local),
                protocol: r.protocol,
                listening: r.listening,
                pid: owners.get(&r.inode).copied(),
            })
            .collect())
    }
}

/// UDP has no LISTEN state; a bound socket with no peer is receiving from anyone.
fn is_unconnected(remote: &SocketAddr) -> bool {
    remote.port() == 0 && remote.ip().is_unspecified()
}

/// Map socket inodes to the first pid holding them open.
fn socket_owners(inodes: &HashSet<u64>) -> HashMap<u64, i32> {
    let mut owners = HashMap::new();
    if inodes.is_empty() {
        return owners;
    }

    let all_procs = match procfs::process::all_processes() {
        Ok(procs) => procs,
        Err(e) => {
            debug!(error = %e, "cannot walk /proc for socket owners");
            return owners;
        }
    };

    for entry in all_procs {
        let Ok(proc) = entry else { continue };
        let Ok(fds) = proc.fd() else {
            continue;
        };
        for fd in fds.flatten() {
            if let FDTarget::Socket(inode) = fd.target {
                if inodes.contains(&inode) {
                    owners.entry(inode).or_insert_with(|| proc.pid());
                }
            }
        }
        if owners.len() == inodes.len() {
            break;
        }
    }

    owners
}
