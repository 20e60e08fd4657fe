//! Per-cycle report persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portwatch_core::{CycleId, Degradation, ScanSnapshot, Verdict};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::AgentError;
use crate::Result;

/// Side-effect boundary for a finished cycle.
///
/// Errors are returned to the scheduler, which logs and ignores them.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Persist one cycle's snapshot and verdicts.
    async fn persist(&self, snapshot: &ScanSnapshot, verdicts: &[Verdict]) -> Result<()>;
}

/// Document written by [`JsonFileSink`].
#[derive(Debug, Serialize)]
pub struct ReportDocument<'a> {
    pub cycle_id: CycleId,
    pub timestamp: DateTime<Utc>,
    pub host: HostSection,
    pub containers: Vec<ContainerEntry<'a>>,
    pub verdicts: &'a [Verdict],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    pub degraded: &'a [Degradation],
}

#[derive(Debug, Serialize)]
pub struct HostSection {
    pub services: Vec<ServiceEntry>,
}

#[derive(Debug, Serialize)]
pub struct ServiceEntry {
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub proto: String,
    pub process: Option<ProcessEntry>,
}

#[derive(Debug, Serialize)]
pub struct ProcessEntry {
    pub pid: i32,
    pub name: String,
    pub exe: String,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ContainerEntry<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub status: &'a str,
    pub image: &'a str,
}

impl<'a> ReportDocument<'a> {
    /// Flatten a snapshot into the on-disk shape.
    #[must_use]
    pub fn new(snapshot: &'a ScanSnapshot, verdicts: &'a [Verdict]) -> Self {
        let services = snapshot
            .endpoints()
            .iter()
            .map(|observed| ServiceEntry {
                ip: observed.endpoint.ip.map(|ip| ip.to_string()),
                port: observed.endpoint.port,
                proto: observed.endpoint.protocol.to_string(),
                process: observed.process.as_ref().map(|p| ProcessEntry {
                    pid: p.pid(),
                    name: p.name_lookup().to_string(),
                    exe: p.executable_lookup().to_string(),
                    resolved: p.resolved(),
                    version: p.version().map(ToString::to_string),
                }),
            })
            .collect();

        let containers = snapshot
            .containers()
            .iter()
            .map(|c| ContainerEntry {
                id: &c.id,
                name: &c.name,
                status: &c.status,
                image: &c.image_tag,
            })
            .collect();

        Self {
            cycle_id: snapshot.cycle_id(),
            timestamp: snapshot.timestamp(),
            host: HostSection { services },
            containers,
            verdicts,
            degraded: snapshot.degraded(),
        }
    }
}

/// Writes the cycle report as JSON, replacing the previous file atomically.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    /// Create a sink writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Report location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| AgentError::Report(format!("{}: {}", path.display(), e.error)))?;
    Ok(())
}

#[async_trait]
impl ReportSink for JsonFileSink {
    fn name(&self) -> &'static str {
        "json-file"
    }

    async fn persist(&self, snapshot: &ScanSnapshot, verdicts: &[Verdict]) -> Result<()> {
        let mut bytes = serde_json::to_vec_pretty(&ReportDocument::new(snapshot, verdicts))?;
        bytes.push(b'\n');

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| AgentError::Report(e.to_string()))??;

        debug!(path = %self.path.display(), cycle_id = %snapshot.cycle_id(), "report written");
        Ok(())
    }
}

/// Logs a human-readable report, one line per subject.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReportSink;

#[async_trait]
impl ReportSink for LogReportSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn persist(&self, snapshot: &ScanSnapshot, verdicts: &[Verdict]) -> Result<()> {
        info!(cycle_id = %snapshot.cycle_id(), "=== Monitor Report ===");

        for observed in snapshot.endpoints() {
            match &observed.process {
                Some(p) => info!(
                    "Service {} | pid {} | {} | {}",
                    observed.endpoint,
                    p.pid(),
                    p.name_lookup(),
                    p.executable_lookup()
                ),
                None => info!("Service {} | no owning process", observed.endpoint),
            }
        }

        if snapshot.containers().is_empty() {
            info!("No containers found.");
        }
        for c in snapshot.containers() {
            info!("Container {} | {} | {} | {}", c.id, c.name, c.status, c.image_tag);
        }

        for d in snapshot.degraded() {
            info!("Degraded: {} ({})", d.provider, d.reason);
        }
        for v in verdicts {
            info!("Finding: {v}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portwatch_core::{
        ContainerRecord, Lookup, ObservedEndpoint, ProcessAttribution, Protocol, ServiceEndpoint,
        UnresolvedReason,
    };

    fn snapshot() -> ScanSnapshot {
        ScanSnapshot::new(
            CycleId::new(3),
            Utc::now(),
            vec![
                ObservedEndpoint {
                    endpoint: ServiceEndpoint::new(
                        Some("0.0.0.0".parse().unwrap()),
                        Some(22),
                        Protocol::Tcp,
                        Some(101),
                    ),
                    process: Some(ProcessAttribution::new(
                        101,
                        Lookup::Resolved("sshd".into()),
                        Lookup::Resolved("/usr/sbin/sshd".into()),
                    )),
                },
                ObservedEndpoint {
                    endpoint: ServiceEndpoint::new(None, Some(8080), Protocol::Tcp, Some(202)),
                    process: Some(ProcessAttribution::unresolved(202, UnresolvedReason::Timeout)),
                },
                ObservedEndpoint {
                    endpoint: ServiceEndpoint::new(None, Some(53), Protocol::Udp, None),
                    process: None,
                },
            ],
            vec![ContainerRecord::new("abcdef0123456789", "/web", "running", Some("nginx:1.25"))],
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn test_json_report_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let sink = JsonFileSink::new(&path);

        tokio_test::assert_ok!(sink.persist(&snapshot(), &[]).await);

        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["cycle_id"], 3);
        let services = doc["host"]["services"].as_array().unwrap();
        assert_eq!(services.len(), 3);
        assert_eq!(services[0]["ip"], "0.0.0.0");
        assert_eq!(services[0]["port"], 22);
        assert_eq!(services[0]["proto"], "tcp");
        assert_eq!(services[0]["process"]["name"], "sshd");
        assert_eq!(services[0]["process"]["exe"], "/usr/sbin/sshd");
        assert_eq!(services[1]["process"]["resolved"], false);
        assert!(services[2]["process"].is_null());
        assert_eq!(doc["containers"][0]["id"], "abcdef012345");
        assert_eq!(doc["containers"][0]["image"], "nginx:1.25");
        assert!(doc.get("degraded").is_none());
    }

    #[tokio::test]
    async fn test_json_report_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let sink = JsonFileSink::new(&path);

        sink.persist(&snapshot(), &[]).await.unwrap();
        let empty = ScanSnapshot::empty(CycleId::new(4), Utc::now());
        sink.persist(&empty, &[]).await.unwrap();

        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["cycle_id"], 4);
        assert!(doc["host"]["services"].as_array().unwrap().is_empty());
        assert!(doc["containers"].as_array().unwrap().is_empty());

        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn test_unwritable_directory_is_an_error() {
        let sink = JsonFileSink::new("/nonexistent-portwatch-dir/report.json");
        tokio_test::assert_err!(sink.persist(&snapshot(), &[]).await);
    }

    #[tokio::test]
    async fn test_log_sink_never_fails() {
        tokio_test::assert_ok!(LogReportSink.persist(&snapshot(), &[]).await);
        let empty = ScanSnapshot::empty(CycleId::FIRST, Utc::now());
        tokio_test::assert_ok!(LogReportSink.persist(&empty, &[]).await);
    }
}
