//! Output formatting for snapshots and verdicts.

use clap::ValueEnum;
use colored::Colorize;
use portwatch_core::{ScanSnapshot, Severity, Verdict};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Available output formats.
#[derive(Debug, Clone, Copy, Default, ValueEnum, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable lines with colors
    #[default]
    Pretty,
    /// JSON output
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// One agent's cycle result as printed by `scan` and `run --once`.
#[derive(Debug, Serialize)]
pub struct CycleReport<'a> {
    pub agent: String,
    pub snapshot: &'a ScanSnapshot,
    pub verdicts: &'a [Verdict],
    pub alerted: bool,
}

fn severity_label(severity: Severity) -> colored::ColoredString {
    let label = severity.to_string().to_uppercase();
    match severity {
        Severity::Low => label.dimmed(),
        Severity::Medium => label.yellow(),
        Severity::High => label.red(),
        Severity::Critical => label.red().bold(),
    }
}

/// Print cycle reports in the requested format.
pub fn print_reports(reports: &[CycleReport<'_>], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(reports)?),
        OutputFormat::Pretty => {
            for report in reports {
                print_pretty(report);
            }
        }
    }
    Ok(())
}

fn print_pretty(report: &CycleReport<'_>) {
    let snapshot = report.snapshot;
    println!(
        "{} {} (cycle {})",
        "Agent:".bold(),
        report.agent.cyan(),
        snapshot.cycle_id()
    );

    if !snapshot.endpoints().is_empty() {
        println!("  {}", "Listening services:".bold());
        for observed in snapshot.endpoints() {
            let process = observed.process.as_ref().map_or_else(
                || "(no owning process)".dimmed().to_string(),
                |p| {
                    let mut line = format!("pid {} {} {}", p.pid(), p.name_lookup(), p.executable_lookup());
                    if let Some(version) = p.version() {
                        line.push_str(&format!(" [{version}]"));
                    }
                    if !p.resolved() {
                        line = line.dimmed().to_string();
                    }
                    line
                },
            );
            println!("    {:<28} {}", observed.endpoint.to_string(), process);
        }
    }

    if !snapshot.containers().is_empty() {
        println!("  {}", "Containers:".bold());
        for c in snapshot.containers() {
            println!("    {}  {:<24} {:<10} {}", c.id, c.name, c.status, c.image_tag);
        }
    }

    for d in snapshot.degraded() {
        println!("  {} {}: {}", "degraded".yellow(), d.provider, d.reason);
    }

    if report.verdicts.is_empty() {
        println!("  {}", "No suspicious findings.".green());
    } else {
        println!("  {}", "Findings:".bold());
        for v in report.verdicts {
            println!(
                "    {:<8} {} matched {} on {}",
                severity_label(v.severity),
                v.subject,
                v.matched_rule.cyan(),
                v.evidence
            );
        }
        if report.alerted {
            println!("  {}", "Alert dispatched.".yellow());
        }
    }
    println!();
}
