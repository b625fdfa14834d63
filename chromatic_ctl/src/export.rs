//! JSON-lines export of run metrics.
//!
//! Each call appends one record to a file under a caller-supplied directory;
//! existing lines are never rewritten.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::coupling::{CoupledSummary, CouplingMetrics};
use crate::error::CtlResult;
use crate::filter::FilterSummary;
use crate::pipeline::PipelineReport;

pub const COUPLING_METRICS_FILE: &str = "coupling_metrics.jsonl";
pub const FILTER_BEHAVIOR_FILE: &str = "filter_behavior.jsonl";
pub const END_TO_END_SUMMARY_FILE: &str = "end_to_end_summary.jsonl";

fn timestamp_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

fn append_json_line<T: Serialize>(dir: &Path, file_name: &str, value: &T) -> CtlResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(file_name);
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    file.write_all(&line)?;
    Ok(path)
}

#[derive(Serialize)]
struct Record<'a, T: Serialize> {
    timestamp_ms: u128,
    #[serde(flatten)]
    body: &'a T,
}

#[derive(Debug, Serialize)]
pub struct EndToEndRecord {
    pub input_length: usize,
    pub agreement: f64,
    pub coherence: f64,
    pub warnings: usize,
    pub violations: usize,
}

impl From<&CoupledSummary> for EndToEndRecord {
    fn from(summary: &CoupledSummary) -> Self {
        Self {
            input_length: summary.length,
            agreement: summary.mean_agreement,
            coherence: summary.mean_coherence,
            warnings: summary.warnings,
            violations: summary.violations,
        }
    }
}

pub fn log_coupling_metrics(dir: &Path, metrics: &CouplingMetrics) -> CtlResult<PathBuf> {
    append_json_line(
        dir,
        COUPLING_METRICS_FILE,
        &Record {
            timestamp_ms: timestamp_ms(),
            body: metrics,
        },
    )
}

pub fn log_filter_behavior(dir: &Path, summary: &FilterSummary) -> CtlResult<PathBuf> {
    append_json_line(
        dir,
        FILTER_BEHAVIOR_FILE,
        &Record {
            timestamp_ms: timestamp_ms(),
            body: summary,
        },
    )
}

pub fn log_end_to_end_summary(dir: &Path, summary: &CoupledSummary) -> CtlResult<PathBuf> {
    append_json_line(
        dir,
        END_TO_END_SUMMARY_FILE,
        &Record {
            timestamp_ms: timestamp_ms(),
            body: &EndToEndRecord::from(summary),
        },
    )
}

/// Append all three records for one pipeline run.
pub fn export_report(dir: &Path, report: &PipelineReport) -> CtlResult<()> {
    log_coupling_metrics(dir, &report.coupling.metrics)?;
    log_filter_behavior(dir, &report.filter_summary)?;
    log_end_to_end_summary(dir, &report.coupling.summary)?;
    tracing::debug!("exported pipeline report to {}", dir.display());
    Ok(())
}
