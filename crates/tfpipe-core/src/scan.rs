//! Security-scan severity roll-up.
//!
//! The scanners themselves run as independent best-effort processes
//! outside this layer; each drops a JSON result file into `.tfpipe/scans/`.
//! tfpipe never parses their findings; it rolls the per-scanner statuses
//! up to one coarse pass/warn/fail and publishes the aggregate artifact.

use crate::annotate::Severity;
use crate::error::Result;
use crate::{io, paths};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

// ---------------------------------------------------------------------------
// ScanStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pass,
    Warn,
    Fail,
}

impl ScanStatus {
    pub fn severity(&self) -> Severity {
        match self {
            ScanStatus::Pass => Severity::Success,
            ScanStatus::Warn => Severity::Warning,
            ScanStatus::Fail => Severity::Error,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScannerResult {
    status: ScanStatus,
}

// ---------------------------------------------------------------------------
// ScanSummary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub overall: ScanStatus,
    pub scanners: BTreeMap<String, ScanStatus>,
}

/// Aggregate all scanner result files. A missing scans directory is an
/// empty (passing) summary; an unreadable result file degrades that
/// scanner to `warn` rather than failing the roll-up.
pub fn rollup(root: &Path) -> Result<ScanSummary> {
    let dir = paths::scans_dir(root);
    let mut scanners = BTreeMap::new();

    if dir.exists() {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
            .collect();
        files.sort();

        for file in files {
            let name = file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "unknown".to_string());
            let status = match std::fs::read_to_string(&file)
                .map_err(|e| e.to_string())
                .and_then(|content| {
                    serde_json::from_str::<ScannerResult>(&content).map_err(|e| e.to_string())
                }) {
                Ok(result) => result.status,
                Err(e) => {
                    warn!("unreadable scanner result {}: {e}", file.display());
                    ScanStatus::Warn
                }
            };
            scanners.insert(name, status);
        }
    }

    let overall = scanners
        .values()
        .copied()
        .max()
        .unwrap_or(ScanStatus::Pass);

    Ok(ScanSummary { overall, scanners })
}

/// Write the aggregated summary artifact, returning its path.
pub fn write_summary(root: &Path, summary: &ScanSummary) -> Result<PathBuf> {
    let path = paths::scan_summary_path(root);
    io::atomic_write(&path, serde_json::to_string_pretty(summary)?.as_bytes())?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
