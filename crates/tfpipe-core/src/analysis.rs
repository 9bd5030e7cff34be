//! Best-effort plan analyzers.
//!
//! Two independent optional analyzers run after a successful plan: an
//! AI-summary tool (human-readable digest) and a blast-radius tool
//! (dependency impact, JSON on stdout, prose on stderr). Neither can fail
//! the plan stage: absence, spawn failure, or a nonzero exit becomes a
//! typed outcome, so call sites can never mistake a skipped analysis for
//! a passed one.

use crate::config::AnalyzersConfig;
use crate::{io, paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// AnalysisOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Passed,
    Warned { detail: String },
    Skipped { reason: String },
}

impl AnalysisOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, AnalysisOutcome::Passed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub ai_summary: AnalysisOutcome,
    pub blast_radius: AnalysisOutcome,
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Run both analyzers against the plan's JSON rendering. Never fails.
pub fn run_all(root: &Path, environment: &str, config: &AnalyzersConfig) -> AnalysisReport {
    let plan_json = paths::plan_json_path(root, environment);

    let ai_summary = match &config.ai_summary {
        None => AnalysisOutcome::Skipped {
            reason: "not configured".to_string(),
        },
        Some(bin) => run_analyzer(
            bin,
            &plan_json,
            &paths::ai_summary_path(root, environment),
            None,
        ),
    };
    log_outcome(environment, "ai-summary", &ai_summary);

    let blast_radius = match &config.blast_radius {
        None => AnalysisOutcome::Skipped {
            reason: "not configured".to_string(),
        },
        Some(bin) => run_analyzer(
            bin,
            &plan_json,
            &paths::blast_radius_json_path(root, environment),
            Some(&paths::blast_radius_text_path(root, environment)),
        ),
    };
    log_outcome(environment, "blast-radius", &blast_radius);

    AnalysisReport {
        ai_summary,
        blast_radius,
    }
}

/// Invoke one analyzer with the plan JSON path as its argument. Stdout is
/// the analyzer's report artifact; stderr, when a text path is given, is
/// saved as the prose rendering.
fn run_analyzer(
    bin: &str,
    plan_json: &Path,
    stdout_artifact: &Path,
    stderr_artifact: Option<&Path>,
) -> AnalysisOutcome {
    if which::which(bin).is_err() {
        return AnalysisOutcome::Skipped {
            reason: format!("{bin} is not installed"),
        };
    }

    let output = match Command::new(bin)
        .arg(plan_json)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
    {
        Ok(out) => out,
        Err(e) => {
            return AnalysisOutcome::Skipped {
                reason: format!("failed to spawn {bin}: {e}"),
            }
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !stdout.trim().is_empty() {
        if let Err(e) = io::atomic_write(stdout_artifact, stdout.as_bytes()) {
            warn!("failed to write analyzer artifact: {e}");
        }
    }
    if let (Some(path), false) = (stderr_artifact, stderr.trim().is_empty()) {
        if let Err(e) = io::atomic_write(path, stderr.as_bytes()) {
            warn!("failed to write analyzer artifact: {e}");
        }
    }

    if output.status.success() {
        AnalysisOutcome::Passed
    } else {
        let detail: String = stderr.chars().take(500).collect();
        AnalysisOutcome::Warned {
            detail: detail.trim().to_string(),
        }
    }
}

fn log_outcome(environment: &str, analyzer: &str, outcome: &AnalysisOutcome) {
    match outcome {
        AnalysisOutcome::Passed => info!("[{environment}] {analyzer} analysis passed"),
        AnalysisOutcome::Warned { detail } => {
            warn!("[{environment}] {analyzer} analysis warned: {detail}")
        }
        AnalysisOutcome::Skipped { reason } => {
            info!("[{environment}] {analyzer} analysis skipped: {reason}")
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn analyzers(ai: Option<&str>, blast: Option<&str>) -> AnalyzersConfig {
        AnalyzersConfig {
            ai_summary: ai.map(String::from),
            blast_radius: blast.map(String::from),
        }
    }

    #[test]
    fn unconfigured_analyzers_are_skipped() {
        let dir = TempDir::new().unwrap();
        let report = run_all(dir.path(), "dev", &analyzers(None, None));
        assert!(matches!(report.ai_summary, AnalysisOutcome::Skipped { .. }));
        assert!(matches!(report.blast_radius, AnalysisOutcome::Skipped { .. }));
    }

    #[test]
    fn missing_binary_is_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        let report = run_all(
            dir.path(),
            "dev",
            &analyzers(Some("definitely-not-a-binary"), None),
        );
        match report.ai_summary {
            AnalysisOutcome::Skipped { reason } => assert!(reason.contains("not installed")),
            other => panic!("expected skipped, got {other:?}"),
        }
    }

    #[test]
    fn passing_analyzer_reports_passed() {
        let dir = TempDir::new().unwrap();
        let report = run_all(dir.path(), "dev", &analyzers(Some("true"), None));
        assert!(report.ai_summary.passed());
    }

    #[test]
    fn failing_analyzer_warns_but_does_not_fail() {
        let dir = TempDir::new().unwrap();
        let report = run_all(dir.path(), "dev", &analyzers(Some("false"), None));
        assert!(matches!(report.ai_summary, AnalysisOutcome::Warned { .. }));
    }

    #[test]
    fn analyzer_stdout_becomes_artifact() {
        let dir = TempDir::new().unwrap();
        // `echo` prints its argument (the plan json path) to stdout.
        let report = run_all(dir.path(), "dev", &analyzers(Some("echo"), None));
        assert!(report.ai_summary.passed());
        let artifact = paths::ai_summary_path(dir.path(), "dev");
        assert!(artifact.exists());
        assert!(std::fs::read_to_string(artifact)
            .unwrap()
            .contains("plan.json"));
    }

    #[test]
    fn skipped_is_distinct_from_passed() {
        let skipped = AnalysisOutcome::Skipped {
            reason: "not configured".to_string(),
        };
        assert!(!skipped.passed());
        let json = serde_json::to_string(&skipped).unwrap();
        assert!(json.contains("\"outcome\":\"skipped\""));
    }
}
