//! CI annotations and metadata.
//!
//! Annotations summarize plan risk, scan findings, and apply outcome per
//! environment. When a CI agent binary is configured it is invoked with
//! the `annotate` / `meta-data set` argument conventions; otherwise
//! annotations go to the log and metadata lands in the per-environment
//! metadata artifact. Everything here is best-effort: an annotation that
//! cannot be delivered never fails a stage.

use crate::{io, paths};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{error, info, warn};

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn style(&self) -> &'static str {
        match self {
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.style())
    }
}

// ---------------------------------------------------------------------------
// Annotator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Annotator {
    agent: Option<String>,
    root: PathBuf,
}

impl Annotator {
    pub fn new(root: &Path, agent: Option<String>) -> Self {
        Self {
            agent,
            root: root.to_path_buf(),
        }
    }

    /// Publish a styled annotation scoped to one environment. Best-effort.
    pub fn annotate(&self, environment: &str, severity: Severity, body: &str) {
        if let Some(agent) = &self.agent {
            let context = format!("tfpipe-{environment}");
            let status = Command::new(agent)
                .args(["annotate", "--style", severity.style(), "--context", &context, body])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
            match status {
                Ok(s) if s.success() => return,
                Ok(s) => warn!("ci agent annotate exited with {s}"),
                Err(e) => warn!("ci agent annotate failed to spawn: {e}"),
            }
        }
        match severity {
            Severity::Success => info!("[{environment}] {body}"),
            Severity::Warning => warn!("[{environment}] {body}"),
            Severity::Error => error!("[{environment}] {body}"),
        }
    }

    /// Record one CI metadata key. Best-effort.
    pub fn set_metadata(&self, environment: &str, key: &str, value: &str) {
        let namespaced = format!("tfpipe:{environment}:{key}");
        if let Some(agent) = &self.agent {
            let status = Command::new(agent)
                .args(["meta-data", "set", &namespaced, value])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
            match status {
                Ok(s) if s.success() => return,
                Ok(s) => warn!("ci agent meta-data set exited with {s}"),
                Err(e) => warn!("ci agent meta-data set failed to spawn: {e}"),
            }
        }
        if let Err(e) = self.write_metadata_artifact(environment, key, value) {
            warn!("failed to record metadata {namespaced}: {e}");
        }
    }

    fn write_metadata_artifact(
        &self,
        environment: &str,
        key: &str,
        value: &str,
    ) -> crate::Result<()> {
        let path = paths::metadata_path(&self.root, environment);
        let mut map: BTreeMap<String, String> = if path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&path)?)?
        } else {
            BTreeMap::new()
        };
        map.insert(key.to_string(), value.to_string());
        io::atomic_write(&path, serde_json::to_string_pretty(&map)?.as_bytes())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn severity_styles() {
        assert_eq!(Severity::Success.style(), "success");
        assert_eq!(Severity::Warning.style(), "warning");
        assert_eq!(Severity::Error.style(), "error");
    }

    #[test]
    fn severity_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Severity::Warning).unwrap(),
            "\"warning\""
        );
    }

    #[test]
    fn metadata_lands_in_artifact_without_agent() {
        let dir = TempDir::new().unwrap();
        let annotator = Annotator::new(dir.path(), None);
        annotator.set_metadata("dev", "additions", "3");
        annotator.set_metadata("dev", "destructions", "0");

        let content =
            std::fs::read_to_string(paths::metadata_path(dir.path(), "dev")).unwrap();
        let map: BTreeMap<String, String> = serde_json::from_str(&content).unwrap();
        assert_eq!(map["additions"], "3");
        assert_eq!(map["destructions"], "0");
    }

    #[test]
    fn metadata_is_environment_scoped() {
        let dir = TempDir::new().unwrap();
        let annotator = Annotator::new(dir.path(), None);
        annotator.set_metadata("dev", "additions", "1");
        annotator.set_metadata("prd", "additions", "2");

        assert!(paths::metadata_path(dir.path(), "dev").exists());
        assert!(paths::metadata_path(dir.path(), "prd").exists());
    }

    #[test]
    fn annotate_without_agent_does_not_panic() {
        let dir = TempDir::new().unwrap();
        let annotator = Annotator::new(dir.path(), None);
        annotator.annotate("dev", Severity::Warning, "plan destroys 2 resources");
    }

    #[test]
    fn missing_agent_binary_falls_back() {
        let dir = TempDir::new().unwrap();
        let annotator = Annotator::new(dir.path(), Some("definitely-not-a-binary".to_string()));
        // Spawn failure degrades to the artifact path, never an error.
        annotator.set_metadata("dev", "changes", "1");
        assert!(paths::metadata_path(dir.path(), "dev").exists());
    }
}
