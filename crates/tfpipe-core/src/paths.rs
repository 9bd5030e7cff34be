use crate::error::{PipelineError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const TFPIPE_DIR: &str = ".tfpipe";
pub const ARTIFACTS_DIR: &str = ".tfpipe/artifacts";
pub const BACKUPS_DIR: &str = ".tfpipe/backups";
pub const SCANS_DIR: &str = ".tfpipe/scans";

pub const CONFIG_FILE: &str = "tfpipe.yaml";

pub const PLAN_BINARY: &str = "plan.tfplan";
pub const PLAN_JSON: &str = "plan.json";
pub const PLAN_SUMMARY: &str = "plan-summary.txt";
pub const AI_SUMMARY: &str = "ai-summary.txt";
pub const BLAST_RADIUS_JSON: &str = "blast-radius.json";
pub const BLAST_RADIUS_TEXT: &str = "blast-radius.txt";
pub const OUTPUTS_JSON: &str = "outputs.json";
pub const APPLY_LOG: &str = "apply.log";
pub const METADATA_JSON: &str = "metadata.json";
pub const SCAN_SUMMARY_JSON: &str = "scan-summary.json";

// ---------------------------------------------------------------------------
// Path helpers. Every artifact is environment-scoped so two environments
// in one run can never clobber each other's plans.
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn tfpipe_dir(root: &Path) -> PathBuf {
    root.join(TFPIPE_DIR)
}

pub fn artifact_dir(root: &Path, env: &str) -> PathBuf {
    root.join(ARTIFACTS_DIR).join(env)
}

pub fn plan_binary_path(root: &Path, env: &str) -> PathBuf {
    artifact_dir(root, env).join(PLAN_BINARY)
}

pub fn plan_json_path(root: &Path, env: &str) -> PathBuf {
    artifact_dir(root, env).join(PLAN_JSON)
}

pub fn plan_summary_path(root: &Path, env: &str) -> PathBuf {
    artifact_dir(root, env).join(PLAN_SUMMARY)
}

pub fn ai_summary_path(root: &Path, env: &str) -> PathBuf {
    artifact_dir(root, env).join(AI_SUMMARY)
}

pub fn blast_radius_json_path(root: &Path, env: &str) -> PathBuf {
    artifact_dir(root, env).join(BLAST_RADIUS_JSON)
}

pub fn blast_radius_text_path(root: &Path, env: &str) -> PathBuf {
    artifact_dir(root, env).join(BLAST_RADIUS_TEXT)
}

pub fn outputs_path(root: &Path, env: &str) -> PathBuf {
    artifact_dir(root, env).join(OUTPUTS_JSON)
}

pub fn apply_log_path(root: &Path, env: &str) -> PathBuf {
    artifact_dir(root, env).join(APPLY_LOG)
}

pub fn metadata_path(root: &Path, env: &str) -> PathBuf {
    artifact_dir(root, env).join(METADATA_JSON)
}

pub fn scan_summary_path(root: &Path) -> PathBuf {
    root.join(ARTIFACTS_DIR).join(SCAN_SUMMARY_JSON)
}

pub fn backup_dir(root: &Path, env: &str) -> PathBuf {
    root.join(BACKUPS_DIR).join(env)
}

pub fn scans_dir(root: &Path) -> PathBuf {
    root.join(SCANS_DIR)
}

// ---------------------------------------------------------------------------
// Environment name validation
// ---------------------------------------------------------------------------

static ENV_NAME_RE: OnceLock<Regex> = OnceLock::new();

fn env_name_re() -> &'static Regex {
    ENV_NAME_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").unwrap())
}

pub fn validate_env_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 32 || !env_name_re().is_match(name) {
        return Err(PipelineError::InvalidEnvironmentName(name.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_env_names() {
        for name in ["dev", "tst", "prd", "prod-eu-west-1", "e2e", "x"] {
            validate_env_name(name).unwrap_or_else(|_| panic!("expected valid: {name}"));
        }
    }

    #[test]
    fn invalid_env_names() {
        for name in ["", "-dev", "dev-", "has space", "PRD", "a_b"] {
            assert!(validate_env_name(name).is_err(), "expected invalid: {name}");
        }
    }

    #[test]
    fn artifact_paths_are_env_scoped() {
        let root = Path::new("/tmp/proj");
        assert_eq!(
            plan_binary_path(root, "dev"),
            PathBuf::from("/tmp/proj/.tfpipe/artifacts/dev/plan.tfplan")
        );
        assert_eq!(
            outputs_path(root, "prd"),
            PathBuf::from("/tmp/proj/.tfpipe/artifacts/prd/outputs.json")
        );
        assert_ne!(plan_binary_path(root, "dev"), plan_binary_path(root, "tst"));
    }

    #[test]
    fn config_path_is_at_root() {
        let root = Path::new("/tmp/proj");
        assert_eq!(config_path(root), PathBuf::from("/tmp/proj/tfpipe.yaml"));
    }
}
