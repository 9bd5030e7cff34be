//! Pre-apply state backups.
//!
//! A timestamped snapshot of the remote state, pulled before every apply.
//! Backups are write-once and append-only per environment; nothing in the
//! pipeline ever reads them back; they exist for manual recovery only.
//! A failed backup is logged and the apply proceeds.

use crate::credentials::CredentialBundle;
use crate::environment::Environment;
use crate::error::{PipelineError, Result};
use crate::plan::credentialed;
use crate::tool::ToolInvocation;
use crate::{io, paths};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct StateBackup {
    pub environment: String,
    pub path: PathBuf,
    pub taken_at: DateTime<Utc>,
}

pub fn backup_filename(taken_at: DateTime<Utc>) -> String {
    format!("state-{}.tfstate", taken_at.format("%Y%m%d-%H%M%S"))
}

/// Pull the remote state and write it as a new timestamped snapshot.
pub fn take(root: &Path, environment: &Environment, bundle: &CredentialBundle) -> Result<StateBackup> {
    let workdir = environment.workdir_under(root);
    let output = credentialed(ToolInvocation::new(&workdir, &["state", "pull"])?, bundle).run()?;
    if !output.success {
        return Err(PipelineError::Apply(format!(
            "state pull failed: {}",
            output.combined().trim()
        )));
    }

    let taken_at = Utc::now();
    let dir = paths::backup_dir(root, &environment.name);
    io::ensure_dir(&dir)?;
    let mut path = dir.join(backup_filename(taken_at));
    // Existing snapshots are never overwritten.
    let mut suffix = 1;
    while path.exists() {
        path = dir.join(format!(
            "state-{}-{suffix}.tfstate",
            taken_at.format("%Y%m%d-%H%M%S")
        ));
        suffix += 1;
    }
    io::atomic_write(&path, output.stdout.as_bytes())?;
    info!(
        "[{}] state backed up to {}",
        environment.name,
        path.display()
    );

    Ok(StateBackup {
        environment: environment.name.clone(),
        path,
        taken_at,
    })
}

/// Backup failures never block an apply; they are logged and swallowed.
pub fn take_best_effort(
    root: &Path,
    environment: &Environment,
    bundle: &CredentialBundle,
) -> Option<StateBackup> {
    match take(root, environment, bundle) {
        Ok(backup) => Some(backup),
        Err(e) => {
            warn!(
                "[{}] state backup failed, apply proceeds: {e}",
                environment.name
            );
            None
        }
    }
}

/// All snapshots for an environment, oldest first.
pub fn list(root: &Path, environment: &str) -> Result<Vec<PathBuf>> {
    let dir = paths::backup_dir(root, environment);
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut entries: Vec<PathBuf> = std::fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension().and_then(|e| e.to_str()) == Some("tfstate")
        })
        .collect();
    entries.sort();
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn backup_filename_is_timestamped() {
        let ts = Utc.with_ymd_and_hms(2026, 8, 29, 14, 30, 5).unwrap();
        assert_eq!(backup_filename(ts), "state-20260829-143005.tfstate");
    }

    #[test]
    fn list_empty_when_no_backups() {
        let dir = TempDir::new().unwrap();
        assert!(list(dir.path(), "dev").unwrap().is_empty());
    }

    #[test]
    fn list_returns_snapshots_sorted() {
        let dir = TempDir::new().unwrap();
        let backups = paths::backup_dir(dir.path(), "dev");
        std::fs::create_dir_all(&backups).unwrap();
        std::fs::write(backups.join("state-20260829-120000.tfstate"), b"{}").unwrap();
        std::fs::write(backups.join("state-20260828-090000.tfstate"), b"{}").unwrap();
        std::fs::write(backups.join("notes.txt"), b"ignored").unwrap();

        let listed = list(dir.path(), "dev").unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].ends_with("state-20260828-090000.tfstate"));
        assert!(listed[1].ends_with("state-20260829-120000.tfstate"));
    }

    #[test]
    fn backups_are_environment_scoped() {
        let dir = TempDir::new().unwrap();
        let dev = paths::backup_dir(dir.path(), "dev");
        std::fs::create_dir_all(&dev).unwrap();
        std::fs::write(dev.join("state-20260829-120000.tfstate"), b"{}").unwrap();

        assert_eq!(list(dir.path(), "dev").unwrap().len(), 1);
        assert!(list(dir.path(), "prd").unwrap().is_empty());
    }
}
