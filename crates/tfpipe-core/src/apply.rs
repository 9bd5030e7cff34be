//! Apply stage.
//!
//! Applies the previously reviewed plan artifact, never a freshly
//! computed plan, so what was reviewed is exactly what is applied.
//! Sequence: re-authenticate → re-fetch credentials → re-initialize the
//! backend (idempotent) → lock check → best-effort state backup → apply →
//! capture outputs → publish artifacts. Any fatal step publishes an error
//! annotation before propagating.

use crate::annotate::{Annotator, Severity};
use crate::backend::{self, BackendAddresses};
use crate::backup::{self, StateBackup};
use crate::config::PipelineConfig;
use crate::credentials::{self, CredentialBundle};
use crate::environment::Environment;
use crate::error::{PipelineError, Result};
use crate::plan::{self, credentialed};
use crate::tool::ToolInvocation;
use crate::{io, lock, paths};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug)]
pub struct ApplyOutcome {
    pub outputs_path: PathBuf,
    pub log_path: PathBuf,
    pub backup: Option<StateBackup>,
}

/// Load the credential bundle for a stage: exchange the CI identity token
/// for a session token, then fetch every configured provider.
pub fn load_credentials(config: &PipelineConfig, environment: &str) -> Result<CredentialBundle> {
    let jwt = crate::config::identity_token()?;
    let mut client = credentials::SecretsClient::from_config(&config.secrets);
    client.login(&jwt)?;
    client.load_bundle(&config.secrets, environment)
}

pub fn run(
    root: &Path,
    environment: &Environment,
    config: &PipelineConfig,
    annotator: &Annotator,
    force_unlock_override: bool,
) -> Result<ApplyOutcome> {
    match execute(root, environment, config, annotator, force_unlock_override) {
        Ok(outcome) => {
            annotator.annotate(
                &environment.name,
                Severity::Success,
                &format!("apply complete for {}", environment.name),
            );
            Ok(outcome)
        }
        Err(e) => {
            annotator.annotate(
                &environment.name,
                Severity::Error,
                &format!("apply failed for {}: {e}", environment.name),
            );
            Err(e)
        }
    }
}

fn execute(
    root: &Path,
    environment: &Environment,
    config: &PipelineConfig,
    annotator: &Annotator,
    force_unlock_override: bool,
) -> Result<ApplyOutcome> {
    let env_name = environment.name.as_str();
    let workdir = environment.workdir_under(root);

    // Precondition first: the reviewed plan must be retrievable.
    let plan_binary = plan::require_plan_binary(root, env_name)?;

    let bundle = load_credentials(config, env_name)?;
    let addresses = BackendAddresses::derive(
        &config.backend.effective_base_url(),
        &config.project,
        env_name,
    );
    backend::probe(&addresses, &bundle)?;
    backend::init(&workdir, &addresses, &bundle)?;

    lock::ensure_unlocked(&workdir, &addresses, &bundle, force_unlock_override)?;

    let backup = backup::take_best_effort(root, environment, &bundle);

    info!("[{env_name}] applying {}", plan_binary.display());
    let plan_arg = plan_binary.display().to_string();
    let apply = credentialed(
        ToolInvocation::new(&workdir, &["apply", "-input=false", "-no-color", &plan_arg])?,
        &bundle,
    )
    .run()?;

    // The human-readable log is published whether the apply succeeded or not.
    let log_path = paths::apply_log_path(root, env_name);
    io::atomic_write(&log_path, apply.combined().as_bytes())?;

    if !apply.success {
        return Err(PipelineError::Apply(apply.combined().trim().to_string()));
    }

    let outputs = credentialed(ToolInvocation::new(&workdir, &["output", "-json"])?, &bundle).run()?;
    if !outputs.success {
        return Err(PipelineError::Apply(format!(
            "output capture failed: {}",
            outputs.combined().trim()
        )));
    }
    let outputs_path = paths::outputs_path(root, env_name);
    io::atomic_write(&outputs_path, outputs.stdout.as_bytes())?;

    annotator.set_metadata(env_name, "apply", "success");

    Ok(ApplyOutcome {
        outputs_path,
        log_path,
        backup,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::Annotator;
    use tempfile::TempDir;

    #[test]
    fn missing_plan_artifact_fails_before_any_side_effect() {
        let dir = TempDir::new().unwrap();
        let environment = Environment {
            name: "dev".to_string(),
            position: 0,
            workdir: PathBuf::from("."),
            production: false,
        };
        let config = PipelineConfig::new("proj");
        let annotator = Annotator::new(dir.path(), None);

        let result = run(dir.path(), &environment, &config, &annotator, false);
        assert!(matches!(
            result,
            Err(PipelineError::MissingPlanArtifact(ref env)) if env == "dev"
        ));
        // No backup, no log, no outputs.
        assert!(!paths::apply_log_path(dir.path(), "dev").exists());
        assert!(!paths::outputs_path(dir.path(), "dev").exists());
    }
}
