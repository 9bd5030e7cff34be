use crate::output;
use std::path::Path;
use tfpipe_core::annotate::Annotator;
use tfpipe_core::apply::{self, load_credentials};
use tfpipe_core::backend::{self, BackendAddresses};
use tfpipe_core::config::{self, PipelineConfig, WarnLevel};
use tfpipe_core::environment::{DeploymentSequence, Environment};
use tfpipe_core::plan::{ChangeSummary, PlanStage};
use tfpipe_core::scan::{self, ScanStatus};
use tfpipe_core::PipelineError;
use tracing::info;

/// Drive the full sequence in one process: security-scan gate, then per
/// environment secrets, plan, analysis, approval check, apply, strictly
/// in order. The first fatal error aborts the remaining environments.
pub fn run(
    root: &Path,
    envs: Option<&str>,
    justification: Option<&str>,
    force_unlock: bool,
    json: bool,
) -> anyhow::Result<()> {
    let config = PipelineConfig::load(root)?;
    for warning in config.validate() {
        match warning.level {
            WarnLevel::Error => anyhow::bail!("invalid configuration: {}", warning.message),
            WarnLevel::Warning => tracing::warn!("{}", warning.message),
        }
    }
    let targets = match envs {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => config.target_environments(),
    };
    let sequence = DeploymentSequence::from_config(&config, &targets)?;
    let annotator = Annotator::new(root, config.ci.agent.clone());
    let force = force_unlock || config::force_unlock_override();

    // Approval gates are checked up front so a missing justification fails
    // before any environment is touched.
    for env in sequence.environments() {
        if env.production && justification.is_none() {
            anyhow::bail!(
                "environment '{}' is production-classified; pass --justification",
                env.name
            );
        }
    }

    let scan_summary = scan::rollup(root)?;
    scan::write_summary(root, &scan_summary)?;
    annotator.annotate(
        "scan",
        scan_summary.overall.severity(),
        &format!("security scan: {:?}", scan_summary.overall),
    );
    if scan_summary.overall == ScanStatus::Fail {
        anyhow::bail!("security scan failed; sequence aborted");
    }

    let mut applied = Vec::new();
    for environment in sequence.environments() {
        let summary = deploy(root, environment, &config, &annotator, justification, force)?;
        applied.push(serde_json::json!({
            "environment": environment.name,
            "summary": summary,
        }));
    }

    if json {
        output::print_json(&serde_json::json!({ "applied": applied }))?;
    } else {
        println!("sequence complete: {} environment(s) applied", applied.len());
    }
    Ok(())
}

fn deploy(
    root: &Path,
    environment: &Environment,
    config: &PipelineConfig,
    annotator: &Annotator,
    justification: Option<&str>,
    force_unlock: bool,
) -> anyhow::Result<ChangeSummary> {
    let env_name = environment.name.as_str();
    info!("[{env_name}] starting deployment stage");

    let bundle = load_credentials(config, env_name)?;
    let addresses = BackendAddresses::derive(
        &config.backend.effective_base_url(),
        &config.project,
        env_name,
    );
    backend::probe(&addresses, &bundle)?;
    backend::init(&environment.workdir_under(root), &addresses, &bundle)?;

    let mut stage = PlanStage::new();
    let outcome = stage.run(root, environment, config, &bundle, annotator)?;
    drop(bundle);

    if environment.production {
        let text = justification.ok_or_else(|| {
            PipelineError::SequenceInvalid(format!(
                "production environment '{env_name}' requires a justification"
            ))
        })?;
        let approver = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
        annotator.set_metadata(env_name, "approver", &approver);
        annotator.set_metadata(env_name, "justification", text);
        info!("[{env_name}] approval recorded for {approver}");
    }

    apply::run(root, environment, config, annotator, force_unlock)?;
    Ok(outcome.artifact.summary)
}
