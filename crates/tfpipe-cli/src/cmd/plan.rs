use crate::output;
use std::path::Path;
use tfpipe_core::annotate::Annotator;
use tfpipe_core::apply::load_credentials;
use tfpipe_core::backend::{self, BackendAddresses};
use tfpipe_core::config::PipelineConfig;
use tfpipe_core::environment::DeploymentSequence;
use tfpipe_core::plan::PlanStage;

pub fn run(root: &Path, env: &str, json: bool) -> anyhow::Result<()> {
    let config = PipelineConfig::load(root)?;
    let sequence = DeploymentSequence::from_config(&config, &config.target_environments())?;
    let environment = sequence
        .get(env)
        .ok_or_else(|| tfpipe_core::PipelineError::EnvironmentNotFound(env.to_string()))?;

    let bundle = load_credentials(&config, env)?;
    let addresses = BackendAddresses::derive(
        &config.backend.effective_base_url(),
        &config.project,
        env,
    );
    backend::probe(&addresses, &bundle)?;
    backend::init(&environment.workdir_under(root), &addresses, &bundle)?;

    let annotator = Annotator::new(root, config.ci.agent.clone());
    let mut stage = PlanStage::new();
    let outcome = stage.run(root, environment, &config, &bundle, &annotator)?;

    if json {
        output::print_json(&serde_json::json!({
            "environment": env,
            "phase": stage.phase(),
            "summary": outcome.artifact.summary,
            "analysis": outcome.analysis,
            "plan": outcome.artifact.binary_path,
        }))?;
    } else {
        println!(
            "plan for '{env}': {}",
            outcome.artifact.summary.describe()
        );
        println!("  artifact: {}", outcome.artifact.binary_path.display());
    }
    Ok(())
}
