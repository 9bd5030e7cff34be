use crate::output;
use std::path::Path;
use tfpipe_core::annotate::Annotator;
use tfpipe_core::config::{self, PipelineConfig};
use tfpipe_core::environment::DeploymentSequence;
use tfpipe_core::{apply, PipelineError};

pub fn run(
    root: &Path,
    env: &str,
    force_unlock: bool,
    justification: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let config = PipelineConfig::load(root)?;
    let sequence = DeploymentSequence::from_config(&config, &config.target_environments())?;
    let environment = sequence
        .get(env)
        .ok_or_else(|| PipelineError::EnvironmentNotFound(env.to_string()))?;

    let annotator = Annotator::new(root, config.ci.agent.clone());
    if let Some(text) = justification {
        annotator.set_metadata(env, "justification", text);
    }

    let force = force_unlock || config::force_unlock_override();
    let outcome = apply::run(root, environment, &config, &annotator, force)?;

    if json {
        output::print_json(&serde_json::json!({
            "environment": env,
            "outputs": outcome.outputs_path,
            "log": outcome.log_path,
            "backup": outcome.backup.as_ref().map(|b| &b.path),
        }))?;
    } else {
        println!("apply complete for '{env}'");
        println!("  outputs: {}", outcome.outputs_path.display());
        println!("  log:     {}", outcome.log_path.display());
        if let Some(backup) = &outcome.backup {
            println!("  backup:  {}", backup.path.display());
        }
    }
    Ok(())
}
