use crate::output;
use clap::Subcommand;
use std::path::Path;
use tfpipe_core::apply::load_credentials;
use tfpipe_core::backend::{self, BackendAddresses, ProbeOutcome};
use tfpipe_core::config::PipelineConfig;
use tfpipe_core::environment::DeploymentSequence;

#[derive(Subcommand)]
pub enum BackendSubcommand {
    /// Derive the state addresses and initialize the state client
    Init {
        /// Environment name
        #[arg(long)]
        env: String,
    },
}

pub fn run(root: &Path, subcommand: BackendSubcommand, json: bool) -> anyhow::Result<()> {
    match subcommand {
        BackendSubcommand::Init { env } => init(root, &env, json),
    }
}

fn init(root: &Path, env: &str, json: bool) -> anyhow::Result<()> {
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
    let probe = backend::probe(&addresses, &bundle)?;
    backend::init(&environment.workdir_under(root), &addresses, &bundle)?;

    if json {
        output::print_json(&serde_json::json!({
            "environment": env,
            "state_address": addresses.state,
            "lock_address": addresses.lock,
            "state_exists": probe == ProbeOutcome::Existing,
        }))?;
    } else {
        println!("backend initialized for '{env}'");
        println!("  state: {}", addresses.state);
        if probe == ProbeOutcome::NotCreated {
            println!("  note: no remote state yet (first apply will create it)");
        }
    }
    Ok(())
}
