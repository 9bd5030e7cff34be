use crate::output;
use clap::Subcommand;
use std::path::Path;
use tfpipe_core::apply::load_credentials;
use tfpipe_core::backend::BackendAddresses;
use tfpipe_core::config::PipelineConfig;
use tfpipe_core::environment::DeploymentSequence;
use tfpipe_core::lock::{self, LockStatus};
use tfpipe_core::PipelineError;

#[derive(Subcommand)]
pub enum LockSubcommand {
    /// Show whether the remote state is locked
    Status {
        /// Environment name
        #[arg(long)]
        env: String,
    },

    /// Force-release the remote state lock (operator override)
    Release {
        /// Environment name
        #[arg(long)]
        env: String,

        /// Lock ID to release (default: the currently held lock)
        #[arg(long)]
        id: Option<String>,
    },
}

pub fn run(root: &Path, subcommand: LockSubcommand, json: bool) -> anyhow::Result<()> {
    match subcommand {
        LockSubcommand::Status { env } => status(root, &env, json),
        LockSubcommand::Release { env, id } => release(root, &env, id.as_deref()),
    }
}

fn status(root: &Path, env: &str, json: bool) -> anyhow::Result<()> {
    let config = PipelineConfig::load(root)?;
    let bundle = load_credentials(&config, env)?;
    let addresses = BackendAddresses::derive(
        &config.backend.effective_base_url(),
        &config.project,
        env,
    );

    match lock::status(&addresses, &bundle)? {
        LockStatus::Unlocked => {
            if json {
                output::print_json(&serde_json::json!({
                    "environment": env,
                    "locked": false,
                }))?;
            } else {
                println!("'{env}' is unlocked");
            }
        }
        LockStatus::Locked(info) => {
            if json {
                output::print_json(&serde_json::json!({
                    "environment": env,
                    "locked": true,
                    "id": info.id,
                    "who": info.who,
                    "created": info.created,
                }))?;
            } else {
                println!("'{env}' is locked");
                println!("  id:      {}", info.id);
                if let Some(who) = &info.who {
                    println!("  holder:  {who}");
                }
                if let Some(created) = &info.created {
                    println!("  created: {created}");
                }
            }
        }
    }
    Ok(())
}

fn release(root: &Path, env: &str, id: Option<&str>) -> anyhow::Result<()> {
    let config = PipelineConfig::load(root)?;
    let sequence = DeploymentSequence::from_config(&config, &config.target_environments())?;
    let environment = sequence
        .get(env)
        .ok_or_else(|| PipelineError::EnvironmentNotFound(env.to_string()))?;

    let bundle = load_credentials(&config, env)?;
    let addresses = BackendAddresses::derive(
        &config.backend.effective_base_url(),
        &config.project,
        env,
    );

    let id = match id {
        Some(id) => id.to_string(),
        None => match lock::status(&addresses, &bundle)? {
            LockStatus::Locked(info) => info.id,
            LockStatus::Unlocked => {
                println!("'{env}' is already unlocked");
                return Ok(());
            }
        },
    };

    lock::force_unlock(&environment.workdir_under(root), &id, &bundle)?;
    println!("released lock {id} on '{env}'");
    Ok(())
}
