use crate::output;
use clap::Subcommand;
use std::path::{Path, PathBuf};
use tfpipe_core::apply::load_credentials;
use tfpipe_core::config::PipelineConfig;
use tfpipe_core::credentials::ExportGuard;
use tfpipe_core::paths;

#[derive(Subcommand)]
pub enum SecretsSubcommand {
    /// Exchange the CI identity token and fetch all provider credentials
    Fetch {
        /// Environment name
        #[arg(long)]
        env: String,

        /// Write a KEY=VALUE export file for a later pipeline stage.
        /// The file is owner-only; the consuming stage deletes it.
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

pub fn run(root: &Path, subcommand: SecretsSubcommand, json: bool) -> anyhow::Result<()> {
    match subcommand {
        SecretsSubcommand::Fetch { env, export } => fetch(root, &env, export.as_deref(), json),
    }
}

fn fetch(root: &Path, env: &str, export: Option<&Path>, json: bool) -> anyhow::Result<()> {
    paths::validate_env_name(env)?;
    let config = PipelineConfig::load(root)?;
    let bundle = load_credentials(&config, env)?;

    // Key names only; values never reach stdout.
    let key_names: Vec<String> = bundle
        .env_pairs()
        .into_iter()
        .map(|(k, _)| k)
        .collect();

    if let Some(path) = export {
        let guard = ExportGuard::write(path, &bundle)?;
        // Detach: the consuming stage owns deletion of the export file.
        let path = guard.into_path();
        if !json {
            println!("exported {} credential(s) to {}", key_names.len(), path.display());
        }
    }

    if json {
        output::print_json(&serde_json::json!({
            "environment": env,
            "secrets": key_names,
        }))?;
    } else {
        println!("loaded {} credential(s) for '{env}':", key_names.len());
        for name in key_names {
            println!("  {name}");
        }
    }
    Ok(())
}
