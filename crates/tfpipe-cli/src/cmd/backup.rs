use crate::output;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use std::path::Path;
use tfpipe_core::{backup, paths};

#[derive(Subcommand)]
pub enum BackupSubcommand {
    /// List pre-apply state snapshots, oldest first
    List {
        /// Environment name
        #[arg(long)]
        env: String,
    },
}

pub fn run(root: &Path, subcommand: BackupSubcommand, json: bool) -> anyhow::Result<()> {
    match subcommand {
        BackupSubcommand::List { env } => list(root, &env, json),
    }
}

fn list(root: &Path, env: &str, json: bool) -> anyhow::Result<()> {
    paths::validate_env_name(env)?;
    let snapshots = backup::list(root, env)?;

    if json {
        output::print_json(&snapshots)?;
        return Ok(());
    }

    if snapshots.is_empty() {
        println!("no backups for '{env}'");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = snapshots
        .iter()
        .map(|path| {
            let meta = std::fs::metadata(path);
            let size = meta
                .as_ref()
                .map(|m| m.len().to_string())
                .unwrap_or_else(|_| "?".to_string());
            let modified = meta
                .ok()
                .and_then(|m| m.modified().ok())
                .map(|t| DateTime::<Utc>::from(t).format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "?".to_string());
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            vec![name, size, modified]
        })
        .collect();
    output::print_table(&["FILE", "BYTES", "MODIFIED (UTC)"], rows);
    Ok(())
}
