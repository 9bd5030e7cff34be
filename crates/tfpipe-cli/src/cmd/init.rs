use anyhow::Context;
use std::path::Path;
use tfpipe_core::config::PipelineConfig;
use tfpipe_core::{io, paths};

pub fn run(root: &Path, project: Option<&str>) -> anyhow::Result<()> {
    let project = match project {
        Some(name) => name.to_string(),
        None => root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string()),
    };

    io::ensure_dir(&paths::tfpipe_dir(root))?;
    io::ensure_dir(&root.join(paths::ARTIFACTS_DIR))?;
    io::ensure_dir(&root.join(paths::BACKUPS_DIR))?;
    io::ensure_dir(&root.join(paths::SCANS_DIR))?;

    let config_path = paths::config_path(root);
    if config_path.exists() {
        println!("already initialized: {}", config_path.display());
        return Ok(());
    }

    let config = PipelineConfig::new(&project);
    config
        .save(root)
        .with_context(|| format!("failed to write {}", config_path.display()))?;

    println!("initialized tfpipe for project '{project}'");
    println!("  config: {}", config_path.display());
    println!("edit the environments and backend sections, then run 'tfpipe pipeline generate'");
    Ok(())
}
