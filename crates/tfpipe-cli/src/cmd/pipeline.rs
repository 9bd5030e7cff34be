use clap::Subcommand;
use std::path::{Path, PathBuf};
use tfpipe_core::config::PipelineConfig;
use tfpipe_core::environment::DeploymentSequence;
use tfpipe_core::io;
use tfpipe_core::sequencer::StepGraph;

#[derive(Subcommand)]
pub enum PipelineSubcommand {
    /// Generate the orchestrator step list for the deployment sequence
    Generate {
        /// Comma-separated environment names (default: configured list)
        #[arg(long)]
        envs: Option<String>,

        /// Write the step list to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

pub fn run(root: &Path, subcommand: PipelineSubcommand) -> anyhow::Result<()> {
    match subcommand {
        PipelineSubcommand::Generate { envs, output } => generate(root, envs.as_deref(), output),
    }
}

fn generate(root: &Path, envs: Option<&str>, output: Option<PathBuf>) -> anyhow::Result<()> {
    let config = PipelineConfig::load(root)?;
    let targets = match envs {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => config.target_environments(),
    };

    let sequence = DeploymentSequence::from_config(&config, &targets)?;
    let graph = StepGraph::build(&sequence)?;
    let yaml = graph.to_orchestrator_yaml()?;

    match output {
        Some(path) => {
            io::atomic_write(&path, yaml.as_bytes())?;
            println!("wrote {} steps to {}", graph.nodes().len(), path.display());
        }
        None => print!("{yaml}"),
    }
    Ok(())
}
