mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    backend::BackendSubcommand, backup::BackupSubcommand, lock::LockSubcommand,
    pipeline::PipelineSubcommand, scan::ScanSubcommand, secrets::SecretsSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "tfpipe",
    about = "Terraform/OpenTofu deployment pipeline orchestrator",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from tfpipe.yaml or .git/)
    #[arg(long, global = true, env = "TFPIPE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize tfpipe in the current project
    Init {
        /// Project name (default: the root directory's name)
        #[arg(long)]
        project: Option<String>,
    },

    /// Fetch credentials from the secrets service
    Secrets {
        #[command(subcommand)]
        subcommand: SecretsSubcommand,
    },

    /// Configure and probe the remote state backend
    Backend {
        #[command(subcommand)]
        subcommand: BackendSubcommand,
    },

    /// Validate, plan, and analyze one environment
    Plan {
        /// Environment name
        #[arg(long)]
        env: String,
    },

    /// Run the optional plan analyzers standalone
    Analyze {
        /// Environment name
        #[arg(long)]
        env: String,
    },

    /// Apply the reviewed plan artifact for one environment
    Apply {
        /// Environment name
        #[arg(long)]
        env: String,

        /// Release an existing remote lock before applying (operator override)
        #[arg(long)]
        force_unlock: bool,

        /// Approval justification, recorded in CI metadata
        #[arg(long)]
        justification: Option<String>,
    },

    /// List pre-apply state backups
    Backup {
        #[command(subcommand)]
        subcommand: BackupSubcommand,
    },

    /// Inspect or release the remote state lock
    Lock {
        #[command(subcommand)]
        subcommand: LockSubcommand,
    },

    /// Generate the orchestrator pipeline from the environment sequence
    Pipeline {
        #[command(subcommand)]
        subcommand: PipelineSubcommand,
    },

    /// Drive the full environment sequence in-process
    Run {
        /// Comma-separated environment names (default: configured list)
        #[arg(long)]
        envs: Option<String>,

        /// Approval justification for production environments
        #[arg(long)]
        justification: Option<String>,

        /// Release existing remote locks before applying (operator override)
        #[arg(long)]
        force_unlock: bool,
    },

    /// Aggregate security-scanner results
    Scan {
        #[command(subcommand)]
        subcommand: ScanSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root_path = cli.root.as_deref();
    let root = root::resolve_root(root_path);

    let result = match cli.command {
        Commands::Init { project } => cmd::init::run(&root, project.as_deref()),
        Commands::Secrets { subcommand } => cmd::secrets::run(&root, subcommand, cli.json),
        Commands::Backend { subcommand } => cmd::backend::run(&root, subcommand, cli.json),
        Commands::Plan { env } => cmd::plan::run(&root, &env, cli.json),
        Commands::Analyze { env } => cmd::analyze::run(&root, &env, cli.json),
        Commands::Apply {
            env,
            force_unlock,
            justification,
        } => cmd::apply::run(&root, &env, force_unlock, justification.as_deref(), cli.json),
        Commands::Backup { subcommand } => cmd::backup::run(&root, subcommand, cli.json),
        Commands::Lock { subcommand } => cmd::lock::run(&root, subcommand, cli.json),
        Commands::Pipeline { subcommand } => cmd::pipeline::run(&root, subcommand),
        Commands::Run {
            envs,
            justification,
            force_unlock,
        } => cmd::run::run(
            &root,
            envs.as_deref(),
            justification.as_deref(),
            force_unlock,
            cli.json,
        ),
        Commands::Scan { subcommand } => cmd::scan::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
