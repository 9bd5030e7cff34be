use crate::output;
use clap::Subcommand;
use std::path::Path;
use tfpipe_core::annotate::Annotator;
use tfpipe_core::config::PipelineConfig;
use tfpipe_core::scan::{self, ScanStatus};

#[derive(Subcommand)]
pub enum ScanSubcommand {
    /// Aggregate per-scanner results into one pass/warn/fail summary
    Rollup,
}

pub fn run(root: &Path, subcommand: ScanSubcommand, json: bool) -> anyhow::Result<()> {
    match subcommand {
        ScanSubcommand::Rollup => rollup(root, json),
    }
}

fn rollup(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = PipelineConfig::load(root)?;
    let summary = scan::rollup(root)?;
    let path = scan::write_summary(root, &summary)?;

    let annotator = Annotator::new(root, config.ci.agent.clone());
    let body = match summary.overall {
        ScanStatus::Pass => format!("security scan passed ({} scanner(s))", summary.scanners.len()),
        ScanStatus::Warn => "security scan reported warnings".to_string(),
        ScanStatus::Fail => "security scan failed".to_string(),
    };
    annotator.annotate("scan", summary.overall.severity(), &body);

    if json {
        output::print_json(&summary)?;
    } else {
        println!("security scan: {:?}", summary.overall);
        for (scanner, status) in &summary.scanners {
            println!("  {scanner}: {status:?}");
        }
        println!("  summary: {}", path.display());
    }

    if summary.overall == ScanStatus::Fail {
        anyhow::bail!("security scan failed");
    }
    Ok(())
}
