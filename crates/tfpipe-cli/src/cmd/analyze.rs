use crate::output;
use std::path::Path;
use tfpipe_core::analysis::{self, AnalysisOutcome};
use tfpipe_core::config::PipelineConfig;
use tfpipe_core::paths;

pub fn run(root: &Path, env: &str, json: bool) -> anyhow::Result<()> {
    paths::validate_env_name(env)?;
    let config = PipelineConfig::load(root)?;
    let report = analysis::run_all(root, env, &config.analyzers);

    if json {
        output::print_json(&report)?;
    } else {
        println!("analysis for '{env}':");
        println!("  ai-summary:   {}", describe(&report.ai_summary));
        println!("  blast-radius: {}", describe(&report.blast_radius));
    }
    Ok(())
}

fn describe(outcome: &AnalysisOutcome) -> String {
    match outcome {
        AnalysisOutcome::Passed => "passed".to_string(),
        AnalysisOutcome::Warned { detail } => format!("warned ({detail})"),
        AnalysisOutcome::Skipped { reason } => format!("skipped ({reason})"),
    }
}
