//! Plan stage: validate → plan → analyze → report.
//!
//! Produces the [`PlanArtifact`] the apply stage consumes: the binary plan,
//! its JSON rendering, and the parsed change summary. The summary comes
//! from the JSON rendering when the tool can produce one; the pluralized
//! text line is a fenced fallback that fails explicitly on non-match.

use crate::analysis::{self, AnalysisReport};
use crate::annotate::{Annotator, Severity};
use crate::config::PipelineConfig;
use crate::credentials::CredentialBundle;
use crate::environment::Environment;
use crate::error::{PipelineError, Result};
use crate::tool::ToolInvocation;
use crate::{io, paths};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

// ---------------------------------------------------------------------------
// PlanPhase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanPhase {
    NotStarted,
    Validating,
    Planning,
    Analyzing,
    Reported,
    Failed,
}

impl PlanPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanPhase::NotStarted => "not_started",
            PlanPhase::Validating => "validating",
            PlanPhase::Planning => "planning",
            PlanPhase::Analyzing => "analyzing",
            PlanPhase::Reported => "reported",
            PlanPhase::Failed => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// ChangeSummary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub additions: u64,
    pub changes: u64,
    pub destructions: u64,
}

static PLAN_LINE_RE: OnceLock<Regex> = OnceLock::new();

fn plan_line_re() -> &'static Regex {
    PLAN_LINE_RE.get_or_init(|| {
        Regex::new(r"Plan:\s*(\d+) to add, (\d+) to change, (\d+) to destroy").unwrap()
    })
}

impl ChangeSummary {
    /// Roll up `resource_changes[].change.actions` from the plan's JSON
    /// rendering. Returns None when the document lacks the expected shape.
    pub fn from_plan_json(value: &serde_json::Value) -> Option<Self> {
        let changes = value.get("resource_changes")?.as_array()?;
        let mut summary = ChangeSummary::default();
        for rc in changes {
            let actions = rc.get("change")?.get("actions")?.as_array()?;
            let actions: Vec<&str> = actions.iter().filter_map(|a| a.as_str()).collect();
            match actions.as_slice() {
                ["create"] => summary.additions += 1,
                ["update"] => summary.changes += 1,
                ["delete"] => summary.destructions += 1,
                // A replace is one destruction plus one addition.
                ["delete", "create"] | ["create", "delete"] => {
                    summary.additions += 1;
                    summary.destructions += 1;
                }
                _ => {}
            }
        }
        Some(summary)
    }

    /// Fenced fallback over the human-readable rendering: the pluralized
    /// `Plan: <a> to add, <c> to change, <d> to destroy` line or the
    /// `No changes` sentinel. Anything else is an explicit failure.
    pub fn parse_text(text: &str) -> Result<Self> {
        if let Some(caps) = plan_line_re().captures(text) {
            // The regex only admits digits, so these parses cannot fail.
            return Ok(ChangeSummary {
                additions: caps[1].parse().unwrap_or(0),
                changes: caps[2].parse().unwrap_or(0),
                destructions: caps[3].parse().unwrap_or(0),
            });
        }
        if text.contains("No changes") {
            return Ok(ChangeSummary::default());
        }
        let hint: String = text.chars().take(200).collect();
        Err(PipelineError::PlanSummaryUnparsable(hint))
    }

    /// Destroying anything is worth a warning; everything else is routine.
    pub fn severity(&self) -> Severity {
        if self.destructions > 0 {
            Severity::Warning
        } else {
            Severity::Success
        }
    }

    pub fn total(&self) -> u64 {
        self.additions + self.changes + self.destructions
    }

    pub fn describe(&self) -> String {
        if self.total() == 0 {
            return "no changes".to_string();
        }
        format!(
            "{} to add, {} to change, {} to destroy",
            self.additions, self.changes, self.destructions
        )
    }
}

// ---------------------------------------------------------------------------
// PlanArtifact
// ---------------------------------------------------------------------------

/// The reviewed plan, environment-scoped. Consumed read-only by the
/// analysis and apply stages.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanArtifact {
    pub environment: String,
    pub binary_path: PathBuf,
    pub json_path: PathBuf,
    pub summary: ChangeSummary,
}

/// The apply stage's precondition: the reviewed binary plan must exist.
pub fn require_plan_binary(root: &Path, environment: &str) -> Result<PathBuf> {
    let path = paths::plan_binary_path(root, environment);
    if !path.exists() {
        return Err(PipelineError::MissingPlanArtifact(environment.to_string()));
    }
    Ok(path)
}

// ---------------------------------------------------------------------------
// PlanStage
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct PlanStage {
    phase: PlanPhase,
}

#[derive(Debug)]
pub struct PlanOutcome {
    pub artifact: PlanArtifact,
    pub analysis: AnalysisReport,
}

impl Default for PlanStage {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanStage {
    pub fn new() -> Self {
        Self {
            phase: PlanPhase::NotStarted,
        }
    }

    pub fn phase(&self) -> PlanPhase {
        self.phase
    }

    pub fn run(
        &mut self,
        root: &Path,
        environment: &Environment,
        config: &PipelineConfig,
        bundle: &CredentialBundle,
        annotator: &Annotator,
    ) -> Result<PlanOutcome> {
        match self.execute(root, environment, config, bundle, annotator) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.phase = PlanPhase::Failed;
                Err(e)
            }
        }
    }

    fn execute(
        &mut self,
        root: &Path,
        environment: &Environment,
        config: &PipelineConfig,
        bundle: &CredentialBundle,
        annotator: &Annotator,
    ) -> Result<PlanOutcome> {
        let workdir = environment.workdir_under(root);
        let env_name = environment.name.as_str();

        self.transition(PlanPhase::Validating, env_name);
        let validate = ToolInvocation::new(&workdir, &["validate", "-no-color"])?.run()?;
        if !validate.success {
            return Err(PipelineError::Validation(
                validate.combined().trim().to_string(),
            ));
        }

        self.transition(PlanPhase::Planning, env_name);
        io::ensure_dir(&paths::artifact_dir(root, env_name))?;
        let binary_path = paths::plan_binary_path(root, env_name);
        let out_arg = format!("-out={}", binary_path.display());
        let plan = credentialed(
            ToolInvocation::new(&workdir, &["plan", "-input=false", "-no-color", &out_arg])?,
            bundle,
        )
        .run()?;
        if !plan.success {
            return Err(PipelineError::Plan(plan.combined().trim().to_string()));
        }
        io::atomic_write(
            &paths::plan_summary_path(root, env_name),
            plan.stdout.as_bytes(),
        )?;

        // Structured rendering first; the text line only as fallback.
        let json_path = paths::plan_json_path(root, env_name);
        let binary_arg = binary_path.display().to_string();
        let show = ToolInvocation::new(&workdir, &["show", "-json", &binary_arg])?.run()?;
        let summary = if show.success {
            io::atomic_write(&json_path, show.stdout.as_bytes())?;
            match serde_json::from_str::<serde_json::Value>(&show.stdout)
                .ok()
                .as_ref()
                .and_then(ChangeSummary::from_plan_json)
            {
                Some(summary) => summary,
                None => ChangeSummary::parse_text(&plan.stdout)?,
            }
        } else {
            ChangeSummary::parse_text(&plan.stdout)?
        };

        annotator.set_metadata(env_name, "additions", &summary.additions.to_string());
        annotator.set_metadata(env_name, "changes", &summary.changes.to_string());
        annotator.set_metadata(env_name, "destructions", &summary.destructions.to_string());
        annotator.annotate(
            env_name,
            summary.severity(),
            &format!("plan for {env_name}: {}", summary.describe()),
        );

        self.transition(PlanPhase::Analyzing, env_name);
        let analysis = analysis::run_all(root, env_name, &config.analyzers);

        self.transition(PlanPhase::Reported, env_name);
        Ok(PlanOutcome {
            artifact: PlanArtifact {
                environment: env_name.to_string(),
                binary_path,
                json_path,
                summary,
            },
            analysis,
        })
    }

    fn transition(&mut self, next: PlanPhase, environment: &str) {
        debug!(
            "[{environment}] plan stage: {} -> {}",
            self.phase.as_str(),
            next.as_str()
        );
        self.phase = next;
    }
}

/// Attach the backend transport credentials to a tool invocation.
pub fn credentialed(invocation: ToolInvocation, bundle: &CredentialBundle) -> ToolInvocation {
    let mut invocation = invocation;
    if let Some(username) = bundle.get("backend_username") {
        invocation = invocation.env("TF_HTTP_USERNAME", username);
    }
    if let Some(password) = bundle.get("backend_password") {
        invocation = invocation.env("TF_HTTP_PASSWORD", password);
    }
    invocation
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
