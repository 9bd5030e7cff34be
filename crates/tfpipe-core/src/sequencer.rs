//! Environment sequencer.
//!
//! Builds a typed step graph (nodes plus dependency edges) for the
//! deployment sequence and serializes it to the YAML step list the
//! hosting orchestrator executes. The precedence invariants live in the
//! graph constructor, not in generated text: environment `i+1`'s secrets
//! step always depends on environment `i`'s apply step, the first
//! environment hangs off the static security-scan gate, and a
//! production-classified environment gets exactly one approval node (an
//! opaque barrier evaluated by the orchestrator, not by tfpipe) between
//! analysis and apply.

use crate::environment::DeploymentSequence;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ---------------------------------------------------------------------------
// StepKind / StepNode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    SecurityScan,
    Secrets,
    Plan,
    Analysis,
    Approval { justification_required: bool },
    Apply,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepNode {
    pub id: String,
    pub label: String,
    pub kind: StepKind,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

// ---------------------------------------------------------------------------
// StepGraph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct StepGraph {
    nodes: Vec<StepNode>,
}

impl StepGraph {
    /// Build the graph for a deployment sequence. Dependency edges are
    /// validated here so an invariant violation is a construction error,
    /// never a malformed generated pipeline.
    pub fn build(sequence: &DeploymentSequence) -> Result<Self> {
        if sequence.is_empty() {
            return Err(PipelineError::SequenceInvalid(
                "no environments in sequence".to_string(),
            ));
        }

        let mut nodes = vec![StepNode {
            id: "security-scan".to_string(),
            label: "Static security scan".to_string(),
            kind: StepKind::SecurityScan,
            environment: None,
            depends_on: vec![],
        }];

        let mut previous_apply = None::<String>;
        for env in sequence.environments() {
            let name = env.name.as_str();

            let secrets_dep = previous_apply
                .clone()
                .unwrap_or_else(|| "security-scan".to_string());
            nodes.push(StepNode {
                id: format!("secrets-{name}"),
                label: format!("Fetch credentials ({name})"),
                kind: StepKind::Secrets,
                environment: Some(name.to_string()),
                depends_on: vec![secrets_dep],
            });

            nodes.push(StepNode {
                id: format!("plan-{name}"),
                label: format!("Plan ({name})"),
                kind: StepKind::Plan,
                environment: Some(name.to_string()),
                depends_on: vec![format!("secrets-{name}")],
            });

            nodes.push(StepNode {
                id: format!("analysis-{name}"),
                label: format!("Analyze plan ({name})"),
                kind: StepKind::Analysis,
                environment: Some(name.to_string()),
                depends_on: vec![format!("plan-{name}")],
            });

            let apply_dep = if env.production {
                nodes.push(StepNode {
                    id: format!("approve-{name}"),
                    label: format!("Approve deployment to {name}"),
                    kind: StepKind::Approval {
                        justification_required: true,
                    },
                    environment: Some(name.to_string()),
                    depends_on: vec![format!("analysis-{name}")],
                });
                format!("approve-{name}")
            } else {
                format!("analysis-{name}")
            };

            let apply_id = format!("apply-{name}");
            nodes.push(StepNode {
                id: apply_id.clone(),
                label: format!("Apply ({name})"),
                kind: StepKind::Apply,
                environment: Some(name.to_string()),
                depends_on: vec![apply_dep],
            });
            previous_apply = Some(apply_id);
        }

        let graph = Self { nodes };
        graph.validate()?;
        Ok(graph)
    }

    /// Every id unique; every dependency names an earlier node. The
    /// "earlier" requirement makes cycles impossible by construction.
    fn validate(&self) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::new();
        for node in &self.nodes {
            for dep in &node.depends_on {
                if !seen.contains(dep.as_str()) {
                    return Err(PipelineError::SequenceInvalid(format!(
                        "step '{}' depends on '{dep}' which is not an earlier step",
                        node.id
                    )));
                }
            }
            if !seen.insert(&node.id) {
                return Err(PipelineError::SequenceInvalid(format!(
                    "duplicate step id '{}'",
                    node.id
                )));
            }
        }
        Ok(())
    }

    pub fn nodes(&self) -> &[StepNode] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&StepNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn approval_nodes(&self, environment: &str) -> Vec<&StepNode> {
        self.nodes
            .iter()
            .filter(|n| {
                matches!(n.kind, StepKind::Approval { .. })
                    && n.environment.as_deref() == Some(environment)
            })
            .collect()
    }

    /// Serialize to the orchestrator's YAML step list. Approval nodes
    /// render as opaque block steps with a required justification field.
    pub fn to_orchestrator_yaml(&self) -> Result<String> {
        let steps: Vec<OrchestratorStep> = self.nodes.iter().map(OrchestratorStep::from).collect();
        Ok(serde_yaml::to_string(&OrchestratorPipeline { steps })?)
    }
}

// ---------------------------------------------------------------------------
// Orchestrator serialization
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct OrchestratorPipeline {
    steps: Vec<OrchestratorStep>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum OrchestratorStep {
    Command {
        label: String,
        key: String,
        command: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        depends_on: Vec<String>,
    },
    Block {
        block: String,
        key: String,
        depends_on: Vec<String>,
        fields: Vec<BlockField>,
    },
}

#[derive(Debug, Serialize)]
struct BlockField {
    text: String,
    key: String,
    required: bool,
}

impl From<&StepNode> for OrchestratorStep {
    fn from(node: &StepNode) -> Self {
        let env = node.environment.as_deref().unwrap_or_default();
        match &node.kind {
            StepKind::Approval {
                justification_required,
            } => OrchestratorStep::Block {
                block: node.label.clone(),
                key: node.id.clone(),
                depends_on: node.depends_on.clone(),
                fields: vec![BlockField {
                    text: "Justification".to_string(),
                    key: "justification".to_string(),
                    required: *justification_required,
                }],
            },
            kind => {
                let command = match kind {
                    StepKind::SecurityScan => "tfpipe scan rollup".to_string(),
                    StepKind::Secrets => format!("tfpipe secrets fetch --env {env}"),
                    StepKind::Plan => format!("tfpipe plan --env {env}"),
                    StepKind::Analysis => format!("tfpipe analyze --env {env}"),
                    StepKind::Apply => format!("tfpipe apply --env {env}"),
                    StepKind::Approval { .. } => unreachable!("handled above"),
                };
                OrchestratorStep::Command {
                    label: node.label.clone(),
                    key: node.id.clone(),
                    command,
                    depends_on: node.depends_on.clone(),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnvironmentConfig, PipelineConfig};

    fn sequence(names: &[&str]) -> DeploymentSequence {
        let mut config = PipelineConfig::new("proj");
        config.environments = names
            .iter()
            .map(|n| EnvironmentConfig {
                name: n.to_string(),
                workdir: ".".to_string(),
                production: None,
            })
            .collect();
        let targets: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        DeploymentSequence::from_config(&config, &targets).unwrap()
    }

    #[test]
    fn first_environment_hangs_off_security_scan() {
        let graph = StepGraph::build(&sequence(&["dev", "tst"])).unwrap();
        let secrets = graph.node("secrets-dev").unwrap();
        assert_eq!(secrets.depends_on, vec!["security-scan"]);
    }

    #[test]
    fn next_environment_waits_for_previous_apply() {
        let graph = StepGraph::build(&sequence(&["dev", "tst", "prd"])).unwrap();
        assert_eq!(
            graph.node("secrets-tst").unwrap().depends_on,
            vec!["apply-dev"]
        );
        assert_eq!(
            graph.node("secrets-prd").unwrap().depends_on,
            vec!["apply-tst"]
        );
    }

    #[test]
    fn every_secrets_step_depends_on_predecessor_apply() {
        let graph = StepGraph::build(&sequence(&["dev", "tst", "prd"])).unwrap();
        let envs = ["dev", "tst", "prd"];
        for pair in envs.windows(2) {
            let secrets = graph.node(&format!("secrets-{}", pair[1])).unwrap();
            assert!(
                secrets.depends_on.contains(&format!("apply-{}", pair[0])),
                "secrets-{} must depend on apply-{}",
                pair[1],
                pair[0]
            );
        }
    }

    #[test]
    fn non_production_has_no_approval_gate() {
        let graph = StepGraph::build(&sequence(&["dev", "tst"])).unwrap();
        assert!(graph.approval_nodes("dev").is_empty());
        assert!(graph.approval_nodes("tst").is_empty());
        assert_eq!(
            graph.node("apply-dev").unwrap().depends_on,
            vec!["analysis-dev"]
        );
    }

    #[test]
    fn production_has_exactly_one_approval_with_required_justification() {
        let graph = StepGraph::build(&sequence(&["dev", "prd"])).unwrap();
        let approvals = graph.approval_nodes("prd");
        assert_eq!(approvals.len(), 1);
        assert_eq!(
            approvals[0].kind,
            StepKind::Approval {
                justification_required: true
            }
        );
        // Approval sits between analysis and apply.
        assert_eq!(approvals[0].depends_on, vec!["analysis-prd"]);
        assert_eq!(
            graph.node("apply-prd").unwrap().depends_on,
            vec!["approve-prd"]
        );
    }

    #[test]
    fn graph_orders_environments() {
        let graph = StepGraph::build(&sequence(&["dev", "tst", "prd"])).unwrap();
        let ids: Vec<&str> = graph.nodes().iter().map(|n| n.id.as_str()).collect();
        let pos = |id: &str| ids.iter().position(|i| *i == id).unwrap();
        assert!(pos("apply-dev") < pos("secrets-tst"));
        assert!(pos("apply-tst") < pos("secrets-prd"));
    }

    #[test]
    fn yaml_renders_approval_as_block_step() {
        let graph = StepGraph::build(&sequence(&["prd"])).unwrap();
        let yaml = graph.to_orchestrator_yaml().unwrap();
        assert!(yaml.contains("block: Approve deployment to prd"));
        assert!(yaml.contains("key: justification"));
        assert!(yaml.contains("required: true"));
    }

    #[test]
    fn yaml_renders_commands_with_dependencies() {
        let graph = StepGraph::build(&sequence(&["dev", "tst"])).unwrap();
        let yaml = graph.to_orchestrator_yaml().unwrap();
        assert!(yaml.contains("command: tfpipe plan --env dev"));
        assert!(yaml.contains("command: tfpipe apply --env tst"));
        assert!(yaml.contains("- apply-dev"));
    }

    #[test]
    fn validate_rejects_forward_dependency() {
        let graph = StepGraph {
            nodes: vec![
                StepNode {
                    id: "a".to_string(),
                    label: "A".to_string(),
                    kind: StepKind::Plan,
                    environment: Some("dev".to_string()),
                    depends_on: vec!["b".to_string()],
                },
                StepNode {
                    id: "b".to_string(),
                    label: "B".to_string(),
                    kind: StepKind::Apply,
                    environment: Some("dev".to_string()),
                    depends_on: vec![],
                },
            ],
        };
        assert!(matches!(
            graph.validate(),
            Err(PipelineError::SequenceInvalid(_))
        ));
    }
}
