use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::paths;
use regex::Regex;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// One deployment target, immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    pub name: String,
    /// Zero-based position in the deployment sequence.
    pub position: usize,
    pub workdir: PathBuf,
    /// Production-classified environments require a manual approval gate
    /// before apply.
    pub production: bool,
}

impl Environment {
    pub fn workdir_under(&self, root: &Path) -> PathBuf {
        root.join(&self.workdir)
    }
}

// ---------------------------------------------------------------------------
// DeploymentSequence
// ---------------------------------------------------------------------------

/// Ordered list of environments. Environment `i`'s apply must complete
/// before environment `i + 1`'s stages begin; the sequencer encodes that
/// chain as explicit dependency edges.
#[derive(Debug, Clone)]
pub struct DeploymentSequence {
    environments: Vec<Environment>,
}

impl DeploymentSequence {
    /// Build the sequence for the given target names from configuration.
    ///
    /// Fails on an empty target list, a duplicate name, or a name with no
    /// configured environment.
    pub fn from_config(config: &PipelineConfig, targets: &[String]) -> Result<Self> {
        if targets.is_empty() {
            return Err(PipelineError::SequenceInvalid(
                "no target environments".to_string(),
            ));
        }

        let production_re = Regex::new(&config.production_pattern).map_err(|e| {
            PipelineError::SequenceInvalid(format!(
                "invalid production pattern '{}': {e}",
                config.production_pattern
            ))
        })?;

        let mut seen = std::collections::HashSet::new();
        let mut environments = Vec::with_capacity(targets.len());
        for (position, name) in targets.iter().enumerate() {
            paths::validate_env_name(name)?;
            if !seen.insert(name.as_str()) {
                return Err(PipelineError::SequenceInvalid(format!(
                    "duplicate environment: {name}"
                )));
            }
            let cfg = config
                .environments
                .iter()
                .find(|e| &e.name == name)
                .ok_or_else(|| PipelineError::EnvironmentNotFound(name.clone()))?;
            let production = cfg
                .production
                .unwrap_or_else(|| production_re.is_match(name));
            environments.push(Environment {
                name: name.clone(),
                position,
                workdir: PathBuf::from(&cfg.workdir),
                production,
            });
        }

        Ok(Self { environments })
    }

    pub fn environments(&self) -> &[Environment] {
        &self.environments
    }

    pub fn get(&self, name: &str) -> Option<&Environment> {
        self.environments.iter().find(|e| e.name == name)
    }

    pub fn len(&self) -> usize {
        self.environments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.environments.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvironmentConfig;

    fn config_with(names: &[&str]) -> PipelineConfig {
        let mut config = PipelineConfig::new("proj");
        config.environments = names
            .iter()
            .map(|n| EnvironmentConfig {
                name: n.to_string(),
                workdir: ".".to_string(),
                production: None,
            })
            .collect();
        config
    }

    fn targets(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn sequence_preserves_order_and_positions() {
        let config = config_with(&["dev", "tst", "prd"]);
        let seq = DeploymentSequence::from_config(&config, &targets(&["dev", "tst", "prd"]))
            .unwrap();
        let names: Vec<&str> = seq.environments().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["dev", "tst", "prd"]);
        assert_eq!(seq.environments()[2].position, 2);
    }

    #[test]
    fn production_classification_by_pattern() {
        let config = config_with(&["dev", "prd", "prod-eu"]);
        let seq =
            DeploymentSequence::from_config(&config, &targets(&["dev", "prd", "prod-eu"])).unwrap();
        assert!(!seq.get("dev").unwrap().production);
        assert!(seq.get("prd").unwrap().production);
        assert!(seq.get("prod-eu").unwrap().production);
    }

    #[test]
    fn explicit_production_flag_wins_over_pattern() {
        let mut config = config_with(&["staging"]);
        config.environments[0].production = Some(true);
        let seq = DeploymentSequence::from_config(&config, &targets(&["staging"])).unwrap();
        assert!(seq.get("staging").unwrap().production);
    }

    #[test]
    fn empty_targets_rejected() {
        let config = config_with(&["dev"]);
        assert!(matches!(
            DeploymentSequence::from_config(&config, &[]),
            Err(PipelineError::SequenceInvalid(_))
        ));
    }

    #[test]
    fn duplicate_targets_rejected() {
        let config = config_with(&["dev"]);
        assert!(matches!(
            DeploymentSequence::from_config(&config, &targets(&["dev", "dev"])),
            Err(PipelineError::SequenceInvalid(_))
        ));
    }

    #[test]
    fn unknown_environment_rejected() {
        let config = config_with(&["dev"]);
        assert!(matches!(
            DeploymentSequence::from_config(&config, &targets(&["qa"])),
            Err(PipelineError::EnvironmentNotFound(_))
        ));
    }
}
