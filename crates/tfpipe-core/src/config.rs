use crate::error::{PipelineError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Environment variables consumed from the CI runner
// ---------------------------------------------------------------------------

pub const ENV_ID_TOKEN: &str = "TFPIPE_ID_TOKEN";
pub const ENV_SECRETS_ADDR: &str = "TFPIPE_SECRETS_ADDR";
pub const ENV_BACKEND_URL: &str = "TFPIPE_BACKEND_URL";
pub const ENV_FORCE_UNLOCK: &str = "TFPIPE_FORCE_UNLOCK";
pub const ENV_ENVIRONMENTS: &str = "TFPIPE_ENVIRONMENTS";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// SecretsConfig
// ---------------------------------------------------------------------------

/// A provider namespace in the secrets service, fetched at
/// `secret/<name>/<environment>` with an optional non-namespaced fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub name: String,
    /// A missing mandatory secret aborts the run; optional providers are
    /// logged and skipped.
    #[serde(default)]
    pub mandatory: bool,
    /// Whether a 404 on the environment path may fall back to
    /// `secret/<name>` without the environment segment.
    #[serde(default = "default_true")]
    pub allow_default_path: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecretsConfig {
    /// Secrets service base URL. Overridden by `TFPIPE_SECRETS_ADDR`.
    #[serde(default)]
    pub address: String,
    #[serde(default = "default_auth_path")]
    pub auth_path: String,
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
}

fn default_auth_path() -> String {
    "v1/auth/jwt/login".to_string()
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![
        // The state-backend credential is always mandatory.
        ProviderConfig {
            name: "backend".to_string(),
            mandatory: true,
            allow_default_path: true,
        },
        ProviderConfig {
            name: "cloud".to_string(),
            mandatory: false,
            allow_default_path: true,
        },
        ProviderConfig {
            name: "compliance".to_string(),
            mandatory: false,
            allow_default_path: false,
        },
    ]
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            auth_path: default_auth_path(),
            providers: default_providers(),
        }
    }
}

impl SecretsConfig {
    /// Effective service address: env var wins over the config file.
    pub fn effective_address(&self) -> String {
        std::env::var(ENV_SECRETS_ADDR).unwrap_or_else(|_| self.address.clone())
    }
}

// ---------------------------------------------------------------------------
// BackendConfigFile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct BackendConfigFile {
    /// Remote state base URL. Overridden by `TFPIPE_BACKEND_URL`.
    #[serde(default)]
    pub base_url: String,
}

impl BackendConfigFile {
    pub fn effective_base_url(&self) -> String {
        std::env::var(ENV_BACKEND_URL).unwrap_or_else(|_| self.base_url.clone())
    }
}

// ---------------------------------------------------------------------------
// AnalyzersConfig
// ---------------------------------------------------------------------------

/// Optional plan analyzers. Each names an executable on PATH; an absent or
/// failing analyzer is skipped, never fatal.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct AnalyzersConfig {
    #[serde(default)]
    pub ai_summary: Option<String>,
    #[serde(default)]
    pub blast_radius: Option<String>,
}

// ---------------------------------------------------------------------------
// CiConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct CiConfig {
    /// CI agent binary used for annotations and metadata
    /// (e.g. `buildkite-agent`). When unset, annotations are logged and
    /// metadata lands in the per-environment metadata artifact.
    #[serde(default)]
    pub agent: Option<String>,
}

// ---------------------------------------------------------------------------
// EnvironmentConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    pub name: String,
    /// Working directory holding this environment's configuration,
    /// relative to the project root.
    #[serde(default = "default_workdir")]
    pub workdir: String,
    /// Explicit production flag; when unset, the production name pattern
    /// decides.
    #[serde(default)]
    pub production: Option<bool>,
}

fn default_workdir() -> String {
    ".".to_string()
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub project: String,
    #[serde(default)]
    pub backend: BackendConfigFile,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub environments: Vec<EnvironmentConfig>,
    /// Names matching this pattern are production-classified and require a
    /// manual approval gate before apply.
    #[serde(default = "default_production_pattern")]
    pub production_pattern: String,
    #[serde(default)]
    pub analyzers: AnalyzersConfig,
    #[serde(default)]
    pub ci: CiConfig,
}

fn default_production_pattern() -> String {
    "^(prd|prod)".to_string()
}

impl PipelineConfig {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            backend: BackendConfigFile::default(),
            secrets: SecretsConfig::default(),
            environments: vec![
                EnvironmentConfig {
                    name: "dev".to_string(),
                    workdir: default_workdir(),
                    production: None,
                },
                EnvironmentConfig {
                    name: "prd".to_string(),
                    workdir: default_workdir(),
                    production: None,
                },
            ],
            production_pattern: default_production_pattern(),
            analyzers: AnalyzersConfig::default(),
            ci: CiConfig::default(),
        }
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(PipelineError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let config: PipelineConfig = serde_yaml::from_str(&data)?;
        Ok(config)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.project.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "project name is empty".to_string(),
            });
        }

        if self.environments.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "no environments configured".to_string(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for env in &self.environments {
            if paths::validate_env_name(&env.name).is_err() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("invalid environment name: {}", env.name),
                });
            }
            if !seen.insert(env.name.as_str()) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("duplicate environment name: {}", env.name),
                });
            }
        }

        if !self
            .secrets
            .providers
            .iter()
            .any(|p| p.name == "backend" && p.mandatory)
        {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "the 'backend' secret provider should be mandatory".to_string(),
            });
        }

        if regex::Regex::new(&self.production_pattern).is_err() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("invalid production pattern: {}", self.production_pattern),
            });
        }

        warnings
    }

    // -----------------------------------------------------------------------
    // Runner overrides
    // -----------------------------------------------------------------------

    /// Environment names targeted by this run: `TFPIPE_ENVIRONMENTS`
    /// (comma-separated) wins over the configured list.
    pub fn target_environments(&self) -> Vec<String> {
        match std::env::var(ENV_ENVIRONMENTS) {
            Ok(list) if !list.trim().is_empty() => list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            _ => self.environments.iter().map(|e| e.name.clone()).collect(),
        }
    }
}

/// CI-issued identity token for the secrets service JWT exchange.
pub fn identity_token() -> Result<String> {
    std::env::var(ENV_ID_TOKEN)
        .map_err(|_| PipelineError::Authentication(format!("{ENV_ID_TOKEN} is not set")))
}

/// Whether the operator has set the force-unlock override for this run.
pub fn force_unlock_override() -> bool {
    matches!(
        std::env::var(ENV_FORCE_UNLOCK).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
