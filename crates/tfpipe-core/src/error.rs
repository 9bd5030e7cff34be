use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("not initialized: run 'tfpipe init'")]
    NotInitialized,

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("required secret missing for provider '{provider}' in environment '{environment}'")]
    RequiredSecretMissing {
        provider: String,
        environment: String,
    },

    #[error("configuration validation failed: {0}")]
    Validation(String),

    #[error("plan failed: {0}")]
    Plan(String),

    #[error("apply failed: {0}")]
    Apply(String),

    #[error("state backend unreachable: {0}")]
    BackendUnreachable(String),

    #[error("backend initialization failed: {0}")]
    InitializationFailed(String),

    #[error("remote state is locked (lock id: {id}); rerun with the force-unlock override to release it")]
    StateLocked { id: String },

    #[error("plan summary did not match the expected grammar: {0:?}")]
    PlanSummaryUnparsable(String),

    #[error("lock listing did not match the expected grammar: {0:?}")]
    LockListingUnparsable(String),

    #[error("invalid deployment sequence: {0}")]
    SequenceInvalid(String),

    #[error("environment not found: {0}")]
    EnvironmentNotFound(String),

    #[error("no plan artifact found for environment '{0}': run 'tfpipe plan' first")]
    MissingPlanArtifact(String),

    #[error("invalid environment name '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidEnvironmentName(String),

    #[error("no terraform or tofu binary found on PATH")]
    ToolNotFound,

    #[error("failed to spawn tool: {0}")]
    ToolSpawnFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
