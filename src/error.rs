/// Every failure the gateway can report, each with a stable wire code.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Username is required")]
    MissingUsername,

    #[error("{0}")]
    InvalidInput(String),

    #[error("Access denied. You are not on the authorized list.")]
    Unauthorized,

    #[error("{0}")]
    PermissionDenied(String),

    #[error("{0}")]
    NotFound(String),

    #[error("User '{0}' already exists")]
    AlreadyExists(String),

    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("No prompt provided.")]
    EmptyPrompt,

    #[error("Daily request limit reached")]
    RateLimited,

    #[error("Provider '{0}' not supported")]
    UnknownProvider(String),

    #[error("Model '{model}' not supported by provider '{provider}'")]
    UnknownModel { provider: String, model: String },

    #[error("Error from {provider} API: {body}")]
    Upstream { provider: String, body: String },

    #[error("Invalid response format from {0} API")]
    InvalidUpstreamFormat(String),

    #[error("Error generating response: {0}")]
    Generation(String),

    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl ServiceError {
    /// Machine-readable code sent to clients alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingUsername => "missing_username",
            Self::InvalidInput(_) => "invalid_input",
            Self::Unauthorized => "unauthorized",
            Self::PermissionDenied(_) => "permission_denied",
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::InvalidRole(_) => "invalid_role",
            Self::EmptyPrompt => "no_prompt",
            Self::RateLimited => "rate_limit",
            Self::UnknownProvider(_) => "unknown_provider",
            Self::UnknownModel { .. } => "unknown_model",
            Self::Upstream { .. } => "upstream_error",
            Self::InvalidUpstreamFormat(_) => "invalid_upstream_format",
            Self::Generation(_) => "generation_error",
            Self::Storage(_) => "internal_error",
        }
    }

    /// True for failures raised while talking to (or choosing) a provider.
    pub fn is_dispatch_failure(&self) -> bool {
        matches!(
            self,
            Self::UnknownProvider(_)
                | Self::UnknownModel { .. }
                | Self::Upstream { .. }
                | Self::InvalidUpstreamFormat(_)
                | Self::Generation(_)
        )
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Generation(format!("upstream request timed out: {err}"))
        } else {
            Self::Generation(err.to_string())
        }
    }
}
