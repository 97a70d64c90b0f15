/// Centralized error types for branch-chrono using thiserror
///
/// Provides domain-specific error types for better error handling and user-facing messages.
use thiserror::Error;

/// Main error type for branch-chrono
#[derive(Error, Debug)]
pub enum ChronoError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Resolution error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors raised while talking to the commit-graph provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Repository not found: {0}")]
    RepoNotFound(String),

    #[error("Branch '{branch}' not found in {repo}")]
    BranchNotFound { repo: String, branch: String },

    #[error("Commit not found: {0}")]
    CommitNotFound(String),

    #[error("Transient provider failure: {0}")]
    Transient(String),

    #[error("Provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed provider response: {0}")]
    Malformed(String),

    #[error("Request was cancelled")]
    Cancelled,
}

/// Errors produced by the resolution engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No commit on '{branch}' at or before {at}")]
    NoCommitBeforeTime { branch: String, at: String },

    #[error("First-parent walk of '{branch}' exceeded the cap of {cap} commits (cap exceeded)")]
    CapExceeded { branch: String, cap: usize },

    #[error("Branch '{0}' has no commits")]
    EmptyBranch(String),

    #[error("Ambiguous merge of '{source_branch}' into '{receiver}': {} equally plausible commits", .candidates.len())]
    AmbiguousMerge {
        source_branch: String,
        receiver: String,
        candidates: Vec<String>,
    },

    #[error("No merge of '{source_branch}' into '{receiver}' found at or before {at}")]
    NoMergeFound {
        source_branch: String,
        receiver: String,
        at: String,
    },

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

/// Errors related to input validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid timestamp '{0}': expected ISO-8601")]
    InvalidTimestamp(String),

    #[error("Invalid time range: {from} is after {to}")]
    InvalidTimeRange { from: String, to: String },

    #[error("Invalid repository '{0}': expected owner/name")]
    InvalidRepo(String),

    #[error("Empty {0}")]
    Empty(String),

    #[error("{0} must be greater than 0")]
    NotPositive(String),
}

/// Errors related to the commit cache
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to load cache from '{path}': {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("Failed to save cache to '{path}': {reason}")]
    SaveFailed { path: String, reason: String },
}

// Conversion from anyhow::Error to ChronoError
impl From<anyhow::Error> for ChronoError {
    fn from(err: anyhow::Error) -> Self {
        ChronoError::Other(format!("{:#}", err))
    }
}

impl ProviderError {
    /// Only transient failures (5xx, timeouts, dropped connections) are retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

impl ResolveError {
    /// Cancellation is the one resolution failure that must not be folded into NotFound
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ResolveError::Provider(ProviderError::Cancelled))
    }
}

// Helper methods for ChronoError
impl ChronoError {
    /// Create a new error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        ChronoError::Other(msg.into())
    }

    /// Convert to a user-facing error string suitable for MCP responses
    pub fn to_user_string(&self) -> String {
        format!("{}", self)
    }

    /// Check if this is a user error (validation, bad config value) vs system error
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ChronoError::Validation(_) | ChronoError::Config(ConfigError::InvalidValue { .. })
        )
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            ChronoError::Provider(e) => e.is_retryable(),
            ChronoError::Resolve(ResolveError::Provider(e)) => e.is_retryable(),
            ChronoError::Io(_) => true,
            _ => false,
        }
    }
}
