/// Configuration system for branch-chrono
///
/// Supports loading from multiple sources with priority:
/// CLI args > Environment variables > Config file > Defaults
use crate::error::{ChronoError, ConfigError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Remote commit-graph provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Retry/backoff policy for transient provider failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Resolution engine limits
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Commit cache configuration
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Remote provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// REST API base URL (GitHub or GitHub Enterprise)
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// API token. Never written back to disk.
    #[serde(default, skip_serializing)]
    pub token: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Retry configuration for transient provider failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per call, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Multiplier applied to the delay after every retry
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound for a single delay, in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Randomise each delay by +/-20%
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

/// Resolution engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Hard cap on first-parent walk steps
    #[serde(default = "default_walk_cap")]
    pub walk_cap: usize,

    /// Page size for history and pull-request listings
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Maximum pages scanned by merge correlation
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Receiver/root branch used when a request does not name one
    #[serde(default = "default_receiver_branch")]
    pub default_receiver_branch: String,

    /// Fail with AmbiguousMerge instead of picking the first heuristic match
    #[serde(default)]
    pub strict_merge_heuristic: bool,

    /// Default cap on commits returned by a window listing
    #[serde(default = "default_window_limit")]
    pub window_limit: usize,
}

/// Commit cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Keep immutable commits and compare results in memory
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// Load the cache on startup and save it at shutdown or after one-shot commands
    #[serde(default)]
    pub persist: bool,

    /// Commit cache file path
    #[serde(default = "default_commit_cache_path")]
    pub path: PathBuf,

    /// Maximum commits held in memory; least useful entries are evicted first
    #[serde(default = "default_max_commits")]
    pub max_commits: u64,

    /// Maximum compare results (with patches) held in memory
    #[serde(default = "default_max_compares")]
    pub max_compares: u64,

    /// Seconds between background saves while the MCP server runs
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
}

// Default value functions
fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("branch-chrono/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    8_000
}

fn default_jitter() -> bool {
    true
}

fn default_walk_cap() -> usize {
    50_000
}

fn default_page_size() -> usize {
    100
}

fn default_max_pages() -> usize {
    10
}

fn default_window_limit() -> usize {
    500
}

fn default_receiver_branch() -> String {
    "main".to_string()
}

fn default_cache_enabled() -> bool {
    true
}

fn default_commit_cache_path() -> PathBuf {
    crate::cache::CommitCache::default_path()
}

fn default_max_commits() -> u64 {
    100_000
}

fn default_max_compares() -> u64 {
    1_000
}

fn default_flush_interval_secs() -> u64 {
    300
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            token: None,
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            walk_cap: default_walk_cap(),
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            default_receiver_branch: default_receiver_branch(),
            strict_merge_heuristic: false,
            window_limit: default_window_limit(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            persist: false,
            path: default_commit_cache_path(),
            max_commits: default_max_commits(),
            max_compares: default_max_compares(),
            flush_interval_secs: default_flush_interval_secs(),
        }
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> ChronoError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.into(),
    }
    .into()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, ChronoError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location or create default
    pub fn load_or_default() -> Result<Self, ChronoError> {
        let config_path = crate::paths::PlatformPaths::default_config_path();

        if config_path.exists() {
            tracing::info!("Loading config from: {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), ChronoError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::SaveFailed(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ChronoError> {
        let url = &self.provider.api_base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(invalid(
                "provider.api_base_url",
                format!("must be an http(s) URL, got '{}'", url),
            ));
        }

        if self.provider.timeout_secs == 0 {
            return Err(invalid("provider.timeout_secs", "must be greater than 0"));
        }

        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be greater than 0"));
        }

        if self.retry.backoff_multiplier < 1.0 {
            return Err(invalid(
                "retry.backoff_multiplier",
                format!("must be at least 1.0, got {}", self.retry.backoff_multiplier),
            ));
        }

        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return Err(invalid(
                "retry.max_delay_ms",
                "must not be smaller than retry.initial_delay_ms",
            ));
        }

        if self.resolver.walk_cap == 0 {
            return Err(invalid("resolver.walk_cap", "must be greater than 0"));
        }

        // GitHub caps per_page at 100
        if !(1..=100).contains(&self.resolver.page_size) {
            return Err(invalid(
                "resolver.page_size",
                format!("must be between 1 and 100, got {}", self.resolver.page_size),
            ));
        }

        if self.resolver.max_pages == 0 {
            return Err(invalid("resolver.max_pages", "must be greater than 0"));
        }

        if self.resolver.window_limit == 0 {
            return Err(invalid("resolver.window_limit", "must be greater than 0"));
        }

        if self.resolver.default_receiver_branch.trim().is_empty() {
            return Err(invalid(
                "resolver.default_receiver_branch",
                "must not be empty",
            ));
        }

        if self.cache.max_commits == 0 || self.cache.max_compares == 0 {
            return Err(invalid(
                "cache.max_commits",
                "cache capacities must be greater than 0",
            ));
        }

        if self.cache.flush_interval_secs == 0 {
            return Err(invalid("cache.flush_interval_secs", "must be greater than 0"));
        }

        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("BRANCH_CHRONO_API_URL") {
            self.provider.api_base_url = url;
        }

        // Explicit token wins over the conventional GITHUB_TOKEN
        if let Ok(token) = std::env::var("BRANCH_CHRONO_TOKEN") {
            self.provider.token = Some(token);
        } else if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            self.provider.token = Some(token);
        }

        if let Ok(attempts) = std::env::var("BRANCH_CHRONO_MAX_ATTEMPTS")
            && let Ok(n) = attempts.parse()
        {
            self.retry.max_attempts = n;
        }

        if let Ok(cap) = std::env::var("BRANCH_CHRONO_WALK_CAP")
            && let Ok(n) = cap.parse()
        {
            self.resolver.walk_cap = n;
        }

        if let Ok(branch) = std::env::var("BRANCH_CHRONO_RECEIVER_BRANCH") {
            self.resolver.default_receiver_branch = branch;
        }

        if let Ok(path) = std::env::var("BRANCH_CHRONO_CACHE_PATH") {
            self.cache.path = PathBuf::from(path);
        }
    }

    /// Create a new Config with defaults and environment overrides
    pub fn new() -> Result<Self, ChronoError> {
        let mut config = Self::load_or_default()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}
