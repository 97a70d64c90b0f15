//! Core library client for branch-chrono
//!
//! This module provides the main client interface for using branch-chrono
//! as a library in your own Rust applications.

use crate::cache::{CachingProvider, CommitCache, CommitStore};
use crate::config::Config;
use crate::error::ChronoError;
use crate::history::CommitHistory;
use crate::orchestrator::TemporalDiffOrchestrator;
use crate::provider::{CommitGraphProvider, GitHubProvider, RetryPolicy, RetryingProvider};
use crate::timestamp::{parse_time_range, parse_timestamp};
use crate::types::*;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Main client for temporal branch resolution
///
/// Wraps a commit-graph provider stack (GitHub REST, retries, commit cache)
/// and exposes the request-level operations. It can be used directly as a
/// library or wrapped by the MCP server.
///
/// # Example
///
/// ```no_run
/// use branch_chrono::{ChronoClient, TemporalDiffRequest};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = ChronoClient::new()?;
///
///     let req = TemporalDiffRequest {
///         owner: "rust-lang".to_string(),
///         repo: "cargo".to_string(),
///         branch_from: "master".to_string(),
///         branch_to: "master".to_string(),
///         time_from: "2024-01-01T00:00:00Z".to_string(),
///         time_to: "2024-02-01T00:00:00Z".to_string(),
///         receiver_branch: Some("master".to_string()),
///     };
///     let outcome = client.temporal_diff(req, &CancellationToken::new()).await?;
///     if let Some(diff) = outcome.diff() {
///         println!("{} files changed", diff.files.len());
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct ChronoClient {
    pub(crate) orchestrator: TemporalDiffOrchestrator,
    pub(crate) history: CommitHistory,
    // Shared commit store, when the provider stack has one
    pub(crate) commit_store: Option<CommitStore>,
    pub(crate) config: Arc<Config>,
}

impl ChronoClient {
    /// Create a client from the config file, environment and defaults
    pub fn new() -> Result<Self> {
        let config = Config::new().context("Failed to load configuration")?;
        Self::with_config(config)
    }

    /// Create a client talking to GitHub with the given configuration
    ///
    /// The provider stack is GitHub REST, wrapped in retries, wrapped in the
    /// commit cache (when `cache.enabled`).
    pub fn with_config(config: Config) -> Result<Self> {
        tracing::info!("Initializing branch-chrono client");
        tracing::debug!("API base URL: {}", config.provider.api_base_url);
        tracing::debug!("Walk cap: {}", config.resolver.walk_cap);

        let github =
            GitHubProvider::new(&config.provider).context("Failed to initialize GitHub provider")?;
        let retrying = RetryingProvider::new(github, RetryPolicy::from_config(&config.retry));

        if !config.cache.enabled {
            return Ok(Self::with_provider(Arc::new(retrying), config));
        }
        Ok(Self::with_cached_provider(retrying, config))
    }

    /// Create a client over `provider` wrapped in the commit cache
    ///
    /// With `cache.persist` the store is preloaded from `cache.path`; an
    /// unreadable cache file starts an empty store.
    pub fn with_cached_provider<P>(provider: P, config: Config) -> Self
    where
        P: CommitGraphProvider + 'static,
    {
        let store = CommitStore::from_config(&config.cache);
        if config.cache.persist {
            match CommitCache::load(&config.cache.path) {
                Ok(snapshot) => store.preload(snapshot),
                Err(e) => tracing::warn!("Failed to load commit cache: {}, starting fresh", e),
            }
            tracing::info!("Using commit cache file: {:?}", config.cache.path);
        }

        let provider = CachingProvider::with_store(provider, store.clone());
        let mut client = Self::with_provider(Arc::new(provider), config);
        client.commit_store = Some(store);
        client
    }

    /// Create a client over any provider, used as-is
    pub fn with_provider(provider: Arc<dyn CommitGraphProvider>, config: Config) -> Self {
        Self {
            orchestrator: TemporalDiffOrchestrator::new(Arc::clone(&provider), &config.resolver),
            history: CommitHistory::new(provider, &config.resolver),
            commit_store: None,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn receiver_or_default<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .map(str::trim)
            .unwrap_or(&self.config.resolver.default_receiver_branch)
    }

    /// Resolve one branch at one point in time
    pub async fn resolve_point(
        &self,
        req: ResolvePointRequest,
        cancel: &CancellationToken,
    ) -> Result<ResolvedPoint, ChronoError> {
        req.validate()?;
        let at = parse_timestamp(&req.at)?;
        let root = self.receiver_or_default(req.root_branch.as_deref());

        let point = self
            .orchestrator
            .resolver()
            .resolve_at_or_before(&req.coordinates(), req.branch.trim(), at, root, cancel)
            .await?;
        Ok(point)
    }

    /// Diff `branch_from` at `time_from` against `branch_to` at `time_to`
    ///
    /// Unresolvable endpoints come back as `TemporalDiffOutcome::NotFound`,
    /// not as an error.
    pub async fn temporal_diff(
        &self,
        req: TemporalDiffRequest,
        cancel: &CancellationToken,
    ) -> Result<TemporalDiffOutcome, ChronoError> {
        req.validate()?;
        let (time_from, time_to) = parse_time_range(&req.time_from, &req.time_to)?;
        let receiver = self.receiver_or_default(req.receiver_branch.as_deref());

        self.orchestrator
            .resolve_temporal_diff(
                &req.coordinates(),
                req.branch_from.trim(),
                req.branch_to.trim(),
                time_from,
                time_to,
                receiver,
                cancel,
            )
            .await
    }

    /// Diff two caller-supplied commits
    pub async fn diff_commits(
        &self,
        req: DiffCommitsRequest,
        cancel: &CancellationToken,
    ) -> Result<DiffResult, ChronoError> {
        req.validate()?;
        let from = ResolvedPoint::pinned(req.base_sha.trim());
        let to = ResolvedPoint::pinned(req.head_sha.trim());

        let diff = self
            .orchestrator
            .diff_engine()
            .diff(&req.coordinates(), from, to, cancel)
            .await?;
        Ok(diff)
    }

    /// Commits on a branch between two times, newest first
    pub async fn commits_in_window(
        &self,
        req: CommitsInWindowRequest,
        cancel: &CancellationToken,
    ) -> Result<CommitWindow, ChronoError> {
        req.validate()?;
        let (since, until) = parse_time_range(&req.since, &req.until)?;

        let window = self
            .history
            .commits_in_window(
                &req.coordinates(),
                req.branch.trim(),
                since,
                until,
                req.limit,
                cancel,
            )
            .await?;
        Ok(window)
    }

    /// Write the commit cache to disk when persistence is enabled
    ///
    /// Nothing is written if the cache has not changed since the last save.
    pub async fn save_cache(&self) -> Result<(), ChronoError> {
        let Some(store) = &self.commit_store else {
            return Ok(());
        };
        if !self.config.cache.persist {
            return Ok(());
        }
        if store.persist(&self.config.cache.path).await? {
            tracing::debug!("Commit cache saved");
        }
        Ok(())
    }

    /// Save the commit cache every `period` until `stop` fires, then once more
    pub async fn flush_cache_every(&self, period: Duration, stop: CancellationToken) {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.save_cache().await {
                        tracing::warn!("Failed to save commit cache: {}", e);
                    }
                }
            }
        }

        if let Err(e) = self.save_cache().await {
            tracing::warn!("Failed to save commit cache on shutdown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests;
