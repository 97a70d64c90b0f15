use super::CommitGraphProvider;
use crate::config::RetryConfig;
use crate::error::ProviderError;
use crate::types::{
    CommitNode, CommitQuery, CompareResult, PullRequestQuery, PullRequestRecord, RepoCoordinates,
};
use std::future::Future;
use std::time::Duration;

/// Exponential backoff policy for transient provider failures
///
/// Built from [`RetryConfig`] and handed to whatever needs it; there is no
/// process-wide retry state.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    jitter: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            multiplier: config.backoff_multiplier.max(1.0),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `retry` (1-based), without jitter
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = self.multiplier.powi(retry.saturating_sub(1) as i32);
        let secs = (self.initial_delay.as_secs_f64() * factor).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    fn sleep_duration(&self, retry: u32) -> Duration {
        let delay = self.base_delay(retry);
        if self.jitter {
            use rand::Rng;
            let jitter = rand::thread_rng().gen_range(0.8..1.2);
            Duration::from_secs_f64(delay.as_secs_f64() * jitter)
        } else {
            delay
        }
    }

    /// Run `call` until it succeeds, fails non-transiently, or attempts run out
    ///
    /// Backoff sleeps are plain timers; callers that need to abort mid-backoff
    /// wrap the whole call in [`super::cancellable`], which drops the sleep.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.sleep_duration(attempt);
                    tracing::warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        operation,
                        attempt,
                        self.max_attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_retryable() {
                        tracing::warn!(
                            "{} failed after {} attempts: {}",
                            operation,
                            attempt,
                            err
                        );
                    }
                    return Err(err);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Decorator that retries transient failures of the wrapped provider
pub struct RetryingProvider<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P: CommitGraphProvider> RetryingProvider<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait::async_trait]
impl<P: CommitGraphProvider> CommitGraphProvider for RetryingProvider<P> {
    async fn get_branch_tip(
        &self,
        repo: &RepoCoordinates,
        branch: &str,
    ) -> Result<String, ProviderError> {
        self.policy
            .run("get_branch_tip", || self.inner.get_branch_tip(repo, branch))
            .await
    }

    async fn get_commit(
        &self,
        repo: &RepoCoordinates,
        sha: &str,
    ) -> Result<CommitNode, ProviderError> {
        self.policy
            .run("get_commit", || self.inner.get_commit(repo, sha))
            .await
    }

    async fn list_commits(
        &self,
        repo: &RepoCoordinates,
        query: &CommitQuery,
    ) -> Result<Vec<CommitNode>, ProviderError> {
        self.policy
            .run("list_commits", || self.inner.list_commits(repo, query))
            .await
    }

    async fn list_closed_pull_requests(
        &self,
        repo: &RepoCoordinates,
        query: &PullRequestQuery,
    ) -> Result<Vec<PullRequestRecord>, ProviderError> {
        self.policy
            .run("list_closed_pull_requests", || {
                self.inner.list_closed_pull_requests(repo, query)
            })
            .await
    }

    async fn compare_commits(
        &self,
        repo: &RepoCoordinates,
        base: &str,
        head: &str,
    ) -> Result<CompareResult, ProviderError> {
        self.policy
            .run("compare_commits", || self.inner.compare_commits(repo, base, head))
            .await
    }

    async fn get_first_commit(
        &self,
        repo: &RepoCoordinates,
        branch: &str,
    ) -> Result<Option<CommitNode>, ProviderError> {
        self.policy
            .run("get_first_commit", || self.inner.get_first_commit(repo, branch))
            .await
    }

    async fn merge_base(
        &self,
        repo: &RepoCoordinates,
        a: &str,
        b: &str,
    ) -> Result<Option<String>, ProviderError> {
        self.policy
            .run("merge_base", || self.inner.merge_base(repo, a, b))
            .await
    }
}
