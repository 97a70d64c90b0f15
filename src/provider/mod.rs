//! Remote commit-graph access
//!
//! The resolution engine only ever talks to a [`CommitGraphProvider`]. The
//! production implementation speaks the GitHub REST API; the in-memory graph
//! backs tests, benchmarks and offline use.

/// GitHub REST implementation
pub mod github;
/// In-memory commit graph
pub mod memory;
/// Retry/backoff decorator for transient failures
pub mod retry;

pub use github::GitHubProvider;
pub use memory::InMemoryCommitGraph;
pub use retry::{RetryPolicy, RetryingProvider};

use crate::error::ProviderError;
use crate::types::{
    CommitNode, CommitQuery, CompareResult, PullRequestQuery, PullRequestRecord, RepoCoordinates,
};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Read-only accessor for a repository's commit graph
#[async_trait::async_trait]
pub trait CommitGraphProvider: Send + Sync {
    /// Current tip of a branch. Never cached: branches move between requests.
    async fn get_branch_tip(
        &self,
        repo: &RepoCoordinates,
        branch: &str,
    ) -> Result<String, ProviderError>;

    /// Metadata for a single commit
    async fn get_commit(
        &self,
        repo: &RepoCoordinates,
        sha: &str,
    ) -> Result<CommitNode, ProviderError>;

    /// One page of history reachable from `query.sha`
    async fn list_commits(
        &self,
        repo: &RepoCoordinates,
        query: &CommitQuery,
    ) -> Result<Vec<CommitNode>, ProviderError>;

    /// One page of closed pull requests targeting `query.base`
    async fn list_closed_pull_requests(
        &self,
        repo: &RepoCoordinates,
        query: &PullRequestQuery,
    ) -> Result<Vec<PullRequestRecord>, ProviderError>;

    /// Compare `base...head`
    async fn compare_commits(
        &self,
        repo: &RepoCoordinates,
        base: &str,
        head: &str,
    ) -> Result<CompareResult, ProviderError>;

    /// Oldest commit reachable from a branch (ascending-date, page size 1)
    async fn get_first_commit(
        &self,
        repo: &RepoCoordinates,
        branch: &str,
    ) -> Result<Option<CommitNode>, ProviderError> {
        let query = CommitQuery::new(branch).per_page(1).ascending();
        Ok(self.list_commits(repo, &query).await?.into_iter().next())
    }

    /// Lowest common ancestor of two commits; None for unrelated histories
    async fn merge_base(
        &self,
        repo: &RepoCoordinates,
        a: &str,
        b: &str,
    ) -> Result<Option<String>, ProviderError> {
        Ok(self.compare_commits(repo, a, b).await?.merge_base_sha)
    }
}

/// Run a provider call, abandoning it as soon as `cancel` fires
pub async fn cancellable<T, F>(cancel: &CancellationToken, call: F) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    if cancel.is_cancelled() {
        return Err(ProviderError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProviderError::Cancelled),
        result = call => result,
    }
}
