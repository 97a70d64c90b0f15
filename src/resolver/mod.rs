//! Branch-at-time resolution by first-parent walk
//!
//! Given a branch and a target time, the resolver walks the branch's own
//! mainline (first parents only) back from its current tip and returns the
//! first commit at or before the target. When the branch did not exist yet it
//! falls back to the fork point with the root branch, and finally to the
//! branch's oldest commit.

use crate::config::ResolverConfig;
use crate::error::{ProviderError, ResolveError};
use crate::provider::{CommitGraphProvider, cancellable};
use crate::timestamp::format_timestamp;
use crate::types::{CommitNode, CommitQuery, RepoCoordinates, ResolutionMethod, ResolvedPoint};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Outcome of a bounded first-parent walk
enum Walk {
    Found(CommitNode),
    /// History ran out before reaching the target time
    ReachedRoot,
}

/// Resolves "branch B at time T" to a single commit
#[derive(Clone)]
pub struct BranchPointResolver {
    provider: Arc<dyn CommitGraphProvider>,
    walk_cap: usize,
    page_size: usize,
}

impl BranchPointResolver {
    pub fn new(provider: Arc<dyn CommitGraphProvider>, config: &ResolverConfig) -> Self {
        Self {
            provider,
            walk_cap: config.walk_cap,
            page_size: config.page_size,
        }
    }

    pub fn with_walk_cap(mut self, walk_cap: usize) -> Self {
        self.walk_cap = walk_cap;
        self
    }

    pub fn walk_cap(&self) -> usize {
        self.walk_cap
    }

    /// Resolve `branch` as of `at`
    ///
    /// Order of strategies:
    /// 1. first-parent walk from the current tip (`DirectWalk`)
    /// 2. merge base of the branch tip and `root_branch` tip (`ForkPoint`),
    ///    skipped when `branch` is the root branch
    /// 3. oldest commit reachable from the branch (`FirstCommit`)
    ///
    /// Commits sharing a timestamp are decided by walk order: the first one
    /// met on the first-parent path wins.
    pub async fn resolve_at_or_before(
        &self,
        repo: &RepoCoordinates,
        branch: &str,
        at: DateTime<Utc>,
        root_branch: &str,
        cancel: &CancellationToken,
    ) -> Result<ResolvedPoint, ResolveError> {
        tracing::info!(
            "Resolving {}@{} at or before {}",
            repo,
            branch,
            format_timestamp(at)
        );

        let tip = cancellable(cancel, self.provider.get_branch_tip(repo, branch)).await?;

        match self.walk_first_parent(repo, branch, &tip, at, cancel).await? {
            Walk::Found(commit) => {
                return Ok(
                    ResolvedPoint::new(branch, commit.sha.clone(), ResolutionMethod::DirectWalk)
                        .with_commit(&commit),
                );
            }
            Walk::ReachedRoot => {
                tracing::warn!(
                    "{}@{} has no commit at or before {}, trying fallbacks",
                    repo,
                    branch,
                    format_timestamp(at)
                );
            }
        }

        if branch != root_branch {
            match self.fork_point(repo, &tip, root_branch, cancel).await {
                Ok(Some(sha)) => {
                    tracing::info!("{}@{} resolved to fork point {}", repo, branch, sha);
                    return Ok(ResolvedPoint::new(branch, sha, ResolutionMethod::ForkPoint));
                }
                Ok(None) => {
                    tracing::warn!(
                        "{}@{} shares no history with '{}'",
                        repo,
                        branch,
                        root_branch
                    );
                }
                Err(ProviderError::Cancelled) => return Err(ProviderError::Cancelled.into()),
                Err(e) => {
                    tracing::warn!("Fork point of {}@{} unavailable: {}", repo, branch, e);
                }
            }
        }

        match cancellable(cancel, self.provider.get_first_commit(repo, branch)).await {
            Ok(Some(first)) => {
                tracing::info!(
                    "{}@{} resolved to first commit {}",
                    repo,
                    branch,
                    first.sha
                );
                Ok(
                    ResolvedPoint::new(branch, first.sha.clone(), ResolutionMethod::FirstCommit)
                        .with_commit(&first),
                )
            }
            Ok(None) => Err(ResolveError::EmptyBranch(branch.to_string())),
            Err(ProviderError::Cancelled) => Err(ProviderError::Cancelled.into()),
            Err(e) => {
                tracing::warn!("First commit of {}@{} unavailable: {}", repo, branch, e);
                Err(ResolveError::NoCommitBeforeTime {
                    branch: branch.to_string(),
                    at: format_timestamp(at),
                })
            }
        }
    }

    async fn walk_first_parent(
        &self,
        repo: &RepoCoordinates,
        branch: &str,
        tip: &str,
        at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Walk, ResolveError> {
        // Request-scoped prefetch window: one history page serves many steps
        let mut window: HashMap<String, CommitNode> = HashMap::new();
        let mut current = tip.to_string();
        let mut steps = 0usize;

        loop {
            if steps >= self.walk_cap {
                tracing::warn!(
                    "Walk of {}@{} hit the cap of {} commits",
                    repo,
                    branch,
                    self.walk_cap
                );
                return Err(ResolveError::CapExceeded {
                    branch: branch.to_string(),
                    cap: self.walk_cap,
                });
            }
            steps += 1;

            let commit = match window.remove(&current) {
                Some(commit) => commit,
                None => match self.refill(repo, &current, &mut window, cancel).await {
                    Ok(commit) => commit,
                    Err(ProviderError::CommitNotFound(_)) if current == tip => {
                        return Err(ResolveError::EmptyBranch(branch.to_string()));
                    }
                    Err(e) => return Err(e.into()),
                },
            };

            if commit.committed_at <= at {
                tracing::debug!(
                    "{}@{} resolved after {} walk steps to {}",
                    repo,
                    branch,
                    steps,
                    commit.sha
                );
                return Ok(Walk::Found(commit));
            }

            match commit.first_parent() {
                Some(parent) => current = parent.to_string(),
                None => return Ok(Walk::ReachedRoot),
            }
        }
    }

    /// Fetch a history page starting at `sha` into the window and return `sha`
    async fn refill(
        &self,
        repo: &RepoCoordinates,
        sha: &str,
        window: &mut HashMap<String, CommitNode>,
        cancel: &CancellationToken,
    ) -> Result<CommitNode, ProviderError> {
        let query = CommitQuery::new(sha).per_page(self.page_size);
        let page = cancellable(cancel, self.provider.list_commits(repo, &query)).await?;
        tracing::debug!("Prefetched {} commits from {}", page.len(), sha);

        window.clear();
        window.extend(page.into_iter().map(|c| (c.sha.clone(), c)));

        match window.remove(sha) {
            Some(commit) => Ok(commit),
            None => cancellable(cancel, self.provider.get_commit(repo, sha)).await,
        }
    }

    async fn fork_point(
        &self,
        repo: &RepoCoordinates,
        tip: &str,
        root_branch: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, ProviderError> {
        let root_tip = cancellable(cancel, self.provider.get_branch_tip(repo, root_branch)).await?;
        cancellable(cancel, self.provider.merge_base(repo, tip, &root_tip)).await
    }
}
