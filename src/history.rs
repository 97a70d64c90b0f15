//! Commit listings over a time window
//!
//! The listing is anchored on the branch tip observed at the start of the
//! request, so pages stay consistent even if the branch moves mid-listing.

use crate::config::ResolverConfig;
use crate::error::ResolveError;
use crate::provider::{CommitGraphProvider, cancellable};
use crate::types::{BranchRef, CommitQuery, CommitWindow, RepoCoordinates};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Lists the commits reachable from a branch between two times
#[derive(Clone)]
pub struct CommitHistory {
    provider: Arc<dyn CommitGraphProvider>,
    page_size: usize,
    default_limit: usize,
}

impl CommitHistory {
    pub fn new(provider: Arc<dyn CommitGraphProvider>, config: &ResolverConfig) -> Self {
        Self {
            provider,
            page_size: config.page_size.max(1),
            default_limit: config.window_limit.max(1),
        }
    }

    /// Commits on `branch` with `since <= committed_at <= until`, newest first
    ///
    /// At most `limit` commits are returned (default: configured window
    /// limit); `truncated` reports whether more matched.
    pub async fn commits_in_window(
        &self,
        repo: &RepoCoordinates,
        branch: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<CommitWindow, ResolveError> {
        let limit = limit.unwrap_or(self.default_limit).max(1);
        let tip = cancellable(cancel, self.provider.get_branch_tip(repo, branch)).await?;

        let mut commits = Vec::new();
        let mut truncated = false;
        let mut page = 1;
        loop {
            let query = CommitQuery::new(tip.as_str())
                .since(since)
                .until(until)
                .per_page(self.page_size)
                .page(page);
            let batch = cancellable(cancel, self.provider.list_commits(repo, &query)).await?;
            let exhausted = batch.len() < self.page_size;

            for commit in batch {
                if commits.len() == limit {
                    truncated = true;
                    break;
                }
                commits.push(commit);
            }
            if truncated || exhausted {
                break;
            }
            page += 1;
        }

        tracing::info!(
            "Listed {} commits on {}@{} ({}{})",
            commits.len(),
            repo,
            branch,
            tip,
            if truncated { ", truncated" } else { "" }
        );

        Ok(CommitWindow {
            branch: BranchRef {
                name: branch.to_string(),
                tip_sha: tip,
            },
            since,
            until,
            commits,
            truncated,
        })
    }
}
