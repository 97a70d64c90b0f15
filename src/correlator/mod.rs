//! Merge correlation: placing a branch's work on the branch it was merged into
//!
//! Two strategies, in order:
//! - closed pull requests from the source branch into the receiver (exact)
//! - merge commits on the receiver whose message names the source branch
//!   (best effort; merge message conventions are not stable and squash or
//!   rebase merges leave no trace)

use crate::config::ResolverConfig;
use crate::error::{ProviderError, ResolveError};
use crate::provider::{CommitGraphProvider, cancellable};
use crate::timestamp::format_timestamp;
use crate::types::{
    CommitNode, CommitQuery, PullRequestQuery, PullRequestRecord, RepoCoordinates,
    ResolutionMethod, ResolvedPoint,
};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tokio_util::sync::CancellationToken;

static PULL_REQUEST_MERGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Merge pull request #\d+ from (\S+)").expect("pull request merge pattern")
});
static BRANCH_MERGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Merge branch '([^']+)'").expect("branch merge pattern"));
static REMOTE_BRANCH_MERGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Merge remote-tracking branch '([^']+)'").expect("remote branch merge pattern")
});

/// Whether a merge commit message says it merged `branch`
///
/// Recognised forms (first line only):
/// - `Merge pull request #12 from owner/branch`
/// - `Merge branch 'branch'` (optionally followed by `into ...`)
/// - `Merge remote-tracking branch 'origin/branch'`
pub fn message_references_branch(message: &str, branch: &str) -> bool {
    let summary = message.lines().next().unwrap_or("").trim();

    if let Some(caps) = PULL_REQUEST_MERGE.captures(summary) {
        // "owner/branch"; the branch part may itself contain slashes
        let head = &caps[1];
        return head == branch
            || head
                .split_once('/')
                .is_some_and(|(_, name)| name == branch);
    }
    if let Some(caps) = REMOTE_BRANCH_MERGE.captures(summary) {
        let remote_ref = &caps[1];
        return remote_ref == branch
            || remote_ref
                .split_once('/')
                .is_some_and(|(_, name)| name == branch);
    }
    if let Some(caps) = BRANCH_MERGE.captures(summary) {
        return &caps[1] == branch;
    }
    false
}

/// Finds where a source branch's work landed on a receiver branch
#[derive(Clone)]
pub struct MergeCorrelator {
    provider: Arc<dyn CommitGraphProvider>,
    page_size: usize,
    max_pages: usize,
    strict: bool,
}

impl MergeCorrelator {
    pub fn new(provider: Arc<dyn CommitGraphProvider>, config: &ResolverConfig) -> Self {
        Self {
            provider,
            page_size: config.page_size,
            max_pages: config.max_pages,
            strict: config.strict_merge_heuristic,
        }
    }

    /// Resolve the head of `source_branch` as reflected in `receiver` by `at`
    ///
    /// The returned point is tagged `PrMerge` (the PR's merge commit) or
    /// `MessageHeuristic` (second parent of a matching merge commit).
    pub async fn resolve_via_merge(
        &self,
        repo: &RepoCoordinates,
        source_branch: &str,
        receiver: &str,
        at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<ResolvedPoint, ResolveError> {
        tracing::info!(
            "Correlating {}@{} via merges into '{}' by {}",
            repo,
            source_branch,
            receiver,
            format_timestamp(at)
        );

        match self
            .find_pull_request_merge(repo, source_branch, receiver, at, cancel)
            .await
        {
            Ok(Some(pr)) => {
                if let Some(sha) = pr.merge_commit_sha {
                    tracing::info!(
                        "{} merged into '{}' by PR #{} ({})",
                        source_branch,
                        receiver,
                        pr.number,
                        sha
                    );
                    let mut point = ResolvedPoint::new(source_branch, sha, ResolutionMethod::PrMerge);
                    point.committed_at = pr.merged_at;
                    return Ok(point);
                }
            }
            Ok(None) => {
                tracing::debug!(
                    "No merged PR from '{}' into '{}', trying merge messages",
                    source_branch,
                    receiver
                );
            }
            Err(ProviderError::Cancelled) => return Err(ProviderError::Cancelled.into()),
            Err(e) => {
                tracing::warn!(
                    "Pull request lookup for '{}' failed, trying merge messages: {}",
                    source_branch,
                    e
                );
            }
        }

        self.find_merge_commit(repo, source_branch, receiver, at, cancel)
            .await
    }

    /// Most recently merged PR from `source_branch` into `receiver` at or before `at`
    async fn find_pull_request_merge(
        &self,
        repo: &RepoCoordinates,
        source_branch: &str,
        receiver: &str,
        at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Option<PullRequestRecord>, ProviderError> {
        let mut best: Option<PullRequestRecord> = None;

        for page in 1..=self.max_pages {
            let query = PullRequestQuery::new(receiver)
                .per_page(self.page_size)
                .page(page);
            let prs = cancellable(cancel, self.provider.list_closed_pull_requests(repo, &query))
                .await?;
            let fetched = prs.len();
            tracing::debug!("PR page {} for '{}': {} records", page, receiver, fetched);

            for pr in prs {
                let eligible = pr.head_ref == source_branch
                    && pr.merge_commit_sha.is_some()
                    && pr.merged_at.is_some_and(|merged| merged <= at);
                if eligible && best.as_ref().is_none_or(|b| pr.merged_at > b.merged_at) {
                    best = Some(pr);
                }
            }

            if fetched < self.page_size {
                break;
            }
        }

        Ok(best)
    }

    /// Scan the receiver's history up to `at` for a merge commit naming `source_branch`
    async fn find_merge_commit(
        &self,
        repo: &RepoCoordinates,
        source_branch: &str,
        receiver: &str,
        at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<ResolvedPoint, ResolveError> {
        for page in 1..=self.max_pages {
            let query = CommitQuery::new(receiver)
                .until(at)
                .per_page(self.page_size)
                .page(page);
            let commits = cancellable(cancel, self.provider.list_commits(repo, &query)).await?;
            let fetched = commits.len();

            let matches: Vec<&CommitNode> = commits
                .iter()
                .filter(|c| c.is_merge() && message_references_branch(&c.message, source_branch))
                .collect();

            if let Some(point) = self.pick_merge(&matches, source_branch, receiver)? {
                return Ok(point);
            }
            if fetched < self.page_size {
                break;
            }
        }

        Err(ResolveError::NoMergeFound {
            source_branch: source_branch.to_string(),
            receiver: receiver.to_string(),
            at: format_timestamp(at),
        })
    }

    /// Choose among the matches of one history page
    ///
    /// The most recent match wins; ties keep page order. In strict mode a tie
    /// on the winner's timestamp is reported as ambiguous instead.
    fn pick_merge(
        &self,
        matches: &[&CommitNode],
        source_branch: &str,
        receiver: &str,
    ) -> Result<Option<ResolvedPoint>, ResolveError> {
        let Some(winner) = matches
            .iter()
            .copied()
            .reduce(|best, c| if c.committed_at > best.committed_at { c } else { best })
        else {
            return Ok(None);
        };

        if matches.len() > 1 {
            let others: Vec<&str> = matches
                .iter()
                .filter(|c| c.sha != winner.sha)
                .map(|c| c.sha.as_str())
                .collect();
            tracing::warn!(
                "{} merge commits on '{}' name '{}'; using {}, ignoring {:?}",
                matches.len(),
                receiver,
                source_branch,
                winner.sha,
                others
            );

            let tied: Vec<String> = matches
                .iter()
                .filter(|c| c.committed_at == winner.committed_at)
                .map(|c| c.sha.clone())
                .collect();
            if self.strict && tied.len() > 1 {
                return Err(ResolveError::AmbiguousMerge {
                    source_branch: source_branch.to_string(),
                    receiver: receiver.to_string(),
                    candidates: tied,
                });
            }
        }

        let Some(merged_head) = winner.merged_parent() else {
            return Ok(None);
        };
        tracing::info!(
            "{} located on '{}' by merge commit {} (heuristic)",
            source_branch,
            receiver,
            winner.sha
        );
        Ok(Some(ResolvedPoint::new(
            source_branch,
            merged_head,
            ResolutionMethod::MessageHeuristic,
        )))
    }
}
