use crate::error::ProviderError;
use crate::provider::{CommitGraphProvider, cancellable};
use crate::types::{DiffResult, RepoCoordinates, ResolvedPoint};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// File-level diff between two resolved points
///
/// Patch text is passed through untouched.
#[derive(Clone)]
pub struct DiffEngine {
    provider: Arc<dyn CommitGraphProvider>,
}

impl DiffEngine {
    pub fn new(provider: Arc<dyn CommitGraphProvider>) -> Self {
        Self { provider }
    }

    /// Diff `from` (base) against `to` (head)
    ///
    /// Equal SHAs short-circuit to an empty result without a provider call.
    pub async fn diff(
        &self,
        repo: &RepoCoordinates,
        from: ResolvedPoint,
        to: ResolvedPoint,
        cancel: &CancellationToken,
    ) -> Result<DiffResult, ProviderError> {
        if from.sha == to.sha {
            tracing::debug!("{} and {} are the same commit, empty diff", from.branch, to.branch);
            return Ok(DiffResult::identical(from, to));
        }

        let compare = cancellable(
            cancel,
            self.provider.compare_commits(repo, &from.sha, &to.sha),
        )
        .await?;

        tracing::info!(
            "{}...{}: {:?}, {} files changed",
            from.sha,
            to.sha,
            compare.status,
            compare.files.len()
        );

        Ok(DiffResult {
            from,
            to,
            compare_status: Some(compare.status),
            merge_base_sha: compare.merge_base_sha,
            files: compare.files,
        })
    }
}
