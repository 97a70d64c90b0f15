//! Temporal diff: branch A at T1 against branch B at T2
//!
//! Each endpoint is resolved directly first and through merge correlation
//! second. Both endpoints resolve concurrently. An endpoint that cannot be
//! placed makes the whole request `NotFound`; a diff is only ever built from
//! two resolved SHAs, and equal SHAs never reach the provider's compare.

use crate::config::ResolverConfig;
use crate::correlator::MergeCorrelator;
use crate::diff::DiffEngine;
use crate::error::{ChronoError, ProviderError};
use crate::provider::CommitGraphProvider;
use crate::resolver::BranchPointResolver;
use crate::timestamp::{check_time_range, format_timestamp};
use crate::types::{
    DiffResult, Endpoint, RepoCoordinates, ResolvedPoint, TemporalDiffOutcome,
    UnresolvedEndpoint,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Why an endpoint produced no point
enum EndpointFailure {
    Cancelled,
    Unresolved(UnresolvedEndpoint),
}

#[derive(Clone)]
pub struct TemporalDiffOrchestrator {
    resolver: BranchPointResolver,
    correlator: MergeCorrelator,
    diff_engine: DiffEngine,
}

impl TemporalDiffOrchestrator {
    pub fn new(provider: Arc<dyn CommitGraphProvider>, config: &ResolverConfig) -> Self {
        Self {
            resolver: BranchPointResolver::new(Arc::clone(&provider), config),
            correlator: MergeCorrelator::new(Arc::clone(&provider), config),
            diff_engine: DiffEngine::new(provider),
        }
    }

    pub fn resolver(&self) -> &BranchPointResolver {
        &self.resolver
    }

    pub fn diff_engine(&self) -> &DiffEngine {
        &self.diff_engine
    }

    /// Diff `branch_from` at `time_from` against `branch_to` at `time_to`
    ///
    /// `receiver` is the branch merged work is looked for on, and the root
    /// branch for fork-point fallbacks. Errors are reserved for invalid
    /// input, cancellation, and a failed compare of two resolved points.
    #[allow(clippy::too_many_arguments)]
    pub async fn resolve_temporal_diff(
        &self,
        repo: &RepoCoordinates,
        branch_from: &str,
        branch_to: &str,
        time_from: DateTime<Utc>,
        time_to: DateTime<Utc>,
        receiver: &str,
        cancel: &CancellationToken,
    ) -> Result<TemporalDiffOutcome, ChronoError> {
        check_time_range(time_from, time_to)?;

        tracing::info!(
            "Temporal diff on {}: {}@{} -> {}@{} (receiver '{}')",
            repo,
            branch_from,
            format_timestamp(time_from),
            branch_to,
            format_timestamp(time_to),
            receiver
        );

        let (from, to) = futures::join!(
            self.resolve_endpoint(repo, Endpoint::From, branch_from, time_from, receiver, cancel),
            self.resolve_endpoint(repo, Endpoint::To, branch_to, time_to, receiver, cancel),
        );

        let mut unresolved = Vec::new();
        let mut points = Vec::with_capacity(2);
        for outcome in [from, to] {
            match outcome {
                Ok(point) => points.push(point),
                Err(EndpointFailure::Cancelled) => {
                    return Err(ProviderError::Cancelled.into());
                }
                Err(EndpointFailure::Unresolved(endpoint)) => unresolved.push(endpoint),
            }
        }

        if !unresolved.is_empty() {
            tracing::warn!(
                "Temporal diff on {} not found: {} endpoint(s) unresolved",
                repo,
                unresolved.len()
            );
            return Ok(TemporalDiffOutcome::NotFound { unresolved });
        }

        let mut points = points.into_iter();
        let (Some(from), Some(to)) = (points.next(), points.next()) else {
            return Err(ChronoError::other("endpoint resolution produced no points"));
        };

        if from.sha == to.sha {
            tracing::info!("Both endpoints resolved to {}, no activity in window", from.sha);
            return Ok(TemporalDiffOutcome::Resolved(DiffResult::identical(from, to)));
        }

        let diff = self.diff_engine.diff(repo, from, to, cancel).await?;
        Ok(TemporalDiffOutcome::Resolved(diff))
    }

    /// Direct resolution, then merge correlation against the receiver
    async fn resolve_endpoint(
        &self,
        repo: &RepoCoordinates,
        endpoint: Endpoint,
        branch: &str,
        at: DateTime<Utc>,
        receiver: &str,
        cancel: &CancellationToken,
    ) -> Result<ResolvedPoint, EndpointFailure> {
        let mut reasons = Vec::new();

        match self
            .resolver
            .resolve_at_or_before(repo, branch, at, receiver, cancel)
            .await
        {
            Ok(point) => return Ok(point),
            Err(e) if e.is_cancelled() => return Err(EndpointFailure::Cancelled),
            Err(e) => {
                tracing::warn!("Direct resolution of {}@{} failed: {}", repo, branch, e);
                reasons.push(e.to_string());
            }
        }

        if branch == receiver {
            reasons.push(format!(
                "'{}' is the receiver branch; no merge to correlate",
                branch
            ));
        } else {
            match self
                .correlator
                .resolve_via_merge(repo, branch, receiver, at, cancel)
                .await
            {
                Ok(point) => return Ok(point),
                Err(e) if e.is_cancelled() => return Err(EndpointFailure::Cancelled),
                Err(e) => {
                    tracing::warn!("Merge correlation of {}@{} failed: {}", repo, branch, e);
                    reasons.push(e.to_string());
                }
            }
        }

        Err(EndpointFailure::Unresolved(UnresolvedEndpoint {
            endpoint,
            branch: branch.to_string(),
            at,
            reasons,
        }))
    }
}
