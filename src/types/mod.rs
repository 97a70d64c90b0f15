use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Owner/name pair identifying a repository on the provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoCoordinates {
    pub owner: String,
    pub name: String,
}

impl RepoCoordinates {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse an `owner/name` string
    pub fn parse(full_name: &str) -> Result<Self, ValidationError> {
        match full_name.trim().split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self::new(owner, name))
            }
            _ => Err(ValidationError::InvalidRepo(full_name.to_string())),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A commit as reported by the provider. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitNode {
    /// Full commit SHA
    pub sha: String,
    /// Parent SHAs; index 0 is the first parent (the branch's own mainline)
    pub parent_shas: Vec<String>,
    /// Timestamp used for all ordering decisions
    pub committed_at: DateTime<Utc>,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub author_email: Option<String>,
    /// Full commit message
    #[serde(default)]
    pub message: String,
}

impl CommitNode {
    pub fn first_parent(&self) -> Option<&str> {
        self.parent_shas.first().map(String::as_str)
    }

    /// Head of the branch merged in by this commit, if it is a merge
    pub fn merged_parent(&self) -> Option<&str> {
        self.parent_shas.get(1).map(String::as_str)
    }

    pub fn is_merge(&self) -> bool {
        self.parent_shas.len() > 1
    }

    pub fn is_root(&self) -> bool {
        self.parent_shas.is_empty()
    }

    /// First line of the commit message
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }
}

/// A branch name with its tip as observed during one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
    pub name: String,
    pub tip_sha: String,
}

/// Closed pull request as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRecord {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    /// Branch the PR was opened from
    pub head_ref: String,
    /// Branch the PR targets
    pub base_ref: String,
    /// None while open or when closed without merging
    pub merged_at: Option<DateTime<Utc>>,
    pub merge_commit_sha: Option<String>,
}

impl PullRequestRecord {
    pub fn is_merged(&self) -> bool {
        self.merged_at.is_some()
    }
}

/// Which strategy produced a resolved commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    /// First-parent walk found a commit at or before the target time
    DirectWalk,
    /// Branch did not exist yet; merge base with the root branch
    ForkPoint,
    /// Merge commit of a pull request merged into the receiver
    PrMerge,
    /// Second parent of a merge commit matched by its message
    MessageHeuristic,
    /// Oldest commit reachable from the branch
    FirstCommit,
    /// SHA supplied directly by the caller
    Pinned,
}

impl ResolutionMethod {
    /// Whether the result is an exact answer rather than an approximation
    pub fn is_exact(&self) -> bool {
        matches!(
            self,
            ResolutionMethod::DirectWalk | ResolutionMethod::PrMerge | ResolutionMethod::Pinned
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionMethod::DirectWalk => "direct_walk",
            ResolutionMethod::ForkPoint => "fork_point",
            ResolutionMethod::PrMerge => "pr_merge",
            ResolutionMethod::MessageHeuristic => "message_heuristic",
            ResolutionMethod::FirstCommit => "first_commit",
            ResolutionMethod::Pinned => "pinned",
        }
    }
}

impl fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the resolver: one commit standing in for a branch at a time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPoint {
    /// Branch the point was resolved for
    pub branch: String,
    pub sha: String,
    pub method: ResolutionMethod,
    /// Timestamp of the resolved commit, when it was fetched along the way
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committed_at: Option<DateTime<Utc>>,
}

impl ResolvedPoint {
    pub fn new(branch: impl Into<String>, sha: impl Into<String>, method: ResolutionMethod) -> Self {
        Self {
            branch: branch.into(),
            sha: sha.into(),
            method,
            committed_at: None,
        }
    }

    /// Point for a caller-supplied SHA
    pub fn pinned(sha: impl Into<String>) -> Self {
        let sha = sha.into();
        Self::new(sha.clone(), sha, ResolutionMethod::Pinned)
    }

    pub fn with_commit(mut self, commit: &CommitNode) -> Self {
        self.committed_at = Some(commit.committed_at);
        self
    }
}

/// Per-file change classification, preserved verbatim from the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Added,
    Modified,
    Removed,
    Renamed,
    Copied,
    Changed,
    Unchanged,
}

impl FileStatus {
    /// Map a provider status string
    pub fn from_provider(status: &str) -> Option<Self> {
        match status {
            "added" => Some(FileStatus::Added),
            "modified" => Some(FileStatus::Modified),
            "removed" | "deleted" => Some(FileStatus::Removed),
            "renamed" => Some(FileStatus::Renamed),
            "copied" => Some(FileStatus::Copied),
            "changed" => Some(FileStatus::Changed),
            "unchanged" => Some(FileStatus::Unchanged),
            _ => None,
        }
    }
}

/// One file in a diff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    /// Old path for renames and copies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_path: Option<String>,
    pub status: FileStatus,
    pub additions: u64,
    pub deletions: u64,
    pub changes: u64,
    /// Unified patch text; empty for binary or oversized files
    #[serde(default)]
    pub patch: String,
}

/// Relationship between the two sides of a compare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareStatus {
    Identical,
    Ahead,
    Behind,
    Diverged,
}

impl CompareStatus {
    pub fn from_provider(status: &str) -> Option<Self> {
        match status {
            "identical" => Some(CompareStatus::Identical),
            "ahead" => Some(CompareStatus::Ahead),
            "behind" => Some(CompareStatus::Behind),
            "diverged" => Some(CompareStatus::Diverged),
            _ => None,
        }
    }
}

/// Result of the provider's base/head comparison primitive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareResult {
    pub status: CompareStatus,
    /// None when the two histories share no ancestor
    pub merge_base_sha: Option<String>,
    pub ahead_by: u64,
    pub behind_by: u64,
    pub files: Vec<FileChange>,
}

/// File-level change set between two resolved points
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub from: ResolvedPoint,
    pub to: ResolvedPoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_status: Option<CompareStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_base_sha: Option<String>,
    pub files: Vec<FileChange>,
}

impl DiffResult {
    /// Diff of a point with itself: always empty
    pub fn identical(from: ResolvedPoint, to: ResolvedPoint) -> Self {
        Self {
            compare_status: Some(CompareStatus::Identical),
            merge_base_sha: Some(to.sha.clone()),
            from,
            to,
            files: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Both endpoints were resolved exactly
    pub fn is_exact(&self) -> bool {
        self.from.method.is_exact() && self.to.method.is_exact()
    }

    pub fn total_additions(&self) -> u64 {
        self.files.iter().map(|f| f.additions).sum()
    }

    pub fn total_deletions(&self) -> u64 {
        self.files.iter().map(|f| f.deletions).sum()
    }
}

/// Ordering of history listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    /// Newest first
    #[default]
    Descending,
    /// Oldest first
    Ascending,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Descending => "desc",
            SortDirection::Ascending => "asc",
        }
    }
}

/// History listing parameters (`listCommits`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitQuery {
    /// Branch name or SHA to list history from
    pub sha: String,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub per_page: usize,
    /// 1-based page number
    pub page: usize,
    pub direction: SortDirection,
}

impl CommitQuery {
    pub fn new(sha: impl Into<String>) -> Self {
        Self {
            sha: sha.into(),
            since: None,
            until: None,
            per_page: 100,
            page: 1,
            direction: SortDirection::Descending,
        }
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn ascending(mut self) -> Self {
        self.direction = SortDirection::Ascending;
        self
    }
}

/// Sort key for pull-request listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PullRequestSort {
    Created,
    #[default]
    Updated,
}

impl PullRequestSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            PullRequestSort::Created => "created",
            PullRequestSort::Updated => "updated",
        }
    }
}

/// Closed pull-request listing parameters (`listClosedPullRequests`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestQuery {
    /// Target branch
    pub base: String,
    pub sort: PullRequestSort,
    pub direction: SortDirection,
    pub per_page: usize,
    pub page: usize,
}

impl PullRequestQuery {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            sort: PullRequestSort::Updated,
            direction: SortDirection::Descending,
            per_page: 100,
            page: 1,
        }
    }

    pub fn per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }
}

/// Commits reachable from a branch inside a time window, newest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitWindow {
    /// Branch and the tip the listing was taken from
    pub branch: BranchRef,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub commits: Vec<CommitNode>,
    /// More commits matched than the listing limit allowed
    pub truncated: bool,
}

/// Which side of a temporal diff an endpoint is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    From,
    To,
}

/// An endpoint neither direct resolution nor merge correlation could place
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedEndpoint {
    pub endpoint: Endpoint,
    pub branch: String,
    pub at: DateTime<Utc>,
    /// Failure of every strategy tried, in order
    pub reasons: Vec<String>,
}

/// Result of a temporal diff request. Never carries a partial diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TemporalDiffOutcome {
    Resolved(DiffResult),
    NotFound { unresolved: Vec<UnresolvedEndpoint> },
}

impl TemporalDiffOutcome {
    pub fn diff(&self) -> Option<&DiffResult> {
        match self {
            TemporalDiffOutcome::Resolved(diff) => Some(diff),
            TemporalDiffOutcome::NotFound { .. } => None,
        }
    }

    pub fn into_diff(self) -> Option<DiffResult> {
        match self {
            TemporalDiffOutcome::Resolved(diff) => Some(diff),
            TemporalDiffOutcome::NotFound { .. } => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TemporalDiffOutcome::NotFound { .. })
    }
}

/// Request to resolve a branch at a point in time
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResolvePointRequest {
    /// Repository owner (user or organisation)
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Branch to resolve
    pub branch: String,
    /// ISO-8601 timestamp; a trailing Z is accepted and naive timestamps are UTC
    pub at: String,
    /// Trunk used for the fork-point fallback (default: configured receiver branch)
    #[serde(default)]
    pub root_branch: Option<String>,
}

/// Request for the diff of branch_from at time_from against branch_to at time_to
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TemporalDiffRequest {
    /// Repository owner (user or organisation)
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Branch for the earlier endpoint
    pub branch_from: String,
    /// Branch for the later endpoint
    pub branch_to: String,
    /// ISO-8601 timestamp of the earlier endpoint
    pub time_from: String,
    /// ISO-8601 timestamp of the later endpoint
    pub time_to: String,
    /// Branch that absorbs merged work (default: configured receiver branch)
    #[serde(default)]
    pub receiver_branch: Option<String>,
}

/// Request for the diff between two explicit commits
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DiffCommitsRequest {
    /// Repository owner (user or organisation)
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Base commit SHA
    pub base_sha: String,
    /// Head commit SHA
    pub head_sha: String,
}

/// Request for the commits on a branch between two points in time
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CommitsInWindowRequest {
    /// Repository owner (user or organisation)
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Branch whose history is listed
    pub branch: String,
    /// ISO-8601 start of the window (inclusive)
    pub since: String,
    /// ISO-8601 end of the window (inclusive)
    pub until: String,
    /// Maximum number of commits returned (default: configured window limit)
    #[serde(default)]
    pub limit: Option<usize>,
}

fn require(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty(field.to_string()));
    }
    Ok(())
}

impl ResolvePointRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("owner", &self.owner)?;
        require("repo", &self.repo)?;
        require("branch", &self.branch)?;
        require("at", &self.at)?;
        if let Some(root) = &self.root_branch {
            require("root_branch", root)?;
        }
        Ok(())
    }

    pub fn coordinates(&self) -> RepoCoordinates {
        RepoCoordinates::new(self.owner.trim(), self.repo.trim())
    }
}

impl TemporalDiffRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("owner", &self.owner)?;
        require("repo", &self.repo)?;
        require("branch_from", &self.branch_from)?;
        require("branch_to", &self.branch_to)?;
        require("time_from", &self.time_from)?;
        require("time_to", &self.time_to)?;
        if let Some(receiver) = &self.receiver_branch {
            require("receiver_branch", receiver)?;
        }
        Ok(())
    }

    pub fn coordinates(&self) -> RepoCoordinates {
        RepoCoordinates::new(self.owner.trim(), self.repo.trim())
    }
}

impl DiffCommitsRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("owner", &self.owner)?;
        require("repo", &self.repo)?;
        require("base_sha", &self.base_sha)?;
        require("head_sha", &self.head_sha)?;
        Ok(())
    }

    pub fn coordinates(&self) -> RepoCoordinates {
        RepoCoordinates::new(self.owner.trim(), self.repo.trim())
    }
}

impl CommitsInWindowRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("owner", &self.owner)?;
        require("repo", &self.repo)?;
        require("branch", &self.branch)?;
        require("since", &self.since)?;
        require("until", &self.until)?;
        if self.limit == Some(0) {
            return Err(ValidationError::NotPositive("limit".to_string()));
        }
        Ok(())
    }

    pub fn coordinates(&self) -> RepoCoordinates {
        RepoCoordinates::new(self.owner.trim(), self.repo.trim())
    }
}

#[cfg(test)]
mod tests;
