use super::CommitGraphProvider;
use crate::error::ProviderError;
use crate::timestamp::parse_timestamp;
use crate::types::{
    CommitNode, CommitQuery, CompareResult, CompareStatus, FileChange, PullRequestQuery,
    PullRequestRecord, PullRequestSort, RepoCoordinates, SortDirection,
};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Provider call kinds, used for call accounting and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    BranchTip,
    Commit,
    ListCommits,
    PullRequests,
    Compare,
    MergeBase,
}

/// Commit graph held entirely in memory
///
/// Built with chained builder calls:
///
/// ```
/// use branch_chrono::provider::InMemoryCommitGraph;
///
/// let graph = InMemoryCommitGraph::new("octo/widgets")
///     .commit("a", &[], "2024-01-01T00:00:00Z", "init")
///     .commit("b", &["a"], "2024-01-02T00:00:00Z", "second")
///     .branch("main", "b");
/// assert_eq!(graph.commit_count(), 2);
/// ```
///
/// Every call is counted so tests can assert on provider traffic, and errors
/// can be queued per call kind to simulate an unreliable remote.
pub struct InMemoryCommitGraph {
    repo: RepoCoordinates,
    commits: HashMap<String, CommitNode>,
    branches: HashMap<String, String>,
    pull_requests: Vec<PullRequestRecord>,
    files: HashMap<(String, String), Vec<FileChange>>,
    latency: Option<Duration>,
    calls: Mutex<HashMap<Call, usize>>,
    failures: Mutex<HashMap<Call, VecDeque<ProviderError>>>,
}

impl InMemoryCommitGraph {
    pub fn new(full_name: &str) -> Self {
        let repo = RepoCoordinates::parse(full_name)
            .unwrap_or_else(|_| RepoCoordinates::new(full_name, ""));
        Self {
            repo,
            commits: HashMap::new(),
            branches: HashMap::new(),
            pull_requests: Vec::new(),
            files: HashMap::new(),
            latency: None,
            calls: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Add a commit. `committed_at` is any timestamp `parse_timestamp` accepts.
    pub fn commit(self, sha: &str, parents: &[&str], committed_at: &str, message: &str) -> Self {
        let at = match parse_timestamp(committed_at) {
            Ok(at) => at,
            Err(e) => {
                tracing::warn!("Ignoring bad timestamp for commit {}: {}", sha, e);
                DateTime::<Utc>::UNIX_EPOCH
            }
        };
        self.commit_at(sha, parents, at, message)
    }

    pub fn commit_at(
        mut self,
        sha: &str,
        parents: &[&str],
        committed_at: DateTime<Utc>,
        message: &str,
    ) -> Self {
        self.commits.insert(
            sha.to_string(),
            CommitNode {
                sha: sha.to_string(),
                parent_shas: parents.iter().map(|p| p.to_string()).collect(),
                committed_at,
                author_name: Some("Test Author".to_string()),
                author_email: Some("author@example.com".to_string()),
                message: message.to_string(),
            },
        );
        self
    }

    pub fn branch(mut self, name: &str, tip: &str) -> Self {
        self.branches.insert(name.to_string(), tip.to_string());
        self
    }

    /// Add a closed pull request. `merged_at` of None means closed unmerged.
    pub fn pull_request(
        mut self,
        number: u64,
        head_ref: &str,
        base_ref: &str,
        merged_at: Option<&str>,
        merge_commit_sha: Option<&str>,
    ) -> Self {
        self.pull_requests.push(PullRequestRecord {
            number,
            title: format!("PR #{}", number),
            head_ref: head_ref.to_string(),
            base_ref: base_ref.to_string(),
            merged_at: merged_at.and_then(|m| parse_timestamp(m).ok()),
            merge_commit_sha: merge_commit_sha.map(str::to_string),
        });
        self
    }

    /// Files reported by `compare_commits(base, head)`
    pub fn files(mut self, base: &str, head: &str, files: Vec<FileChange>) -> Self {
        self.files
            .insert((base.to_string(), head.to_string()), files);
        self
    }

    /// Delay every call, for cancellation and concurrency tests
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queue errors returned (in order) by the next calls of one kind
    pub fn inject_failures(&self, call: Call, errors: Vec<ProviderError>) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.entry(call).or_default().extend(errors);
        }
    }

    pub fn call_count(&self, call: Call) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.get(&call).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.values().sum())
            .unwrap_or(0)
    }

    pub fn commit_count(&self) -> usize {
        self.commits.len()
    }

    pub fn repo(&self) -> &RepoCoordinates {
        &self.repo
    }

    async fn enter(&self, call: Call, repo: &RepoCoordinates) -> Result<(), ProviderError> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(call).or_insert(0) += 1;
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let injected = self
            .failures
            .lock()
            .ok()
            .and_then(|mut failures| failures.get_mut(&call).and_then(VecDeque::pop_front));
        if let Some(err) = injected {
            return Err(err);
        }
        if repo != &self.repo {
            return Err(ProviderError::RepoNotFound(repo.full_name()));
        }
        Ok(())
    }

    /// Branch name or full SHA to a SHA
    fn resolve_ref(&self, reference: &str) -> Option<&str> {
        if let Some(tip) = self.branches.get(reference) {
            return Some(tip.as_str());
        }
        self.commits.get_key_value(reference).map(|(sha, _)| sha.as_str())
    }

    /// Every commit reachable from `start` through any parent, including itself
    fn ancestors(&self, start: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start.to_string()]);
        while let Some(sha) = queue.pop_front() {
            let Some(commit) = self.commits.get(&sha) else {
                continue;
            };
            if !seen.insert(sha) {
                continue;
            }
            queue.extend(commit.parent_shas.iter().cloned());
        }
        seen
    }

    fn compute_merge_base(&self, a: &str, b: &str) -> Option<String> {
        let left = self.ancestors(a);
        let right = self.ancestors(b);
        left.intersection(&right)
            .filter_map(|sha| self.commits.get(sha))
            .max_by(|x, y| {
                x.committed_at
                    .cmp(&y.committed_at)
                    .then_with(|| x.sha.cmp(&y.sha))
            })
            .map(|c| c.sha.clone())
    }
}

fn paginate<T>(items: Vec<T>, page: usize, per_page: usize) -> Vec<T> {
    let per_page = per_page.max(1);
    let skip = page.saturating_sub(1).saturating_mul(per_page);
    items.into_iter().skip(skip).take(per_page).collect()
}

#[async_trait::async_trait]
impl CommitGraphProvider for InMemoryCommitGraph {
    async fn get_branch_tip(
        &self,
        repo: &RepoCoordinates,
        branch: &str,
    ) -> Result<String, ProviderError> {
        self.enter(Call::BranchTip, repo).await?;
        self.branches
            .get(branch)
            .cloned()
            .ok_or_else(|| ProviderError::BranchNotFound {
                repo: repo.full_name(),
                branch: branch.to_string(),
            })
    }

    async fn get_commit(
        &self,
        repo: &RepoCoordinates,
        sha: &str,
    ) -> Result<CommitNode, ProviderError> {
        self.enter(Call::Commit, repo).await?;
        self.commits
            .get(sha)
            .cloned()
            .ok_or_else(|| ProviderError::CommitNotFound(sha.to_string()))
    }

    async fn list_commits(
        &self,
        repo: &RepoCoordinates,
        query: &CommitQuery,
    ) -> Result<Vec<CommitNode>, ProviderError> {
        self.enter(Call::ListCommits, repo).await?;
        let start = self
            .resolve_ref(&query.sha)
            .ok_or_else(|| ProviderError::CommitNotFound(query.sha.clone()))?;

        let mut history: Vec<CommitNode> = self
            .ancestors(start)
            .iter()
            .filter_map(|sha| self.commits.get(sha))
            .filter(|c| query.since.is_none_or(|since| c.committed_at >= since))
            .filter(|c| query.until.is_none_or(|until| c.committed_at <= until))
            .cloned()
            .collect();

        history.sort_by(|a, b| {
            b.committed_at
                .cmp(&a.committed_at)
                .then_with(|| a.sha.cmp(&b.sha))
        });
        if query.direction == SortDirection::Ascending {
            history.reverse();
        }

        Ok(paginate(history, query.page, query.per_page))
    }

    async fn list_closed_pull_requests(
        &self,
        repo: &RepoCoordinates,
        query: &PullRequestQuery,
    ) -> Result<Vec<PullRequestRecord>, ProviderError> {
        self.enter(Call::PullRequests, repo).await?;
        let mut prs: Vec<PullRequestRecord> = self
            .pull_requests
            .iter()
            .filter(|pr| pr.base_ref == query.base)
            .cloned()
            .collect();

        // Merge time stands in for update time; PR numbers are allocated in creation order
        match query.sort {
            PullRequestSort::Updated => prs.sort_by(|a, b| {
                b.merged_at
                    .cmp(&a.merged_at)
                    .then_with(|| b.number.cmp(&a.number))
            }),
            PullRequestSort::Created => prs.sort_by(|a, b| b.number.cmp(&a.number)),
        }
        if query.direction == SortDirection::Ascending {
            prs.reverse();
        }

        Ok(paginate(prs, query.page, query.per_page))
    }

    async fn compare_commits(
        &self,
        repo: &RepoCoordinates,
        base: &str,
        head: &str,
    ) -> Result<CompareResult, ProviderError> {
        self.enter(Call::Compare, repo).await?;
        let base_sha = self
            .resolve_ref(base)
            .ok_or_else(|| ProviderError::CommitNotFound(base.to_string()))?;
        let head_sha = self
            .resolve_ref(head)
            .ok_or_else(|| ProviderError::CommitNotFound(head.to_string()))?;

        let base_ancestors = self.ancestors(base_sha);
        let head_ancestors = self.ancestors(head_sha);
        let ahead_by = head_ancestors.difference(&base_ancestors).count() as u64;
        let behind_by = base_ancestors.difference(&head_ancestors).count() as u64;

        let status = match (ahead_by, behind_by) {
            (0, 0) => CompareStatus::Identical,
            (_, 0) => CompareStatus::Ahead,
            (0, _) => CompareStatus::Behind,
            _ => CompareStatus::Diverged,
        };

        let files = self
            .files
            .get(&(base.to_string(), head.to_string()))
            .or_else(|| {
                self.files
                    .get(&(base_sha.to_string(), head_sha.to_string()))
            })
            .cloned()
            .unwrap_or_default();

        Ok(CompareResult {
            status,
            merge_base_sha: self.compute_merge_base(base_sha, head_sha),
            ahead_by,
            behind_by,
            files,
        })
    }

    async fn merge_base(
        &self,
        repo: &RepoCoordinates,
        a: &str,
        b: &str,
    ) -> Result<Option<String>, ProviderError> {
        self.enter(Call::MergeBase, repo).await?;
        let a = self
            .resolve_ref(a)
            .ok_or_else(|| ProviderError::CommitNotFound(a.to_string()))?;
        let b = self
            .resolve_ref(b)
            .ok_or_else(|| ProviderError::CommitNotFound(b.to_string()))?;
        Ok(self.compute_merge_base(a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileStatus;

    fn repo() -> RepoCoordinates {
        RepoCoordinates::new("octo", "widgets")
    }

    /// main: a - b - m ; feature: a - f1 - f2, merged into main at m
    fn graph() -> InMemoryCommitGraph {
        InMemoryCommitGraph::new("octo/widgets")
            .commit("a", &[], "2024-01-01T00:00:00Z", "init")
            .commit("b", &["a"], "2024-01-02T00:00:00Z", "main work")
            .commit("f1", &["a"], "2024-01-01T12:00:00Z", "feature 1")
            .commit("f2", &["f1"], "2024-01-02T12:00:00Z", "feature 2")
            .commit("m", &["b", "f2"], "2024-01-03T00:00:00Z", "Merge branch 'feature'")
            .branch("main", "m")
            .branch("feature", "f2")
    }

    #[tokio::test]
    async fn test_branch_tip_and_missing_branch() {
        let g = graph();
        assert_eq!(g.get_branch_tip(&repo(), "main").await, Ok("m".to_string()));

        let err = g.get_branch_tip(&repo(), "nope").await.unwrap_err();
        assert_eq!(
            err,
            ProviderError::BranchNotFound {
                repo: "octo/widgets".to_string(),
                branch: "nope".to_string()
            }
        );
        assert_eq!(g.call_count(Call::BranchTip), 2);
    }

    #[tokio::test]
    async fn test_wrong_repo_is_repo_not_found() {
        let g = graph();
        let err = g
            .get_branch_tip(&RepoCoordinates::new("octo", "gadgets"), "main")
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::RepoNotFound("octo/gadgets".to_string()));
    }

    #[tokio::test]
    async fn test_list_commits_is_newest_first_and_filtered() {
        let g = graph();
        let until = parse_timestamp("2024-01-02T06:00:00Z").unwrap();
        let page = g
            .list_commits(&repo(), &CommitQuery::new("main").until(until))
            .await
            .unwrap();

        let shas: Vec<_> = page.iter().map(|c| c.sha.as_str()).collect();
        assert_eq!(shas, vec!["b", "f1", "a"]);
    }

    #[tokio::test]
    async fn test_list_commits_ascending_page_size_one() {
        let g = graph();
        let page = g
            .list_commits(&repo(), &CommitQuery::new("feature").per_page(1).ascending())
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].sha, "a");
    }

    #[tokio::test]
    async fn test_list_commits_pagination() {
        let g = graph();
        let second = g
            .list_commits(&repo(), &CommitQuery::new("main").per_page(2).page(2))
            .await
            .unwrap();
        let shas: Vec<_> = second.iter().map(|c| c.sha.as_str()).collect();
        assert_eq!(shas, vec!["b", "f1"]);

        let past_end = g
            .list_commits(&repo(), &CommitQuery::new("main").per_page(2).page(9))
            .await
            .unwrap();
        assert!(past_end.is_empty());
    }

    #[tokio::test]
    async fn test_compare_reports_merge_base_and_files() {
        let files = vec![FileChange {
            path: "src/lib.rs".to_string(),
            previous_path: None,
            status: FileStatus::Modified,
            additions: 3,
            deletions: 1,
            changes: 4,
            patch: "@@".to_string(),
        }];
        let g = graph().files("b", "f2", files.clone());

        let result = g.compare_commits(&repo(), "b", "f2").await.unwrap();
        assert_eq!(result.status, CompareStatus::Diverged);
        assert_eq!(result.merge_base_sha.as_deref(), Some("a"));
        assert_eq!(result.ahead_by, 2);
        assert_eq!(result.behind_by, 1);
        assert_eq!(result.files, files);

        let ahead = g.compare_commits(&repo(), "a", "main").await.unwrap();
        assert_eq!(ahead.status, CompareStatus::Ahead);

        let same = g.compare_commits(&repo(), "m", "m").await.unwrap();
        assert_eq!(same.status, CompareStatus::Identical);
    }

    #[tokio::test]
    async fn test_merge_base_of_unrelated_histories_is_none() {
        let g = graph()
            .commit("x", &[], "2024-01-05T00:00:00Z", "orphan")
            .branch("orphan", "x");
        assert_eq!(g.merge_base(&repo(), "orphan", "main").await, Ok(None));
        assert_eq!(
            g.merge_base(&repo(), "feature", "main").await,
            Ok(Some("f2".to_string()))
        );
    }

    #[tokio::test]
    async fn test_cyclic_parents_terminate() {
        let g = InMemoryCommitGraph::new("octo/widgets")
            .commit("x", &["y"], "2024-01-02T00:00:00Z", "x")
            .commit("y", &["x"], "2024-01-01T00:00:00Z", "y")
            .branch("loop", "x");
        let page = g
            .list_commits(&repo(), &CommitQuery::new("loop"))
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
    }

    #[tokio::test]
    async fn test_pull_requests_filtered_by_base_newest_first() {
        let g = graph()
            .pull_request(1, "feature", "main", Some("2024-01-03T00:00:00Z"), Some("m"))
            .pull_request(2, "other", "develop", Some("2024-01-04T00:00:00Z"), Some("z"))
            .pull_request(3, "feature", "main", None, None)
            .pull_request(4, "hotfix", "main", Some("2024-01-05T00:00:00Z"), Some("h"));

        let prs = g
            .list_closed_pull_requests(&repo(), &PullRequestQuery::new("main"))
            .await
            .unwrap();
        let numbers: Vec<_> = prs.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![4, 1, 3]);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed_in_order() {
        let g = graph();
        g.inject_failures(
            Call::Commit,
            vec![ProviderError::Transient("502".to_string())],
        );

        assert!(matches!(
            g.get_commit(&repo(), "a").await,
            Err(ProviderError::Transient(_))
        ));
        assert!(g.get_commit(&repo(), "a").await.is_ok());
        assert_eq!(g.call_count(Call::Commit), 2);
        assert_eq!(g.total_calls(), 2);
    }
}
