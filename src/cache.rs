use crate::config::CacheConfig;
use crate::error::{CacheError, ProviderError};
use crate::provider::CommitGraphProvider;
use crate::types::{
    CommitNode, CommitQuery, CompareResult, PullRequestQuery, PullRequestRecord, RepoCoordinates,
};
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Immutable facts learned about one repository
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RepoCache {
    /// sha -> commit
    #[serde(default)]
    pub commits: HashMap<String, CommitNode>,
    /// "base...head" -> compare result, for SHA pairs only
    #[serde(default)]
    pub compares: HashMap<String, CompareResult>,
}

/// On-disk snapshot of the commit store
///
/// Only content-addressed facts live here. Branch tips and history listings
/// move between requests and are never cached.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CommitCache {
    /// Map of "owner/name" -> cached facts
    pub repos: HashMap<String, RepoCache>,
}

/// Whether a ref is a full SHA-1 or SHA-256 object id rather than a branch name
pub fn is_full_sha(reference: &str) -> bool {
    matches!(reference.len(), 40 | 64) && reference.bytes().all(|b| b.is_ascii_hexdigit())
}

fn compare_key(base: &str, head: &str) -> String {
    format!("{}...{}", base, head)
}

impl CommitCache {
    /// Get the default cache file path
    pub fn default_path() -> PathBuf {
        crate::paths::PlatformPaths::default_commit_cache_path()
    }

    /// Load cache from disk; a missing file is an empty cache
    pub fn load(cache_path: &Path) -> Result<Self, CacheError> {
        if !cache_path.exists() {
            tracing::debug!("Commit cache file not found, starting with empty cache");
            return Ok(Self::default());
        }

        let load_failed = |reason: String| CacheError::LoadFailed {
            path: cache_path.display().to_string(),
            reason,
        };
        let content = fs::read_to_string(cache_path).map_err(|e| load_failed(e.to_string()))?;
        let cache: CommitCache =
            serde_json::from_str(&content).map_err(|e| load_failed(e.to_string()))?;

        tracing::info!(
            "Loaded commit cache with {} commits across {} repositories",
            cache.total_commits(),
            cache.repos.len()
        );
        Ok(cache)
    }

    /// Save cache to disk
    pub fn save(&self, cache_path: &Path) -> Result<(), CacheError> {
        let save_failed = |reason: String| CacheError::SaveFailed {
            path: cache_path.display().to_string(),
            reason,
        };

        if let Some(parent) = cache_path.parent() {
            fs::create_dir_all(parent).map_err(|e| save_failed(e.to_string()))?;
        }
        let content = serde_json::to_string(self).map_err(|e| save_failed(e.to_string()))?;
        fs::write(cache_path, content).map_err(|e| save_failed(e.to_string()))?;

        tracing::debug!("Saved commit cache to {:?}", cache_path);
        Ok(())
    }

    pub fn insert_commit(&mut self, repo: &str, commit: CommitNode) {
        self.repos
            .entry(repo.to_string())
            .or_default()
            .commits
            .insert(commit.sha.clone(), commit);
    }

    pub fn total_commits(&self) -> usize {
        self.repos.values().map(|r| r.commits.len()).sum()
    }
}

/// (repository, sha or "base...head")
type StoreKey = (String, String);

/// Bounded in-memory store of commits and SHA-pair comparisons
///
/// Cloning shares the underlying caches. Capacity is enforced by entry
/// count; evictions are applied lazily as entries are inserted.
#[derive(Clone)]
pub struct CommitStore {
    commits: Cache<StoreKey, CommitNode>,
    compares: Cache<StoreKey, CompareResult>,
    // Set on insert, cleared when a save starts
    dirty: Arc<AtomicBool>,
}

impl CommitStore {
    pub fn new(max_commits: u64, max_compares: u64) -> Self {
        Self {
            commits: Cache::builder().max_capacity(max_commits).build(),
            compares: Cache::builder().max_capacity(max_compares).build(),
            dirty: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_commits, config.max_compares)
    }

    pub fn get_commit(&self, repo: &str, sha: &str) -> Option<CommitNode> {
        self.commits.get(&(repo.to_string(), sha.to_string()))
    }

    pub fn insert_commit(&self, repo: &str, commit: CommitNode) {
        self.commits.insert((repo.to_string(), commit.sha.clone()), commit);
        self.dirty.store(true, Ordering::Release);
    }

    pub fn get_compare(&self, repo: &str, base: &str, head: &str) -> Option<CompareResult> {
        self.compares.get(&(repo.to_string(), compare_key(base, head)))
    }

    pub fn insert_compare(&self, repo: &str, base: &str, head: &str, result: CompareResult) {
        self.compares.insert((repo.to_string(), compare_key(base, head)), result);
        self.dirty.store(true, Ordering::Release);
    }

    /// Fill the store from a loaded snapshot; capacity limits still apply
    pub fn preload(&self, snapshot: CommitCache) {
        for (repo, cached) in snapshot.repos {
            for (sha, commit) in cached.commits {
                self.commits.insert((repo.clone(), sha), commit);
            }
            for (key, result) in cached.compares {
                self.compares.insert((repo.clone(), key), result);
            }
        }
    }

    /// Copy the current entries into the on-disk format
    pub fn snapshot(&self) -> CommitCache {
        let mut snapshot = CommitCache::default();
        for (key, commit) in self.commits.iter() {
            snapshot.insert_commit(&key.0, commit);
        }
        for (key, result) in self.compares.iter() {
            snapshot
                .repos
                .entry(key.0.clone())
                .or_default()
                .compares
                .insert(key.1.clone(), result);
        }
        snapshot
    }

    /// Number of cached (commits, compares) once pending evictions have run
    pub fn entry_counts(&self) -> (u64, u64) {
        self.commits.run_pending_tasks();
        self.compares.run_pending_tasks();
        (self.commits.entry_count(), self.compares.entry_count())
    }

    /// Write the store to `path` off the async runtime, if anything changed
    ///
    /// Returns whether a save happened.
    pub async fn persist(&self, path: &Path) -> Result<bool, CacheError> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }

        let snapshot = self.snapshot();
        let target = path.to_path_buf();
        let saved = tokio::task::spawn_blocking(move || snapshot.save(&target))
            .await
            .map_err(|e| CacheError::SaveFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
            .and_then(|result| result);

        if saved.is_err() {
            // Keep the changes pending for the next attempt
            self.dirty.store(true, Ordering::Release);
        }
        saved.map(|_| true)
    }
}

impl Default for CommitStore {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

/// Decorator serving immutable lookups from a shared [`CommitStore`]
pub struct CachingProvider<P> {
    inner: P,
    store: CommitStore,
}

impl<P: CommitGraphProvider> CachingProvider<P> {
    pub fn new(inner: P) -> Self {
        Self::with_store(inner, CommitStore::default())
    }

    pub fn with_store(inner: P, store: CommitStore) -> Self {
        Self { inner, store }
    }

    pub fn store(&self) -> &CommitStore {
        &self.store
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    fn remember(&self, repo: &RepoCoordinates, commits: &[CommitNode]) {
        if commits.is_empty() {
            return;
        }
        let key = repo.full_name();
        for commit in commits {
            self.store.insert_commit(&key, commit.clone());
        }
    }
}

#[async_trait::async_trait]
impl<P: CommitGraphProvider> CommitGraphProvider for CachingProvider<P> {
    async fn get_branch_tip(
        &self,
        repo: &RepoCoordinates,
        branch: &str,
    ) -> Result<String, ProviderError> {
        self.inner.get_branch_tip(repo, branch).await
    }

    async fn get_commit(
        &self,
        repo: &RepoCoordinates,
        sha: &str,
    ) -> Result<CommitNode, ProviderError> {
        if let Some(commit) = self.store.get_commit(&repo.full_name(), sha) {
            return Ok(commit);
        }

        let commit = self.inner.get_commit(repo, sha).await?;
        if is_full_sha(sha) {
            self.remember(repo, std::slice::from_ref(&commit));
        }
        Ok(commit)
    }

    async fn list_commits(
        &self,
        repo: &RepoCoordinates,
        query: &CommitQuery,
    ) -> Result<Vec<CommitNode>, ProviderError> {
        let commits = self.inner.list_commits(repo, query).await?;
        self.remember(repo, &commits);
        Ok(commits)
    }

    async fn list_closed_pull_requests(
        &self,
        repo: &RepoCoordinates,
        query: &PullRequestQuery,
    ) -> Result<Vec<PullRequestRecord>, ProviderError> {
        self.inner.list_closed_pull_requests(repo, query).await
    }

    async fn compare_commits(
        &self,
        repo: &RepoCoordinates,
        base: &str,
        head: &str,
    ) -> Result<CompareResult, ProviderError> {
        let cacheable = is_full_sha(base) && is_full_sha(head);
        let key = repo.full_name();
        if cacheable && let Some(result) = self.store.get_compare(&key, base, head) {
            tracing::debug!("Compare {}...{} served from cache", base, head);
            return Ok(result);
        }

        let result = self.inner.compare_commits(repo, base, head).await?;
        if cacheable {
            self.store.insert_compare(&key, base, head, result.clone());
        }
        Ok(result)
    }

    async fn get_first_commit(
        &self,
        repo: &RepoCoordinates,
        branch: &str,
    ) -> Result<Option<CommitNode>, ProviderError> {
        let first = self.inner.get_first_commit(repo, branch).await?;
        if let Some(commit) = &first {
            self.remember(repo, std::slice::from_ref(commit));
        }
        Ok(first)
    }

    async fn merge_base(
        &self,
        repo: &RepoCoordinates,
        a: &str,
        b: &str,
    ) -> Result<Option<String>, ProviderError> {
        // Through our own compare so SHA-pair results land in the store
        Ok(self.compare_commits(repo, a, b).await?.merge_base_sha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::memory::{Call, InMemoryCommitGraph};
    use tempfile::tempdir;

    fn sha(n: u32) -> String {
        format!("{:040x}", n)
    }

    fn repo() -> RepoCoordinates {
        RepoCoordinates::new("octo", "widgets")
    }

    fn graph() -> InMemoryCommitGraph {
        InMemoryCommitGraph::new("octo/widgets")
            .commit(&sha(1), &[], "2024-01-01T00:00:00Z", "init")
            .commit(&sha(2), &[sha(1).as_str()], "2024-01-02T00:00:00Z", "second")
            .branch("main", &sha(2))
    }

    fn node(n: u32, message: &str) -> CommitNode {
        CommitNode {
            sha: sha(n),
            parent_shas: vec![],
            committed_at: chrono::Utc::now(),
            author_name: None,
            author_email: None,
            message: message.to_string(),
        }
    }

    #[test]
    fn test_is_full_sha() {
        assert!(is_full_sha(&sha(1)));
        assert!(is_full_sha(&"a".repeat(64)));
        assert!(!is_full_sha("main"));
        assert!(!is_full_sha("abc1234"));
        assert!(!is_full_sha(&"g".repeat(40)));
    }

    #[test]
    fn test_default_is_empty() {
        let cache = CommitCache::default();
        assert_eq!(cache.total_commits(), 0);
        assert!(cache.repos.is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("commit_cache.json");

        let mut cache = CommitCache::default();
        cache.insert_commit("octo/widgets", node(1, "init"));
        cache.save(&path).unwrap();

        let loaded = CommitCache::load(&path).unwrap();
        assert_eq!(loaded.total_commits(), 1);
        assert_eq!(loaded.repos["octo/widgets"].commits[&sha(1)].message, "init");
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let cache = CommitCache::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(cache.repos.len(), 0);
    }

    #[test]
    fn test_load_corrupt_file_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("commit_cache.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            CommitCache::load(&path),
            Err(CacheError::LoadFailed { .. })
        ));
    }

    #[test]
    fn test_store_respects_commit_capacity() {
        let store = CommitStore::new(8, 2);
        for n in 1..=100 {
            store.insert_commit("octo/widgets", node(n, "work"));
        }

        let (commits, compares) = store.entry_counts();
        assert!(commits <= 8, "store grew to {} commits", commits);
        assert_eq!(compares, 0);
    }

    #[test]
    fn test_store_respects_compare_capacity() {
        let store = CommitStore::new(8, 2);
        let result = CompareResult {
            status: crate::types::CompareStatus::Identical,
            merge_base_sha: None,
            ahead_by: 0,
            behind_by: 0,
            files: vec![],
        };
        for n in 1..=20 {
            store.insert_compare("octo/widgets", &sha(n), &sha(n + 1), result.clone());
        }

        let (_, compares) = store.entry_counts();
        assert!(compares <= 2, "store grew to {} compares", compares);
    }

    #[test]
    fn test_snapshot_preload_round_trip() {
        let store = CommitStore::default();
        store.insert_commit("octo/widgets", node(1, "init"));
        store.insert_commit("octo/gadgets", node(2, "other"));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.total_commits(), 2);

        let restored = CommitStore::default();
        restored.preload(snapshot);
        let commit = restored.get_commit("octo/gadgets", &sha(2)).unwrap();
        assert_eq!(commit.message, "other");
        assert!(restored.get_commit("octo/widgets", &sha(2)).is_none());
    }

    #[tokio::test]
    async fn test_persist_only_writes_when_dirty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("commit_cache.json");
        let store = CommitStore::default();

        assert!(!store.persist(&path).await.unwrap());
        assert!(!path.exists());

        store.insert_commit("octo/widgets", node(1, "init"));
        assert!(store.persist(&path).await.unwrap());
        assert_eq!(CommitCache::load(&path).unwrap().total_commits(), 1);

        // Nothing new since the last save
        assert!(!store.persist(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_persist_stays_dirty() {
        let dir = tempdir().unwrap();
        // A directory where the file should be makes the write fail
        let path = dir.path().join("occupied");
        fs::create_dir(&path).unwrap();

        let store = CommitStore::default();
        store.insert_commit("octo/widgets", node(1, "init"));
        assert!(store.persist(&path).await.is_err());

        fs::remove_dir(&path).unwrap();
        assert!(store.persist(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_commit_is_served_from_cache() {
        let provider = CachingProvider::new(graph());

        let first = provider.get_commit(&repo(), &sha(2)).await.unwrap();
        let second = provider.get_commit(&repo(), &sha(2)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.inner().call_count(Call::Commit), 1);
    }

    #[tokio::test]
    async fn test_listing_populates_cache_but_is_never_cached() {
        let provider = CachingProvider::new(graph());

        provider
            .list_commits(&repo(), &CommitQuery::new("main"))
            .await
            .unwrap();
        provider
            .list_commits(&repo(), &CommitQuery::new("main"))
            .await
            .unwrap();
        assert_eq!(provider.inner().call_count(Call::ListCommits), 2);

        provider.get_commit(&repo(), &sha(1)).await.unwrap();
        assert_eq!(provider.inner().call_count(Call::Commit), 0);
    }

    #[tokio::test]
    async fn test_branch_tip_is_never_cached() {
        let provider = CachingProvider::new(graph());
        provider.get_branch_tip(&repo(), "main").await.unwrap();
        provider.get_branch_tip(&repo(), "main").await.unwrap();
        assert_eq!(provider.inner().call_count(Call::BranchTip), 2);
    }

    #[tokio::test]
    async fn test_compare_cached_only_for_sha_pairs() {
        let provider = CachingProvider::new(graph());

        provider.compare_commits(&repo(), &sha(1), &sha(2)).await.unwrap();
        provider.compare_commits(&repo(), &sha(1), &sha(2)).await.unwrap();
        assert_eq!(provider.inner().call_count(Call::Compare), 1);

        provider.compare_commits(&repo(), &sha(1), "main").await.unwrap();
        provider.compare_commits(&repo(), &sha(1), "main").await.unwrap();
        assert_eq!(provider.inner().call_count(Call::Compare), 3);
    }

    #[tokio::test]
    async fn test_merge_base_reuses_cached_compare() {
        let provider = CachingProvider::new(graph());

        let first = provider.merge_base(&repo(), &sha(2), &sha(1)).await.unwrap();
        let second = provider.merge_base(&repo(), &sha(2), &sha(1)).await.unwrap();
        assert_eq!(first, Some(sha(1)));
        assert_eq!(second, first);
        assert_eq!(provider.inner().call_count(Call::Compare), 1);

        // A later diff of the same pair is already cached too
        provider.compare_commits(&repo(), &sha(2), &sha(1)).await.unwrap();
        assert_eq!(provider.inner().call_count(Call::Compare), 1);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let provider = CachingProvider::new(graph());
        provider.inner().inject_failures(
            Call::Commit,
            vec![ProviderError::Transient("502".to_string())],
        );

        assert!(provider.get_commit(&repo(), &sha(1)).await.is_err());
        assert!(provider.get_commit(&repo(), &sha(1)).await.is_ok());
        assert_eq!(provider.inner().call_count(Call::Commit), 2);
    }

    #[tokio::test]
    async fn test_shared_store_between_providers() {
        let shared = CommitStore::default();
        let warm = CachingProvider::with_store(graph(), shared.clone());
        warm.get_commit(&repo(), &sha(1)).await.unwrap();

        let cold = CachingProvider::with_store(graph(), shared);
        cold.get_commit(&repo(), &sha(1)).await.unwrap();
        assert_eq!(cold.inner().call_count(Call::Commit), 0);
    }
}
