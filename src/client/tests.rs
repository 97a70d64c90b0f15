use super::*;
use crate::error::{ProviderError, ResolveError, ValidationError};
use crate::provider::memory::{Call, InMemoryCommitGraph};
use tempfile::TempDir;

// Helper to create a client over a small in-memory history
fn create_test_client() -> (ChronoClient, Arc<InMemoryCommitGraph>) {
    let graph = Arc::new(
        InMemoryCommitGraph::new("octo/widgets")
            .commit("A", &[], "2024-01-01T00:00:00Z", "init")
            .commit("B", &["A"], "2024-01-03T00:00:00Z", "work")
            .branch("main", "B")
            .branch("trunk", "B")
            .files(
                "A",
                "B",
                vec![FileChange {
                    path: "README.md".to_string(),
                    previous_path: None,
                    status: FileStatus::Modified,
                    additions: 1,
                    deletions: 1,
                    changes: 2,
                    patch: "@@ -1 +1 @@\n-old\n+new".to_string(),
                }],
            ),
    );
    let client = ChronoClient::with_provider(graph.clone(), Config::default());
    (client, graph)
}

fn resolve_req(branch: &str, at: &str) -> ResolvePointRequest {
    ResolvePointRequest {
        owner: "octo".to_string(),
        repo: "widgets".to_string(),
        branch: branch.to_string(),
        at: at.to_string(),
        root_branch: None,
    }
}

fn diff_req(time_from: &str, time_to: &str) -> TemporalDiffRequest {
    TemporalDiffRequest {
        owner: "octo".to_string(),
        repo: "widgets".to_string(),
        branch_from: "main".to_string(),
        branch_to: "main".to_string(),
        time_from: time_from.to_string(),
        time_to: time_to.to_string(),
        receiver_branch: None,
    }
}

// ===== Client Initialization Tests =====

#[test]
fn test_with_config_builds_github_stack() {
    let client = ChronoClient::with_config(Config::default()).unwrap();
    assert!(client.commit_store.is_some());
    assert_eq!(client.config().resolver.default_receiver_branch, "main");
}

#[test]
fn test_with_config_without_cache() {
    let mut config = Config::default();
    config.cache.enabled = false;
    let client = ChronoClient::with_config(config).unwrap();
    assert!(client.commit_store.is_none());
}

#[test]
fn test_client_clone() {
    let (client, _graph) = create_test_client();
    let _cloned = client.clone();
}

// ===== resolve_point Tests =====

#[tokio::test]
async fn test_resolve_point_accepts_z_suffix_and_naive() {
    let (client, _graph) = create_test_client();
    let cancel = CancellationToken::new();

    let zulu = client
        .resolve_point(resolve_req("main", "2024-01-02T00:00:00Z"), &cancel)
        .await
        .unwrap();
    let naive = client
        .resolve_point(resolve_req("main", "2024-01-02T00:00:00"), &cancel)
        .await
        .unwrap();

    assert_eq!(zulu.sha, "A");
    assert_eq!(zulu, naive);
}

#[tokio::test]
async fn test_resolve_point_trims_branch() {
    let (client, _graph) = create_test_client();
    let point = client
        .resolve_point(
            resolve_req("  main ", "2024-01-04T00:00:00Z"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(point.sha, "B");
    assert_eq!(point.branch, "main");
}

#[tokio::test]
async fn test_resolve_point_invalid_timestamp_makes_no_calls() {
    let (client, graph) = create_test_client();
    let err = client
        .resolve_point(resolve_req("main", "last tuesday"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ChronoError::Validation(ValidationError::InvalidTimestamp(_))
    ));
    assert!(err.is_user_error());
    assert_eq!(graph.total_calls(), 0);
}

#[tokio::test]
async fn test_resolve_point_empty_branch_rejected() {
    let (client, _graph) = create_test_client();
    let err = client
        .resolve_point(resolve_req("", "2024-01-02T00:00:00Z"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ChronoError::Validation(ValidationError::Empty(_))
    ));
}

#[tokio::test]
async fn test_resolve_point_missing_branch_is_resolve_error() {
    let (client, _graph) = create_test_client();
    let err = client
        .resolve_point(resolve_req("nope", "2024-01-02T00:00:00Z"), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ChronoError::Resolve(ResolveError::Provider(ProviderError::BranchNotFound { .. }))
    ));
}

#[tokio::test]
async fn test_resolve_point_uses_requested_root_branch() {
    let (client, graph) = create_test_client();
    let mut req = resolve_req("main", "2023-01-01T00:00:00Z");
    req.root_branch = Some("trunk".to_string());

    let point = client
        .resolve_point(req, &CancellationToken::new())
        .await
        .unwrap();

    // main and trunk share a tip, so the fork point is that tip
    assert_eq!(point.method, ResolutionMethod::ForkPoint);
    assert_eq!(point.sha, "B");
    assert_eq!(graph.call_count(Call::MergeBase), 1);
}

// ===== temporal_diff Tests =====

#[tokio::test]
async fn test_temporal_diff_resolved() {
    let (client, _graph) = create_test_client();
    let outcome = client
        .temporal_diff(
            diff_req("2024-01-02T00:00:00Z", "2024-01-04T00:00:00Z"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let diff = outcome.into_diff().unwrap();
    assert_eq!(diff.files.len(), 1);
    assert_eq!(diff.files[0].path, "README.md");
}

#[tokio::test]
async fn test_temporal_diff_inverted_range() {
    let (client, graph) = create_test_client();
    let err = client
        .temporal_diff(
            diff_req("2024-01-04T00:00:00Z", "2024-01-02T00:00:00Z"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ChronoError::Validation(ValidationError::InvalidTimeRange { .. })
    ));
    assert_eq!(graph.total_calls(), 0);
}

#[tokio::test]
async fn test_temporal_diff_unknown_repo_is_not_found() {
    let (client, _graph) = create_test_client();
    let mut req = diff_req("2024-01-02T00:00:00Z", "2024-01-04T00:00:00Z");
    req.repo = "gadgets".to_string();

    let outcome = client
        .temporal_diff(req, &CancellationToken::new())
        .await
        .unwrap();
    assert!(outcome.is_not_found());
}

// ===== diff_commits Tests =====

#[tokio::test]
async fn test_diff_commits_pinned_endpoints() {
    let (client, _graph) = create_test_client();
    let diff = client
        .diff_commits(
            DiffCommitsRequest {
                owner: "octo".to_string(),
                repo: "widgets".to_string(),
                base_sha: "A".to_string(),
                head_sha: "B".to_string(),
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(diff.from.method, ResolutionMethod::Pinned);
    assert_eq!(diff.to.method, ResolutionMethod::Pinned);
    assert!(diff.is_exact());
    assert_eq!(diff.total_additions(), 1);
}

#[tokio::test]
async fn test_diff_commits_same_sha_no_calls() {
    let (client, graph) = create_test_client();
    let diff = client
        .diff_commits(
            DiffCommitsRequest {
                owner: "octo".to_string(),
                repo: "widgets".to_string(),
                base_sha: "A".to_string(),
                head_sha: "A".to_string(),
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(diff.is_empty());
    assert_eq!(graph.total_calls(), 0);
}

// ===== save_cache Tests =====

#[tokio::test]
async fn test_save_cache_noop_without_persistence() {
    let (client, _graph) = create_test_client();
    assert!(client.save_cache().await.is_ok());
}

fn persisting_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.cache.persist = true;
    config.cache.path = dir.path().join("commit_cache.json");
    config
}

fn sha(n: u32) -> String {
    format!("{:040x}", n)
}

fn sha_history() -> InMemoryCommitGraph {
    InMemoryCommitGraph::new("octo/widgets")
        .commit(&sha(1), &[], "2024-01-01T00:00:00Z", "init")
        .commit(&sha(2), &[sha(1).as_str()], "2024-01-03T00:00:00Z", "work")
        .branch("main", &sha(2))
}

#[tokio::test]
async fn test_save_cache_skips_unchanged_cache() {
    let temp_dir = TempDir::new().unwrap();
    let client = ChronoClient::with_cached_provider(sha_history(), persisting_config(&temp_dir));

    client.save_cache().await.unwrap();
    assert!(!temp_dir.path().join("commit_cache.json").exists());
}

#[tokio::test]
async fn test_persisted_cache_is_reloaded() {
    let temp_dir = TempDir::new().unwrap();
    let client = ChronoClient::with_cached_provider(sha_history(), persisting_config(&temp_dir));
    client
        .diff_commits(
            DiffCommitsRequest {
                owner: "octo".to_string(),
                repo: "widgets".to_string(),
                base_sha: sha(1),
                head_sha: sha(2),
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    client.save_cache().await.unwrap();
    assert!(temp_dir.path().join("commit_cache.json").exists());

    // A fresh client starts with the saved commits and compare
    let reloaded = ChronoClient::with_cached_provider(sha_history(), persisting_config(&temp_dir));
    let store = reloaded.commit_store.as_ref().unwrap();
    assert!(store.get_compare("octo/widgets", &sha(1), &sha(2)).is_some());
}

#[tokio::test]
async fn test_flush_cache_every_saves_on_stop() {
    let temp_dir = TempDir::new().unwrap();
    let client = Arc::new(ChronoClient::with_cached_provider(
        sha_history(),
        persisting_config(&temp_dir),
    ));
    let stop = CancellationToken::new();

    let flusher = {
        let client = Arc::clone(&client);
        let stop = stop.clone();
        tokio::spawn(async move {
            client
                .flush_cache_every(Duration::from_secs(3600), stop)
                .await
        })
    };

    client
        .resolve_point(resolve_req("main", "2024-01-02T00:00:00Z"), &CancellationToken::new())
        .await
        .unwrap();
    stop.cancel();
    flusher.await.unwrap();

    let saved = CommitCache::load(&temp_dir.path().join("commit_cache.json")).unwrap();
    assert!(saved.total_commits() >= 1);
}

#[tokio::test]
async fn test_flush_cache_every_saves_periodically() {
    let temp_dir = TempDir::new().unwrap();
    let client = Arc::new(ChronoClient::with_cached_provider(
        sha_history(),
        persisting_config(&temp_dir),
    ));
    client
        .resolve_point(resolve_req("main", "2024-01-02T00:00:00Z"), &CancellationToken::new())
        .await
        .unwrap();

    let stop = CancellationToken::new();
    let flusher = {
        let client = Arc::clone(&client);
        let stop = stop.clone();
        tokio::spawn(async move {
            client
                .flush_cache_every(Duration::from_millis(10), stop)
                .await
        })
    };

    let path = temp_dir.path().join("commit_cache.json");
    for _ in 0..100 {
        if path.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(path.exists());

    stop.cancel();
    flusher.await.unwrap();
}

// ===== commits_in_window Tests =====

fn window_req(since: &str, until: &str) -> CommitsInWindowRequest {
    CommitsInWindowRequest {
        owner: "octo".to_string(),
        repo: "widgets".to_string(),
        branch: "main".to_string(),
        since: since.to_string(),
        until: until.to_string(),
        limit: None,
    }
}

#[tokio::test]
async fn test_commits_in_window() {
    let (client, _graph) = create_test_client();
    let window = client
        .commits_in_window(
            window_req("2024-01-01", "2024-01-02T00:00:00Z"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(window.commits.len(), 1);
    assert_eq!(window.commits[0].sha, "A");
    assert_eq!(window.branch.tip_sha, "B");
}

#[tokio::test]
async fn test_commits_in_window_inverted_range_makes_no_calls() {
    let (client, graph) = create_test_client();
    let err = client
        .commits_in_window(
            window_req("2024-02-01", "2024-01-01"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ChronoError::Validation(ValidationError::InvalidTimeRange { .. })
    ));
    assert_eq!(graph.total_calls(), 0);
}
