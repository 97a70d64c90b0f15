use super::*;
use chrono::TimeZone;

fn commit(sha: &str, parents: &[&str], message: &str) -> CommitNode {
    CommitNode {
        sha: sha.to_string(),
        parent_shas: parents.iter().map(|p| p.to_string()).collect(),
        committed_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        author_name: Some("Ada".to_string()),
        author_email: Some("ada@example.com".to_string()),
        message: message.to_string(),
    }
}

#[test]
fn test_repo_coordinates_parse() {
    let repo = RepoCoordinates::parse("octo/widgets").unwrap();
    assert_eq!(repo.owner, "octo");
    assert_eq!(repo.name, "widgets");
    assert_eq!(repo.full_name(), "octo/widgets");
    assert_eq!(repo.to_string(), "octo/widgets");
}

#[test]
fn test_repo_coordinates_parse_rejects_malformed() {
    for bad in ["widgets", "/widgets", "octo/", "octo/widgets/extra", ""] {
        assert!(
            matches!(
                RepoCoordinates::parse(bad),
                Err(ValidationError::InvalidRepo(_))
            ),
            "{:?} should be rejected",
            bad
        );
    }
}

#[test]
fn test_commit_node_parents() {
    let root = commit("a", &[], "init");
    assert!(root.is_root());
    assert!(!root.is_merge());
    assert_eq!(root.first_parent(), None);

    let merge = commit("m", &["a", "f"], "Merge branch 'feature'\n\nbody");
    assert!(merge.is_merge());
    assert_eq!(merge.first_parent(), Some("a"));
    assert_eq!(merge.merged_parent(), Some("f"));
    assert_eq!(merge.summary(), "Merge branch 'feature'");
}

#[test]
fn test_resolution_method_exactness() {
    assert!(ResolutionMethod::DirectWalk.is_exact());
    assert!(ResolutionMethod::PrMerge.is_exact());
    assert!(ResolutionMethod::Pinned.is_exact());
    assert!(!ResolutionMethod::ForkPoint.is_exact());
    assert!(!ResolutionMethod::MessageHeuristic.is_exact());
    assert!(!ResolutionMethod::FirstCommit.is_exact());
}

#[test]
fn test_resolution_method_serializes_snake_case() {
    let json = serde_json::to_string(&ResolutionMethod::MessageHeuristic).unwrap();
    assert_eq!(json, "\"message_heuristic\"");
    assert_eq!(ResolutionMethod::PrMerge.to_string(), "pr_merge");
}

#[test]
fn test_resolved_point_with_commit() {
    let c = commit("abc", &[], "init");
    let point = ResolvedPoint::new("main", "abc", ResolutionMethod::DirectWalk).with_commit(&c);
    assert_eq!(point.committed_at, Some(c.committed_at));

    let pinned = ResolvedPoint::pinned("def");
    assert_eq!(pinned.sha, "def");
    assert_eq!(pinned.method, ResolutionMethod::Pinned);
    assert!(pinned.committed_at.is_none());
}

#[test]
fn test_file_status_from_provider() {
    assert_eq!(FileStatus::from_provider("added"), Some(FileStatus::Added));
    assert_eq!(FileStatus::from_provider("removed"), Some(FileStatus::Removed));
    assert_eq!(FileStatus::from_provider("renamed"), Some(FileStatus::Renamed));
    assert_eq!(FileStatus::from_provider("exploded"), None);
}

#[test]
fn test_compare_status_from_provider() {
    assert_eq!(
        CompareStatus::from_provider("diverged"),
        Some(CompareStatus::Diverged)
    );
    assert_eq!(CompareStatus::from_provider("sideways"), None);
}

#[test]
fn test_identical_diff_is_empty() {
    let from = ResolvedPoint::new("main", "abc", ResolutionMethod::DirectWalk);
    let to = ResolvedPoint::new("main", "abc", ResolutionMethod::DirectWalk);
    let diff = DiffResult::identical(from, to);

    assert!(diff.is_empty());
    assert!(diff.is_exact());
    assert_eq!(diff.compare_status, Some(CompareStatus::Identical));
    assert_eq!(diff.total_additions(), 0);
}

#[test]
fn test_diff_totals_and_exactness() {
    let files = vec![
        FileChange {
            path: "src/lib.rs".to_string(),
            previous_path: None,
            status: FileStatus::Modified,
            additions: 10,
            deletions: 2,
            changes: 12,
            patch: "@@ -1 +1 @@".to_string(),
        },
        FileChange {
            path: "logo.png".to_string(),
            previous_path: None,
            status: FileStatus::Added,
            additions: 0,
            deletions: 0,
            changes: 0,
            patch: String::new(),
        },
    ];
    let diff = DiffResult {
        from: ResolvedPoint::new("main", "a", ResolutionMethod::DirectWalk),
        to: ResolvedPoint::new("feature", "b", ResolutionMethod::MessageHeuristic),
        compare_status: Some(CompareStatus::Ahead),
        merge_base_sha: Some("a".to_string()),
        files,
    };

    assert_eq!(diff.total_additions(), 10);
    assert_eq!(diff.total_deletions(), 2);
    assert!(!diff.is_exact());
}

#[test]
fn test_commit_query_builder() {
    let until = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    let query = CommitQuery::new("main")
        .until(until)
        .per_page(1)
        .page(3)
        .ascending();

    assert_eq!(query.sha, "main");
    assert_eq!(query.until, Some(until));
    assert_eq!(query.since, None);
    assert_eq!(query.per_page, 1);
    assert_eq!(query.page, 3);
    assert_eq!(query.direction, SortDirection::Ascending);
}

#[test]
fn test_pull_request_query_defaults() {
    let query = PullRequestQuery::new("main");
    assert_eq!(query.sort, PullRequestSort::Updated);
    assert_eq!(query.direction, SortDirection::Descending);
    assert_eq!(query.page, 1);
}

#[test]
fn test_outcome_serialization_is_tagged() {
    let outcome = TemporalDiffOutcome::NotFound {
        unresolved: vec![UnresolvedEndpoint {
            endpoint: Endpoint::To,
            branch: "gone".to_string(),
            at: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            reasons: vec!["Branch 'gone' not found in octo/widgets".to_string()],
        }],
    };

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["outcome"], "not_found");
    assert_eq!(json["unresolved"][0]["endpoint"], "to");
    assert!(outcome.is_not_found());
    assert!(outcome.diff().is_none());
}

#[test]
fn test_resolved_outcome_exposes_diff() {
    let point = ResolvedPoint::new("main", "abc", ResolutionMethod::DirectWalk);
    let outcome = TemporalDiffOutcome::Resolved(DiffResult::identical(point.clone(), point));

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["outcome"], "resolved");
    assert_eq!(json["from"]["method"], "direct_walk");
    assert!(outcome.into_diff().unwrap().is_empty());
}

#[test]
fn test_temporal_diff_request_validation() {
    let mut req = TemporalDiffRequest {
        owner: "octo".to_string(),
        repo: "widgets".to_string(),
        branch_from: "main".to_string(),
        branch_to: "feature".to_string(),
        time_from: "2024-01-01T00:00:00Z".to_string(),
        time_to: "2024-01-02T00:00:00Z".to_string(),
        receiver_branch: None,
    };
    assert!(req.validate().is_ok());
    assert_eq!(req.coordinates().full_name(), "octo/widgets");

    req.branch_to = " ".to_string();
    assert_eq!(
        req.validate(),
        Err(ValidationError::Empty("branch_to".to_string()))
    );

    req.branch_to = "feature".to_string();
    req.receiver_branch = Some(String::new());
    assert!(req.validate().is_err());
}

#[test]
fn test_resolve_point_request_deserializes_without_root() {
    let json = r#"{"owner":"octo","repo":"widgets","branch":"main","at":"2024-01-02T00:00:00Z"}"#;
    let req: ResolvePointRequest = serde_json::from_str(json).unwrap();
    assert!(req.root_branch.is_none());
    assert!(req.validate().is_ok());
}

#[test]
fn test_diff_commits_request_validation() {
    let req = DiffCommitsRequest {
        owner: "octo".to_string(),
        repo: "widgets".to_string(),
        base_sha: String::new(),
        head_sha: "abc".to_string(),
    };
    assert_eq!(
        req.validate(),
        Err(ValidationError::Empty("base_sha".to_string()))
    );
}

#[test]
fn test_commits_in_window_request_validation() {
    let json = r#"{"owner":"octo","repo":"widgets","branch":"main","since":"2024-01-01","until":"2024-02-01"}"#;
    let mut req: CommitsInWindowRequest = serde_json::from_str(json).unwrap();
    assert!(req.limit.is_none());
    assert!(req.validate().is_ok());

    req.limit = Some(0);
    assert_eq!(
        req.validate(),
        Err(ValidationError::NotPositive("limit".to_string()))
    );

    req.limit = Some(10);
    req.until = String::new();
    assert_eq!(
        req.validate(),
        Err(ValidationError::Empty("until".to_string()))
    );
}

#[test]
fn test_commit_window_serializes_branch_tip() {
    let window = CommitWindow {
        branch: BranchRef {
            name: "main".to_string(),
            tip_sha: "abc".to_string(),
        },
        since: "2024-01-01T00:00:00Z".parse().unwrap(),
        until: "2024-01-02T00:00:00Z".parse().unwrap(),
        commits: vec![],
        truncated: false,
    };
    let json = serde_json::to_value(&window).unwrap();
    assert_eq!(json["branch"]["tip_sha"], "abc");
    assert_eq!(json["truncated"], false);
}
