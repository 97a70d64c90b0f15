use super::CommitGraphProvider;
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::timestamp::{format_timestamp, parse_timestamp};
use crate::types::{
    CommitNode, CommitQuery, CompareResult, CompareStatus, FileChange, FileStatus,
    PullRequestQuery, PullRequestRecord, RepoCoordinates, SortDirection,
};
use anyhow::{Context, Result};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, LINK};
use reqwest::{Client as HttpClient, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Commit-graph provider backed by the GitHub REST API
pub struct GitHubProvider {
    http: HttpClient,
    base_url: Url,
}

/// One decoded response page plus the `rel="last"` page number, if any
struct Page<T> {
    body: T,
    last_page: Option<usize>,
}

impl GitHubProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static(GITHUB_API_VERSION),
        );
        if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .context("GitHub token contains invalid header characters")?;
            value.set_sensitive(true);
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }

        let base_url = Url::parse(&config.api_base_url)
            .with_context(|| format!("Invalid API base URL '{}'", config.api_base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("API base URL '{}' cannot carry a path", base_url);
        }

        let http = HttpClient::builder()
            .default_headers(headers)
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        tracing::info!(
            "GitHub provider using {} ({})",
            config.api_base_url,
            if config.token.is_some() {
                "authenticated"
            } else {
                "anonymous"
            }
        );

        Ok(Self { http, base_url })
    }

    /// `{base}/repos/{owner}/{name}/{segments..}`, each segment percent-encoded
    fn endpoint<'a>(
        &self,
        repo: &RepoCoordinates,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> Url {
        let mut url = self.base_url.clone();
        // Base URLs are checked in `new`, so the path is always mutable
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend(["repos", repo.owner.as_str(), repo.name.as_str()])
                .extend(segments);
        }
        url
    }

    /// GET a JSON resource. `Ok(None)` means 404.
    async fn fetch<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<Option<Page<T>>, ProviderError> {
        tracing::debug!("GET {} {:?}", url, query);
        let path = url.path().to_string();

        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &message));
        }

        let last_page = response
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_last_page);

        let bytes = response.bytes().await.map_err(map_transport_error)?;
        let body = serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::Malformed(format!("{}: {}", path, e)))?;

        Ok(Some(Page { body, last_page }))
    }

    /// Turn a 404 into the most specific NotFound the repo endpoint allows
    async fn not_found(&self, repo: &RepoCoordinates, otherwise: ProviderError) -> ProviderError {
        match self
            .fetch::<serde_json::Value>(self.endpoint(repo, []), &[])
            .await
        {
            Ok(None) => ProviderError::RepoNotFound(repo.full_name()),
            Ok(Some(_)) => otherwise,
            Err(e) => e,
        }
    }

    async fn fetch_commit_page(
        &self,
        repo: &RepoCoordinates,
        query: &CommitQuery,
        page: usize,
    ) -> Result<Page<Vec<CommitNode>>, ProviderError> {
        let mut params = vec![
            ("sha", query.sha.clone()),
            ("per_page", query.per_page.max(1).to_string()),
            ("page", page.to_string()),
        ];
        if let Some(since) = query.since {
            params.push(("since", format_timestamp(since)));
        }
        if let Some(until) = query.until {
            params.push(("until", format_timestamp(until)));
        }

        let url = self.endpoint(repo, ["commits"]);
        match self.fetch::<Vec<CommitJson>>(url, &params).await? {
            Some(page) => Ok(Page {
                body: page
                    .body
                    .into_iter()
                    .map(CommitJson::into_node)
                    .collect::<Result<_, _>>()?,
                last_page: page.last_page,
            }),
            None => Err(self
                .not_found(repo, ProviderError::CommitNotFound(query.sha.clone()))
                .await),
        }
    }

    /// GitHub only lists newest first; ascending pages are cut from the end
    async fn list_ascending(
        &self,
        repo: &RepoCoordinates,
        query: &CommitQuery,
    ) -> Result<Vec<CommitNode>, ProviderError> {
        let per_page = query.per_page.max(1);
        let first = self.fetch_commit_page(repo, query, 1).await?;
        let last_page = first.last_page.unwrap_or(1).max(1);
        let last_items = if last_page == 1 {
            first.body.clone()
        } else {
            self.fetch_commit_page(repo, query, last_page).await?.body
        };

        let total = (last_page - 1) * per_page + last_items.len();
        // Descending index window [start, end) holding the requested ascending page
        let end = total.saturating_sub(query.page.saturating_sub(1) * per_page);
        let start = end.saturating_sub(per_page);
        if start >= end {
            return Ok(Vec::new());
        }

        let mut collected = Vec::with_capacity(end - start);
        for desc_page in (start / per_page + 1)..=((end - 1) / per_page + 1) {
            let items = if desc_page == 1 {
                first.body.clone()
            } else if desc_page == last_page {
                last_items.clone()
            } else {
                self.fetch_commit_page(repo, query, desc_page).await?.body
            };
            let offset = (desc_page - 1) * per_page;
            collected.extend(
                items
                    .into_iter()
                    .enumerate()
                    .filter(|(i, _)| (start..end).contains(&(offset + i)))
                    .map(|(_, c)| c),
            );
        }
        collected.reverse();
        Ok(collected)
    }
}

#[async_trait::async_trait]
impl CommitGraphProvider for GitHubProvider {
    async fn get_branch_tip(
        &self,
        repo: &RepoCoordinates,
        branch: &str,
    ) -> Result<String, ProviderError> {
        // Slashes in branch names stay path separators; everything else is encoded
        let url = self.endpoint(repo, ["branches"].into_iter().chain(branch.split('/')));
        match self.fetch::<BranchJson>(url, &[]).await? {
            Some(page) => Ok(page.body.commit.sha),
            None => Err(self
                .not_found(
                    repo,
                    ProviderError::BranchNotFound {
                        repo: repo.full_name(),
                        branch: branch.to_string(),
                    },
                )
                .await),
        }
    }

    async fn get_commit(
        &self,
        repo: &RepoCoordinates,
        sha: &str,
    ) -> Result<CommitNode, ProviderError> {
        let url = self.endpoint(repo, ["commits", sha]);
        match self.fetch::<CommitJson>(url, &[]).await {
            Ok(Some(page)) => page.body.into_node(),
            Ok(None) => Err(self
                .not_found(repo, ProviderError::CommitNotFound(sha.to_string()))
                .await),
            // Unknown SHAs come back as 422 "No commit found for SHA"
            Err(ProviderError::Rejected { status: 422, .. }) => {
                Err(ProviderError::CommitNotFound(sha.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn list_commits(
        &self,
        repo: &RepoCoordinates,
        query: &CommitQuery,
    ) -> Result<Vec<CommitNode>, ProviderError> {
        match query.direction {
            SortDirection::Descending => Ok(self
                .fetch_commit_page(repo, query, query.page.max(1))
                .await?
                .body),
            SortDirection::Ascending => self.list_ascending(repo, query).await,
        }
    }

    async fn list_closed_pull_requests(
        &self,
        repo: &RepoCoordinates,
        query: &PullRequestQuery,
    ) -> Result<Vec<PullRequestRecord>, ProviderError> {
        let params = [
            ("state", "closed".to_string()),
            ("base", query.base.clone()),
            ("sort", query.sort.as_str().to_string()),
            ("direction", query.direction.as_str().to_string()),
            ("per_page", query.per_page.max(1).to_string()),
            ("page", query.page.max(1).to_string()),
        ];
        let url = self.endpoint(repo, ["pulls"]);
        match self.fetch::<Vec<PullJson>>(url, &params).await? {
            Some(page) => page.body.into_iter().map(PullJson::into_record).collect(),
            None => Err(ProviderError::RepoNotFound(repo.full_name())),
        }
    }

    async fn compare_commits(
        &self,
        repo: &RepoCoordinates,
        base: &str,
        head: &str,
    ) -> Result<CompareResult, ProviderError> {
        let range = format!("{}...{}", base, head);
        let url = self.endpoint(repo, ["compare", range.as_str()]);
        match self.fetch::<CompareJson>(url, &[]).await? {
            Some(page) => page.body.into_result(),
            None => Err(self
                .not_found(
                    repo,
                    ProviderError::CommitNotFound(format!("{}...{}", base, head)),
                )
                .await),
        }
    }
}

/// Map a non-success, non-404 status
fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let message = serde_json::from_str::<ErrorJson>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.trim().to_string());
    if status.is_server_error() {
        ProviderError::Transient(format!("{}: {}", status, message))
    } else {
        ProviderError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

fn map_transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_decode() {
        ProviderError::Malformed(err.to_string())
    } else {
        // Timeouts, refused or reset connections, truncated bodies
        ProviderError::Transient(err.to_string())
    }
}

/// Extract the page number of the `rel="last"` entry of a Link header
fn parse_last_page(link: &str) -> Option<usize> {
    link.split(',')
        .find(|part| part.contains("rel=\"last\""))
        .and_then(|part| {
            let url = part.split(';').next()?.trim();
            let url = url.strip_prefix('<')?.strip_suffix('>')?;
            let (_, query) = url.split_once('?')?;
            query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(key, _)| *key == "page")
                .and_then(|(_, value)| value.parse().ok())
        })
}

fn parse_provider_time(raw: &str) -> Result<chrono::DateTime<chrono::Utc>, ProviderError> {
    parse_timestamp(raw).map_err(|_| ProviderError::Malformed(format!("bad timestamp '{}'", raw)))
}

#[derive(Debug, Deserialize)]
struct ErrorJson {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ShaJson {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct BranchJson {
    commit: ShaJson,
}

#[derive(Debug, Clone, Deserialize)]
struct SignatureJson {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommitDetailJson {
    #[serde(default)]
    message: String,
    #[serde(default)]
    author: Option<SignatureJson>,
    #[serde(default)]
    committer: Option<SignatureJson>,
}

#[derive(Debug, Deserialize)]
struct CommitJson {
    sha: String,
    commit: CommitDetailJson,
    #[serde(default)]
    parents: Vec<ShaJson>,
}

impl CommitJson {
    fn into_node(self) -> Result<CommitNode, ProviderError> {
        let detail = self.commit;
        let date = detail
            .committer
            .as_ref()
            .and_then(|c| c.date.as_deref())
            .or_else(|| detail.author.as_ref().and_then(|a| a.date.as_deref()))
            .ok_or_else(|| ProviderError::Malformed(format!("commit {} has no date", self.sha)))?;
        let committed_at = parse_provider_time(date)?;
        let (author_name, author_email) = detail
            .author
            .map(|a| (a.name, a.email))
            .unwrap_or_default();

        Ok(CommitNode {
            sha: self.sha,
            parent_shas: self.parents.into_iter().map(|p| p.sha).collect(),
            committed_at,
            author_name,
            author_email,
            message: detail.message,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RefJson {
    #[serde(rename = "ref")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct PullJson {
    number: u64,
    #[serde(default)]
    title: String,
    head: RefJson,
    base: RefJson,
    #[serde(default)]
    merged_at: Option<String>,
    #[serde(default)]
    merge_commit_sha: Option<String>,
}

impl PullJson {
    fn into_record(self) -> Result<PullRequestRecord, ProviderError> {
        let merged_at = self
            .merged_at
            .as_deref()
            .map(parse_provider_time)
            .transpose()?;
        Ok(PullRequestRecord {
            number: self.number,
            title: self.title,
            head_ref: self.head.name,
            base_ref: self.base.name,
            merged_at,
            merge_commit_sha: self.merge_commit_sha,
        })
    }
}

#[derive(Debug, Deserialize)]
struct FileJson {
    filename: String,
    #[serde(default)]
    previous_filename: Option<String>,
    status: String,
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
    #[serde(default)]
    changes: u64,
    #[serde(default)]
    patch: Option<String>,
}

impl FileJson {
    fn into_change(self) -> FileChange {
        let status = FileStatus::from_provider(&self.status).unwrap_or_else(|| {
            tracing::warn!(
                "Unknown file status '{}' for {}, treating as changed",
                self.status,
                self.filename
            );
            FileStatus::Changed
        });
        FileChange {
            path: self.filename,
            previous_path: self.previous_filename,
            status,
            additions: self.additions,
            deletions: self.deletions,
            changes: self.changes,
            patch: self.patch.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompareJson {
    status: String,
    #[serde(default)]
    merge_base_commit: Option<ShaJson>,
    #[serde(default)]
    ahead_by: u64,
    #[serde(default)]
    behind_by: u64,
    #[serde(default)]
    files: Vec<FileJson>,
}

impl CompareJson {
    fn into_result(self) -> Result<CompareResult, ProviderError> {
        let status = CompareStatus::from_provider(&self.status).ok_or_else(|| {
            ProviderError::Malformed(format!("unknown compare status '{}'", self.status))
        })?;
        Ok(CompareResult {
            status,
            merge_base_sha: self.merge_base_commit.map(|c| c.sha),
            ahead_by: self.ahead_by,
            behind_by: self.behind_by,
            files: self.files.into_iter().map(FileJson::into_change).collect(),
        })
    }
}
