use crate::client::ChronoClient;
use crate::config::Config;
use crate::types::*;

use anyhow::{Context, Result};
use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler, ServiceExt,
    handler::server::{router::prompt::PromptRouter, tool::ToolRouter, wrapper::Parameters},
    model::*,
    prompt, prompt_handler, prompt_router,
    service::RequestContext,
    tool, tool_handler, tool_router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct ChronoMcpServer {
    client: Arc<ChronoClient>,
    tool_router: ToolRouter<Self>,
    prompt_router: PromptRouter<Self>,
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("Serialization failed: {}", e))
}

impl ChronoMcpServer {
    /// Create a new server with the default configuration
    pub fn new() -> Result<Self> {
        let client = ChronoClient::new()?;
        Self::with_client(Arc::new(client))
    }

    /// Create a new server with an existing client
    pub fn with_client(client: Arc<ChronoClient>) -> Result<Self> {
        Ok(Self {
            client,
            tool_router: Self::tool_router(),
            prompt_router: Self::prompt_router(),
        })
    }

    /// Get the underlying client
    pub fn client(&self) -> &ChronoClient {
        &self.client
    }

    pub(crate) async fn run_resolve_branch_point(
        &self,
        req: ResolvePointRequest,
        cancel: &CancellationToken,
    ) -> Result<String, String> {
        req.validate().map_err(|e| e.to_string())?;

        let point = self
            .client
            .resolve_point(req, cancel)
            .await
            .map_err(|e| e.to_user_string())?;

        to_json(&point)
    }

    pub(crate) async fn run_temporal_diff(
        &self,
        req: TemporalDiffRequest,
        cancel: &CancellationToken,
    ) -> Result<String, String> {
        req.validate().map_err(|e| e.to_string())?;

        let outcome = self
            .client
            .temporal_diff(req, cancel)
            .await
            .map_err(|e| e.to_user_string())?;

        to_json(&outcome)
    }

    pub(crate) async fn run_diff_commits(
        &self,
        req: DiffCommitsRequest,
        cancel: &CancellationToken,
    ) -> Result<String, String> {
        req.validate().map_err(|e| e.to_string())?;

        let diff = self
            .client
            .diff_commits(req, cancel)
            .await
            .map_err(|e| e.to_user_string())?;

        to_json(&diff)
    }

    pub(crate) async fn run_commits_in_window(
        &self,
        req: CommitsInWindowRequest,
        cancel: &CancellationToken,
    ) -> Result<String, String> {
        req.validate().map_err(|e| e.to_string())?;

        let window = self
            .client
            .commits_in_window(req, cancel)
            .await
            .map_err(|e| e.to_user_string())?;

        to_json(&window)
    }
}

#[tool_router(router = tool_router)]
impl ChronoMcpServer {
    #[tool(
        description = "Resolve the commit a branch pointed at, at or before a given time. Walks the branch's first-parent history; falls back to the fork point with the root branch, then to the branch's first commit."
    )]
    async fn resolve_branch_point(
        &self,
        ctx: RequestContext<RoleServer>,
        Parameters(req): Parameters<ResolvePointRequest>,
    ) -> Result<String, String> {
        self.run_resolve_branch_point(req, &ctx.ct).await
    }

    #[tool(
        description = "Diff branch_from at time_from against branch_to at time_to. Branches that were merged and deleted are located through their merge into the receiver branch. Returns outcome 'resolved' with the file-level diff, or 'not_found' with the reasons per endpoint."
    )]
    async fn temporal_diff(
        &self,
        ctx: RequestContext<RoleServer>,
        Parameters(req): Parameters<TemporalDiffRequest>,
    ) -> Result<String, String> {
        self.run_temporal_diff(req, &ctx.ct).await
    }

    #[tool(description = "File-level diff between two explicit commits")]
    async fn diff_commits(
        &self,
        ctx: RequestContext<RoleServer>,
        Parameters(req): Parameters<DiffCommitsRequest>,
    ) -> Result<String, String> {
        self.run_diff_commits(req, &ctx.ct).await
    }

    #[tool(
        description = "List the commits on a branch between two times (inclusive), newest first. Returns the branch tip the listing was taken from and whether the result was truncated by the limit."
    )]
    async fn commits_in_window(
        &self,
        ctx: RequestContext<RoleServer>,
        Parameters(req): Parameters<CommitsInWindowRequest>,
    ) -> Result<String, String> {
        self.run_commits_in_window(req, &ctx.ct).await
    }
}

// Prompts for slash commands
#[prompt_router]
impl ChronoMcpServer {
    #[prompt(
        name = "diff-window",
        description = "Show what changed on a branch between two points in time"
    )]
    async fn diff_window_prompt(
        &self,
        Parameters(args): Parameters<serde_json::Value>,
    ) -> Result<GetPromptResult, McpError> {
        let repo = args.get("repo").and_then(|v| v.as_str()).unwrap_or("owner/repo");
        let branch = args
            .get("branch")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.client.config().resolver.default_receiver_branch);
        let from = args.get("from").and_then(|v| v.as_str()).unwrap_or("");
        let to = args.get("to").and_then(|v| v.as_str()).unwrap_or("now");

        let messages = vec![PromptMessage::new_text(
            PromptMessageRole::User,
            format!(
                "Please use temporal_diff to show what changed on branch '{}' of {} between {} and {}. Summarise the changed files and note any endpoint that was resolved approximately.",
                branch, repo, from, to
            ),
        )];

        Ok(GetPromptResult {
            description: Some(format!("Changes on {}@{} from {} to {}", repo, branch, from, to)),
            messages,
        })
    }

    #[prompt(
        name = "branch-at",
        description = "Find the commit a branch pointed at on a given date"
    )]
    async fn branch_at_prompt(
        &self,
        Parameters(args): Parameters<serde_json::Value>,
    ) -> Result<Vec<PromptMessage>, McpError> {
        let repo = args.get("repo").and_then(|v| v.as_str()).unwrap_or("owner/repo");
        let branch = args.get("branch").and_then(|v| v.as_str()).unwrap_or("main");
        let at = args.get("at").and_then(|v| v.as_str()).unwrap_or("");

        Ok(vec![PromptMessage::new_text(
            PromptMessageRole::User,
            format!(
                "Please use resolve_branch_point to find the commit branch '{}' of {} pointed at as of {}.",
                branch, repo, at
            ),
        )])
    }
}

#[tool_handler(router = self.tool_router)]
#[prompt_handler]
impl ServerHandler for ChronoMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_prompts()
                .build(),
            server_info: Implementation {
                name: "branch-chrono".into(),
                title: Some("Branch Chrono - Point-in-time Branch Resolution".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Point-in-time branch resolution over a remote commit graph. \
                Use resolve_branch_point to find where a branch was at a given time, \
                temporal_diff to compare a branch across a time window (including merged \
                and deleted branches), commits_in_window to list a branch's commits \
                between two times, and diff_commits for two explicit SHAs."
                    .into(),
            ),
        }
    }
}

impl ChronoMcpServer {
    pub async fn serve_stdio() -> Result<()> {
        let config = Config::new().context("Failed to load configuration")?;
        Self::serve_stdio_with_config(config).await
    }

    pub async fn serve_stdio_with_config(config: Config) -> Result<()> {
        tracing::info!("Starting branch-chrono MCP server");

        let flush_period = Duration::from_secs(config.cache.flush_interval_secs);
        let client =
            Arc::new(ChronoClient::with_config(config).context("Failed to create client")?);
        let server = Self::with_client(Arc::clone(&client)).context("Failed to create MCP server")?;

        // Cache writes happen in the background and once more at shutdown
        let stop = CancellationToken::new();
        let flusher = {
            let client = Arc::clone(&client);
            let stop = stop.clone();
            tokio::spawn(async move { client.flush_cache_every(flush_period, stop).await })
        };

        let transport = rmcp::transport::io::stdio();
        let served = async { Ok::<_, anyhow::Error>(server.serve(transport).await?.waiting().await?) }.await;

        stop.cancel();
        if let Err(e) = flusher.await {
            tracing::warn!("Commit cache flusher failed: {}", e);
        }

        served?;
        Ok(())
    }
}
