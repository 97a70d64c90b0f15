use anyhow::{Context, Result};
use branch_chrono::config::Config;
use branch_chrono::mcp_server::ChronoMcpServer;
use branch_chrono::paths::PlatformPaths;
use branch_chrono::{
    ChronoClient, CommitsInWindowRequest, DiffCommitsRequest, RepoCoordinates,
    ResolvePointRequest, TemporalDiffRequest,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT_HASH"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser)]
#[command(name = "branch-chrono")]
#[command(about = "Point-in-time branch resolution and temporal diffs", long_about = None)]
#[command(version, long_version = LONG_VERSION)]
struct Cli {
    /// Config file (default: platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// API token for the commit-graph provider
    #[arg(long, env = "GITHUB_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// Provider API base URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server over stdio (default)
    Serve,

    /// Resolve the commit a branch pointed at, at or before a time
    Resolve {
        /// Repository as owner/name
        repo: String,

        /// Branch to resolve
        branch: String,

        /// ISO-8601 timestamp
        #[arg(long)]
        at: String,

        /// Root branch for the fork-point fallback
        #[arg(long)]
        root: Option<String>,
    },

    /// Diff a branch at one time against a branch at another
    Diff {
        /// Repository as owner/name
        repo: String,

        /// Branch for the earlier endpoint
        #[arg(long)]
        from_branch: String,

        /// Branch for the later endpoint (default: same as --from-branch)
        #[arg(long)]
        to_branch: Option<String>,

        /// ISO-8601 timestamp of the earlier endpoint
        #[arg(long)]
        from: String,

        /// ISO-8601 timestamp of the later endpoint
        #[arg(long)]
        to: String,

        /// Branch that absorbs merged work
        #[arg(long)]
        receiver: Option<String>,
    },

    /// List a branch's commits between two times, newest first
    Commits {
        /// Repository as owner/name
        repo: String,

        /// Branch to list
        branch: String,

        /// ISO-8601 start of the window (inclusive)
        #[arg(long)]
        since: String,

        /// ISO-8601 end of the window (inclusive)
        #[arg(long)]
        until: String,

        /// Maximum number of commits (default: resolver.window_limit)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Write a default config file
    InitConfig {
        /// Destination (default: platform config directory)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Diff two explicit commits
    Compare {
        /// Repository as owner/name
        repo: String,

        /// Base commit SHA
        base: String,

        /// Head commit SHA
        head: String,
    },
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load_or_default().context("Failed to load configuration")?,
    };
    config.apply_env_overrides();

    if let Some(token) = &cli.token {
        config.provider.token = Some(token.clone());
    }
    if let Some(url) = &cli.api_url {
        config.provider.api_base_url = url.clone();
    }

    config.validate()?;
    Ok(config)
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = path.unwrap_or_else(PlatformPaths::default_config_path);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    Config::default().save(&path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Cancel in-flight provider calls on Ctrl-C
fn ctrl_c_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            trigger.cancel();
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries MCP traffic or JSON output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Runs before loading so a broken config file can be replaced
    if let Some(Commands::InitConfig { path, force }) = cli.command {
        return init_config(path, force);
    }

    let config = load_config(&cli)?;

    let Some(command) = cli.command else {
        return ChronoMcpServer::serve_stdio_with_config(config).await;
    };

    match command {
        Commands::Serve => ChronoMcpServer::serve_stdio_with_config(config).await?,
        Commands::Resolve {
            repo,
            branch,
            at,
            root,
        } => {
            let coordinates = RepoCoordinates::parse(&repo)?;
            let client = ChronoClient::with_config(config)?;
            let point = client
                .resolve_point(
                    ResolvePointRequest {
                        owner: coordinates.owner,
                        repo: coordinates.name,
                        branch,
                        at,
                        root_branch: root,
                    },
                    &ctrl_c_token(),
                )
                .await?;
            client.save_cache().await?;
            print_json(&point)?;
        }
        Commands::Diff {
            repo,
            from_branch,
            to_branch,
            from,
            to,
            receiver,
        } => {
            let coordinates = RepoCoordinates::parse(&repo)?;
            let client = ChronoClient::with_config(config)?;
            let branch_to = to_branch.unwrap_or_else(|| from_branch.clone());
            let outcome = client
                .temporal_diff(
                    TemporalDiffRequest {
                        owner: coordinates.owner,
                        repo: coordinates.name,
                        branch_from: from_branch,
                        branch_to,
                        time_from: from,
                        time_to: to,
                        receiver_branch: receiver,
                    },
                    &ctrl_c_token(),
                )
                .await?;
            client.save_cache().await?;
            print_json(&outcome)?;
        }
        Commands::Commits {
            repo,
            branch,
            since,
            until,
            limit,
        } => {
            let coordinates = RepoCoordinates::parse(&repo)?;
            let client = ChronoClient::with_config(config)?;
            let window = client
                .commits_in_window(
                    CommitsInWindowRequest {
                        owner: coordinates.owner,
                        repo: coordinates.name,
                        branch,
                        since,
                        until,
                        limit,
                    },
                    &ctrl_c_token(),
                )
                .await?;
            client.save_cache().await?;
            print_json(&window)?;
        }
        Commands::InitConfig { path, force } => init_config(path, force)?,
        Commands::Compare { repo, base, head } => {
            let coordinates = RepoCoordinates::parse(&repo)?;
            let client = ChronoClient::with_config(config)?;
            let diff = client
                .diff_commits(
                    DiffCommitsRequest {
                        owner: coordinates.owner,
                        repo: coordinates.name,
                        base_sha: base,
                        head_sha: head,
                    },
                    &ctrl_c_token(),
                )
                .await?;
            client.save_cache().await?;
            print_json(&diff)?;
        }
    }

    Ok(())
}
