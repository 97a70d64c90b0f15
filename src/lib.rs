//! # Branch Chrono - Point-in-time Branch Resolution
//!
//! A Rust library and Model Context Protocol (MCP) server that answers "what did
//! branch B look like at time T?" against a remote commit-graph API, and builds
//! file-level diffs between two such points.
//!
//! ## Overview
//!
//! Branch Chrono resolves a (branch, time) pair to one commit by walking the
//! branch's first-parent history back from its current tip. Branches that were
//! merged and deleted are located through their merge into a receiver branch,
//! first by pull request records and then by merge-commit messages. Two
//! resolved points are diffed with the provider's compare primitive.
//!
//! ## Key Features
//!
//! - **First-Parent Resolution**: Merged-in side histories never leak into a branch's timeline
//! - **Fallbacks**: Fork point with the root branch, then the branch's first commit
//! - **Merge Correlation**: Pull request records first, merge-message heuristic second
//! - **Provenance**: Every endpoint is tagged with the method that produced it
//! - **Bounded Work**: Walk cap, page limits, retries with backoff, cancellation
//! - **Commit Cache**: Immutable commit facts cached in memory and optionally on disk
//! - **Window Listings**: Commits on a branch between two times
//! - **MCP Protocol**: 4 tools and 2 slash commands for AI assistant integration
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   MCP Client    │  (Claude, VS Code, etc.)
//! └────────┬────────┘
//!          │ stdio
//! ┌────────▼────────┐
//! │ ChronoMcpServer │  (4 tools, 2 prompts)
//! └────────┬────────┘
//!          │
//! ┌────────▼─────────────────┐
//! │ TemporalDiffOrchestrator │
//! └──┬─────────────┬──────┬──┘
//!    │             │      │
//! ┌──▼───────┐ ┌───▼────┐ ┌▼─────────┐
//! │ Resolver │ │Correla-│ │DiffEngine│
//! │          │ │tor     │ │          │
//! └──┬───────┘ └───┬────┘ └┬─────────┘
//!    └─────────────┼───────┘
//!          ┌───────▼────────┐
//!          │ CachingProvider│ → RetryingProvider → GitHubProvider
//!          └────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`mcp_server`]: MCP protocol server implementation with tools and prompts
//! - [`client`]: Library client wiring configuration to the provider stack
//! - [`orchestrator`]: Temporal diff across two (branch, time) endpoints
//! - [`resolver`]: First-parent branch-at-time resolution
//! - [`correlator`]: Merge correlation for merged and deleted branches
//! - [`diff`]: File-level diff between two resolved points
//! - [`history`]: Commits on a branch inside a time window
//! - [`provider`]: Commit-graph provider trait, GitHub client, retries, in-memory graph
//! - [`cache`]: Commit cache and caching provider decorator
//! - [`config`]: Configuration management with environment variable support
//! - [`types`]: Domain and MCP request types with JSON schema
//! - [`timestamp`]: Timestamp parsing at the API boundary
//! - [`error`]: Error types
//! - [`paths`]: Platform-specific default paths
//!
//! ## Usage Example
//!
//! ```no_run
//! use branch_chrono::mcp_server::ChronoMcpServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Serve over stdio (MCP protocol) with default configuration
//!     ChronoMcpServer::serve_stdio().await?;
//!
//!     Ok(())
//! }
//! ```

/// Commit cache and caching provider decorator
pub mod cache;

/// Library client for temporal branch resolution
pub mod client;

/// Configuration management with environment variable overrides
pub mod config;

/// Merge correlation for branches that no longer resolve directly
pub mod correlator;

/// File-level diff between resolved points
pub mod diff;

/// Error types and utilities
pub mod error;

/// Commit listings over a time window
pub mod history;

/// MCP server implementation with tools and prompts
pub mod mcp_server;

/// Temporal diff orchestration
pub mod orchestrator;

/// Platform-specific default paths
pub mod paths;

/// Commit-graph provider abstraction and implementations
pub mod provider;

/// Branch-at-time resolution
pub mod resolver;

/// Timestamp parsing and formatting
pub mod timestamp;

/// Domain types and MCP request types with JSON schema definitions
pub mod types;

pub use client::ChronoClient;
pub use config::Config;
pub use correlator::MergeCorrelator;
pub use diff::DiffEngine;
pub use error::{ChronoError, ProviderError, ResolveError};
pub use history::CommitHistory;
pub use orchestrator::TemporalDiffOrchestrator;
pub use provider::{CommitGraphProvider, InMemoryCommitGraph};
pub use resolver::BranchPointResolver;
pub use types::{
    CommitWindow, CommitsInWindowRequest, DiffCommitsRequest, DiffResult, RepoCoordinates,
    ResolutionMethod, ResolvePointRequest, ResolvedPoint, TemporalDiffOutcome,
    TemporalDiffRequest,
};
