//! axigen-mcp-rs: Axigen mail MCP server over stdio
//!
//! This server exposes the Axigen REST API to MCP clients as a set of tools.
//! Every tool call carries its own credentials; sessions are cached per
//! account and refreshed transparently when they expire or are rejected.
//!
//! # Architecture
//!
//! - [`main`]: Process entry point with env loading and stdio serving
//! - [`config`]: Environment-driven server settings
//! - [`errors`]: Application error model with MCP error mapping
//! - [`credentials`]: Credential validation, cache keys, Basic-Auth header
//! - [`session`]: Per-account session cache with TTL and locking
//! - [`axigen`]: Authenticated REST transport with refresh-and-retry
//! - [`server`]: MCP tool handlers with validation and response shaping
//! - [`models`]: Input/output DTOs and schema-bearing types

mod axigen;
mod config;
mod credentials;
mod errors;
mod models;
mod server;
mod session;

use config::ServerConfig;
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application entry point
///
/// Initializes tracing from environment, loads config, and serves the MCP
/// server over stdio. Cached sessions are dropped once the client
/// disconnects.
///
/// # Environment Variables
///
/// See [`ServerConfig::load_from_env`] for full configuration options.
///
/// # Example
///
/// ```no_run
/// AXIGEN_DEFAULT_SERVER_URL=https://mail.example.com \
/// AXIGEN_WRITE_ENABLED=true \
/// cargo run
/// ```
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = ServerConfig::load_from_env()?;
    info!(
        server = %config.default_server_url,
        write_enabled = config.write_enabled,
        "starting axigen MCP server"
    );

    let server = server::AxigenServer::new(config)?;
    let client = server.client();
    let service = server.serve(stdio()).await?;
    service.waiting().await?;

    client.shutdown().await;
    Ok(())
}
