//! MCP protocol client.
//!
//! Talks to a tool server (the PBIXRay extractor) over line-delimited
//! JSON-RPC 2.0 on the server's stdin/stdout.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     McpClient (Tokio)                        │
//! │  - spawns the server (or wraps injected streams)             │
//! │  - initialize → notifications/initialized handshake          │
//! │  - id → oneshot slot map for pipelined calls                 │
//! │  - one background read loop resolves slots by id             │
//! └──────────────────────────────────────────────────────────────┘
//!                 stdin (NDJSON) │ ▲ stdout (NDJSON)
//!                                ▼ │
//! ┌──────────────────────────────────────────────────────────────┐
//! │               Tool server (child process)                    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use pbimeta::mcp::{ClientOptions, McpClient, ServerCommand};
//! use serde_json::json;
//!
//! let client = McpClient::spawn(ServerCommand::new("pbixray-mcp"), ClientOptions::default());
//! client.initialize().await?;
//! let result = client.call_tool("get_tables", json!({})).await?;
//! client.close().await;
//! ```

pub mod client;
pub mod error;
pub mod protocol;

pub use client::{ClientOptions, McpClient, ServerCommand, SessionState, ToolCaller};
pub use error::{McpError, McpResult};
pub use protocol::{CallToolResult, ContentBlock, ToolDescriptor};
