//! MCP server for NovelAI image generation.
//!
//! Exposes one tool, `generate_image`, over the streamable HTTP transport.
//! Tool calls are normalized into a fixed NovelAI Diffusion V4.5 Full
//! request shape, posted upstream, and the resulting PNG (bare or inside a
//! ZIP archive) is returned as a base64 image content block.
//!
//! The crate splits into a session layer and a translation pipeline:
//!
//! - [`session`] owns the table of live sessions and their lifecycle
//! - [`transport`] dispatches JSON-RPC messages within one session
//! - [`http`] is the axum surface binding headers to the session layer
//! - [`params`], [`upstream`], [`client`], [`decode`] form the pipeline
//!   from raw tool arguments to a base64 PNG

pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod http;
pub mod params;
pub mod server;
pub mod session;
pub mod transport;
pub mod upstream;

pub use client::NovelAiClient;
pub use config::Config;
pub use error::{ConfigError, Error, Result};
pub use server::ImageServer;
pub use session::{SessionError, SessionManager};
pub use transport::{SessionTransport, ToolServerTransport};
