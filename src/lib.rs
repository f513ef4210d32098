//! # agentlink-client
//!
//! Rust client for the agent command channel.
//!
//! An agent keeps one authenticated, full-duplex link to its control plane
//! and sends commands over it. Responses come back in any order and are
//! matched to their callers by correlation id, so any number of tasks can
//! have commands in flight at once.
//!
//! ## Architecture
//!
//! - **Connection manager**: dial, `auth` handshake, link lifecycle
//! - **Writer task**: the only owner of the transport's write half
//! - **Inbound router**: the only reader; resolves responses, answers pings
//! - **Heartbeat**: periodic `ping` frames
//! - **Dispatcher**: correlation, timeout and cancellation per command
//!
//! ## Example
//!
//! ```ignore
//! use agentlink_client::commands::AgentCommands;
//! use agentlink_client::{AgentClient, CancellationToken};
//!
//! #[tokio::main]
//! async fn main() -> agentlink_client::Result<()> {
//!     let client = AgentClient::builder("https://cp.example.com")
//!         .credentials("agent-42", "s3cret")
//!         .build()?;
//!     client.connect().await?;
//!
//!     let status = client.get_status(&CancellationToken::new()).await?;
//!     println!("{:?}", status.data);
//!
//!     client.disconnect().await
//! }
//! ```

pub mod codec;
pub mod commands;
pub mod config;
pub mod connection;
pub mod correlation;
pub mod error;
pub mod event;
pub mod protocol;
pub mod transport;
pub mod writer;

mod client;
mod dispatcher;
mod heartbeat;
mod router;

pub use client::{AgentClient, ClientBuilder};
pub use config::{ClientConfig, Credentials, ReconnectPolicy};
pub use connection::{ConnectionState, SessionInfo};
pub use error::{AgentLinkError, Result};
pub use event::ClientEvent;
pub use protocol::CommandResult;
pub use tokio_util::sync::CancellationToken;
