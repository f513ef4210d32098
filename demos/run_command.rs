//! Run Command - connect, send one command, disconnect.
//!
//! This example demonstrates:
//! - Building an agent client with the fluent builder
//! - Watching link events on a broadcast subscription
//! - Sending a typed command and reading its result
//!
//! # Running
//!
//! ```text
//! AGENTLINK_URL=https://cp.example.com \
//! AGENTLINK_CLIENT_ID=agent-42 \
//! AGENTLINK_CLIENT_SECRET=s3cret \
//! RUST_LOG=agentlink_client=debug \
//! cargo run --example run_command
//! ```

use std::time::Duration;

use agentlink_client::commands::{AgentCommands, CollectionRequest};
use agentlink_client::{AgentClient, CancellationToken, ClientEvent};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let url = std::env::var("AGENTLINK_URL").unwrap_or_else(|_| "http://localhost:8080".into());
    let client_id = std::env::var("AGENTLINK_CLIENT_ID").unwrap_or_else(|_| "demo-agent".into());
    let secret = std::env::var("AGENTLINK_CLIENT_SECRET").unwrap_or_default();

    let client = AgentClient::builder(url)
        .credentials(client_id, secret)
        .command_timeout(Duration::from_secs(15))
        .build()?;

    // Print unsolicited frames and lifecycle changes as they happen
    let mut events = client.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ClientEvent::Message(frame) => {
                    tracing::info!(frame_type = ?frame.frame_type, payload = ?frame.raw_payload(), "message")
                }
                other => tracing::info!(event = ?other, "link event"),
            }
        }
    });

    client.connect().await?;
    if let Some(session) = client.session() {
        tracing::info!(session_id = %session.session_id, "connected");
    }

    // Ctrl-C aborts the in-flight command
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let request = CollectionRequest {
        collector: "inventory".into(),
        ..Default::default()
    };
    match client.run_collection(&cancel, &request).await {
        Ok(result) if result.success => {
            tracing::info!(data = ?result.data, "collection finished")
        }
        Ok(result) => tracing::warn!(error = ?result.error, "collection failed"),
        Err(e) => tracing::error!(error = %e, "command error"),
    }

    client.disconnect().await?;
    Ok(())
}
