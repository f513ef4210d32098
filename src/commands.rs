//! Typed wrappers for the commands an agent understands.
//!
//! [`AgentCommands`] only shapes payloads; correlation, timeouts and
//! cancellation all come from [`AgentClient::send_json`].

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::client::AgentClient;
use crate::error::Result;
use crate::protocol::CommandResult;
use crate::transport::BoxFuture;

/// Command names on the wire.
pub mod names {
    pub const RUN_COLLECTION: &str = "run_collection";
    pub const RESTART_AGENT: &str = "restart_agent";
    pub const UPDATE_AGENT: &str = "update_agent";
    pub const GET_STATUS: &str = "get_status";
    pub const UPDATE_CONFIG: &str = "update_config";
}

/// Body of `run_collection`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionRequest {
    /// Collector to run, e.g. `inventory` or `metrics`.
    pub collector: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

/// Body of `restart_agent`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestartRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Body of `update_agent`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateAgentRequest {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    /// Hex SHA-256 of the package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// Named command wrappers.
pub trait AgentCommands {
    fn run_collection<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        request: &'a CollectionRequest,
    ) -> BoxFuture<'a, Result<CommandResult>>;

    fn restart_agent<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        request: &'a RestartRequest,
    ) -> BoxFuture<'a, Result<CommandResult>>;

    fn update_agent<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        request: &'a UpdateAgentRequest,
    ) -> BoxFuture<'a, Result<CommandResult>>;

    fn get_status<'a>(&'a self, cancel: &'a CancellationToken)
        -> BoxFuture<'a, Result<CommandResult>>;

    /// Push a configuration document to the agent.
    fn update_config<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        config: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<CommandResult>>;
}

impl AgentCommands for AgentClient {
    fn run_collection<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        request: &'a CollectionRequest,
    ) -> BoxFuture<'a, Result<CommandResult>> {
        Box::pin(self.send_json(cancel, names::RUN_COLLECTION, request))
    }

    fn restart_agent<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        request: &'a RestartRequest,
    ) -> BoxFuture<'a, Result<CommandResult>> {
        Box::pin(self.send_json(cancel, names::RESTART_AGENT, request))
    }

    fn update_agent<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        request: &'a UpdateAgentRequest,
    ) -> BoxFuture<'a, Result<CommandResult>> {
        Box::pin(self.send_json(cancel, names::UPDATE_AGENT, request))
    }

    fn get_status<'a>(
        &'a self,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<CommandResult>> {
        Box::pin(self.send(cancel, names::GET_STATUS, None))
    }

    fn update_config<'a>(
        &'a self,
        cancel: &'a CancellationToken,
        config: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<CommandResult>> {
        Box::pin(self.send_json(cancel, names::UPDATE_CONFIG, config))
    }
}
