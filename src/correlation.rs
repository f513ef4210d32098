//! Correlation table mapping in-flight command ids to their waiters.
//!
//! The dispatcher registers an id before sending a command; the inbound
//! router resolves it when the matching `command_response` arrives. The
//! returned [`PendingCall`] deregisters its id when dropped, so the entry is
//! removed on every exit path: response, timeout, cancellation, a dropped
//! future, or a panic.
//!
//! ```text
//!  send()                         router
//!    │ register(id) ──► table ◄── resolve(id, result)
//!    │ wait ◄─────── oneshot ◄────┘
//!    └ drop(PendingCall) ─► deregister(id)
//! ```

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::{AgentLinkError, Result};
use crate::protocol::CommandResult;

/// Thread-safe map from correlation id to a one-shot response channel.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    pending: Mutex<HashMap<String, oneshot::Sender<CommandResult>>>,
}

impl CorrelationTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh correlation id.
    pub fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Register a waiter for `id`.
    ///
    /// Fails if `id` is already registered.
    pub fn register(&self, id: impl Into<String>) -> Result<PendingCall<'_>> {
        let id = id.into();
        let (tx, rx) = oneshot::channel();

        let mut pending = self.pending.lock();
        if pending.contains_key(&id) {
            return Err(AgentLinkError::DuplicateCorrelationId(id));
        }
        pending.insert(id.clone(), tx);
        tracing::trace!(id = %id, in_flight = pending.len(), "registered pending call");
        drop(pending);

        Ok(PendingCall {
            table: self,
            id,
            rx: Some(rx),
        })
    }

    /// Deliver `result` to the waiter for `id`.
    ///
    /// Returns `false` when nobody is waiting: the id is unknown, already
    /// resolved, or its caller gave up. That is not an error.
    pub fn resolve(&self, id: &str, result: CommandResult) -> bool {
        let waiter = self.pending.lock().remove(id);
        match waiter {
            Some(tx) => tx.send(result).is_ok(),
            None => {
                tracing::debug!(id = %id, "dropping response for unknown correlation id");
                false
            }
        }
    }

    /// Remove the entry for `id`, if still present.
    pub fn deregister(&self, id: &str) {
        self.pending.lock().remove(id);
    }

    /// Resolve every pending call with a copy of `result`.
    ///
    /// Returns how many waiters were resolved.
    pub fn drain(&self, result: CommandResult) -> usize {
        let waiters: Vec<_> = self.pending.lock().drain().collect();
        let count = waiters.len();
        for (_, tx) in waiters {
            let _ = tx.send(result.clone());
        }
        count
    }

    /// Number of calls currently waiting.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether no calls are waiting.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

/// One in-flight command awaiting its response.
///
/// Dropping it removes the id from the table.
#[derive(Debug)]
pub struct PendingCall<'a> {
    table: &'a CorrelationTable,
    id: String,
    rx: Option<oneshot::Receiver<CommandResult>>,
}

impl PendingCall<'_> {
    /// The correlation id.
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the response.
    ///
    /// Fails with `ConnectionClosed` if the entry was removed without a
    /// result. Can only be awaited once; later calls fail the same way.
    pub async fn response(&mut self) -> Result<CommandResult> {
        match self.rx.as_mut() {
            Some(rx) => {
                let result = rx.await.map_err(|_| AgentLinkError::ConnectionClosed);
                self.rx = None;
                result
            }
            None => Err(AgentLinkError::ConnectionClosed),
        }
    }
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        self.table.deregister(&self.id);
    }
}
