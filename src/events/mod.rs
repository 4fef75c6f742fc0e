//! Mirror event sink.
//!
//! Fires and memory writes are echoed to an external mirror (graph store,
//! analytics, whatever is listening) as fire-and-forget events. The core's
//! correctness never depends on these being delivered: publishing is
//! non-blocking and a closed channel is swallowed.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// An event mirrored out of the main transaction path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MirrorEvent {
    /// An intent fire was recorded.
    IntentFired {
        /// The fired intent.
        intent_id: Uuid,
        /// Owning user.
        user_id: String,
        /// Reported outcome.
        status: String,
        /// Whether the intent is still enabled after the fire.
        enabled: bool,
    },
    /// Memories were extracted and persisted for a user.
    MemoriesStored {
        /// Owning user.
        user_id: String,
        /// Number of records written.
        count: usize,
    },
}

/// Handle for publishing mirror events.
#[derive(Debug, Clone)]
pub struct MirrorSink {
    tx: mpsc::UnboundedSender<MirrorEvent>,
}

impl MirrorSink {
    /// Spawn the consumer task and return the publishing handle.
    ///
    /// The default consumer only logs. A real mirror integration would
    /// replace the loop body with its upsert call.
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<MirrorEvent>();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match &event {
                    MirrorEvent::IntentFired {
                        intent_id, status, ..
                    } => {
                        tracing::debug!(%intent_id, status, "mirror: intent fired");
                    }
                    MirrorEvent::MemoriesStored { user_id, count } => {
                        tracing::debug!(user_id, count, "mirror: memories stored");
                    }
                }
            }
        });
        Self { tx }
    }

    /// Publish an event without waiting. Send failures are swallowed.
    pub fn publish(&self, event: MirrorEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("mirror sink closed, event dropped");
        }
    }
}
