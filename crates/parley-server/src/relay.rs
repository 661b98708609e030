//! Broadcast relay: persist, then fan out.
//!
//! Delivery is deliberately untargeted — every live connection receives
//! every persisted message, and clients filter by conversation locally.
//! Narrowing delivery to the two participants would be a separate relay
//! policy change, not made here.

use std::sync::Arc;

use tracing::{debug, warn};

use parley_core::{Message, ParleyResult, ServerFrame};

use crate::registry::ConnectionRegistry;
use crate::store::MessageLog;

/// Persists inbound messages and broadcasts them to live connections.
pub struct BroadcastRelay {
    log: Arc<MessageLog>,
    registry: Arc<ConnectionRegistry>,
}

impl BroadcastRelay {
    pub fn new(log: Arc<MessageLog>, registry: Arc<ConnectionRegistry>) -> Self {
        Self { log, registry }
    }

    /// Handle a SEND_MESSAGE: append to the durable log, then deliver a
    /// NEW_MESSAGE frame to every live connection.
    ///
    /// The append happens first; a broadcast is only ever sent for a
    /// persisted message. Fan-out uses `try_send` so a connection with a
    /// full outbound queue cannot stall the others — it misses this
    /// broadcast and catches up from history on its next AUTH.
    pub async fn handle_send(&self, message: Message) -> ParleyResult<()> {
        self.log.append(&message).await?;

        let frame = ServerFrame::NewMessage(message.clone());
        let mut delivered = 0usize;
        for entry in self.registry.snapshot().await {
            match entry.sender.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(
                        conn_id = entry.conn_id,
                        username = %entry.username,
                        error = %e,
                        "dropping broadcast for connection"
                    );
                }
            }
        }

        debug!(id = %message.id, delivered, "message broadcast");
        Ok(())
    }
}
