use crate::errors::BridgeError;
use purewolf_protocol::HostReply;
use purewolf_protocol::RequestId;
use std::collections::HashMap;
use tokio::sync::oneshot;

pub(crate) type ReplySender = oneshot::Sender<Result<HostReply, BridgeError>>;

/// In-flight correlated calls, keyed by request id. Every entry is resolved
/// at most once: resolution removes the entry before the continuation fires,
/// so a duplicate reply finds nothing.
#[derive(Default)]
pub(crate) struct PendingTable {
    entries: HashMap<RequestId, ReplySender>,
}

impl PendingTable {
    pub fn register(&mut self, id: RequestId, sender: ReplySender) {
        let previous = self.entries.insert(id, sender);
        debug_assert!(previous.is_none(), "request id {id} registered twice");
    }

    /// Delivers `reply` to the matching caller. Returns false for a
    /// stale/duplicate/unknown id; the caller drops the frame.
    pub fn resolve(&mut self, id: RequestId, reply: HostReply) -> bool {
        match self.entries.remove(&id) {
            Some(sender) => {
                // The caller may have dropped its future; delivery is then a no-op.
                let _ = sender.send(Ok(reply));
                true
            }
            None => false,
        }
    }

    /// Rolls back a registration whose send failed.
    pub fn remove(&mut self, id: RequestId) -> Option<ReplySender> {
        self.entries.remove(&id)
    }

    /// Fails every outstanding entry with `ChannelLost` and clears the
    /// table, releasing callers that would otherwise wait forever on a dead
    /// channel.
    pub fn cancel_all(&mut self, reason: &str) -> usize {
        let count = self.entries.len();
        for (_, sender) in self.entries.drain() {
            let _ = sender.send(Err(BridgeError::channel_lost(reason)));
        }
        count
    }

    /// Fails the listed entries (those still pending) with `ChannelLost`.
    pub fn cancel_ids(&mut self, ids: &[RequestId], reason: &str) -> usize {
        let mut count = 0;
        for id in ids {
            if let Some(sender) = self.entries.remove(id) {
                let _ = sender.send(Err(BridgeError::channel_lost(reason)));
                count += 1;
            }
        }
        count
    }

    pub fn ids(&self) -> Vec<RequestId> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
