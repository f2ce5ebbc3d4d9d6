//! Broadcast bus for mutation signals.

use crate::traits::{MutationKind, MutationSignal, MutationSource};
use crate::types::ListId;
use tokio::sync::broadcast;
use tracing::trace;

const DEFAULT_CAPACITY: usize = 64;

/// In-process [`MutationSource`] backed by a broadcast channel.
///
/// Hosts call [`MutationBus::notify`] whenever they observe a write against a
/// list's backing resource.
#[derive(Debug, Clone)]
pub struct MutationBus {
    sender: broadcast::Sender<MutationSignal>,
}

impl MutationBus {
    /// Create a bus with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus retaining up to `capacity` unread signals per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a signal. Returns the number of subscribers that saw it.
    pub fn notify(&self, list: ListId, kind: MutationKind) -> usize {
        trace!(%list, ?kind, "mutation signal");
        self.sender
            .send(MutationSignal::new(list, kind))
            .unwrap_or(0)
    }
}

impl Default for MutationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MutationSource for MutationBus {
    fn subscribe(&self) -> broadcast::Receiver<MutationSignal> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_signals() {
        let bus = MutationBus::new();
        let mut rx = bus.subscribe();

        assert_eq!(bus.notify(ListId::new("h1"), MutationKind::Update), 1);
        let signal = rx.recv().await.unwrap();
        assert_eq!(signal.list, ListId::new("h1"));
        assert_eq!(signal.kind, MutationKind::Update);
    }

    #[test]
    fn test_notify_without_subscribers() {
        let bus = MutationBus::new();
        assert_eq!(bus.notify(ListId::new("h1"), MutationKind::Create), 0);
    }
}
