//! Coarse progress events for CLI or TUI consumers.
//!
//! Observers are called inline from the export, so implementations must
//! return immediately. [`ChannelObserver`] hands events to an unbounded
//! channel for consumers that do their own I/O.

use crate::model::MediaKind;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// One more page of a document's block listing arrived.
    PageFetched {
        document_id: String,
        pages: u32,
        blocks: usize,
    },
    /// A document finished rendering.
    BlocksRendered { document_id: String, blocks: usize },
    /// An asset was resolved (or failed to be).
    AssetResolved {
        token: String,
        kind: MediaKind,
        local: bool,
        ok: bool,
    },
    /// A wiki node was discovered during traversal.
    WikiNodeVisited {
        node_token: String,
        title: String,
        depth: usize,
    },
}

/// Receives progress events. Must not block.
pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_event(&self, _event: ProgressEvent) {}
}

/// Forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressObserver for ChannelObserver {
    fn on_event(&self, event: ProgressEvent) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_observer_forwards_without_blocking() {
        let (observer, mut receiver) = ChannelObserver::new();
        observer.on_event(ProgressEvent::BlocksRendered {
            document_id: "doc".to_string(),
            blocks: 3,
        });

        assert_eq!(
            receiver.try_recv().unwrap(),
            ProgressEvent::BlocksRendered {
                document_id: "doc".to_string(),
                blocks: 3
            }
        );

        drop(receiver);
        observer.on_event(ProgressEvent::BlocksRendered {
            document_id: "doc".to_string(),
            blocks: 4,
        });
    }
}
