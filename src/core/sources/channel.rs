//! In-memory event source fed through a [`ChannelPublisher`].

use tokio::sync::mpsc;

use super::{EventSource, SourceSink, Subscription};
use crate::core::model::{ConnectionStatus, RawPayload, SourceTag};

/// Sending half of a [`ChannelSource`].
#[derive(Clone)]
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<RawPayload>,
}

impl ChannelPublisher {
    /// Returns false once the source has stopped.
    pub fn publish(&self, payload: RawPayload) -> bool {
        self.tx.send(payload).is_ok()
    }
}

/// Adapter that forwards whatever is published on its channel, in order.
pub struct ChannelSource {
    tag: SourceTag,
    rx: mpsc::UnboundedReceiver<RawPayload>,
}

impl ChannelSource {
    pub fn new(tag: SourceTag) -> (ChannelPublisher, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelPublisher { tx }, Self { tag, rx })
    }
}

impl EventSource for ChannelSource {
    fn tag(&self) -> SourceTag {
        self.tag
    }

    fn subscribe(self: Box<Self>, sink: SourceSink) -> Subscription {
        let mut rx = self.rx;
        let task_sink = sink.clone();
        Subscription::spawn(&sink, async move {
            task_sink.status(ConnectionStatus::Connected);
            while let Some(payload) = rx.recv().await {
                if !task_sink.deliver(payload) {
                    return;
                }
            }
            task_sink.status(ConnectionStatus::Disconnected(
                "publisher closed".to_string(),
            ));
        })
    }
}
