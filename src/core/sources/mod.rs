//! Event source adapters.
//!
//! Every adapter pushes raw payloads and connection-status changes into the
//! engine inbox through a [`SourceSink`]. Reconnection is the adapter's
//! business; the engine only sees status notifications. Dropping or calling
//! [`Subscription::unsubscribe`] stops delivery immediately.

pub mod channel;
pub mod document_feed;
pub mod message_bus;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::core::alerts::engine::{EngineHandle, EngineInput};
use crate::core::model::{ConnectionStatus, RawPayload, SourceTag};

pub use channel::{ChannelPublisher, ChannelSource};
pub use document_feed::DocumentFeedSource;
pub use message_bus::MessageBusSource;

/// Fixed-backoff reconnect policy shared by the network-ish adapters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    pub backoff: Duration,
    pub connect_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_millis(1000),
            connect_timeout: Duration::from_millis(4000),
        }
    }
}

/// A feed of raw payloads for one source.
pub trait EventSource: Send + 'static {
    fn tag(&self) -> SourceTag;

    /// Start delivering into `sink`. Must be called inside a tokio runtime.
    fn subscribe(self: Box<Self>, sink: SourceSink) -> Subscription;
}

/// Subscribe `source` to a running engine.
pub fn attach(source: Box<dyn EventSource>, engine: &EngineHandle) -> Subscription {
    let sink = SourceSink::new(source.tag(), engine.inbox());
    source.subscribe(sink)
}

/// Where an adapter delivers payloads and status changes.
#[derive(Clone)]
pub struct SourceSink {
    source: SourceTag,
    inbox: mpsc::UnboundedSender<EngineInput>,
    closed: Arc<AtomicBool>,
}

impl SourceSink {
    pub(crate) fn new(source: SourceTag, inbox: mpsc::UnboundedSender<EngineInput>) -> Self {
        Self {
            source,
            inbox,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn source(&self) -> SourceTag {
        self.source
    }

    /// Deliver a payload stamped with its arrival time.
    /// Returns false once unsubscribed or the engine is gone.
    pub fn deliver(&self, payload: RawPayload) -> bool {
        if self.is_closed() {
            return false;
        }
        self.inbox
            .send(EngineInput::Payload {
                source: self.source,
                payload,
                received_at: Instant::now(),
            })
            .is_ok()
    }

    pub fn status(&self, status: ConnectionStatus) -> bool {
        if self.is_closed() {
            return false;
        }
        self.inbox
            .send(EngineInput::Status {
                source: self.source,
                status,
            })
            .is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.inbox.is_closed()
    }

    fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

/// Handle returned by [`EventSource::subscribe`]; releasing it unsubscribes.
pub struct Subscription {
    source: SourceTag,
    closed: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Run `task` as the adapter loop behind `sink`.
    pub fn spawn<F>(sink: &SourceSink, task: F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        Self {
            source: sink.source(),
            closed: sink.closed_flag(),
            task: tokio::spawn(task),
        }
    }

    pub fn source(&self) -> SourceTag {
        self.source
    }

    /// Stop delivery. Safe to call any number of times.
    pub fn unsubscribe(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            log::debug!("Unsubscribed from {}", self.source);
        }
        self.task.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// A sink wired to a bare channel so tests can inspect engine inputs.
    pub fn sink(source: SourceTag) -> (SourceSink, mpsc::UnboundedReceiver<EngineInput>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SourceSink::new(source, tx), rx)
    }

    pub fn payloads(rx: &mut mpsc::UnboundedReceiver<EngineInput>) -> Vec<RawPayload> {
        let mut out = Vec::new();
        while let Ok(input) = rx.try_recv() {
            if let EngineInput::Payload { payload, .. } = input {
                out.push(payload);
            }
        }
        out
    }

    pub fn statuses(rx: &mut mpsc::UnboundedReceiver<EngineInput>) -> Vec<ConnectionStatus> {
        let mut out = Vec::new();
        while let Ok(input) = rx.try_recv() {
            if let EngineInput::Status { status, .. } = input {
                out.push(status);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::testing::sink;
    use super::*;

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent_and_stops_delivery() {
        let (sink, mut rx) = sink(SourceTag::MessageBus);
        let subscription = Subscription::spawn(&sink, std::future::pending());

        assert!(sink.deliver(RawPayload::Text("one".into())));
        subscription.unsubscribe();
        subscription.unsubscribe();

        assert!(!subscription.is_active());
        assert!(!sink.deliver(RawPayload::Text("two".into())));
        assert!(!sink.status(ConnectionStatus::Connected));
        assert_eq!(testing::payloads(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let (sink, _rx) = sink(SourceTag::DocumentFeed);
        let subscription = Subscription::spawn(&sink, std::future::pending());
        drop(subscription);
        assert!(sink.is_closed());
    }
}
