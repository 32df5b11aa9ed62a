//! Topic subscription over a newline-delimited TCP broker link.
//!
//! On connect the client sends `SUB <topic>\n`; the broker then pushes lines
//! of the form `<topic> <payload>`. Lines for other topics are ignored. Every
//! matching payload is delivered as-is: text when it is UTF-8, raw bytes
//! otherwise, so a garbled frame is dropped by the normalizer and never costs
//! the connection.

use std::time::Duration;

use log::{debug, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

use super::{EventSource, ReconnectPolicy, SourceSink, Subscription};
use crate::core::config::MessageBusSettings;
use crate::core::error::ConnectionError;
use crate::core::model::{ConnectionStatus, RawPayload, SourceTag};

pub struct MessageBusSource {
    broker_addr: String,
    topic: String,
    policy: ReconnectPolicy,
}

impl MessageBusSource {
    pub fn new(broker_addr: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            broker_addr: broker_addr.into(),
            topic: topic.into(),
            policy: ReconnectPolicy::default(),
        }
    }

    pub fn from_settings(settings: &MessageBusSettings) -> Self {
        Self {
            broker_addr: settings.broker_addr.clone(),
            topic: settings.topic.clone(),
            policy: ReconnectPolicy {
                backoff: Duration::from_millis(settings.reconnect_backoff_ms),
                connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            },
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn run(self, sink: SourceSink) {
        loop {
            sink.status(ConnectionStatus::Connecting);
            match self.session(&sink).await {
                Ok(()) => return,
                Err(e) => {
                    warn!("Message bus {} error: {}", self.broker_addr, e);
                    sink.status(ConnectionStatus::Disconnected(e.to_string()));
                }
            }
            if sink.is_closed() {
                return;
            }
            sleep(self.policy.backoff).await;
        }
    }

    /// One connection lifetime. Ok only when the sink has closed.
    async fn session(&self, sink: &SourceSink) -> Result<(), ConnectionError> {
        let connect = TcpStream::connect(self.broker_addr.as_str());
        let stream = timeout(self.policy.connect_timeout, connect)
            .await
            .map_err(|_| ConnectionError::Timeout(self.policy.connect_timeout))??;

        let (reader, mut writer) = stream.into_split();
        writer
            .write_all(format!("SUB {}\n", self.topic).as_bytes())
            .await?;
        debug!("Subscribed to {}", self.topic);
        sink.status(ConnectionStatus::Connected);

        let mut reader = BufReader::new(reader);
        let mut frame = Vec::new();
        loop {
            frame.clear();
            if reader.read_until(b'\n', &mut frame).await? == 0 {
                return Err(ConnectionError::Closed);
            }
            if let Some(payload) = topic_payload(&frame, &self.topic) {
                if !sink.deliver(to_payload(payload)) {
                    return Ok(());
                }
            }
        }
    }
}

impl EventSource for MessageBusSource {
    fn tag(&self) -> SourceTag {
        SourceTag::MessageBus
    }

    fn subscribe(self: Box<Self>, sink: SourceSink) -> Subscription {
        let task_sink = sink.clone();
        Subscription::spawn(&sink, self.run(task_sink))
    }
}

/// Payload of a `<topic> <payload>` frame, if it is for `topic`.
fn topic_payload<'a>(frame: &'a [u8], topic: &str) -> Option<&'a [u8]> {
    let frame = frame.strip_suffix(b"\n").unwrap_or(frame);
    let frame = frame.strip_suffix(b"\r").unwrap_or(frame);
    match frame.iter().position(|b| *b == b' ') {
        Some(split) if &frame[..split] == topic.as_bytes() => Some(&frame[split + 1..]),
        None if frame == topic.as_bytes() => Some(&[]),
        _ => None,
    }
}

fn to_payload(bytes: &[u8]) -> RawPayload {
    match std::str::from_utf8(bytes) {
        Ok(text) => RawPayload::Text(text.to_string()),
        Err(_) => RawPayload::Bytes(bytes.to_vec()),
    }
}
