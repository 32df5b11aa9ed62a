//! "Latest document" feed over a JSON-lines file.
//!
//! Each appended line is one document write. After every batch of writes the
//! feed delivers the document with the greatest `order_field` value, the way
//! an ordered, limit-one real-time query would. Documents missing that field
//! are excluded. Every (re)connect re-delivers the current latest document.

use std::cmp::Ordering;
use std::path::PathBuf;
use std::time::Duration;

use log::{debug, warn};
use serde_json::Value;
use tokio::time::{sleep, timeout};

use super::{EventSource, ReconnectPolicy, SourceSink, Subscription};
use crate::core::config::DocumentFeedSettings;
use crate::core::error::ConnectionError;
use crate::core::log_io::LogTailer;
use crate::core::model::{ConnectionStatus, RawPayload, SourceTag};

pub struct DocumentFeedSource {
    path: PathBuf,
    order_field: String,
    poll_interval: Duration,
    policy: ReconnectPolicy,
}

impl DocumentFeedSource {
    pub fn new(path: impl Into<PathBuf>, order_field: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            order_field: order_field.into(),
            poll_interval: Duration::from_millis(250),
            policy: ReconnectPolicy::default(),
        }
    }

    pub fn from_settings(settings: &DocumentFeedSettings) -> Self {
        Self {
            path: settings.path.clone(),
            order_field: settings.order_field.clone(),
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            policy: ReconnectPolicy {
                backoff: Duration::from_millis(settings.reconnect_backoff_ms),
                connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            },
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn run(self, sink: SourceSink) {
        loop {
            sink.status(ConnectionStatus::Connecting);
            match self.connect().await {
                Ok(tailer) => {
                    sink.status(ConnectionStatus::Connected);
                    match self.follow(tailer, &sink).await {
                        Ok(()) => return,
                        Err(e) => {
                            warn!("Document feed {:?} failed: {}", self.path, e);
                            sink.status(ConnectionStatus::Disconnected(e.to_string()));
                        }
                    }
                }
                Err(e) => {
                    warn!("Cannot open document feed {:?}: {}", self.path, e);
                    sink.status(ConnectionStatus::Disconnected(e.to_string()));
                }
            }
            if sink.is_closed() {
                return;
            }
            sleep(self.policy.backoff).await;
        }
    }

    async fn connect(&self) -> Result<LogTailer, ConnectionError> {
        let path = self.path.clone();
        let open = tokio::task::spawn_blocking(move || LogTailer::open_at_start(path));
        match timeout(self.policy.connect_timeout, open).await {
            Err(_) => Err(ConnectionError::Timeout(self.policy.connect_timeout)),
            Ok(Err(join)) => Err(ConnectionError::Io(std::io::Error::other(join))),
            Ok(Ok(result)) => Ok(result?),
        }
    }

    /// Poll for writes until the file errors (Err) or the sink closes (Ok).
    async fn follow(&self, mut tailer: LogTailer, sink: &SourceSink) -> Result<(), ConnectionError> {
        let mut latest = LatestDocument::new(self.order_field.clone());
        loop {
            let (returned, lines) = read_blocking(tailer).await?;
            tailer = returned;
            let lines = lines?;
            let documents = lines.iter().filter_map(|line| parse_document(line));
            if let Some(document) = latest.apply(documents) {
                if !sink.deliver(RawPayload::Document(document)) {
                    return Ok(());
                }
            }
            if sink.is_closed() {
                return Ok(());
            }
            sleep(self.poll_interval).await;
        }
    }
}

/// Run one tailer read on the blocking pool, handing the tailer back.
async fn read_blocking(
    mut tailer: LogTailer,
) -> Result<(LogTailer, std::io::Result<Vec<String>>), ConnectionError> {
    tokio::task::spawn_blocking(move || {
        let lines = tailer.read_new_lines();
        (tailer, lines)
    })
    .await
    .map_err(|join| ConnectionError::Io(std::io::Error::other(join)))
}

impl EventSource for DocumentFeedSource {
    fn tag(&self) -> SourceTag {
        SourceTag::DocumentFeed
    }

    fn subscribe(self: Box<Self>, sink: SourceSink) -> Subscription {
        let task_sink = sink.clone();
        Subscription::spawn(&sink, self.run(task_sink))
    }
}

fn parse_document(line: &str) -> Option<Value> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Skipping unparseable document line: {}", e);
            None
        }
    }
}

/// Sort key for the ordering field: numbers sort before strings.
#[derive(Debug, Clone, PartialEq, PartialOrd)]
enum OrderKey {
    Number(f64),
    Text(String),
}

impl OrderKey {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }
}

/// Tracks which document currently sits at the top of the ordered query.
struct LatestDocument {
    order_field: String,
    latest: Option<(OrderKey, Value)>,
}

impl LatestDocument {
    fn new(order_field: String) -> Self {
        Self {
            order_field,
            latest: None,
        }
    }

    /// Apply a batch of writes. Returns the latest document if it changed.
    fn apply(&mut self, documents: impl IntoIterator<Item = Value>) -> Option<Value> {
        let mut changed = false;
        for document in documents {
            let Some(key) = document.get(&self.order_field).and_then(OrderKey::of) else {
                debug!("Document without `{}` excluded from feed", self.order_field);
                continue;
            };
            let newer = match &self.latest {
                None => true,
                // Ties go to the later write
                Some((current, _)) => !matches!(
                    key.partial_cmp(current),
                    Some(Ordering::Less) | None
                ),
            };
            if newer {
                self.latest = Some((key, document));
                changed = true;
            }
        }
        if changed {
            self.latest.as_ref().map(|(_, document)| document.clone())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sources::testing;
    use serde_json::json;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_latest_document_ordering() {
        let mut latest = LatestDocument::new("timestamp".to_string());

        let first = latest.apply(vec![
            json!({"type": "Horn", "timestamp": 2}),
            json!({"type": "Left", "timestamp": 1}),
        ]);
        assert_eq!(first, Some(json!({"type": "Horn", "timestamp": 2})));

        // An older write does not change the top document
        assert_eq!(latest.apply(vec![json!({"type": "Right", "timestamp": 1})]), None);

        // Missing order field is excluded
        assert_eq!(latest.apply(vec![json!({"type": "Right"})]), None);

        let tie = latest.apply(vec![json!({"type": "Right", "timestamp": 2})]);
        assert_eq!(tie, Some(json!({"type": "Right", "timestamp": 2})));
    }

    #[test]
    fn test_string_keys_sort_after_numbers() {
        let mut latest = LatestDocument::new("timestamp".to_string());
        latest.apply(vec![json!({"type": "Horn", "timestamp": 99})]);
        let next = latest.apply(vec![json!({"type": "Left", "timestamp": "2025-01-01T00:00:00Z"})]);
        assert!(next.is_some());

        let later = latest.apply(vec![json!({"type": "Right", "timestamp": "2025-01-01T00:00:05Z"})]);
        assert_eq!(later.unwrap()["type"], "Right");
    }

    #[tokio::test]
    async fn test_feed_delivers_latest_then_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("alerts.jsonl");
        std::fs::write(
            &path,
            "{\"type\":\"Horn\",\"timestamp\":1}\n{\"type\":\"Left\",\"timestamp\":3}\nnot json\n",
        )
        .unwrap();

        let (sink, mut rx) = testing::sink(SourceTag::DocumentFeed);
        let source = DocumentFeedSource::new(&path, "timestamp")
            .with_poll_interval(Duration::from_millis(10));
        let subscription = Box::new(source).subscribe(sink);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let payloads = testing::payloads(&mut rx);
        assert_eq!(
            payloads,
            vec![RawPayload::Document(json!({"type": "Left", "timestamp": 3}))]
        );

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{\"type\":\"Right\",\"timestamp\":4}}").unwrap();
        file.sync_all().unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let payloads = testing::payloads(&mut rx);
        assert_eq!(
            payloads,
            vec![RawPayload::Document(json!({"type": "Right", "timestamp": 4}))]
        );

        subscription.unsubscribe();
    }

    #[tokio::test]
    async fn test_non_utf8_line_does_not_stall_feed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("alerts.jsonl");
        let mut content = b"{\"type\":\"Horn\",\"timestamp\":1,\"note\":\"\xff\"}\n".to_vec();
        content.extend_from_slice(b"{\"type\":\"Left\",\"timestamp\":2}\n");
        std::fs::write(&path, &content).unwrap();

        let (sink, mut rx) = testing::sink(SourceTag::DocumentFeed);
        let source = DocumentFeedSource::new(&path, "timestamp")
            .with_poll_interval(Duration::from_millis(10));
        let subscription = Box::new(source).subscribe(sink);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let mut payloads = Vec::new();
        let mut statuses = Vec::new();
        while let Ok(input) = rx.try_recv() {
            match input {
                crate::core::alerts::engine::EngineInput::Status { status, .. } => statuses.push(status),
                crate::core::alerts::engine::EngineInput::Payload { payload, .. } => payloads.push(payload),
                _ => {}
            }
        }

        assert_eq!(
            payloads,
            vec![RawPayload::Document(json!({"type": "Left", "timestamp": 2}))]
        );
        assert_eq!(
            statuses,
            vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
        );

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{\"type\":\"Right\",\"timestamp\":3}}").unwrap();
        file.sync_all().unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            testing::payloads(&mut rx),
            vec![RawPayload::Document(json!({"type": "Right", "timestamp": 3}))]
        );

        subscription.unsubscribe();
    }

    #[tokio::test]
    async fn test_missing_file_reports_and_retries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("later.jsonl");

        let (sink, mut rx) = testing::sink(SourceTag::DocumentFeed);
        let source = DocumentFeedSource::new(&path, "timestamp")
            .with_poll_interval(Duration::from_millis(10))
            .with_policy(ReconnectPolicy {
                backoff: Duration::from_millis(20),
                connect_timeout: Duration::from_millis(500),
            });
        let _subscription = Box::new(source).subscribe(sink);

        tokio::time::sleep(Duration::from_millis(50)).await;
        std::fs::write(&path, "{\"type\":\"Right\",\"timestamp\":1}\n").unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        let mut statuses = Vec::new();
        let mut payloads = Vec::new();
        while let Ok(input) = rx.try_recv() {
            match input {
                crate::core::alerts::engine::EngineInput::Status { status, .. } => statuses.push(status),
                crate::core::alerts::engine::EngineInput::Payload { payload, .. } => payloads.push(payload),
                _ => {}
            }
        }

        assert_eq!(statuses.first(), Some(&ConnectionStatus::Connecting));
        assert!(statuses
            .iter()
            .any(|s| matches!(s, ConnectionStatus::Disconnected(_))));
        assert_eq!(statuses.last(), Some(&ConnectionStatus::Connected));
        assert_eq!(payloads.len(), 1);
    }
}
