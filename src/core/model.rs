use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Which external feed a payload arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceTag {
    /// Real-time "latest document" feed (horn detections)
    DocumentFeed,
    /// Publish/subscribe topic feed (siren detections)
    MessageBus,
}

impl SourceTag {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::DocumentFeed => "document feed",
            Self::MessageBus => "message bus",
        }
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A payload exactly as an adapter received it, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    Text(String),
    Document(serde_json::Value),
    Bytes(Vec<u8>),
}

/// Detected hazard category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertKind {
    Horn,
    HornLeft,
    HornRight,
    SirenDetected,
    None,
}

impl AlertKind {
    /// Alert class driving reset delay and feedback pattern. `None` has no class.
    pub fn class(&self) -> Option<AlertClass> {
        match self {
            Self::Horn | Self::HornLeft | Self::HornRight => Some(AlertClass::Horn),
            Self::SirenDetected => Some(AlertClass::Siren),
            Self::None => None,
        }
    }

    /// Headline shown while this alert is current.
    pub fn headline(&self) -> &'static str {
        match self {
            Self::Horn => "Horn Detected!",
            Self::HornLeft => "Horn Detected: Left Side",
            Self::HornRight => "Horn Detected: Right Side",
            Self::SirenDetected => "Siren Detected!",
            Self::None => "No Horn Detected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertClass {
    Horn,
    Siren,
}

impl AlertClass {
    pub fn all() -> &'static [AlertClass] {
        &[Self::Horn, Self::Siren]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Front,
    Left,
    Right,
    None,
}

impl Direction {
    /// Case-insensitive parse; unknown strings yield `None` (the Option).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "front" => Some(Self::Front),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Front => "Front",
            Self::Left => "Left",
            Self::Right => "Right",
            Self::None => "None",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    None,
}

impl Severity {
    /// Case-insensitive parse; empty or unknown strings yield `None` (the Option).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::None => "None",
        }
    }
}

/// Canonical, source-agnostic alert produced once per raw payload.
///
/// Invariant: `kind == AlertKind::None` implies `direction == None`,
/// `severity == None` and `intensity == 0`. Only the normalizer and
/// [`AlertEvent::clear`] construct events, and both uphold it.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub intensity: f32,
    pub direction: Direction,
    pub severity: Severity,
    pub raw_message: String,
    pub source: SourceTag,
    /// Monotonic arrival time, used for ordering and reset scheduling
    pub received_at: Instant,
    /// Wall-clock arrival time, for history display only
    pub received_wall: DateTime<Utc>,
}

impl AlertEvent {
    /// A clear signal (`kind == None`) carrying the original payload text.
    pub fn clear(source: SourceTag, raw_message: String, received_at: Instant) -> Self {
        Self {
            kind: AlertKind::None,
            intensity: 0.0,
            direction: Direction::None,
            severity: Severity::None,
            raw_message,
            source,
            received_at,
            received_wall: Utc::now(),
        }
    }

    pub fn is_clear(&self) -> bool {
        self.kind == AlertKind::None
    }

    pub fn headline(&self) -> &'static str {
        self.kind.headline()
    }

    pub fn summary(&self) -> AlertSummary {
        AlertSummary {
            kind: self.kind,
            headline: self.headline().to_string(),
            direction: self.direction,
            severity: self.severity,
            intensity: self.intensity,
            source: self.source,
            received_wall: self.received_wall,
        }
    }
}

/// History entry kept after an alert is superseded or reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSummary {
    pub kind: AlertKind,
    pub headline: String,
    pub direction: Direction,
    pub severity: Severity,
    pub intensity: f32,
    pub source: SourceTag,
    pub received_wall: DateTime<Utc>,
}

/// Per-source connection state, reported by adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected(String),
}

impl ConnectionStatus {
    /// Human-readable status line for the given source.
    pub fn message(&self, source: SourceTag) -> String {
        match self {
            Self::Connecting => format!("Connecting to {}...", source),
            Self::Connected => format!("Connected to {}", source),
            Self::Disconnected(reason) => format!("Error connecting to {}: {}", source, reason),
        }
    }
}
