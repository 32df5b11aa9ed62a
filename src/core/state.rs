use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::Instant;

use super::model::{AlertEvent, AlertSummary, ConnectionStatus, SourceTag};

/// The engine-owned alert state. Readers only ever see [`AlertSnapshot`]s.
pub struct AlertState {
    current: Option<AlertEvent>,
    /// Shared with snapshots; appends copy-on-write if a reader still holds one
    history: Arc<Vec<AlertSummary>>,
    expires_at: Option<Instant>,
    history_limit: Option<usize>,
}

impl AlertState {
    pub fn new() -> Self {
        Self {
            current: None,
            history: Arc::new(Vec::new()),
            expires_at: None,
            history_limit: None,
        }
    }

    /// Cap retained history; the oldest entries are dropped once the cap is hit.
    pub fn with_history_limit(limit: Option<usize>) -> Self {
        Self {
            history_limit: limit,
            ..Self::new()
        }
    }

    /// Make `event` current and schedule its expiry. Replaces any previous alert.
    pub fn activate(&mut self, event: AlertEvent, expires_at: Instant) {
        self.push_history(event.summary());
        self.current = Some(event);
        self.expires_at = Some(expires_at);
    }

    /// Record a clear signal and go idle.
    pub fn clear_with(&mut self, event: &AlertEvent) {
        self.push_history(event.summary());
        self.reset();
    }

    /// Go idle. History is untouched.
    pub fn reset(&mut self) {
        self.current = None;
        self.expires_at = None;
    }

    pub fn current(&self) -> Option<&AlertEvent> {
        self.current.as_ref()
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    pub fn history(&self) -> &[AlertSummary] {
        &self.history
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    fn push_history(&mut self, summary: AlertSummary) {
        let history = Arc::make_mut(&mut self.history);
        history.push(summary);
        if let Some(limit) = self.history_limit {
            if history.len() > limit {
                let excess = history.len() - limit;
                history.drain(..excess);
            }
        }
    }

    pub fn snapshot(
        &self,
        connections: &HashMap<SourceTag, ConnectionStatus>,
        status_message: &str,
        last_error: Option<&str>,
    ) -> AlertSnapshot {
        AlertSnapshot {
            current: self.current.clone(),
            history: Arc::clone(&self.history),
            expires_at: self.expires_at,
            connections: connections.clone(),
            status_message: status_message.to_string(),
            last_error: last_error.map(str::to_string),
        }
    }
}

impl Default for AlertState {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable view of the engine published after every state change.
#[derive(Debug, Clone)]
pub struct AlertSnapshot {
    pub current: Option<AlertEvent>,
    pub history: Arc<Vec<AlertSummary>>,
    pub expires_at: Option<Instant>,
    pub connections: HashMap<SourceTag, ConnectionStatus>,
    pub status_message: String,
    /// Most recent connection or feedback failure, for a fallback view
    pub last_error: Option<String>,
}

impl AlertSnapshot {
    pub fn idle() -> Self {
        Self {
            current: None,
            history: Arc::new(Vec::new()),
            expires_at: None,
            connections: HashMap::new(),
            status_message: String::new(),
            last_error: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }
}
