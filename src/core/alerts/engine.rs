// Alert lifecycle engine - owns AlertState and serializes every mutation.
//
// `AlertLifecycle` is the synchronous state machine. `AlertEngine` runs it on a
// single task that drains one inbox (adapter payloads, status changes, manual
// resets) and a single reset deadline. There is never more than one pending
// timer: the deadline lives in the state, so superseding an alert moves it and
// an expired-but-stale deadline can never clear a newer alert.

use std::collections::HashMap;

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use super::feedback::decide_feedback;
use super::model::{AlertEngineConfig, FeedbackCommand};
use crate::core::error::FeedbackDispatchError;
use crate::core::model::{AlertEvent, ConnectionStatus, RawPayload, SourceTag};
use crate::core::normalizer::normalize_at;
use crate::core::state::{AlertSnapshot, AlertState};

/// Everything the engine task consumes, in arrival order.
#[derive(Debug)]
pub enum EngineInput {
    Payload {
        source: SourceTag,
        payload: RawPayload,
        received_at: Instant,
    },
    Status {
        source: SourceTag,
        status: ConnectionStatus,
    },
    ManualReset,
    /// A feedback modality failed; recorded, never rolls back state
    FeedbackFailed(String),
    Shutdown,
}

/// Synchronous alert state machine.
pub struct AlertLifecycle {
    config: AlertEngineConfig,
    state: AlertState,
    connections: HashMap<SourceTag, ConnectionStatus>,
    status_message: String,
    last_error: Option<String>,
    /// Source whose disconnect set `last_error`, if that is where it came from
    error_source: Option<SourceTag>,
}

impl AlertLifecycle {
    pub fn new(config: AlertEngineConfig) -> Self {
        let state = AlertState::with_history_limit(config.history_limit);
        Self {
            config,
            state,
            connections: HashMap::new(),
            status_message: String::new(),
            last_error: None,
            error_source: None,
        }
    }

    /// Accept a normalized event. Last write wins: any active alert and its
    /// deadline are replaced. Returns the feedback to dispatch, if any.
    pub fn accept(&mut self, event: AlertEvent) -> Option<FeedbackCommand> {
        let Some(class) = event.kind.class() else {
            debug!("Clear signal from {}, going idle", event.source);
            self.state.clear_with(&event);
            return None;
        };

        let feedback = decide_feedback(&event, &self.config);
        let expires_at = event.received_at + self.config.reset_delay(class);
        if let Some(previous) = self.state.current() {
            debug!(
                "Superseding {:?} with {:?}",
                previous.kind, event.kind
            );
        }
        self.state.activate(event, expires_at);
        feedback
    }

    /// Clear the alert if its deadline has passed. Returns true if it cleared.
    pub fn fire_timer(&mut self, now: Instant) -> bool {
        match self.state.expires_at() {
            Some(deadline) if now >= deadline => {
                self.state.reset();
                true
            }
            _ => false,
        }
    }

    /// User-initiated reset. Returns true if an alert was active.
    pub fn manual_reset(&mut self) -> bool {
        let was_active = self.state.is_active();
        self.state.reset();
        was_active
    }

    pub fn update_connection(&mut self, source: SourceTag, status: ConnectionStatus) {
        self.status_message = status.message(source);
        match &status {
            ConnectionStatus::Disconnected(reason) => {
                self.last_error = Some(format!("{}: {}", source, reason));
                self.error_source = Some(source);
            }
            ConnectionStatus::Connected if self.error_source == Some(source) => {
                self.last_error = None;
                self.error_source = None;
            }
            _ => {}
        }
        self.connections.insert(source, status);
    }

    pub fn record_error(&mut self, message: String) {
        self.last_error = Some(message);
        self.error_source = None;
    }

    /// The single pending reset deadline, if an alert is active.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.state.expires_at()
    }

    pub fn state(&self) -> &AlertState {
        &self.state
    }

    pub fn connection(&self, source: SourceTag) -> Option<&ConnectionStatus> {
        self.connections.get(&source)
    }

    pub fn snapshot(&self) -> AlertSnapshot {
        self.state.snapshot(
            &self.connections,
            &self.status_message,
            self.last_error.as_deref(),
        )
    }
}

/// Cloneable handle for feeding and observing a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    inbox: mpsc::UnboundedSender<EngineInput>,
    snapshots: watch::Receiver<AlertSnapshot>,
}

impl EngineHandle {
    /// Queue a raw payload as if it arrived now.
    pub fn submit(&self, source: SourceTag, payload: RawPayload) -> bool {
        self.send(EngineInput::Payload {
            source,
            payload,
            received_at: Instant::now(),
        })
    }

    /// Zero-argument reset exposed to the presentation layer.
    pub fn manual_reset(&self) -> bool {
        self.send(EngineInput::ManualReset)
    }

    pub fn report_feedback_error(&self, err: &FeedbackDispatchError) -> bool {
        self.send(EngineInput::FeedbackFailed(err.to_string()))
    }

    pub fn shutdown(&self) -> bool {
        self.send(EngineInput::Shutdown)
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> AlertSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified after every state change.
    pub fn subscribe(&self) -> watch::Receiver<AlertSnapshot> {
        self.snapshots.clone()
    }

    pub(crate) fn inbox(&self) -> mpsc::UnboundedSender<EngineInput> {
        self.inbox.clone()
    }

    fn send(&self, input: EngineInput) -> bool {
        self.inbox.send(input).is_ok()
    }
}

/// The single-writer task around [`AlertLifecycle`].
pub struct AlertEngine {
    lifecycle: AlertLifecycle,
    inbox: mpsc::UnboundedReceiver<EngineInput>,
    snapshots: watch::Sender<AlertSnapshot>,
    feedback: Option<mpsc::UnboundedSender<FeedbackCommand>>,
}

impl AlertEngine {
    pub fn new(
        config: AlertEngineConfig,
        feedback: Option<mpsc::UnboundedSender<FeedbackCommand>>,
    ) -> (Self, EngineHandle) {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let lifecycle = AlertLifecycle::new(config);
        let (snapshot_tx, snapshot_rx) = watch::channel(lifecycle.snapshot());

        let engine = Self {
            lifecycle,
            inbox: inbox_rx,
            snapshots: snapshot_tx,
            feedback,
        };
        let handle = EngineHandle {
            inbox: inbox_tx,
            snapshots: snapshot_rx,
        };
        (engine, handle)
    }

    /// Build the engine and run it on the current tokio runtime.
    pub fn spawn(
        config: AlertEngineConfig,
        feedback: Option<mpsc::UnboundedSender<FeedbackCommand>>,
    ) -> (EngineHandle, JoinHandle<()>) {
        let (engine, handle) = Self::new(config, feedback);
        let task = tokio::spawn(engine.run());
        (handle, task)
    }

    pub async fn run(mut self) {
        info!("Alert engine started");
        loop {
            let deadline = self.lifecycle.next_deadline();
            tokio::select! {
                // Pending inputs win over an expiring deadline
                biased;

                input = self.inbox.recv() => match input {
                    Some(EngineInput::Shutdown) | None => break,
                    Some(input) => self.process(input),
                },
                _ = wait_for(deadline) => {
                    self.expire_if_due(Instant::now());
                }
            }
        }
        info!("Alert engine stopped");
    }

    /// Handle one input, then honor a deadline that passed meanwhile so a
    /// busy inbox cannot hold an alert up.
    fn process(&mut self, input: EngineInput) {
        self.handle(input);
        self.expire_if_due(Instant::now());
    }

    fn expire_if_due(&mut self, now: Instant) {
        if self.lifecycle.fire_timer(now) {
            debug!("Alert expired, back to idle");
            self.publish();
        }
    }

    fn handle(&mut self, input: EngineInput) {
        match input {
            EngineInput::Payload {
                source,
                payload,
                received_at,
            } => match normalize_at(source, &payload, received_at) {
                Ok(event) => {
                    debug!("{} event from {}: {}", event.headline(), source, event.raw_message);
                    if let Some(command) = self.lifecycle.accept(event) {
                        self.dispatch(command);
                    }
                    self.publish();
                }
                Err(e) => {
                    warn!("Dropping payload from {}: {}", source, e);
                }
            },
            EngineInput::Status { source, status } => {
                info!("{}", status.message(source));
                self.lifecycle.update_connection(source, status);
                self.publish();
            }
            EngineInput::ManualReset => {
                if self.lifecycle.manual_reset() {
                    debug!("Alert manually reset");
                }
                self.publish();
            }
            EngineInput::FeedbackFailed(message) => {
                self.lifecycle.record_error(message);
                self.publish();
            }
            EngineInput::Shutdown => {}
        }
    }

    fn dispatch(&mut self, command: FeedbackCommand) {
        let Some(feedback) = &self.feedback else {
            return;
        };
        if feedback.send(command).is_err() {
            let err = FeedbackDispatchError::DispatcherGone;
            error!("{}", err);
            self.lifecycle.record_error(err.to_string());
            self.feedback = None;
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.lifecycle.snapshot());
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
