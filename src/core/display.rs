//! Text rendering of engine snapshots for the terminal front end.

use std::fmt::Write;

use super::model::{AlertEvent, AlertKind};
use super::state::AlertSnapshot;

/// Headline plus detail line for the current alert, or the idle headline.
pub fn render_alert(current: Option<&AlertEvent>) -> String {
    match current {
        None => AlertKind::None.headline().to_string(),
        Some(event) if event.is_clear() => event.headline().to_string(),
        Some(event) => format!(
            "{}\n  intensity {:.1} | severity {} | direction {}",
            event.headline(),
            event.intensity,
            event.severity.as_str(),
            event.direction.as_str(),
        ),
    }
}

/// Full screen: alert, connection status and the latest error if any.
pub fn render_snapshot(snapshot: &AlertSnapshot) -> String {
    let mut out = render_alert(snapshot.current.as_ref());
    if !snapshot.status_message.is_empty() {
        let _ = write!(out, "\n[{}]", snapshot.status_message);
    }
    if let Some(err) = &snapshot.last_error {
        let _ = write!(out, "\n! {}", err);
    }
    out
}
