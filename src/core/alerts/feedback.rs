// Feedback decision: which modalities fire for an accepted alert.
//
// Only transitions into Active produce feedback. Clear signals and
// timer-driven resets never do.

use super::model::{AlertEngineConfig, FeedbackCommand};
use crate::core::model::AlertEvent;

/// Build the feedback bundle for an event, or `None` for a clear signal.
pub fn decide_feedback(event: &AlertEvent, config: &AlertEngineConfig) -> Option<FeedbackCommand> {
    let class = event.kind.class()?;
    let policy = config.policy(class);

    Some(FeedbackCommand {
        kind: event.kind,
        class,
        direction: event.direction,
        severity: event.severity,
        intensity: event.intensity,
        vibration: policy.vibration_pattern(),
        haptic: policy.haptic,
        sound_clip: policy.sound_clip,
    })
}
