// Alert policy types and the feedback commands the engine emits.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::core::model::{AlertClass, AlertKind, Direction, Severity};

/// Haptic effect requested from the device driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HapticKind {
    ImpactLight,
    ImpactMedium,
    ImpactHeavy,
    NotificationWarning,
}

impl HapticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImpactLight => "impactLight",
            Self::ImpactMedium => "impactMedium",
            Self::ImpactHeavy => "impactHeavy",
            Self::NotificationWarning => "notificationWarning",
        }
    }
}

/// Per-class policy: how long the alert stays up and how it is signalled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertClassPolicy {
    /// Auto-reset delay in milliseconds
    pub reset_delay_ms: u64,
    /// Alternating wait/vibrate durations in milliseconds
    pub vibration_pattern_ms: Vec<u64>,
    pub haptic: HapticKind,
    /// Sound clip file name, `None` disables sound for this class
    #[serde(default)]
    pub sound_clip: Option<String>,
}

impl AlertClassPolicy {
    pub fn default_for(class: AlertClass) -> Self {
        match class {
            AlertClass::Horn => Self {
                reset_delay_ms: 5000,
                vibration_pattern_ms: vec![0, 500],
                haptic: HapticKind::ImpactHeavy,
                sound_clip: Some("alert1.mp3".to_string()),
            },
            AlertClass::Siren => Self {
                reset_delay_ms: 12000,
                vibration_pattern_ms: vec![0, 800, 400, 800, 400, 1200],
                haptic: HapticKind::NotificationWarning,
                sound_clip: Some("alert1.mp3".to_string()),
            },
        }
    }

    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reset_delay_ms)
    }

    pub fn vibration_pattern(&self) -> Vec<Duration> {
        self.vibration_pattern_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }
}

/// Alert engine configuration - persisted in settings.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEngineConfig {
    /// Per-class policy (reset delay, vibration, haptic, sound)
    pub classes: HashMap<AlertClass, AlertClassPolicy>,
    /// Optional cap on retained history; `None` keeps everything
    #[serde(default)]
    pub history_limit: Option<usize>,
}

impl Default for AlertEngineConfig {
    fn default() -> Self {
        let classes = AlertClass::all()
            .iter()
            .map(|class| (*class, AlertClassPolicy::default_for(*class)))
            .collect();
        Self {
            classes,
            history_limit: None,
        }
    }
}

impl AlertEngineConfig {
    /// Policy for a class, falling back to built-in defaults if absent
    pub fn policy(&self, class: AlertClass) -> AlertClassPolicy {
        self.classes
            .get(&class)
            .cloned()
            .unwrap_or_else(|| AlertClassPolicy::default_for(class))
    }

    pub fn reset_delay(&self, class: AlertClass) -> Duration {
        self.classes
            .get(&class)
            .map(AlertClassPolicy::reset_delay)
            .unwrap_or_else(|| AlertClassPolicy::default_for(class).reset_delay())
    }
}

/// Feedback bundle emitted on every transition into Active
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackCommand {
    pub kind: AlertKind,
    pub class: AlertClass,
    pub direction: Direction,
    pub severity: Severity,
    pub intensity: f32,
    pub vibration: Vec<Duration>,
    pub haptic: HapticKind,
    pub sound_clip: Option<String>,
}
