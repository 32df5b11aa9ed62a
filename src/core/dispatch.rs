// Feedback dispatcher: turns FeedbackCommands into device calls.
//
// Runs on its own thread so the audio output (not Send on every platform) is
// opened, used and dropped in one place. Commands are executed one at a time,
// so overlapping sound requests queue up instead of mixing. Failures are
// logged and reported back to the engine; they never undo an alert.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::mpsc;

use super::alerts::engine::EngineHandle;
use super::alerts::model::{FeedbackCommand, HapticKind};
use super::error::FeedbackDispatchError;

/// Device modalities the dispatcher drives.
pub trait FeedbackDriver {
    /// Alternating wait/vibrate durations.
    fn vibrate(&mut self, pattern: &[Duration]) -> Result<(), FeedbackDispatchError>;

    fn play_sound(&mut self, clip: &str) -> Result<(), FeedbackDispatchError>;

    fn haptic(&mut self, kind: HapticKind) -> Result<(), FeedbackDispatchError>;
}

/// Run every modality for one command, collecting failures.
pub fn execute<D: FeedbackDriver + ?Sized>(
    driver: &mut D,
    command: &FeedbackCommand,
) -> Vec<FeedbackDispatchError> {
    let mut failures = Vec::new();
    if let Err(e) = driver.vibrate(&command.vibration) {
        failures.push(e);
    }
    if let Err(e) = driver.haptic(command.haptic) {
        failures.push(e);
    }
    if let Some(clip) = &command.sound_clip {
        if let Err(e) = driver.play_sound(clip) {
            failures.push(e);
        }
    }
    failures
}

/// Owns the dispatcher thread. Dropping every command sender stops it.
pub struct FeedbackDispatcher {
    thread: Option<thread::JoinHandle<()>>,
}

impl FeedbackDispatcher {
    /// Spawn the dispatcher thread consuming `commands`. `make_driver` runs
    /// on that thread.
    pub fn start<D, F>(
        make_driver: F,
        mut commands: mpsc::UnboundedReceiver<FeedbackCommand>,
        reporter: Option<EngineHandle>,
    ) -> Self
    where
        D: FeedbackDriver,
        F: FnOnce() -> D + Send + 'static,
    {
        let thread = thread::Builder::new()
            .name("feedback-dispatch".to_string())
            .spawn(move || {
                let mut driver = make_driver();
                while let Some(command) = commands.blocking_recv() {
                    for err in execute(&mut driver, &command) {
                        error!("Feedback for {:?} failed: {}", command.kind, err);
                        if let Some(reporter) = &reporter {
                            reporter.report_feedback_error(&err);
                        }
                    }
                }
                info!("Feedback dispatcher stopped");
            });

        let thread = match thread {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("Cannot start feedback dispatcher: {}", e);
                None
            }
        };
        Self { thread }
    }

    /// Wait for the thread to drain and exit.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Feedback dispatcher panicked");
            }
        }
    }
}

/// Audio output with clips preloaded into memory.
pub struct SoundPlayer {
    _stream: rodio::OutputStream,
    sink: rodio::Sink,
    sound_dir: PathBuf,
    clips: HashMap<String, Vec<u8>>,
}

impl SoundPlayer {
    /// Open the default output device and preload `clips` from `sound_dir`.
    pub fn open(sound_dir: impl Into<PathBuf>, clips: &[String]) -> Result<Self, FeedbackDispatchError> {
        let mut stream = rodio::OutputStreamBuilder::open_default_stream()
            .map_err(|e| FeedbackDispatchError::AudioUnavailable(e.to_string()))?;
        stream.log_on_drop(false);
        let sink = rodio::Sink::connect_new(stream.mixer());

        let sound_dir = sound_dir.into();
        let mut loaded = HashMap::new();
        for clip in clips {
            match load_clip(&sound_dir, clip) {
                Ok(bytes) => {
                    loaded.insert(clip.clone(), bytes);
                }
                Err(e) => warn!("Sound clip not preloaded: {}", e),
            }
        }
        info!("Audio ready, {} clip(s) loaded", loaded.len());

        Ok(Self {
            _stream: stream,
            sink,
            sound_dir,
            clips: loaded,
        })
    }

    /// Queue a clip behind anything already playing.
    pub fn play(&mut self, clip: &str) -> Result<(), FeedbackDispatchError> {
        if !self.clips.contains_key(clip) {
            let bytes = load_clip(&self.sound_dir, clip)?;
            self.clips.insert(clip.to_string(), bytes);
        }
        let bytes = self
            .clips
            .get(clip)
            .cloned()
            .ok_or_else(|| FeedbackDispatchError::PlaybackFailed(clip.to_string()))?;

        let source = rodio::Decoder::new(Cursor::new(bytes)).map_err(|e| {
            FeedbackDispatchError::Decode {
                clip: clip.to_string(),
                reason: e.to_string(),
            }
        })?;
        self.sink.append(source);
        Ok(())
    }
}

fn load_clip(sound_dir: &Path, clip: &str) -> Result<Vec<u8>, FeedbackDispatchError> {
    let path = sound_dir.join(clip);
    let file = File::open(&path).map_err(|_| FeedbackDispatchError::SoundMissing(path.clone()))?;
    let mut bytes = Vec::new();
    BufReader::new(file)
        .read_to_end(&mut bytes)
        .map_err(|_| FeedbackDispatchError::SoundMissing(path))?;
    Ok(bytes)
}

/// Default driver: sound through [`SoundPlayer`], vibration and haptics logged.
///
/// Vibration motors and haptic engines live on the phone side; here they are
/// represented by log lines so the pipeline can run on any host.
pub struct DeviceFeedback {
    player: Option<SoundPlayer>,
}

impl DeviceFeedback {
    pub fn new(player: Option<SoundPlayer>) -> Self {
        Self { player }
    }

    /// Try to open audio; fall back to silent operation if there is no device.
    pub fn open(sound_dir: impl Into<PathBuf>, clips: &[String]) -> Self {
        match SoundPlayer::open(sound_dir, clips) {
            Ok(player) => Self::new(Some(player)),
            Err(e) => {
                warn!("Running without sound: {}", e);
                Self::new(None)
            }
        }
    }
}

impl FeedbackDriver for DeviceFeedback {
    fn vibrate(&mut self, pattern: &[Duration]) -> Result<(), FeedbackDispatchError> {
        let millis: Vec<u128> = pattern.iter().map(Duration::as_millis).collect();
        info!("Vibrate {:?}", millis);
        Ok(())
    }

    fn play_sound(&mut self, clip: &str) -> Result<(), FeedbackDispatchError> {
        match &mut self.player {
            Some(player) => player.play(clip),
            None => Err(FeedbackDispatchError::AudioUnavailable(
                "no output device".to_string(),
            )),
        }
    }

    fn haptic(&mut self, kind: HapticKind) -> Result<(), FeedbackDispatchError> {
        info!("Haptic {}", kind.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::engine::AlertEngine;
    use crate::core::alerts::model::AlertEngineConfig;
    use crate::core::model::{AlertClass, AlertKind, Direction, RawPayload, Severity, SourceTag};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<String>>>,
        fail_sound: bool,
    }

    impl FeedbackDriver for Recorder {
        fn vibrate(&mut self, pattern: &[Duration]) -> Result<(), FeedbackDispatchError> {
            self.calls.lock().unwrap().push(format!("vibrate:{}", pattern.len()));
            Ok(())
        }

        fn play_sound(&mut self, clip: &str) -> Result<(), FeedbackDispatchError> {
            if self.fail_sound {
                return Err(FeedbackDispatchError::SoundMissing(PathBuf::from(clip)));
            }
            self.calls.lock().unwrap().push(format!("sound:{}", clip));
            Ok(())
        }

        fn haptic(&mut self, kind: HapticKind) -> Result<(), FeedbackDispatchError> {
            self.calls.lock().unwrap().push(format!("haptic:{}", kind.as_str()));
            Ok(())
        }
    }

    fn command(sound: Option<&str>) -> FeedbackCommand {
        FeedbackCommand {
            kind: AlertKind::HornLeft,
            class: AlertClass::Horn,
            direction: Direction::Left,
            severity: Severity::High,
            intensity: 10.0,
            vibration: vec![Duration::ZERO, Duration::from_millis(500)],
            haptic: HapticKind::ImpactHeavy,
            sound_clip: sound.map(str::to_string),
        }
    }

    #[test]
    fn test_execute_runs_all_modalities() {
        let mut recorder = Recorder::default();
        let failures = execute(&mut recorder, &command(Some("alert1.mp3")));
        assert!(failures.is_empty());
        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec!["vibrate:2", "haptic:impactHeavy", "sound:alert1.mp3"]
        );
    }

    #[test]
    fn test_execute_skips_disabled_sound() {
        let mut recorder = Recorder::default();
        execute(&mut recorder, &command(None));
        assert_eq!(recorder.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_sound_failure_still_runs_other_modalities() {
        let mut recorder = Recorder {
            fail_sound: true,
            ..Recorder::default()
        };
        let failures = execute(&mut recorder, &command(Some("missing.mp3")));
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], FeedbackDispatchError::SoundMissing(_)));
        assert_eq!(recorder.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_device_without_audio_reports_unavailable() {
        let mut device = DeviceFeedback::new(None);
        assert!(device.vibrate(&[Duration::ZERO]).is_ok());
        assert!(matches!(
            device.play_sound("alert1.mp3"),
            Err(FeedbackDispatchError::AudioUnavailable(_))
        ));
    }

    #[test]
    fn test_load_clip_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_clip(dir.path(), "nope.mp3"),
            Err(FeedbackDispatchError::SoundMissing(_))
        ));
        std::fs::write(dir.path().join("a.mp3"), b"abc").unwrap();
        assert_eq!(load_clip(dir.path(), "a.mp3").unwrap(), b"abc".to_vec());
    }

    #[test]
    fn test_dispatcher_thread_drains_and_stops() {
        let recorder = Recorder::default();
        let calls = Arc::clone(&recorder.calls);
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = FeedbackDispatcher::start(move || recorder, rx, None);

        tx.send(command(Some("a.mp3"))).unwrap();
        tx.send(command(Some("b.mp3"))).unwrap();
        drop(tx);
        dispatcher.join();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 6);
        assert_eq!(calls[2], "sound:a.mp3");
        assert_eq!(calls[5], "sound:b.mp3");
    }

    #[tokio::test]
    async fn test_failure_is_reported_without_undoing_alert() {
        let recorder = Recorder {
            fail_sound: true,
            ..Recorder::default()
        };
        let (feedback_tx, feedback_rx) = mpsc::unbounded_channel();
        let (engine, handle) = AlertEngine::new(AlertEngineConfig::default(), Some(feedback_tx));
        let engine_task = tokio::spawn(engine.run());
        let dispatcher =
            FeedbackDispatcher::start(move || recorder, feedback_rx, Some(handle.clone()));

        let mut snapshots = handle.subscribe();
        handle.submit(SourceTag::MessageBus, RawPayload::Text("siren".into()));

        let snapshot = loop {
            snapshots.changed().await.unwrap();
            let snapshot = snapshots.borrow_and_update().clone();
            if snapshot.last_error.is_some() {
                break snapshot;
            }
        };
        assert!(snapshot.is_active());
        assert!(snapshot.last_error.unwrap().contains("sound clip not found"));

        handle.shutdown();
        engine_task.await.unwrap();
        drop(handle);
        tokio::task::spawn_blocking(move || dispatcher.join()).await.unwrap();
    }
}
