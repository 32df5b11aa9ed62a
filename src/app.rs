use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};

use crate::core::{
    alerts::engine::{AlertEngine, EngineHandle},
    config::{ConfigManager, Settings},
    dispatch::{DeviceFeedback, FeedbackDispatcher},
    display::render_snapshot,
    error::AlertError,
    model::AlertClass,
    sources::{attach, DocumentFeedSource, MessageBusSource, Subscription},
    state::AlertSnapshot,
};

/// Commands typed on the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopCommand {
    Reset,
    Quit,
}

impl LoopCommand {
    fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "reset" | "r" => Some(Self::Reset),
            "quit" | "q" | "exit" => Some(Self::Quit),
            _ => None,
        }
    }
}

pub fn run() -> Result<(), AlertError> {
    init_logging();

    let config_manager = ConfigManager::from_env();
    let settings = config_manager.load();
    info!("Settings loaded from {:?}", config_manager.path());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| AlertError::Runtime(e.to_string()))?;
    runtime.block_on(serve(settings))
}

fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("info");
    if env_logger::Builder::from_env(env).try_init().is_err() {
        warn!("Logger already initialised");
    }
}

async fn serve(settings: Settings) -> Result<(), AlertError> {
    // Engine -> dispatcher command channel
    let (feedback_tx, feedback_rx) = mpsc::unbounded_channel();
    let (handle, engine_task) = AlertEngine::spawn(settings.alerts.clone(), Some(feedback_tx));

    let clips = sound_clips(&settings);
    let sound_dir = settings.sound_dir.clone();
    let dispatcher = FeedbackDispatcher::start(
        move || DeviceFeedback::open(sound_dir, &clips),
        feedback_rx,
        Some(handle.clone()),
    );

    let subscriptions = attach_sources(&settings, &handle);
    let renderer = tokio::spawn(render_loop(handle.subscribe()));

    let (command_tx, mut commands) = mpsc::channel(8);
    tokio::spawn(read_commands(command_tx));
    info!("Type `reset` to clear the current alert, `quit` to exit");

    loop {
        tokio::select! {
            Some(command) = commands.recv() => match command {
                LoopCommand::Reset => {
                    handle.manual_reset();
                }
                LoopCommand::Quit => break,
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("Cannot listen for ctrl-c: {}", e);
                }
                break;
            }
        }
    }

    info!("Shutting down");
    for subscription in &subscriptions {
        subscription.unsubscribe();
    }
    handle.shutdown();
    engine_task
        .await
        .map_err(|e| AlertError::Runtime(e.to_string()))?;
    renderer.abort();
    drop(handle);

    // The engine dropped its command sender, so the dispatcher drains and exits
    tokio::task::spawn_blocking(move || dispatcher.join())
        .await
        .map_err(|e| AlertError::Runtime(e.to_string()))?;
    Ok(())
}

fn attach_sources(settings: &Settings, handle: &EngineHandle) -> Vec<Subscription> {
    let mut subscriptions = Vec::new();
    if settings.document_feed.enabled {
        let source = DocumentFeedSource::from_settings(&settings.document_feed);
        subscriptions.push(attach(Box::new(source), handle));
    }
    if settings.message_bus.enabled {
        let source = MessageBusSource::from_settings(&settings.message_bus);
        subscriptions.push(attach(Box::new(source), handle));
    }
    if subscriptions.is_empty() {
        warn!("No event sources enabled");
    }
    subscriptions
}

/// Distinct clips named by the alert policy, preloaded by the sound player.
fn sound_clips(settings: &Settings) -> Vec<String> {
    let mut clips: Vec<String> = AlertClass::all()
        .iter()
        .filter_map(|class| settings.alerts.policy(*class).sound_clip)
        .collect();
    clips.sort();
    clips.dedup();
    clips
}

async fn render_loop(mut snapshots: watch::Receiver<AlertSnapshot>) {
    let mut last = String::new();
    loop {
        let screen = render_snapshot(&snapshots.borrow_and_update());
        if screen != last {
            println!("{}\n", screen);
            last = screen;
        }
        if snapshots.changed().await.is_err() {
            break;
        }
    }
}

async fn read_commands(tx: mpsc::Sender<LoopCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match LoopCommand::parse(&line) {
                Some(command) => {
                    if tx.send(command).await.is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => warn!("Unknown command: {}", line.trim()),
            },
            // Closed stdin leaves ctrl-c as the way out
            Ok(None) => break,
            Err(e) => {
                warn!("Cannot read stdin: {}", e);
                break;
            }
        }
    }
}
