use serde::Deserialize;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use quest_tracker::config::TrackerConfig;
use quest_tracker::data::GameCatalog;
use quest_tracker::profile::PlayerProfile;
use quest_tracker::quest::{OfflineRewardService, QuestTracker, ServerQuestState};
use quest_tracker::schedule::{SystemClock, TokioScheduler};
use quest_tracker::session::{QuestSession, SessionCommand, SessionHandle};

const DEFAULT_CONFIG_PATH: &str = "quest-tracker.toml";

/// Saved profile and the server quest payload it was loaded with
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SavedState {
    profile: PlayerProfile,
    quests: ServerQuestState,
}

fn load_state(path: &Path) -> Result<SavedState, String> {
    if !path.exists() {
        warn!("State file {:?} not found, starting a fresh profile", path);
        return Ok(SavedState::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse {:?}: {}", path, e))
}

fn init_logging(default_directive: &str) {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    match default_directive.parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("Ignoring invalid log filter '{}': {}", default_directive, e),
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Forward console lines to the session. EOF shuts the session down.
fn spawn_console(handle: SessionHandle) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match SessionCommand::parse(&line) {
                Ok(command) => {
                    if handle.send(command).is_err() {
                        return;
                    }
                }
                Err(e) => warn!("{}", e),
            }
        }
        handle.shutdown();
    });
}

async fn run(config: TrackerConfig) -> Result<(), String> {
    let mut catalog = GameCatalog::new();
    catalog.load_from_directory(&config.data_dir)?;
    let catalog = Arc::new(catalog);

    let state = load_state(&config.state_file)?;
    let latency = Duration::from_millis(config.reward_latency_ms);

    let mut profile = state.profile;
    profile.set_levels(catalog.levels());

    let (scheduler, timers) = TokioScheduler::new();
    let mut tracker = QuestTracker::new(
        catalog,
        config,
        profile,
        Arc::new(SystemClock),
        Box::new(scheduler),
    )?;

    tracker.subscribe(|event| match serde_json::to_string(event) {
        Ok(json) => info!("Event {}", json),
        Err(_) => info!("Event {:?}", event),
    });
    tracker.init(&state.quests);

    let service = Arc::new(OfflineRewardService::new(latency));
    let (session, handle) = QuestSession::new(tracker, service, timers);

    let ctrl_c = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
        }
        ctrl_c.shutdown();
    });
    spawn_console(handle);

    let tracker = session.run().await;
    info!(
        "Final state: {} daily, {} main quests, reward waiting: {}",
        tracker.daily_quests().len(),
        tracker.main_quests().len(),
        tracker.is_reward_waiting()
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let config = TrackerConfig::load_or_default(&config_path);
    let log_filter = config
        .as_ref()
        .map(|c| c.log_filter.clone())
        .unwrap_or_else(|_| TrackerConfig::default().log_filter);
    init_logging(&log_filter);

    let result = match config {
        Ok(config) => {
            info!("Using config {:?}", config_path);
            run(config).await
        }
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        error!("Quest tracker failed: {}", e);
        std::process::exit(1);
    }
}
