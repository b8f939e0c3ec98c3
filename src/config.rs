//! Runtime configuration, loaded from a TOML file.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Directory holding the catalog TOML files
    pub data_dir: PathBuf,
    /// JSON file with the saved profile and server quest state
    pub state_file: PathBuf,
    /// Name of the game timer that defines the daily reset boundary
    pub daily_reset_timer_id: String,
    /// Energy granted per energy ticket received as a reward
    pub energy_consume_amount: i32,
    /// Mission that unlocks quests; quests are always available when unset
    pub quests_required_mission: Option<String>,
    /// Mission that unlocks daily energy
    pub daily_energy_required_mission: Option<String>,
    /// Extra time added to every energy countdown
    pub energy_timer_slack_secs: u64,
    /// Simulated latency of the offline reward service
    pub reward_latency_ms: u64,
    /// Default tracing filter directive
    pub log_filter: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            state_file: PathBuf::from("state.json"),
            daily_reset_timer_id: "daily_reset".to_string(),
            energy_consume_amount: 10,
            quests_required_mission: None,
            daily_energy_required_mission: None,
            energy_timer_slack_secs: 1,
            reward_latency_ms: 250,
            log_filter: "quest_tracker=info".to_string(),
        }
    }
}

impl TrackerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("Failed to parse config: {}", e))
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
        Self::from_toml_str(&content)
    }

    /// Load `path`, falling back to defaults if it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            warn!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        Self::load(path)
    }
}
