//! Daily energy stage definitions.

use serde::{Deserialize, Serialize};

/// Longest accepted delay between stages (one week)
pub const MAX_ENERGY_DELAY_SECS: i64 = 7 * 24 * 60 * 60;

/// `daily_energy.toml`
#[derive(Debug, Clone, Deserialize)]
pub struct EnergyStageFile {
    #[serde(default)]
    pub stage: Vec<EnergyStageDef>,
}

/// One step of the delay-gated bonus energy sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergyStageDef {
    pub id: String,
    pub energy: i32,
    #[serde(default)]
    pub crystals: i32,
    /// Seconds after the previous stage was collected before this one is due
    #[serde(default)]
    pub delay_secs: i64,
}
