//! Material definitions referenced by quest rewards.

use serde::{Deserialize, Serialize};

/// How a material behaves when granted as a reward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialKind {
    #[default]
    Regular,
    /// Converted to energy on receipt instead of entering the inventory
    EnergyTicket,
}

/// Raw material data as it appears in TOML (keyed by id)
#[derive(Debug, Clone, Deserialize)]
pub struct RawMaterialDef {
    #[serde(default)]
    pub kind: MaterialKind,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialDef {
    pub id: String,
    pub kind: MaterialKind,
    pub display_name: String,
}

impl MaterialDef {
    pub fn from_raw(id: &str, raw: &RawMaterialDef) -> Self {
        Self {
            id: id.to_string(),
            kind: raw.kind,
            display_name: raw.display_name.clone().unwrap_or_else(|| id.to_string()),
        }
    }

    pub fn is_energy_ticket(&self) -> bool {
        self.kind == MaterialKind::EnergyTicket
    }
}
