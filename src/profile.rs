//! Player profile store.
//!
//! The tracker never owns currency, inventory or level. It talks to a
//! [`ProfileStore`] handed to it at construction; [`PlayerProfile`] is the
//! in-memory implementation.
//!
//! Level is derived from total XP through the catalog's [`LevelTable`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::data::LevelTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Gold,
    /// Premium currency
    Crystals,
}

/// Local energy captured when a reward is applied, used to reconcile the
/// authoritative total that arrives with the confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergySnapshot {
    pub amount: i32,
    pub max: i32,
}

/// Authoritative energy state reported by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergyState {
    pub amount: i32,
    pub max: i32,
    #[serde(default)]
    pub next_restore_time: Option<DateTime<Utc>>,
}

/// New unit ("soul") granted by a reward response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitGrant {
    pub unit_id: String,
    #[serde(default = "default_one")]
    pub level: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitInfo {
    pub unit_id: String,
    pub level: i32,
}

/// Equipment item granted by a reward response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentGrant {
    pub item_id: String,
    #[serde(default = "default_one")]
    pub count: i32,
}

fn default_one() -> i32 {
    1
}

/// Operations the tracker needs from the player's profile
pub trait ProfileStore: Send {
    fn level(&self) -> i32;
    fn add_experience(&mut self, amount: i32, reason: &str);
    fn add_currency(&mut self, currency: Currency, amount: i32);
    fn add_material(&mut self, material_id: &str, amount: i32);
    /// Returns false if the inventory holds less than `amount`
    fn remove_material(&mut self, material_id: &str, amount: i32) -> bool;
    /// Grant energy and capture the baseline for later reconciliation
    fn add_energy(&mut self, amount: i32) -> EnergySnapshot;
    fn energy_snapshot(&self) -> EnergySnapshot;
    fn sync_energy(&mut self, server: &EnergyState, snapshot: &EnergySnapshot);
    /// Returns the new unit, or None if it was already owned
    fn add_unit(&mut self, grant: &UnitGrant) -> Option<UnitInfo>;
    fn add_equipment(&mut self, grant: &EquipmentGrant);
    fn is_mission_completed(&self, mission_id: &str) -> bool;
}

/// In-memory player profile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerProfile {
    pub xp: i64,
    pub gold: i64,
    pub crystals: i64,
    pub energy: i32,
    pub energy_max: i32,
    pub materials: HashMap<String, i32>,
    pub units: Vec<UnitInfo>,
    pub equipment: Vec<EquipmentGrant>,
    pub completed_missions: HashSet<String>,
    #[serde(skip)]
    levels: Arc<LevelTable>,
}

impl PlayerProfile {
    pub fn new(levels: Arc<LevelTable>) -> Self {
        let cap = levels.energy_cap(1);
        Self {
            xp: 0,
            gold: 0,
            crystals: 0,
            energy: cap,
            energy_max: cap,
            materials: HashMap::new(),
            units: Vec::new(),
            equipment: Vec::new(),
            completed_missions: HashSet::new(),
            levels,
        }
    }

    /// Profile starting at the first XP of `level`
    pub fn at_level(levels: Arc<LevelTable>, level: i32) -> Self {
        let xp = levels.total_xp_for_level(level);
        let cap = levels.energy_cap(level);
        Self {
            xp,
            energy: cap,
            energy_max: cap,
            ..Self::new(levels)
        }
    }

    /// Attach the level table after loading a saved profile
    pub fn set_levels(&mut self, levels: Arc<LevelTable>) {
        self.levels = levels;
    }

    pub fn material_count(&self, material_id: &str) -> i32 {
        self.materials.get(material_id).copied().unwrap_or(0)
    }

    pub fn complete_mission(&mut self, mission_id: &str) {
        self.completed_missions.insert(mission_id.to_string());
    }

    /// XP needed to reach next level
    pub fn xp_to_next_level(&self) -> i64 {
        let level = self.level();
        if level >= self.levels.max_level() {
            return 0;
        }
        self.levels.total_xp_for_level(level + 1) - self.xp
    }
}

impl Default for PlayerProfile {
    fn default() -> Self {
        Self::new(Arc::default())
    }
}

impl ProfileStore for PlayerProfile {
    fn level(&self) -> i32 {
        self.levels.level_for_xp(self.xp)
    }

    fn add_experience(&mut self, amount: i32, reason: &str) {
        if amount <= 0 {
            return;
        }
        let before = self.level();
        self.xp += amount as i64;
        let after = self.level();
        debug!("Added {} xp ({}), total {}", amount, reason, self.xp);

        if after > before {
            // Level-up raises the cap and refills
            self.energy_max = self.levels.energy_cap(after);
            self.energy = self.energy.max(self.energy_max);
            info!("Player leveled up {} -> {}", before, after);
        }
    }

    fn add_currency(&mut self, currency: Currency, amount: i32) {
        match currency {
            Currency::Gold => self.gold += amount as i64,
            Currency::Crystals => self.crystals += amount as i64,
        }
    }

    fn add_material(&mut self, material_id: &str, amount: i32) {
        *self.materials.entry(material_id.to_string()).or_insert(0) += amount;
    }

    fn remove_material(&mut self, material_id: &str, amount: i32) -> bool {
        match self.materials.get_mut(material_id) {
            Some(count) if *count >= amount => {
                *count -= amount;
                if *count == 0 {
                    self.materials.remove(material_id);
                }
                true
            }
            _ => false,
        }
    }

    fn add_energy(&mut self, amount: i32) -> EnergySnapshot {
        self.energy += amount;
        self.energy_snapshot()
    }

    fn energy_snapshot(&self) -> EnergySnapshot {
        EnergySnapshot {
            amount: self.energy,
            max: self.energy_max,
        }
    }

    fn sync_energy(&mut self, server: &EnergyState, snapshot: &EnergySnapshot) {
        let local_delta = self.energy - snapshot.amount;
        self.energy = (server.amount + local_delta).max(0);
        self.energy_max = server.max;
        debug!(
            "Energy synced: server {} + local {} = {}",
            server.amount, local_delta, self.energy
        );
    }

    fn add_unit(&mut self, grant: &UnitGrant) -> Option<UnitInfo> {
        if self.units.iter().any(|u| u.unit_id == grant.unit_id) {
            return None;
        }
        let unit = UnitInfo {
            unit_id: grant.unit_id.clone(),
            level: grant.level,
        };
        self.units.push(unit.clone());
        Some(unit)
    }

    fn add_equipment(&mut self, grant: &EquipmentGrant) {
        self.equipment.push(grant.clone());
    }

    fn is_mission_completed(&self, mission_id: &str) -> bool {
        self.completed_missions.contains(mission_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::level_def::test_table;

    fn profile() -> PlayerProfile {
        PlayerProfile::new(Arc::new(test_table()))
    }

    #[test]
    fn test_level_follows_table() {
        let mut profile = profile();
        assert_eq!(profile.level(), 1);
        assert_eq!(profile.xp_to_next_level(), 80);

        profile.add_experience(199, "test");
        assert_eq!(profile.level(), 2);
        assert_eq!(profile.xp_to_next_level(), 1);

        profile.add_experience(1_000_000, "test");
        assert_eq!(profile.level(), 10);
        assert_eq!(profile.xp_to_next_level(), 0);
    }

    #[test]
    fn test_at_level() {
        let profile = PlayerProfile::at_level(Arc::new(test_table()), 5);
        assert_eq!(profile.level(), 5);
        assert_eq!(profile.xp, 500);
        assert_eq!(profile.energy_max, 65);
    }

    #[test]
    fn test_level_up_raises_energy_cap() {
        let mut profile = profile();
        profile.energy = 10;
        profile.add_experience(100, "test");
        assert_eq!(profile.level(), 2);
        assert_eq!(profile.energy_max, 62);
        assert_eq!(profile.energy, 62);
    }

    #[test]
    fn test_saved_profile_needs_table_to_level() {
        let mut profile: PlayerProfile = serde_json::from_str(r#"{"xp": 400}"#).unwrap();
        assert_eq!(profile.level(), 1);

        profile.set_levels(Arc::new(test_table()));
        assert_eq!(profile.level(), 4);
    }

    #[test]
    fn test_materials() {
        let mut profile = profile();
        profile.add_material("ore", 3);
        assert!(!profile.remove_material("ore", 4));
        assert!(profile.remove_material("ore", 3));
        assert_eq!(profile.material_count("ore"), 0);
        assert!(!profile.remove_material("gem", 1));
    }

    #[test]
    fn test_sync_energy_keeps_later_local_changes() {
        let mut profile = profile();
        profile.energy = 20;
        let snapshot = profile.add_energy(30);
        assert_eq!(snapshot.amount, 50);

        // Player spends 5 energy before the confirmation arrives
        profile.energy -= 5;

        let server = EnergyState { amount: 52, max: 70, next_restore_time: None };
        profile.sync_energy(&server, &snapshot);
        assert_eq!(profile.energy, 47);
        assert_eq!(profile.energy_max, 70);
    }

    #[test]
    fn test_add_unit_rejects_duplicates() {
        let mut profile = profile();
        let grant = UnitGrant { unit_id: "knight".to_string(), level: 1 };
        assert!(profile.add_unit(&grant).is_some());
        assert!(profile.add_unit(&grant).is_none());
        assert_eq!(profile.units.len(), 1);
    }
}
