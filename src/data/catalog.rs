//! Static reference data registry.
//!
//! Loads quest, login, energy, material, timer and level definitions from a data
//! directory of TOML files. Each file is optional; a missing file leaves the
//! corresponding catalog empty.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::energy_def::{EnergyStageDef, EnergyStageFile, MAX_ENERGY_DELAY_SECS};
use super::game_timer::GameTimerDef;
use super::level_def::LevelTable;
use super::material_def::{MaterialDef, RawMaterialDef};
use super::quest_def::{
    DailyGoal, DailyQuestDef, LoginCycleDef, MainQuestDef, RawDailyQuestFile, RawLoginFile,
    RawMainQuestFile,
};

/// Registry for all static quest-related definitions
pub struct GameCatalog {
    /// Daily definitions in file order
    daily: Vec<Arc<DailyQuestDef>>,
    main: HashMap<String, Arc<MainQuestDef>>,
    login: BTreeMap<i32, LoginCycleDef>,
    /// Ordered energy stages
    energy_stages: Vec<EnergyStageDef>,
    materials: HashMap<String, MaterialDef>,
    timers: HashMap<String, GameTimerDef>,
    levels: Arc<LevelTable>,
}

impl GameCatalog {
    pub fn new() -> Self {
        Self {
            daily: Vec::new(),
            main: HashMap::new(),
            login: BTreeMap::new(),
            energy_stages: Vec::new(),
            materials: HashMap::new(),
            timers: HashMap::new(),
            levels: Arc::default(),
        }
    }

    /// Load every catalog file found under `data_dir`
    pub fn load_from_directory(&mut self, data_dir: &Path) -> Result<(), String> {
        if !data_dir.exists() {
            warn!("Data directory does not exist: {:?}", data_dir);
            return Ok(());
        }

        let quests_dir = data_dir.join("quests");
        if let Some(content) = read_optional(&quests_dir.join("daily.toml"))? {
            self.parse_daily_quests(&content)?;
        }
        if let Some(content) = read_optional(&quests_dir.join("main.toml"))? {
            self.parse_main_quests(&content)?;
        }
        if let Some(content) = read_optional(&quests_dir.join("login.toml"))? {
            self.parse_login_cycles(&content)?;
        }
        if let Some(content) = read_optional(&data_dir.join("daily_energy.toml"))? {
            self.parse_energy_stages(&content)?;
        }
        if let Some(content) = read_optional(&data_dir.join("materials.toml"))? {
            self.parse_materials(&content)?;
        }
        if let Some(content) = read_optional(&data_dir.join("timers.toml"))? {
            self.parse_timers(&content)?;
        }
        if let Some(content) = read_optional(&data_dir.join("levels.toml"))? {
            self.parse_levels(&content)?;
        }

        info!(
            "Loaded catalog: {} daily, {} main, {} login cycles, {} energy stages, {} materials, {} timers, {} levels",
            self.daily.len(),
            self.main.len(),
            self.login.len(),
            self.energy_stages.len(),
            self.materials.len(),
            self.timers.len(),
            self.levels.max_level()
        );

        Ok(())
    }

    /// Parse daily quest definitions. Invalid entries are skipped with a warning.
    pub fn parse_daily_quests(&mut self, content: &str) -> Result<usize, String> {
        let raw: RawDailyQuestFile = toml::from_str(content)
            .map_err(|e| format!("Failed to parse daily quests: {}", e))?;

        let mut count = 0;
        for entry in &raw.daily {
            match DailyQuestDef::from_raw(entry) {
                Ok(def) => {
                    if let Some(pos) = self.daily.iter().position(|d| d.id == def.id) {
                        warn!("Duplicate daily quest ID '{}', overwriting", def.id);
                        self.daily[pos] = Arc::new(def);
                    } else {
                        self.daily.push(Arc::new(def));
                    }
                    count += 1;
                }
                Err(e) => warn!("Skipping daily quest: {}", e),
            }
        }
        Ok(count)
    }

    pub fn parse_main_quests(&mut self, content: &str) -> Result<usize, String> {
        let raw: RawMainQuestFile = toml::from_str(content)
            .map_err(|e| format!("Failed to parse main quests: {}", e))?;

        let mut count = 0;
        for entry in &raw.main {
            match MainQuestDef::from_raw(entry) {
                Ok(def) => {
                    if self.main.contains_key(&def.id) {
                        warn!("Duplicate main quest ID '{}', overwriting", def.id);
                    }
                    self.main.insert(def.id.clone(), Arc::new(def));
                    count += 1;
                }
                Err(e) => warn!("Skipping main quest: {}", e),
            }
        }
        Ok(count)
    }

    pub fn parse_login_cycles(&mut self, content: &str) -> Result<usize, String> {
        let raw: RawLoginFile = toml::from_str(content)
            .map_err(|e| format!("Failed to parse login rewards: {}", e))?;

        for entry in &raw.cycle {
            if self.login.contains_key(&entry.cycle) {
                warn!("Duplicate login cycle {}, overwriting", entry.cycle);
            }
            self.login.insert(entry.cycle, LoginCycleDef::from_raw(entry));
        }
        Ok(raw.cycle.len())
    }

    /// Energy stages replace any previously loaded sequence; order is significant.
    pub fn parse_energy_stages(&mut self, content: &str) -> Result<usize, String> {
        let raw: EnergyStageFile = toml::from_str(content)
            .map_err(|e| format!("Failed to parse energy stages: {}", e))?;

        if let Some(stage) = raw.stage.iter().find(|s| s.delay_secs < 0) {
            return Err(format!("Energy stage '{}' has negative delay", stage.id));
        }
        if let Some(stage) = raw.stage.iter().find(|s| s.delay_secs > MAX_ENERGY_DELAY_SECS) {
            return Err(format!(
                "Energy stage '{}' delay {}s exceeds {}s",
                stage.id, stage.delay_secs, MAX_ENERGY_DELAY_SECS
            ));
        }
        // The first stage's delay restarts from "now" on every recomputation
        if let Some(first) = raw.stage.first().filter(|s| s.delay_secs > 0) {
            warn!(
                "First energy stage '{}' has delay {}s and will never become due",
                first.id, first.delay_secs
            );
        }

        self.energy_stages = raw.stage;
        Ok(self.energy_stages.len())
    }

    pub fn parse_materials(&mut self, content: &str) -> Result<usize, String> {
        let table: HashMap<String, RawMaterialDef> = toml::from_str(content)
            .map_err(|e| format!("Failed to parse materials: {}", e))?;

        let count = table.len();
        for (id, raw) in table {
            if self.materials.contains_key(&id) {
                warn!("Duplicate material ID '{}', overwriting", id);
            }
            let material = MaterialDef::from_raw(&id, &raw);
            self.materials.insert(id, material);
        }
        Ok(count)
    }

    pub fn parse_timers(&mut self, content: &str) -> Result<usize, String> {
        let table: HashMap<String, GameTimerDef> = toml::from_str(content)
            .map_err(|e| format!("Failed to parse timers: {}", e))?;

        let count = table.len();
        for (id, timer) in table {
            timer.validate().map_err(|e| format!("Timer '{}': {}", id, e))?;
            self.timers.insert(id, timer);
        }
        Ok(count)
    }

    /// Replaces the level table; the whole table is rejected if invalid
    pub fn parse_levels(&mut self, content: &str) -> Result<usize, String> {
        let table = LevelTable::from_toml_str(content)?;
        let count = table.max_level() as usize;
        self.levels = Arc::new(table);
        Ok(count)
    }

    /// Get a daily quest definition by ID
    pub fn daily_by_id(&self, id: &str) -> Option<&Arc<DailyQuestDef>> {
        self.daily.iter().find(|d| d.id == id)
    }

    pub fn daily_defs(&self) -> &[Arc<DailyQuestDef>] {
        &self.daily
    }

    /// Get a main quest definition by ID
    pub fn main_by_id(&self, id: &str) -> Option<&Arc<MainQuestDef>> {
        self.main.get(id)
    }

    pub fn login_cycle(&self, cycle: i32) -> Option<&LoginCycleDef> {
        self.login.get(&cycle)
    }

    pub fn energy_stage(&self, step: usize) -> Option<&EnergyStageDef> {
        self.energy_stages.get(step)
    }

    pub fn energy_stage_count(&self) -> usize {
        self.energy_stages.len()
    }

    pub fn material(&self, id: &str) -> Option<&MaterialDef> {
        self.materials.get(id)
    }

    pub fn timer(&self, id: &str) -> Option<&GameTimerDef> {
        self.timers.get(id)
    }

    pub fn levels(&self) -> Arc<LevelTable> {
        Arc::clone(&self.levels)
    }

    /// For each daily goal, the definition with the highest required level
    /// not exceeding `level`. Goals with no eligible definition are absent.
    pub fn select_daily_for_level(&self, level: i32) -> BTreeMap<DailyGoal, Arc<DailyQuestDef>> {
        let mut selected: BTreeMap<DailyGoal, Arc<DailyQuestDef>> = BTreeMap::new();

        for def in &self.daily {
            if def.required_level > level {
                continue;
            }
            let replace = selected
                .get(&def.goal)
                .map_or(true, |current| current.required_level < def.required_level);
            if replace {
                selected.insert(def.goal, Arc::clone(def));
            }
        }

        selected
    }
}

impl Default for GameCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, String> {
    if !path.exists() {
        warn!("Catalog file does not exist: {:?}", path);
        return Ok(None);
    }
    fs::read_to_string(path)
        .map(Some)
        .map_err(|e| format!("Failed to read {:?}: {}", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DAILY: &str = r#"
[[daily]]
id = "win_low"
goal = "win_battle"
target = 2
required_level = 1

[[daily]]
id = "win_mid"
goal = "win_battle"
target = 4
required_level = 5

[[daily]]
id = "win_high"
goal = "win_battle"
target = 8
required_level = 10

[[daily]]
id = "arena"
goal = "arena_fight"
required_level = 7

[[daily]]
id = "broken"
goal = "teleport"
"#;

    #[test]
    fn test_invalid_daily_entries_are_skipped() {
        let mut catalog = GameCatalog::new();
        let loaded = catalog.parse_daily_quests(DAILY).unwrap();
        assert_eq!(loaded, 4);
        assert!(catalog.daily_by_id("broken").is_none());
    }

    #[test]
    fn test_select_daily_picks_highest_eligible_level() {
        let mut catalog = GameCatalog::new();
        catalog.parse_daily_quests(DAILY).unwrap();

        let at_five = catalog.select_daily_for_level(5);
        assert_eq!(at_five.len(), 1);
        assert_eq!(at_five[&DailyGoal::WinBattle].id, "win_mid");

        let at_ten = catalog.select_daily_for_level(10);
        assert_eq!(at_ten[&DailyGoal::WinBattle].id, "win_high");
        assert_eq!(at_ten[&DailyGoal::ArenaFight].id, "arena");

        assert!(catalog.select_daily_for_level(0).is_empty());
    }

    #[test]
    fn test_negative_energy_delay_rejected() {
        let mut catalog = GameCatalog::new();
        let result = catalog.parse_energy_stages(
            r#"
[[stage]]
id = "s1"
energy = 10
delay_secs = -5
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_oversized_energy_delay_rejected() {
        let mut catalog = GameCatalog::new();
        let result = catalog.parse_energy_stages(
            r#"
[[stage]]
id = "s1"
energy = 10

[[stage]]
id = "s2"
energy = 10
delay_secs = 10000000000000
"#,
        );
        assert!(result.is_err());
        assert_eq!(catalog.energy_stage_count(), 0);
    }

    #[test]
    fn test_load_from_directory() {
        let temp_dir = TempDir::new().unwrap();
        let quests_dir = temp_dir.path().join("quests");
        std::fs::create_dir_all(&quests_dir).unwrap();

        std::fs::write(quests_dir.join("daily.toml"), DAILY).unwrap();
        std::fs::write(
            quests_dir.join("main.toml"),
            r#"
[[main]]
id = "reach_5"
goal = "reach_level"
target = 5
xp = 100
"#,
        )
        .unwrap();
        std::fs::write(
            quests_dir.join("login.toml"),
            r#"
[[cycle]]
cycle = 0

[[cycle.day]]
gold = 50

[[cycle.day]]
crystals = 5
"#,
        )
        .unwrap();
        std::fs::write(
            temp_dir.path().join("daily_energy.toml"),
            r#"
[[stage]]
id = "morning"
energy = 30

[[stage]]
id = "noon"
energy = 30
crystals = 2
delay_secs = 3600
"#,
        )
        .unwrap();
        std::fs::write(
            temp_dir.path().join("materials.toml"),
            r#"
[energy_ticket]
kind = "energy_ticket"

[iron_ore]
display_name = "Iron Ore"
"#,
        )
        .unwrap();
        std::fs::write(
            temp_dir.path().join("timers.toml"),
            r#"
[daily_reset]
kind = "daily"
hour = 4
"#,
        )
        .unwrap();
        std::fs::write(
            temp_dir.path().join("levels.toml"),
            r#"
[[level]]
xp = 0
energy_cap = 60

[[level]]
xp = 100
energy_cap = 65
"#,
        )
        .unwrap();

        let mut catalog = GameCatalog::new();
        catalog.load_from_directory(temp_dir.path()).unwrap();

        assert_eq!(catalog.daily_defs().len(), 4);
        assert_eq!(catalog.main_by_id("reach_5").unwrap().reward.xp, 100);
        assert_eq!(catalog.login_cycle(0).unwrap().days.len(), 2);
        assert_eq!(catalog.energy_stage_count(), 2);
        assert_eq!(catalog.energy_stage(1).unwrap().delay_secs, 3600);
        assert!(catalog.material("energy_ticket").unwrap().is_energy_ticket());
        assert_eq!(catalog.material("iron_ore").unwrap().display_name, "Iron Ore");
        assert!(catalog.timer("daily_reset").is_some());
        assert_eq!(catalog.levels().max_level(), 2);
        assert_eq!(catalog.levels().energy_cap(2), 65);
    }

    #[test]
    fn test_missing_directory_is_not_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut catalog = GameCatalog::new();
        assert!(catalog.load_from_directory(&temp_dir.path().join("nope")).is_ok());
        assert!(catalog.daily_defs().is_empty());
    }

    #[test]
    fn test_bundled_data_loads() {
        let data_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("data");
        let mut catalog = GameCatalog::new();
        catalog.load_from_directory(&data_dir).unwrap();

        assert_eq!(catalog.daily_defs().len(), 7);
        assert!(catalog.main_by_id("main_reach_5").is_some());
        assert_eq!(catalog.login_cycle(0).unwrap().days.len(), 7);
        assert_eq!(catalog.energy_stage(0).unwrap().delay_secs, 0);
        assert!(catalog.timer("daily_reset").is_some());
        assert!(matches!(catalog.timer("weekly_arena"), Some(GameTimerDef::Interval { .. })));
        assert_eq!(catalog.levels().max_level(), 20);
        assert_eq!(catalog.levels().level_for_xp(400), 4);

        let selected = catalog.select_daily_for_level(10);
        assert_eq!(selected[&DailyGoal::WinBattle].id, "daily_win_5");
        assert_eq!(selected.len(), 6);
    }
}
