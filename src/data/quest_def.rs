//! Quest Definition Structures
//!
//! Daily, main and login quest data deserialized from TOML catalog files.

use serde::{Deserialize, Serialize};

/// `quests/daily.toml`
#[derive(Debug, Clone, Deserialize)]
pub struct RawDailyQuestFile {
    #[serde(default)]
    pub daily: Vec<RawDailyQuest>,
}

/// `quests/main.toml`
#[derive(Debug, Clone, Deserialize)]
pub struct RawMainQuestFile {
    #[serde(default)]
    pub main: Vec<RawMainQuest>,
}

/// `quests/login.toml`
#[derive(Debug, Clone, Deserialize)]
pub struct RawLoginFile {
    #[serde(default)]
    pub cycle: Vec<RawLoginCycle>,
}

/// Raw daily quest as it appears in TOML
#[derive(Debug, Clone, Deserialize)]
pub struct RawDailyQuest {
    pub id: String,
    pub goal: String,
    #[serde(default = "default_target")]
    pub target: i32,
    #[serde(default)]
    pub required_level: i32,
    #[serde(flatten)]
    pub reward: RawReward,
}

/// Raw main quest as it appears in TOML
#[derive(Debug, Clone, Deserialize)]
pub struct RawMainQuest {
    pub id: String,
    pub goal: String,
    #[serde(default = "default_target")]
    pub target: i32,
    #[serde(flatten)]
    pub reward: RawReward,
}

/// One login reward cycle, a sequence of per-day rewards
#[derive(Debug, Clone, Deserialize)]
pub struct RawLoginCycle {
    pub cycle: i32,
    #[serde(default, rename = "day")]
    pub days: Vec<RawReward>,
}

fn default_target() -> i32 {
    1
}

/// Reward fields shared by every quest kind
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawReward {
    #[serde(default)]
    pub gold: i32,
    #[serde(default)]
    pub crystals: i32,
    #[serde(default)]
    pub xp: i32,
    pub material_id: Option<String>,
    #[serde(default)]
    pub material_amount: i32,
}

// ============================================================================
// Resolved Quest Structures (after parsing)
// ============================================================================

/// Objective taxonomy for daily quests
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DailyGoal {
    WinBattle,
    SpendEnergy,
    UpgradeUnit,
    OpenLootbox,
    ArenaFight,
    /// Meta-goal: collect the reward of every other daily quest
    CompleteAll,
}

impl DailyGoal {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "win_battle" | "win" => Some(DailyGoal::WinBattle),
            "spend_energy" => Some(DailyGoal::SpendEnergy),
            "upgrade_unit" | "upgrade" => Some(DailyGoal::UpgradeUnit),
            "open_lootbox" | "lootbox" => Some(DailyGoal::OpenLootbox),
            "arena_fight" | "arena" => Some(DailyGoal::ArenaFight),
            "complete_all" => Some(DailyGoal::CompleteAll),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DailyGoal::WinBattle => "win_battle",
            DailyGoal::SpendEnergy => "spend_energy",
            DailyGoal::UpgradeUnit => "upgrade_unit",
            DailyGoal::OpenLootbox => "open_lootbox",
            DailyGoal::ArenaFight => "arena_fight",
            DailyGoal::CompleteAll => "complete_all",
        }
    }
}

/// Objective taxonomy for main (story) quests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MainGoal {
    ReachLevel,
    CompleteMission,
    CollectUnits,
    UpgradeUnit,
    WinArena,
}

impl MainGoal {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "reach_level" | "level" => Some(MainGoal::ReachLevel),
            "complete_mission" | "mission" => Some(MainGoal::CompleteMission),
            "collect_units" => Some(MainGoal::CollectUnits),
            "upgrade_unit" | "upgrade" => Some(MainGoal::UpgradeUnit),
            "win_arena" | "arena" => Some(MainGoal::WinArena),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MainGoal::ReachLevel => "reach_level",
            MainGoal::CompleteMission => "complete_mission",
            MainGoal::CollectUnits => "collect_units",
            MainGoal::UpgradeUnit => "upgrade_unit",
            MainGoal::WinArena => "win_arena",
        }
    }
}

/// Material granted by a reward
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterialReward {
    pub material_id: String,
    pub amount: i32,
}

/// Reward payload, resolved from static data at issuance time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QuestReward {
    pub gold: i32,
    pub crystals: i32,
    pub xp: i32,
    pub material: Option<MaterialReward>,
}

impl QuestReward {
    pub fn from_raw(raw: &RawReward) -> Self {
        Self {
            gold: raw.gold,
            crystals: raw.crystals,
            xp: raw.xp,
            material: raw
                .material_id
                .as_ref()
                .filter(|_| raw.material_amount > 0)
                .map(|id| MaterialReward {
                    material_id: id.clone(),
                    amount: raw.material_amount,
                }),
        }
    }
}

/// A resolved daily quest definition
#[derive(Debug, Clone)]
pub struct DailyQuestDef {
    pub id: String,
    pub goal: DailyGoal,
    /// Progress required to complete
    pub target: i32,
    /// Minimum player level for this definition to be issued
    pub required_level: i32,
    pub reward: QuestReward,
}

impl DailyQuestDef {
    pub fn from_raw(raw: &RawDailyQuest) -> Result<Self, String> {
        let goal = DailyGoal::from_str(&raw.goal)
            .ok_or_else(|| format!("Invalid daily goal '{}' in quest '{}'", raw.goal, raw.id))?;

        if raw.target <= 0 {
            return Err(format!("Daily quest '{}' has non-positive target {}", raw.id, raw.target));
        }

        Ok(Self {
            id: raw.id.clone(),
            goal,
            target: raw.target,
            required_level: raw.required_level,
            reward: QuestReward::from_raw(&raw.reward),
        })
    }
}

/// A resolved main quest definition
#[derive(Debug, Clone)]
pub struct MainQuestDef {
    pub id: String,
    pub goal: MainGoal,
    pub target: i32,
    pub reward: QuestReward,
}

impl MainQuestDef {
    pub fn from_raw(raw: &RawMainQuest) -> Result<Self, String> {
        let goal = MainGoal::from_str(&raw.goal)
            .ok_or_else(|| format!("Invalid main goal '{}' in quest '{}'", raw.goal, raw.id))?;

        if raw.target <= 0 {
            return Err(format!("Main quest '{}' has non-positive target {}", raw.id, raw.target));
        }

        Ok(Self {
            id: raw.id.clone(),
            goal,
            target: raw.target,
            reward: QuestReward::from_raw(&raw.reward),
        })
    }
}

/// Reward for a single day of a login cycle
#[derive(Debug, Clone)]
pub struct LoginDayDef {
    /// Generated as `login_<cycle>_<day>`
    pub id: String,
    pub reward: QuestReward,
}

/// A login reward cycle
#[derive(Debug, Clone)]
pub struct LoginCycleDef {
    pub cycle: i32,
    pub days: Vec<LoginDayDef>,
}

impl LoginCycleDef {
    pub fn from_raw(raw: &RawLoginCycle) -> Self {
        Self {
            cycle: raw.cycle,
            days: raw
                .days
                .iter()
                .enumerate()
                .map(|(day, reward)| LoginDayDef {
                    id: format!("login_{}_{}", raw.cycle, day),
                    reward: QuestReward::from_raw(reward),
                })
                .collect(),
        }
    }

    pub fn day(&self, day: usize) -> Option<&LoginDayDef> {
        self.days.get(day)
    }
}
