//! Quest State Tracking
//!
//! In-memory quest records and the server payload they are parsed from.

use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::{
    DailyGoal, DailyQuestDef, EnergyStageDef, GameCatalog, GameTimerDef, LoginDayDef, MainGoal,
    MainQuestDef,
};

/// Index of the first energy stage in a reset cycle
pub const FIRST_ENERGY_STEP: usize = 0;

/// Quest state as delivered by the server at profile load
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerQuestState {
    #[serde(default)]
    pub main: Vec<ServerQuestEntry>,
    #[serde(default)]
    pub daily: Vec<ServerQuestEntry>,
    #[serde(default)]
    pub login: ServerLoginState,
    #[serde(default)]
    pub daily_energy: ServerEnergyState,
}

impl ServerQuestState {
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("Failed to parse quest state: {}", e))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerQuestEntry {
    pub id: String,
    #[serde(default)]
    pub progress: i32,
    #[serde(default)]
    pub rewarded: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerLoginState {
    #[serde(default)]
    pub cycle: i32,
    #[serde(default)]
    pub day: usize,
    #[serde(default)]
    pub last_reward_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerEnergyState {
    #[serde(default)]
    pub step: usize,
    #[serde(default)]
    pub last_reward_time: Option<DateTime<Utc>>,
}

/// Add progress toward `target`; returns true if the value changed.
/// Non-positive amounts are ignored so progress never decreases.
fn add_progress(progress: &mut i32, target: i32, amount: i32) -> bool {
    if amount <= 0 || *progress >= target {
        return false;
    }
    *progress = progress.saturating_add(amount).min(target);
    true
}

/// An issued daily quest
#[derive(Debug, Clone)]
pub struct DailyQuestInfo {
    pub def: Arc<DailyQuestDef>,
    pub progress: i32,
    pub is_rewarded: bool,
}

impl DailyQuestInfo {
    pub fn new(def: Arc<DailyQuestDef>) -> Self {
        Self {
            def,
            progress: 0,
            is_rewarded: false,
        }
    }

    /// None if the catalog has no definition for this id
    pub fn from_server(entry: &ServerQuestEntry, catalog: &GameCatalog) -> Option<Self> {
        let def = Arc::clone(catalog.daily_by_id(&entry.id)?);
        let progress = entry.progress.clamp(0, def.target);
        Some(Self {
            def,
            progress,
            is_rewarded: entry.rewarded,
        })
    }

    pub fn id(&self) -> &str {
        &self.def.id
    }

    pub fn goal(&self) -> DailyGoal {
        self.def.goal
    }

    pub fn is_meta_goal(&self) -> bool {
        self.def.goal == DailyGoal::CompleteAll
    }

    pub fn update_goal(&mut self, goal: DailyGoal, amount: i32) -> bool {
        if self.is_rewarded || self.def.goal != goal {
            return false;
        }
        add_progress(&mut self.progress, self.def.target, amount)
    }

    pub fn is_completed(&self) -> bool {
        self.progress >= self.def.target
    }

    pub fn finish(&mut self) {
        self.is_rewarded = true;
    }
}

/// An in-progress main quest
#[derive(Debug, Clone)]
pub struct MainQuestInfo {
    pub def: Arc<MainQuestDef>,
    pub progress: i32,
    pub is_rewarded: bool,
}

impl MainQuestInfo {
    pub fn new(def: Arc<MainQuestDef>) -> Self {
        Self {
            def,
            progress: 0,
            is_rewarded: false,
        }
    }

    pub fn from_server(entry: &ServerQuestEntry, catalog: &GameCatalog) -> Option<Self> {
        let def = Arc::clone(catalog.main_by_id(&entry.id)?);
        let progress = entry.progress.clamp(0, def.target);
        Some(Self {
            def,
            progress,
            is_rewarded: entry.rewarded,
        })
    }

    pub fn id(&self) -> &str {
        &self.def.id
    }

    pub fn goal(&self) -> MainGoal {
        self.def.goal
    }

    pub fn update_goal(&mut self, goal: MainGoal, amount: i32) -> bool {
        if self.is_rewarded || self.def.goal != goal {
            return false;
        }
        add_progress(&mut self.progress, self.def.target, amount)
    }

    pub fn is_completed(&self) -> bool {
        self.progress >= self.def.target
    }

    pub fn finish(&mut self) {
        self.is_rewarded = true;
    }
}

/// Position in the login reward calendar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginQuestInfo {
    pub cycle: i32,
    pub day: usize,
    pub last_reward_time: Option<DateTime<Utc>>,
}

impl LoginQuestInfo {
    pub fn from_server(state: &ServerLoginState) -> Self {
        Self {
            cycle: state.cycle,
            day: state.day,
            last_reward_time: state.last_reward_time,
        }
    }

    pub fn update_from_server(&mut self, state: &ServerLoginState) {
        *self = Self::from_server(state);
    }

    /// Reward data for the current day, if the catalog has any
    pub fn current_day<'a>(&self, catalog: &'a GameCatalog) -> Option<&'a LoginDayDef> {
        catalog.login_cycle(self.cycle)?.day(self.day)
    }

    /// Available once per reset cycle: never claimed, or the reset boundary
    /// following the last claim has passed.
    pub fn is_available(&self, reset_timer: &GameTimerDef, now: DateTime<Utc>) -> bool {
        match self.last_reward_time {
            None => true,
            Some(last) => reset_timer.next_after(last) <= now,
        }
    }

    /// Move to the next day, rolling into the next cycle after the last day
    pub fn advance(&mut self, now: DateTime<Utc>, catalog: &GameCatalog) {
        self.day += 1;
        let days = catalog.login_cycle(self.cycle).map_or(0, |c| c.days.len());
        if self.day >= days && catalog.login_cycle(self.cycle + 1).is_some() {
            self.cycle += 1;
            self.day = 0;
        }
        self.last_reward_time = Some(now);
    }
}

/// Progress through the daily energy stages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyEnergyInfo {
    pub current_step: usize,
    pub last_reward_time: Option<DateTime<Utc>>,
}

impl DailyEnergyInfo {
    pub fn from_server(state: &ServerEnergyState) -> Self {
        Self {
            current_step: state.step,
            last_reward_time: state.last_reward_time,
        }
    }

    pub fn current_stage<'a>(&self, catalog: &'a GameCatalog) -> Option<&'a EnergyStageDef> {
        catalog.energy_stage(self.current_step)
    }

    pub fn reset_step(&mut self) {
        self.current_step = FIRST_ENERGY_STEP;
    }

    pub fn advance(&mut self, now: DateTime<Utc>) {
        self.current_step += 1;
        self.last_reward_time = Some(now);
    }
}
