//! Quest Tracker
//!
//! Owns the player's daily, main, login and energy quest state, keeps it
//! fresh against the daily reset boundary, and maintains the four
//! edge-triggered "reward pending" flags.
//!
//! Daily freshness is lazy: every entry point that touches daily-scoped state
//! runs [`QuestTracker::try_reset_daily`] first. The only proactive path is
//! the energy countdown, a one-shot timer re-armed on every energy
//! notification recomputation.

use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::data::{DailyGoal, GameCatalog, GameTimerDef, MainGoal, QuestReward};
use crate::profile::{Currency, EnergySnapshot, ProfileStore};
use crate::schedule::{Clock, Scheduler, TimerId};

use super::events::{EventBus, NotificationCategory, TrackerEvent};
use super::reward::{PendingReward, RewardKind, RewardRequest, RewardResponse};
use super::state::{
    DailyEnergyInfo, DailyQuestInfo, FIRST_ENERGY_STEP, LoginQuestInfo, MainQuestInfo,
    ServerQuestState,
};

pub struct QuestTracker<P: ProfileStore> {
    catalog: Arc<GameCatalog>,
    config: TrackerConfig,
    reset_timer: GameTimerDef,
    profile: P,
    clock: Arc<dyn Clock>,
    scheduler: Box<dyn Scheduler>,
    events: EventBus,

    daily_quests: Vec<DailyQuestInfo>,
    main_quests: Vec<MainQuestInfo>,
    login_quest: Option<LoginQuestInfo>,
    daily_energy: Option<DailyEnergyInfo>,

    is_inited: bool,
    next_reset_time: DateTime<Utc>,
    energy_timer: Option<TimerId>,

    is_daily_reward_waiting: bool,
    is_main_reward_waiting: bool,
    is_login_reward_waiting: bool,
    is_daily_energy_waiting: bool,
}

impl<P: ProfileStore> QuestTracker<P> {
    /// Fails if the catalog has no timer named by `config.daily_reset_timer_id`
    pub fn new(
        catalog: Arc<GameCatalog>,
        config: TrackerConfig,
        profile: P,
        clock: Arc<dyn Clock>,
        scheduler: Box<dyn Scheduler>,
    ) -> Result<Self, String> {
        let reset_timer = catalog
            .timer(&config.daily_reset_timer_id)
            .cloned()
            .ok_or_else(|| format!("Daily reset timer '{}' not found", config.daily_reset_timer_id))?;

        Ok(Self {
            catalog,
            config,
            reset_timer,
            profile,
            clock,
            scheduler,
            events: EventBus::new(),
            daily_quests: Vec::new(),
            main_quests: Vec::new(),
            login_quest: None,
            daily_energy: None,
            is_inited: false,
            next_reset_time: DateTime::<Utc>::MIN_UTC,
            energy_timer: None,
            is_daily_reward_waiting: false,
            is_main_reward_waiting: false,
            is_login_reward_waiting: false,
            is_daily_energy_waiting: false,
        })
    }

    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&TrackerEvent) + Send + 'static,
    {
        self.events.subscribe(listener);
    }

    /// Clear all quest state and cancel the pending energy countdown
    pub fn reset(&mut self) {
        self.is_inited = false;
        self.daily_quests.clear();
        self.main_quests.clear();
        self.login_quest = None;
        self.daily_energy = None;
        self.next_reset_time = DateTime::<Utc>::MIN_UTC;

        self.is_daily_reward_waiting = false;
        self.is_main_reward_waiting = false;
        self.is_login_reward_waiting = false;
        self.is_daily_energy_waiting = false;

        self.cancel_energy_timer();
        self.events.emit(TrackerEvent::Reset);
    }

    pub fn init_from_json(&mut self, json: &str) -> Result<(), String> {
        let state = ServerQuestState::from_json(json)?;
        self.init(&state);
        Ok(())
    }

    /// Load quest state from the server payload. Ignored once inited.
    pub fn init(&mut self, state: &ServerQuestState) {
        if self.is_inited {
            return;
        }

        let now = self.clock.now();
        self.next_reset_time = self.reset_timer.next_after(now);

        for entry in &state.main {
            if entry.rewarded {
                continue;
            }
            match MainQuestInfo::from_server(entry, &self.catalog) {
                Some(info) => self.main_quests.push(info),
                None => warn!("No definition for main quest '{}', skipping", entry.id),
            }
        }
        self.set_notification_main();

        for entry in &state.daily {
            let Some(info) = DailyQuestInfo::from_server(entry, &self.catalog) else {
                warn!("No definition for daily quest '{}', skipping", entry.id);
                continue;
            };
            if self.daily_quests.iter().any(|q| q.goal() == info.goal()) {
                warn!(
                    "Daily quest '{}' duplicates goal '{}', skipping",
                    entry.id,
                    info.goal().as_str()
                );
                continue;
            }
            self.daily_quests.push(info);
        }

        let login = LoginQuestInfo::from_server(&state.login);
        self.login_quest = Some(login);
        self.is_login_reward_waiting = self.compute_login_waiting();
        self.set_notification_login();

        let mut energy = DailyEnergyInfo::from_server(&state.daily_energy);
        // Reconcile a cycle that rolled over while the client was offline
        let last_boundary = energy.last_reward_time.map(|t| self.reset_timer.next_after(t));
        match last_boundary {
            Some(boundary) if self.next_reset_time - boundary <= chrono::Duration::zero() => {}
            _ => energy.reset_step(),
        }
        self.daily_energy = Some(energy);

        self.is_inited = true;
        info!(
            "Quest tracker initialized: {} daily, {} main, next reset at {}",
            self.daily_quests.len(),
            self.main_quests.len(),
            self.next_reset_time
        );

        self.set_notification_daily();
        self.set_notification_energy();
    }

    pub fn update_daily_goal(&mut self, goal: DailyGoal, amount: i32) {
        self.try_reset_daily();

        for quest in &mut self.daily_quests {
            quest.update_goal(goal, amount);
        }

        self.set_notification_daily();
    }

    pub fn update_main_goal(&mut self, goal: MainGoal, amount: i32) {
        self.try_reset_daily();

        for quest in &mut self.main_quests {
            quest.update_goal(goal, amount);
        }

        self.set_notification_main();
    }

    /// Time left until the daily reset boundary
    pub fn time_to_refresh(&self) -> chrono::Duration {
        self.next_reset_time - self.clock.now()
    }

    /// Reset daily state if the boundary has passed. Returns true if a reset
    /// happened.
    pub fn try_reset_daily(&mut self) -> bool {
        if !self.is_inited || self.time_to_refresh() > chrono::Duration::zero() {
            return false;
        }

        let now = self.clock.now();
        self.next_reset_time = self.reset_timer.next_after(now);
        // Unclaimed daily rewards are lost
        self.init_daily_quests();
        info!("Daily quests reset, next reset at {}", self.next_reset_time);

        self.set_notification_daily();
        self.set_notification_login();

        if let Some(energy) = &mut self.daily_energy {
            energy.reset_step();
            self.set_notification_energy();
        }

        true
    }

    /// Re-derive the daily set from the catalog at the current level
    fn init_daily_quests(&mut self) {
        let selected = self.catalog.select_daily_for_level(self.profile.level());
        self.daily_quests = selected.into_values().map(DailyQuestInfo::new).collect();
    }

    /// Issue daily quests that became eligible after a level-up. Goal kinds
    /// that already have a record are left alone.
    pub fn add_new_quests_on_level_up(&mut self) {
        let selected = self.catalog.select_daily_for_level(self.profile.level());
        let mut added = 0;

        for (goal, def) in selected {
            if self.daily_quests.iter().any(|q| q.goal() == goal) {
                continue;
            }
            self.daily_quests.push(DailyQuestInfo::new(def));
            added += 1;
        }

        if added > 0 {
            debug!("Issued {} new daily quests on level-up", added);
            self.set_notification_daily();
        }
    }

    // ========================================================================
    // Reward collection (local phase)
    // ========================================================================

    pub fn collect_daily_reward(&mut self, quest_id: &str) -> Result<PendingReward, String> {
        if self.try_reset_daily() {
            return Err(format!("Daily quests were reset, '{}' is no longer claimable", quest_id));
        }

        let index = self
            .daily_quests
            .iter()
            .position(|q| q.id() == quest_id)
            .ok_or_else(|| format!("Daily quest '{}' not found", quest_id))?;
        let def = Arc::clone(&self.daily_quests[index].def);

        let outcome = self.apply_reward(&def.reward, RewardKind::Daily, &def.id);

        self.daily_quests[index].finish();
        self.set_notification_daily();
        if outcome.leveled_up {
            self.add_new_quests_on_level_up();
        }

        Ok(PendingReward {
            request: RewardRequest { kind: RewardKind::Daily, id: def.id.clone() },
            snapshot: outcome.snapshot,
        })
    }

    pub fn collect_main_reward(&mut self, quest_id: &str) -> Result<PendingReward, String> {
        let index = self
            .main_quests
            .iter()
            .position(|q| q.id() == quest_id)
            .ok_or_else(|| format!("Main quest '{}' not found", quest_id))?;
        let def = Arc::clone(&self.main_quests[index].def);

        let outcome = self.apply_reward(&def.reward, RewardKind::Main, &def.id);

        let mut quest = self.main_quests.remove(index);
        quest.finish();
        self.set_notification_main();
        if outcome.leveled_up {
            self.add_new_quests_on_level_up();
        }

        Ok(PendingReward {
            request: RewardRequest { kind: RewardKind::Main, id: def.id.clone() },
            snapshot: outcome.snapshot,
        })
    }

    pub fn collect_login_reward(&mut self) -> Result<PendingReward, String> {
        let login = self
            .login_quest
            .as_ref()
            .ok_or_else(|| "Login quest is not initialized".to_string())?;
        let day = login
            .current_day(&self.catalog)
            .cloned()
            .ok_or_else(|| format!("No login reward for cycle {} day {}", login.cycle, login.day))?;

        let outcome = self.apply_reward(&day.reward, RewardKind::Login, &day.id);

        let now = self.clock.now();
        if let Some(login) = &mut self.login_quest {
            login.advance(now, &self.catalog);
        }
        self.set_notification_login();
        if outcome.leveled_up {
            self.add_new_quests_on_level_up();
        }

        Ok(PendingReward {
            request: RewardRequest { kind: RewardKind::Login, id: day.id },
            snapshot: outcome.snapshot,
        })
    }

    /// Collect the current energy stage and move to the next one
    pub fn advance_energy(&mut self) -> Result<PendingReward, String> {
        self.try_reset_daily();

        let energy = self
            .daily_energy
            .as_ref()
            .ok_or_else(|| "Daily energy is not initialized".to_string())?;
        let stage = energy
            .current_stage(&self.catalog)
            .cloned()
            .ok_or_else(|| format!("No energy stage left at step {}", energy.current_step))?;

        let snapshot = self.profile.add_energy(stage.energy);
        if stage.crystals > 0 {
            self.grant_crystals(stage.crystals, RewardKind::Energy, &stage.id);
        }

        let now = self.clock.now();
        let mut step = FIRST_ENERGY_STEP;
        if let Some(energy) = &mut self.daily_energy {
            energy.advance(now);
            step = energy.current_step;
        }
        info!("Collected energy stage '{}' (+{}), now at step {}", stage.id, stage.energy, step);

        self.events.emit(TrackerEvent::EnergyCollected { step });
        self.set_notification_energy();

        Ok(PendingReward {
            request: RewardRequest { kind: RewardKind::Energy, id: stage.id },
            snapshot: Some(snapshot),
        })
    }

    /// Gold, crystals, material (or energy-ticket conversion), then
    /// experience with level-up detection, in that order.
    fn apply_reward(&mut self, reward: &QuestReward, kind: RewardKind, reward_id: &str) -> RewardOutcome {
        let mut outcome = RewardOutcome::default();

        if reward.gold > 0 {
            self.profile.add_currency(Currency::Gold, reward.gold);
        }

        if reward.crystals > 0 {
            self.grant_crystals(reward.crystals, kind, reward_id);
        }

        if let Some(material) = &reward.material {
            match self.catalog.material(&material.material_id) {
                Some(def) if def.is_energy_ticket() => {
                    let energy = self.config.energy_consume_amount * material.amount;
                    outcome.snapshot = Some(self.profile.add_energy(energy));
                }
                Some(_) => self.profile.add_material(&material.material_id, material.amount),
                None => warn!(
                    "Reward '{}' references unknown material '{}'",
                    reward_id, material.material_id
                ),
            }
        }

        if reward.xp > 0 {
            let before = self.profile.level();
            self.profile.add_experience(reward.xp, kind.reason());
            let after = self.profile.level();

            if after > before {
                self.events.emit(TrackerEvent::LevelUp { from: before, to: after });
                // Level-up may change the energy cap
                outcome.snapshot = Some(self.profile.energy_snapshot());
                outcome.leveled_up = true;
            }
        }

        outcome
    }

    fn grant_crystals(&mut self, amount: i32, source: RewardKind, reward_id: &str) {
        self.profile.add_currency(Currency::Crystals, amount);
        info!(
            target: "analytics",
            "crystals_amount_change income=true source=\"{}\" amount={} reward_id={}",
            source.reason(),
            amount,
            reward_id
        );
        self.events.emit(TrackerEvent::CrystalsGranted {
            source,
            amount,
            reward_id: reward_id.to_string(),
        });
    }

    // ========================================================================
    // Reward confirmation (remote phase)
    // ========================================================================

    /// Reconcile with the service response. A failed request leaves the
    /// locally applied reward in place.
    pub fn confirm_reward(&mut self, pending: PendingReward, result: Result<RewardResponse, String>) {
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    "Reward confirmation for {} '{}' failed, keeping local state: {}",
                    pending.request.kind.reason(),
                    pending.request.id,
                    e
                );
                return;
            }
        };

        if let (Some(snapshot), Some(energy)) = (&pending.snapshot, &response.energy) {
            self.profile.sync_energy(energy, snapshot);
        }

        if let Some(soul) = &response.soul {
            if let Some(unit) = self.profile.add_unit(soul) {
                info!("New unit '{}' granted by {}", unit.unit_id, pending.request.id);
                self.events.emit(TrackerEvent::NewHero(unit));
            }
        }

        if let Some(equipment) = response.equipment {
            self.profile.add_equipment(&equipment);
            self.events.emit(TrackerEvent::EquipmentReceived(equipment));
        }

        if pending.request.kind == RewardKind::Login {
            if let (Some(login), Some(state)) = (&mut self.login_quest, &response.login) {
                login.update_from_server(state);
            }
            self.set_notification_login();
        }
    }

    // ========================================================================
    // Energy countdown
    // ========================================================================

    /// Deliver a fired timer. Ids other than the armed energy timer are stale.
    pub fn on_timer_fired(&mut self, id: TimerId) {
        if self.energy_timer != Some(id) {
            debug!("Ignoring stale timer {:?}", id);
            return;
        }
        self.energy_timer = None;

        if !self.try_reset_daily() {
            self.set_notification_energy();
        }
    }

    fn cancel_energy_timer(&mut self) {
        if let Some(id) = self.energy_timer.take() {
            self.scheduler.cancel(id);
        }
    }

    /// When the current energy stage becomes due, clipped to the reset boundary
    fn energy_due_time(&self, energy: &DailyEnergyInfo, now: DateTime<Utc>) -> DateTime<Utc> {
        match energy.current_stage(&self.catalog) {
            // Nothing left this cycle, wait for the reset
            None => self.next_reset_time,
            Some(stage) => {
                let base = if energy.current_step > FIRST_ENERGY_STEP {
                    energy.last_reward_time.unwrap_or(now)
                } else {
                    now
                };
                chrono::Duration::try_seconds(stage.delay_secs)
                    .and_then(|delay| base.checked_add_signed(delay))
                    .map_or(self.next_reset_time, |due| due.min(self.next_reset_time))
            }
        }
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    fn set_flag(&mut self, category: NotificationCategory, pending: bool) {
        let flag = match category {
            NotificationCategory::Main => &mut self.is_main_reward_waiting,
            NotificationCategory::Daily => &mut self.is_daily_reward_waiting,
            NotificationCategory::Login => &mut self.is_login_reward_waiting,
            NotificationCategory::Energy => &mut self.is_daily_energy_waiting,
        };
        if *flag != pending {
            *flag = pending;
            self.events.emit(TrackerEvent::NotificationChanged { category, pending });
        }
    }

    fn set_notification_daily(&mut self) {
        let all_done = self.is_complete_all_daily_goal_completed();
        let pending = self
            .daily_quests
            .iter()
            .any(|q| !q.is_rewarded && (q.is_completed() || (q.is_meta_goal() && all_done)));
        self.set_flag(NotificationCategory::Daily, pending);
    }

    fn set_notification_main(&mut self) {
        let pending = self
            .main_quests
            .iter()
            .any(|q| q.is_completed() && !q.is_rewarded);
        self.set_flag(NotificationCategory::Main, pending);
    }

    fn set_notification_login(&mut self) {
        let pending = self.compute_login_waiting();
        self.set_flag(NotificationCategory::Login, pending);
    }

    fn set_notification_energy(&mut self) {
        let Some(energy) = &self.daily_energy else {
            return;
        };

        let now = self.clock.now();
        let remaining = self.energy_due_time(energy, now) - now;
        let pending = remaining <= chrono::Duration::zero();

        self.cancel_energy_timer();
        if !pending {
            let delay = remaining.to_std().unwrap_or_default()
                + Duration::from_secs(self.config.energy_timer_slack_secs);
            self.energy_timer = Some(self.scheduler.schedule(delay));
        }

        self.set_flag(NotificationCategory::Energy, pending);
    }

    fn compute_login_waiting(&self) -> bool {
        let Some(login) = &self.login_quest else {
            return false;
        };
        login.current_day(&self.catalog).is_some()
            && login.is_available(&self.reset_timer, self.clock.now())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// True iff every daily quest other than the meta-goal has been rewarded
    pub fn is_complete_all_daily_goal_completed(&self) -> bool {
        self.daily_quests
            .iter()
            .filter(|q| !q.is_meta_goal())
            .all(|q| q.is_rewarded)
    }

    pub fn is_quests_available(&self) -> bool {
        self.config
            .quests_required_mission
            .as_deref()
            .map_or(true, |mission| self.profile.is_mission_completed(mission))
    }

    pub fn is_daily_energy_available(&self) -> bool {
        self.config
            .daily_energy_required_mission
            .as_deref()
            .map_or(true, |mission| self.profile.is_mission_completed(mission))
    }

    pub fn is_daily_reward_waiting(&self) -> bool {
        self.is_quests_available() && self.is_daily_reward_waiting
    }

    pub fn is_main_reward_waiting(&self) -> bool {
        self.is_quests_available() && self.is_main_reward_waiting
    }

    /// Evaluated live, the login flag only refreshes on login-related calls
    pub fn is_login_reward_waiting(&self) -> bool {
        self.compute_login_waiting()
    }

    pub fn is_daily_energy_waiting(&self) -> bool {
        self.is_daily_energy_available() && self.is_daily_energy_waiting
    }

    /// Any quest reward pending (energy excluded)
    pub fn is_reward_waiting(&self) -> bool {
        self.is_quests_available()
            && (self.is_main_reward_waiting
                || self.is_daily_reward_waiting
                || self.is_login_reward_waiting())
    }

    /// Raw flag value, without availability gating
    pub fn notification(&self, category: NotificationCategory) -> bool {
        match category {
            NotificationCategory::Main => self.is_main_reward_waiting,
            NotificationCategory::Daily => self.is_daily_reward_waiting,
            NotificationCategory::Login => self.is_login_reward_waiting,
            NotificationCategory::Energy => self.is_daily_energy_waiting,
        }
    }

    pub fn daily_quests(&self) -> &[DailyQuestInfo] {
        &self.daily_quests
    }

    pub fn main_quests(&self) -> &[MainQuestInfo] {
        &self.main_quests
    }

    pub fn login_quest(&self) -> Option<&LoginQuestInfo> {
        self.login_quest.as_ref()
    }

    pub fn daily_energy(&self) -> Option<&DailyEnergyInfo> {
        self.daily_energy.as_ref()
    }

    pub fn next_reset_time(&self) -> DateTime<Utc> {
        self.next_reset_time
    }

    pub fn energy_timer(&self) -> Option<TimerId> {
        self.energy_timer
    }

    pub fn is_inited(&self) -> bool {
        self.is_inited
    }

    pub fn catalog(&self) -> &GameCatalog {
        &self.catalog
    }

    pub fn profile(&self) -> &P {
        &self.profile
    }

    pub fn profile_mut(&mut self) -> &mut P {
        &mut self.profile
    }
}

#[derive(Debug, Default)]
struct RewardOutcome {
    snapshot: Option<EnergySnapshot>,
    leveled_up: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::LevelTable;
    use crate::data::level_def::test_table;
    use crate::profile::{EnergyState, EquipmentGrant, PlayerProfile, UnitGrant};
    use crate::quest::state::{ServerEnergyState, ServerLoginState, ServerQuestEntry};
    use crate::schedule::{ManualClock, ManualScheduler};
    use chrono::TimeZone;
    use std::sync::Mutex;

    const DAILY: &str = r#"
[[daily]]
id = "win_1"
goal = "win_battle"
target = 3
required_level = 1
gold = 10

[[daily]]
id = "win_5"
goal = "win_battle"
target = 5
required_level = 5
gold = 50

[[daily]]
id = "win_10"
goal = "win_battle"
target = 8
required_level = 10
gold = 100

[[daily]]
id = "arena_3"
goal = "arena_fight"
target = 2
required_level = 3
crystals = 5

[[daily]]
id = "lootbox_6"
goal = "open_lootbox"
target = 1
required_level = 6

[[daily]]
id = "all"
goal = "complete_all"
target = 1
required_level = 1
crystals = 20
"#;

    const MAIN: &str = r#"
[[main]]
id = "level_up"
goal = "reach_level"
target = 1
xp = 100

[[main]]
id = "small_xp"
goal = "reach_level"
target = 1
xp = 10

[[main]]
id = "missions"
goal = "complete_mission"
target = 3
gold = 200
material_id = "iron_ore"
material_amount = 4

[[main]]
id = "tickets"
goal = "complete_mission"
target = 1
material_id = "energy_ticket"
material_amount = 2
"#;

    const LOGIN: &str = r#"
[[cycle]]
cycle = 0

[[cycle.day]]
gold = 25

[[cycle.day]]
crystals = 3
"#;

    const ENERGY: &str = r#"
[[stage]]
id = "first"
energy = 20
delay_secs = 60

[[stage]]
id = "second"
energy = 30
crystals = 2
delay_secs = 120

[[stage]]
id = "third"
energy = 40
delay_secs = 180
"#;

    const MATERIALS: &str = r#"
[energy_ticket]
kind = "energy_ticket"

[iron_ore]
"#;

    const TIMERS: &str = r#"
[daily_reset]
kind = "daily"
hour = 4
"#;

    fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn reset_boundary() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 2, 4, 0, 0).unwrap()
    }

    fn levels() -> Arc<LevelTable> {
        Arc::new(test_table())
    }

    fn test_catalog() -> Arc<GameCatalog> {
        let mut catalog = GameCatalog::new();
        catalog.parse_daily_quests(DAILY).unwrap();
        catalog.parse_main_quests(MAIN).unwrap();
        catalog.parse_login_cycles(LOGIN).unwrap();
        catalog.parse_energy_stages(ENERGY).unwrap();
        catalog.parse_materials(MATERIALS).unwrap();
        catalog.parse_timers(TIMERS).unwrap();
        Arc::new(catalog)
    }

    struct Harness {
        tracker: QuestTracker<PlayerProfile>,
        clock: ManualClock,
        scheduler: ManualScheduler,
        events: Arc<Mutex<Vec<TrackerEvent>>>,
    }

    impl Harness {
        fn new(level: i32) -> Self {
            let clock = ManualClock::new(start_time());
            let scheduler = ManualScheduler::new();
            let mut tracker = QuestTracker::new(
                test_catalog(),
                TrackerConfig::default(),
                PlayerProfile::at_level(levels(), level),
                Arc::new(clock.clone()),
                Box::new(scheduler.clone()),
            )
            .unwrap();

            let events = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&events);
            tracker.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

            Self { tracker, clock, scheduler, events }
        }

        fn events(&self) -> Vec<TrackerEvent> {
            self.events.lock().unwrap().clone()
        }

        fn clear_events(&self) {
            self.events.lock().unwrap().clear();
        }

        fn count(&self, event_type: &str) -> usize {
            self.events().iter().filter(|e| e.event_type() == event_type).count()
        }

        fn notifications(&self, category: NotificationCategory) -> Vec<bool> {
            self.events()
                .iter()
                .filter_map(|e| match e {
                    TrackerEvent::NotificationChanged { category: c, pending } if *c == category => {
                        Some(*pending)
                    }
                    _ => None,
                })
                .collect()
        }
    }

    fn entry(id: &str, progress: i32, rewarded: bool) -> ServerQuestEntry {
        ServerQuestEntry { id: id.to_string(), progress, rewarded }
    }

    /// Daily win_5 + arena_3 + meta, main quests, energy collected today
    fn server_state() -> ServerQuestState {
        ServerQuestState {
            main: vec![
                entry("level_up", 0, false),
                entry("small_xp", 0, false),
                entry("missions", 0, false),
                entry("tickets", 0, false),
                entry("done_already", 0, true),
                entry("unknown_main", 0, false),
            ],
            daily: vec![
                entry("win_5", 0, false),
                entry("arena_3", 0, false),
                entry("all", 0, false),
                entry("unknown_daily", 1, false),
            ],
            login: ServerLoginState::default(),
            daily_energy: ServerEnergyState {
                step: 0,
                last_reward_time: Some(start_time() - chrono::Duration::hours(1)),
            },
        }
    }

    fn inited(level: i32) -> Harness {
        let mut h = Harness::new(level);
        h.tracker.init(&server_state());
        h
    }

    #[test]
    fn test_missing_reset_timer_is_an_error() {
        let config = TrackerConfig {
            daily_reset_timer_id: "nope".to_string(),
            ..TrackerConfig::default()
        };
        let result = QuestTracker::new(
            test_catalog(),
            config,
            PlayerProfile::new(levels()),
            Arc::new(ManualClock::new(start_time())),
            Box::new(ManualScheduler::new()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_init_tolerant_parse() {
        let h = inited(5);

        let main_ids: Vec<&str> = h.tracker.main_quests().iter().map(|q| q.id()).collect();
        assert_eq!(main_ids, vec!["level_up", "small_xp", "missions", "tickets"]);

        let daily_ids: Vec<&str> = h.tracker.daily_quests().iter().map(|q| q.id()).collect();
        assert_eq!(daily_ids, vec!["win_5", "arena_3", "all"]);

        assert_eq!(h.tracker.next_reset_time(), reset_boundary());
        assert!(h.tracker.is_inited());
    }

    #[test]
    fn test_init_is_ignored_once_inited() {
        let mut h = inited(5);
        let mut other = server_state();
        other.daily.clear();
        h.tracker.init(&other);
        assert_eq!(h.tracker.daily_quests().len(), 3);
    }

    #[test]
    fn test_init_skips_duplicate_daily_goal() {
        let mut h = Harness::new(5);
        let mut state = server_state();
        state.daily.push(entry("win_1", 0, false));
        h.tracker.init(&state);

        let wins = h
            .tracker
            .daily_quests()
            .iter()
            .filter(|q| q.goal() == DailyGoal::WinBattle)
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn test_init_from_json() {
        let mut h = Harness::new(1);
        h.tracker
            .init_from_json(r#"{"main": [{"id": "missions", "progress": 3}], "daily": []}"#)
            .unwrap();
        assert!(h.tracker.is_main_reward_waiting());
        assert!(Harness::new(1).tracker.init_from_json("not json").is_err());
    }

    #[test]
    fn test_init_resets_energy_from_previous_cycle() {
        let mut h = Harness::new(5);
        let mut state = server_state();
        // Collected two stages yesterday before the 04:00 reset
        state.daily_energy = ServerEnergyState {
            step: 2,
            last_reward_time: Some(Utc.with_ymd_and_hms(2024, 5, 31, 20, 0, 0).unwrap()),
        };
        h.tracker.init(&state);
        assert_eq!(h.tracker.daily_energy().unwrap().current_step, 0);
    }

    #[test]
    fn test_init_keeps_energy_from_current_cycle() {
        let mut h = Harness::new(5);
        let mut state = server_state();
        state.daily_energy = ServerEnergyState {
            step: 2,
            last_reward_time: Some(Utc.with_ymd_and_hms(2024, 6, 1, 5, 0, 0).unwrap()),
        };
        h.tracker.init(&state);
        assert_eq!(h.tracker.daily_energy().unwrap().current_step, 2);
    }

    #[test]
    fn test_daily_notification_is_edge_triggered() {
        let mut h = inited(5);
        h.clear_events();

        h.tracker.update_daily_goal(DailyGoal::WinBattle, 2);
        assert!(h.notifications(NotificationCategory::Daily).is_empty());

        h.tracker.update_daily_goal(DailyGoal::WinBattle, 3);
        assert_eq!(h.notifications(NotificationCategory::Daily), vec![true]);
        assert!(h.tracker.is_daily_reward_waiting());

        // Already pending, no new event
        h.tracker.update_daily_goal(DailyGoal::ArenaFight, 2);
        assert_eq!(h.notifications(NotificationCategory::Daily), vec![true]);

        h.tracker.collect_daily_reward("win_5").unwrap();
        assert_eq!(h.notifications(NotificationCategory::Daily), vec![true]);
        h.tracker.collect_daily_reward("arena_3").unwrap();
        // Meta-goal is now complete, so the flag stays up
        assert!(h.tracker.notification(NotificationCategory::Daily));
        h.tracker.collect_daily_reward("all").unwrap();
        assert_eq!(h.notifications(NotificationCategory::Daily), vec![true, false]);
    }

    #[test]
    fn test_daily_progress_never_decreases_before_reset() {
        let mut h = inited(5);
        let amounts = [1, 0, -4, 2, 7, -1, 3];
        let mut last = 0;
        let mut was_rewarded = false;

        for (i, amount) in amounts.iter().enumerate() {
            h.tracker.update_daily_goal(DailyGoal::WinBattle, *amount);
            let quest = &h.tracker.daily_quests()[0];
            assert!(quest.progress >= last);
            assert!(!(was_rewarded && !quest.is_rewarded));
            last = quest.progress;
            was_rewarded = quest.is_rewarded;

            if i == 4 {
                h.tracker.collect_daily_reward("win_5").unwrap();
            }
        }
        assert!(h.tracker.daily_quests()[0].is_rewarded);
    }

    #[test]
    fn test_main_quests_sharing_goal_all_advance() {
        let mut h = inited(5);
        h.tracker.update_main_goal(MainGoal::CompleteMission, 1);

        let missions = h.tracker.main_quests().iter().find(|q| q.id() == "missions").unwrap();
        let tickets = h.tracker.main_quests().iter().find(|q| q.id() == "tickets").unwrap();
        assert_eq!(missions.progress, 1);
        assert!(tickets.is_completed());
        assert_eq!(h.notifications(NotificationCategory::Main), vec![true]);
    }

    #[test]
    fn test_reset_after_boundary() {
        let mut h = inited(5);
        h.tracker.update_daily_goal(DailyGoal::WinBattle, 5);
        h.tracker.collect_daily_reward("win_5").unwrap();
        h.tracker.update_daily_goal(DailyGoal::ArenaFight, 1);
        let before = h.tracker.next_reset_time();

        h.clock.set(reset_boundary() + chrono::Duration::minutes(5));
        assert!(h.tracker.try_reset_daily());

        assert!(h.tracker.next_reset_time() > before);
        for quest in h.tracker.daily_quests() {
            assert!(!quest.is_rewarded);
            assert_eq!(quest.progress, 0);
        }
        assert!(!h.tracker.is_daily_reward_waiting());
    }

    #[test]
    fn test_reset_happens_once() {
        let mut h = inited(5);
        h.clock.set(reset_boundary());

        assert!(h.tracker.try_reset_daily());
        let boundary = h.tracker.next_reset_time();
        assert!(!h.tracker.try_reset_daily());
        assert_eq!(h.tracker.next_reset_time(), boundary);
    }

    #[test]
    fn test_reset_before_init_does_nothing() {
        let mut h = Harness::new(5);
        assert!(!h.tracker.try_reset_daily());
        assert!(h.tracker.daily_quests().is_empty());
    }

    #[test]
    fn test_goal_update_triggers_lazy_reset() {
        let mut h = inited(5);
        h.tracker.update_daily_goal(DailyGoal::WinBattle, 4);

        h.clock.set(reset_boundary() + chrono::Duration::seconds(1));
        h.tracker.update_daily_goal(DailyGoal::WinBattle, 1);

        let win = h
            .tracker
            .daily_quests()
            .iter()
            .find(|q| q.goal() == DailyGoal::WinBattle)
            .unwrap();
        assert_eq!(win.progress, 1);
        assert!(!win.is_completed());
    }

    #[test]
    fn test_reset_selects_highest_eligible_per_goal() {
        let mut h = inited(5);
        h.clock.set(reset_boundary());
        h.tracker.try_reset_daily();

        let quests = h.tracker.daily_quests();
        let wins: Vec<&DailyQuestInfo> =
            quests.iter().filter(|q| q.goal() == DailyGoal::WinBattle).collect();
        assert_eq!(wins.len(), 1);
        assert_eq!(wins[0].id(), "win_5");
        assert_eq!(wins[0].def.required_level, 5);

        // Level 6 definition is not eligible at level 5
        assert!(quests.iter().all(|q| q.id() != "lootbox_6"));
        assert!(quests.iter().any(|q| q.id() == "arena_3"));
    }

    #[test]
    fn test_collect_after_boundary_is_rejected() {
        let mut h = inited(5);
        h.tracker.update_daily_goal(DailyGoal::WinBattle, 5);
        h.clock.set(reset_boundary());

        let gold = h.tracker.profile().gold;
        assert!(h.tracker.collect_daily_reward("win_5").is_err());
        assert_eq!(h.tracker.profile().gold, gold);
    }

    #[test]
    fn test_complete_all_ignores_meta_goal() {
        let mut h = inited(5);
        assert!(!h.tracker.is_complete_all_daily_goal_completed());

        h.tracker.collect_daily_reward("win_5").unwrap();
        assert!(!h.tracker.is_complete_all_daily_goal_completed());

        h.tracker.collect_daily_reward("arena_3").unwrap();
        assert!(h.tracker.is_complete_all_daily_goal_completed());

        // The meta-goal's own state does not matter
        h.tracker.collect_daily_reward("all").unwrap();
        assert!(h.tracker.is_complete_all_daily_goal_completed());
    }

    #[test]
    fn test_reward_order_and_currency() {
        let mut h = inited(5);
        let gold_before = h.tracker.profile().gold;

        h.tracker.update_main_goal(MainGoal::CompleteMission, 3);
        let pending = h.tracker.collect_main_reward("missions").unwrap();

        assert_eq!(h.tracker.profile().gold, gold_before + 200);
        assert_eq!(h.tracker.profile().material_count("iron_ore"), 4);
        assert!(pending.snapshot.is_none());
        assert_eq!(pending.request, RewardRequest { kind: RewardKind::Main, id: "missions".to_string() });

        // Main quests are removed once rewarded
        assert!(h.tracker.main_quests().iter().all(|q| q.id() != "missions"));
        assert!(h.tracker.collect_main_reward("missions").is_err());
    }

    #[test]
    fn test_energy_ticket_converts_to_energy() {
        let mut h = inited(5);
        let energy_before = h.tracker.profile().energy;

        let pending = h.tracker.collect_main_reward("tickets").unwrap();

        let expected = energy_before + TrackerConfig::default().energy_consume_amount * 2;
        assert_eq!(h.tracker.profile().energy, expected);
        assert_eq!(h.tracker.profile().material_count("energy_ticket"), 0);
        assert_eq!(pending.snapshot.unwrap().amount, expected);
    }

    #[test]
    fn test_crystals_analytics_only_when_positive() {
        let mut h = inited(5);
        h.tracker.collect_daily_reward("win_5").unwrap();
        assert_eq!(h.count("crystals_granted"), 0);

        h.tracker.collect_daily_reward("arena_3").unwrap();
        assert_eq!(h.count("crystals_granted"), 1);
        assert_eq!(h.tracker.profile().crystals, 5);
    }

    #[test]
    fn test_level_up_fires_once_with_snapshot() {
        let mut h = inited(1);
        h.clear_events();

        let pending = h.tracker.collect_main_reward("level_up").unwrap();

        assert_eq!(h.count("level_up"), 1);
        assert!(h.events().contains(&TrackerEvent::LevelUp { from: 1, to: 2 }));
        assert!(pending.snapshot.is_some());
    }

    #[test]
    fn test_xp_without_level_up() {
        let mut h = inited(1);
        h.clear_events();

        let pending = h.tracker.collect_main_reward("small_xp").unwrap();

        assert_eq!(h.count("level_up"), 0);
        assert!(pending.snapshot.is_none());
        assert_eq!(h.tracker.profile().xp, 10);
    }

    #[test]
    fn test_level_up_issues_new_daily_goals() {
        // lootbox_6 unlocks at level 6
        let mut h = Harness::new(5);
        h.tracker.init(&server_state());
        let xp_needed = h.tracker.profile().xp_to_next_level() as i32;
        h.tracker.profile_mut().add_experience(xp_needed, "test");
        assert_eq!(h.tracker.profile().level(), 6);

        h.tracker.add_new_quests_on_level_up();
        let quests = h.tracker.daily_quests();
        assert!(quests.iter().any(|q| q.id() == "lootbox_6"));
        // Existing goal kinds are not duplicated or replaced
        assert_eq!(quests.iter().filter(|q| q.goal() == DailyGoal::WinBattle).count(), 1);
        assert_eq!(quests.len(), 4);
    }

    #[test]
    fn test_confirmation_syncs_energy_and_grants() {
        let mut h = inited(5);
        let pending = h.tracker.collect_main_reward("tickets").unwrap();
        h.clear_events();

        let response = RewardResponse {
            energy: Some(EnergyState { amount: 90, max: 70, next_restore_time: None }),
            soul: Some(UnitGrant { unit_id: "paladin".to_string(), level: 1 }),
            equipment: Some(EquipmentGrant { item_id: "sword".to_string(), count: 1 }),
            login: None,
        };
        h.tracker.confirm_reward(pending, Ok(response));

        assert_eq!(h.tracker.profile().energy, 90);
        assert_eq!(h.tracker.profile().units.len(), 1);
        assert_eq!(h.tracker.profile().equipment.len(), 1);
        assert_eq!(h.count("new_hero"), 1);
        assert_eq!(h.count("equipment_received"), 1);
    }

    #[test]
    fn test_confirmation_without_snapshot_skips_sync() {
        let mut h = inited(5);
        h.tracker.update_main_goal(MainGoal::CompleteMission, 3);
        let pending = h.tracker.collect_main_reward("missions").unwrap();
        let energy = h.tracker.profile().energy;

        let response = RewardResponse {
            energy: Some(EnergyState { amount: 1, max: 1, next_restore_time: None }),
            ..RewardResponse::default()
        };
        h.tracker.confirm_reward(pending, Ok(response));
        assert_eq!(h.tracker.profile().energy, energy);
    }

    #[test]
    fn test_failed_confirmation_keeps_local_state() {
        let mut h = inited(5);
        h.tracker.update_daily_goal(DailyGoal::WinBattle, 5);
        let pending = h.tracker.collect_daily_reward("win_5").unwrap();
        let gold = h.tracker.profile().gold;

        h.tracker.confirm_reward(pending, Err("connection reset".to_string()));

        assert_eq!(h.tracker.profile().gold, gold);
        assert!(h.tracker.daily_quests()[0].is_rewarded);
    }

    #[test]
    fn test_login_reward_flow() {
        let mut h = inited(5);
        assert!(h.tracker.is_login_reward_waiting());
        assert!(h.tracker.notification(NotificationCategory::Login));

        let pending = h.tracker.collect_login_reward().unwrap();
        assert_eq!(pending.request.id, "login_0_0");
        assert_eq!(h.tracker.profile().gold, 25);
        assert!(!h.tracker.notification(NotificationCategory::Login));

        let response = RewardResponse {
            login: Some(ServerLoginState {
                cycle: 0,
                day: 1,
                last_reward_time: Some(start_time()),
            }),
            ..RewardResponse::default()
        };
        h.tracker.confirm_reward(pending, Ok(response));
        assert_eq!(h.tracker.login_quest().unwrap().day, 1);
        assert!(!h.tracker.is_login_reward_waiting());

        // Next day's reward becomes available after the reset boundary
        h.clock.set(reset_boundary());
        h.tracker.try_reset_daily();
        assert!(h.tracker.notification(NotificationCategory::Login));
    }

    #[test]
    fn test_energy_advance_rearms_countdown() {
        let mut h = inited(5);
        let slack = TrackerConfig::default().energy_timer_slack_secs;
        // First stage counts down from now
        assert_eq!(
            h.scheduler.active(),
            vec![(h.tracker.energy_timer().unwrap(), Duration::from_secs(60 + slack))]
        );

        let mut steps = Vec::new();
        for expected_delay in [120, 180] {
            h.tracker.advance_energy().unwrap();
            steps.push(h.tracker.daily_energy().unwrap().current_step);
            let active = h.scheduler.active();
            assert_eq!(active.len(), 1);
            assert_eq!(active[0].1, Duration::from_secs(expected_delay + slack));
        }

        h.tracker.advance_energy().unwrap();
        steps.push(h.tracker.daily_energy().unwrap().current_step);
        assert_eq!(steps, vec![1, 2, 3]);

        // No stage left: count down to the reset boundary
        let until_reset = (reset_boundary() - start_time()).to_std().unwrap();
        let active = h.scheduler.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].1, until_reset + Duration::from_secs(slack));

        assert!(h.tracker.advance_energy().is_err());
        assert_eq!(h.count("energy_collected"), 3);
    }

    #[test]
    fn test_energy_countdown_clipped_to_reset() {
        let mut h = inited(5);
        // 100 seconds before the reset boundary
        h.clock.set(reset_boundary() - chrono::Duration::seconds(100));
        h.tracker.advance_energy().unwrap();

        let active = h.scheduler.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].1, Duration::from_secs(100 + 1));
    }

    #[test]
    fn test_energy_timer_flips_notification() {
        let mut h = inited(5);
        h.tracker.advance_energy().unwrap();
        assert!(!h.tracker.is_daily_energy_waiting());
        let timer = h.tracker.energy_timer().unwrap();

        h.clock.advance(chrono::Duration::seconds(121));
        h.tracker.on_timer_fired(timer);

        assert!(h.tracker.is_daily_energy_waiting());
        assert!(h.tracker.energy_timer().is_none());
        assert_eq!(h.notifications(NotificationCategory::Energy), vec![true]);
    }

    #[test]
    fn test_stale_timer_is_ignored() {
        let mut h = inited(5);
        let stale = h.tracker.energy_timer().unwrap();
        h.tracker.advance_energy().unwrap();
        assert!(h.scheduler.cancelled().contains(&stale));

        let current = h.tracker.energy_timer();
        h.clock.advance(chrono::Duration::seconds(500));
        h.tracker.on_timer_fired(stale);
        assert_eq!(h.tracker.energy_timer(), current);
        assert!(!h.tracker.notification(NotificationCategory::Energy));
    }

    #[test]
    fn test_energy_resets_at_boundary() {
        let mut h = inited(5);
        h.tracker.advance_energy().unwrap();
        h.tracker.advance_energy().unwrap();

        h.clock.set(reset_boundary());
        h.tracker.try_reset_daily();
        assert_eq!(h.tracker.daily_energy().unwrap().current_step, FIRST_ENERGY_STEP);
    }

    #[test]
    fn test_energy_stage_crystals() {
        let mut h = inited(5);
        h.tracker.advance_energy().unwrap();
        assert_eq!(h.tracker.profile().crystals, 0);
        let pending = h.tracker.advance_energy().unwrap();
        assert_eq!(h.tracker.profile().crystals, 2);
        assert_eq!(pending.request, RewardRequest { kind: RewardKind::Energy, id: "second".to_string() });
    }

    #[test]
    fn test_availability_gating() {
        let clock = ManualClock::new(start_time());
        let config = TrackerConfig {
            quests_required_mission: Some("tutorial".to_string()),
            daily_energy_required_mission: Some("tutorial".to_string()),
            ..TrackerConfig::default()
        };
        let mut tracker = QuestTracker::new(
            test_catalog(),
            config,
            PlayerProfile::at_level(levels(), 5),
            Arc::new(clock),
            Box::new(ManualScheduler::new()),
        )
        .unwrap();
        tracker.init(&server_state());
        tracker.update_main_goal(MainGoal::CompleteMission, 1);

        assert!(tracker.notification(NotificationCategory::Main));
        assert!(!tracker.is_main_reward_waiting());
        assert!(!tracker.is_reward_waiting());

        tracker.profile_mut().complete_mission("tutorial");
        assert!(tracker.is_main_reward_waiting());
        assert!(tracker.is_reward_waiting());
    }

    #[test]
    fn test_energy_due_time_near_end_of_time() {
        let mut catalog = GameCatalog::new();
        catalog
            .parse_energy_stages(&format!(
                "[[stage]]\nid = \"first\"\nenergy = 5\n\n[[stage]]\nid = \"last\"\nenergy = 5\ndelay_secs = {}\n",
                crate::data::energy_def::MAX_ENERGY_DELAY_SECS
            ))
            .unwrap();
        catalog.parse_timers(TIMERS).unwrap();

        let now = DateTime::<Utc>::MAX_UTC - chrono::Duration::hours(1);
        let scheduler = ManualScheduler::new();
        let mut tracker = QuestTracker::new(
            Arc::new(catalog),
            TrackerConfig::default(),
            PlayerProfile::at_level(levels(), 1),
            Arc::new(ManualClock::new(now)),
            Box::new(scheduler.clone()),
        )
        .unwrap();

        tracker.init(&ServerQuestState::default());
        assert_eq!(tracker.next_reset_time(), DateTime::<Utc>::MAX_UTC);
        assert!(tracker.is_daily_energy_waiting());

        // A week past now is unrepresentable, so the reset boundary is used
        tracker.advance_energy().unwrap();
        assert!(!tracker.is_daily_energy_waiting());
        assert_eq!(scheduler.active()[0].1, Duration::from_secs(3600 + 1));
    }

    #[test]
    fn test_reset_cancels_timer() {
        let mut h = inited(5);
        let timer = h.tracker.energy_timer().unwrap();

        h.tracker.reset();

        assert!(h.scheduler.cancelled().contains(&timer));
        assert!(h.scheduler.active().is_empty());
        assert!(h.tracker.daily_quests().is_empty());
        assert!(!h.tracker.is_inited());
        assert_eq!(h.events().last(), Some(&TrackerEvent::Reset));
    }
}
