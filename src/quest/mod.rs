//! Quest System
//!
//! Daily, main, login and daily-energy quests for a single player, with
//! two-phase reward collection and edge-triggered notifications.

pub mod events;
pub mod reward;
pub mod state;
pub mod tracker;

pub use events::{EventBus, NotificationCategory, TrackerEvent};
pub use reward::{
    OfflineRewardService, PendingReward, RewardKind, RewardRequest, RewardResponse, RewardService,
};
pub use state::{
    DailyEnergyInfo, DailyQuestInfo, FIRST_ENERGY_STEP, LoginQuestInfo, MainQuestInfo,
    ServerEnergyState, ServerLoginState, ServerQuestEntry, ServerQuestState,
};
pub use tracker::QuestTracker;
