pub mod catalog;
pub mod energy_def;
pub mod game_timer;
pub mod level_def;
pub mod material_def;
pub mod quest_def;

pub use catalog::GameCatalog;
pub use energy_def::EnergyStageDef;
pub use game_timer::GameTimerDef;
pub use level_def::{LevelDef, LevelTable};
pub use material_def::{MaterialDef, MaterialKind};
pub use quest_def::{
    DailyGoal, DailyQuestDef, LoginCycleDef, LoginDayDef, MainGoal, MainQuestDef, MaterialReward,
    QuestReward,
};
