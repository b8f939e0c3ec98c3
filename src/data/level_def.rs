//! Player level table.
//!
//! `levels.toml` lists one entry per level, in order, starting at level 1:
//! the cumulative XP needed to reach it and the energy cap it grants.

use serde::Deserialize;

/// Energy cap used when no level table is loaded
pub const BASE_ENERGY_CAP: i32 = 60;

/// `levels.toml`
#[derive(Debug, Clone, Deserialize)]
pub struct LevelFile {
    #[serde(default)]
    pub level: Vec<LevelDef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LevelDef {
    /// Total XP required to reach this level
    pub xp: i64,
    pub energy_cap: i32,
}

/// Validated level thresholds; index 0 is level 1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelTable {
    levels: Vec<LevelDef>,
}

impl LevelTable {
    pub fn new(levels: Vec<LevelDef>) -> Result<Self, String> {
        let first = levels.first().ok_or_else(|| "Level table is empty".to_string())?;
        if first.xp != 0 {
            return Err(format!("Level 1 must start at 0 xp, got {}", first.xp));
        }
        for (index, pair) in levels.windows(2).enumerate() {
            if pair[1].xp <= pair[0].xp {
                return Err(format!(
                    "Level {} xp {} does not exceed level {} xp {}",
                    index + 2,
                    pair[1].xp,
                    index + 1,
                    pair[0].xp
                ));
            }
        }
        if let Some(index) = levels.iter().position(|l| l.energy_cap <= 0) {
            return Err(format!("Level {} has a non-positive energy cap", index + 1));
        }
        Ok(Self { levels })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, String> {
        let file: LevelFile =
            toml::from_str(content).map_err(|e| format!("Failed to parse levels: {}", e))?;
        Self::new(file.level)
    }

    pub fn max_level(&self) -> i32 {
        self.levels.len() as i32
    }

    /// Total XP required to reach `level`, clamped to the table
    pub fn total_xp_for_level(&self, level: i32) -> i64 {
        self.get(level).xp
    }

    pub fn level_for_xp(&self, xp: i64) -> i32 {
        self.levels.partition_point(|l| l.xp <= xp).max(1) as i32
    }

    pub fn energy_cap(&self, level: i32) -> i32 {
        self.get(level).energy_cap
    }

    fn get(&self, level: i32) -> &LevelDef {
        let index = (level.clamp(1, self.max_level()) - 1) as usize;
        &self.levels[index]
    }
}

/// A single level: nobody levels up until a table is loaded
impl Default for LevelTable {
    fn default() -> Self {
        Self {
            levels: vec![LevelDef { xp: 0, energy_cap: BASE_ENERGY_CAP }],
        }
    }
}

/// Ten-level table shared by unit tests across the crate
#[cfg(test)]
pub(crate) fn test_table() -> LevelTable {
    const XP: [i64; 10] = [0, 80, 200, 350, 500, 700, 950, 1250, 1600, 2000];
    let levels = XP
        .iter()
        .zip(1..)
        .map(|(&xp, level)| LevelDef { xp, energy_cap: BASE_ENERGY_CAP + level })
        .collect();
    LevelTable { levels }
}
