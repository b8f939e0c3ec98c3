//! Named game timers.
//!
//! A timer describes a recurring server boundary (e.g. the daily quest reset)
//! and resolves to the next concrete occurrence after a given instant.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::Deserialize;

/// Longest accepted interval period (ten years)
pub const MAX_PERIOD_SECS: i64 = 10 * 366 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameTimerDef {
    /// Fires every day at `hour:minute` UTC
    Daily {
        #[serde(default)]
        hour: u32,
        #[serde(default)]
        minute: u32,
    },
    /// Fires every `period_secs` starting from `anchor` (RFC 3339 string)
    Interval {
        anchor: DateTime<Utc>,
        period_secs: i64,
    },
}

impl GameTimerDef {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            GameTimerDef::Daily { hour, minute } => {
                if NaiveTime::from_hms_opt(*hour, *minute, 0).is_none() {
                    return Err(format!("Invalid daily timer time {:02}:{:02}", hour, minute));
                }
            }
            GameTimerDef::Interval { period_secs, .. } => {
                if *period_secs <= 0 {
                    return Err(format!("Interval timer period must be positive, got {}", period_secs));
                }
                if *period_secs > MAX_PERIOD_SECS {
                    return Err(format!(
                        "Interval timer period {}s exceeds {}s",
                        period_secs, MAX_PERIOD_SECS
                    ));
                }
            }
        }
        Ok(())
    }

    /// The first boundary strictly after `t`. A boundary past the end of
    /// representable time saturates to `DateTime::<Utc>::MAX_UTC`.
    pub fn next_after(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let next = match self {
            GameTimerDef::Daily { hour, minute } => {
                let time = NaiveTime::from_hms_opt(*hour, *minute, 0).unwrap_or(NaiveTime::MIN);
                let candidate = t.date_naive().and_time(time).and_utc();
                if candidate > t {
                    Some(candidate)
                } else {
                    candidate.checked_add_signed(Duration::days(1))
                }
            }
            GameTimerDef::Interval { anchor, period_secs } => (*period_secs)
                .clamp(1, MAX_PERIOD_SECS)
                .checked_mul(1000)
                .and_then(|period_ms| {
                    let elapsed_ms = (t - *anchor).num_milliseconds();
                    let periods = elapsed_ms.div_euclid(period_ms) + 1;
                    periods.checked_mul(period_ms)
                })
                .and_then(Duration::try_milliseconds)
                .and_then(|offset| anchor.checked_add_signed(offset)),
        };
        next.unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
