//! Tracker Events
//!
//! Notifications raised for the presentation layer, dispatched synchronously
//! to subscribers on the thread that owns the tracker.

use serde::Serialize;
use tracing::debug;

use crate::profile::{EquipmentGrant, UnitInfo};
use super::reward::RewardKind;

/// The four independent "reward pending" signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationCategory {
    Main,
    Daily,
    Login,
    Energy,
}

impl NotificationCategory {
    pub const ALL: [NotificationCategory; 4] = [
        NotificationCategory::Main,
        NotificationCategory::Daily,
        NotificationCategory::Login,
        NotificationCategory::Energy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::Main => "main",
            NotificationCategory::Daily => "daily",
            NotificationCategory::Login => "login",
            NotificationCategory::Energy => "energy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TrackerEvent {
    /// A reward-pending flag changed value
    NotificationChanged {
        category: NotificationCategory,
        pending: bool,
    },
    /// A daily energy stage was collected; `step` is the new current step
    EnergyCollected { step: usize },
    LevelUp { from: i32, to: i32 },
    NewHero(UnitInfo),
    EquipmentReceived(EquipmentGrant),
    /// Premium currency credited by a reward (analytics)
    CrystalsGranted {
        source: RewardKind,
        amount: i32,
        reward_id: String,
    },
    /// The tracker was cleared
    Reset,
}

impl TrackerEvent {
    /// Get event type as string (for logging/debugging)
    pub fn event_type(&self) -> &'static str {
        match self {
            TrackerEvent::NotificationChanged { .. } => "notification_changed",
            TrackerEvent::EnergyCollected { .. } => "energy_collected",
            TrackerEvent::LevelUp { .. } => "level_up",
            TrackerEvent::NewHero(_) => "new_hero",
            TrackerEvent::EquipmentReceived(_) => "equipment_received",
            TrackerEvent::CrystalsGranted { .. } => "crystals_granted",
            TrackerEvent::Reset => "reset",
        }
    }
}

pub type Listener = Box<dyn FnMut(&TrackerEvent) + Send>;

/// Subscriber list; events are delivered in subscription order
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Listener>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&TrackerEvent) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn emit(&mut self, event: TrackerEvent) {
        debug!("Tracker event: {} {:?}", event.event_type(), event);
        for listener in &mut self.listeners {
            listener(&event);
        }
    }
}
