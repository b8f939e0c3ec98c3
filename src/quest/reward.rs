//! Reward requests and confirmations.
//!
//! Rewards are applied locally first; the request to the reward-issuing
//! service only reconciles authoritative totals and delivers extras (new
//! units, equipment, login calendar). A failed confirmation is not rolled
//! back.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::profile::{EnergySnapshot, EnergyState, EquipmentGrant, UnitGrant};
use super::state::ServerLoginState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardKind {
    Daily,
    Main,
    Login,
    Energy,
}

impl RewardKind {
    /// Reason tag recorded with experience and analytics
    pub fn reason(&self) -> &'static str {
        match self {
            RewardKind::Daily => "daily quest",
            RewardKind::Main => "main quest",
            RewardKind::Login => "login quest",
            RewardKind::Energy => "daily energy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewardRequest {
    pub kind: RewardKind,
    /// Quest, login day or energy stage id
    pub id: String,
}

/// Service response; every field is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RewardResponse {
    #[serde(default)]
    pub energy: Option<EnergyState>,
    /// New unit grant
    #[serde(default)]
    pub soul: Option<UnitGrant>,
    #[serde(default)]
    pub equipment: Option<EquipmentGrant>,
    /// Updated login calendar (login rewards only)
    #[serde(default)]
    pub login: Option<ServerLoginState>,
}

impl RewardResponse {
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("Failed to parse reward response: {}", e))
    }
}

/// A locally applied reward awaiting confirmation
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReward {
    pub request: RewardRequest,
    /// Present when the local phase changed energy or the player leveled up
    pub snapshot: Option<EnergySnapshot>,
}

/// Reward-issuing service
pub trait RewardService: Send + Sync + 'static {
    fn request_reward(
        &self,
        request: RewardRequest,
    ) -> impl Future<Output = Result<RewardResponse, String>> + Send;
}

/// Stand-in service used when running without a backend. Confirms every
/// request after a fixed latency with an empty payload.
pub struct OfflineRewardService {
    latency: Duration,
}

impl OfflineRewardService {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl RewardService for OfflineRewardService {
    async fn request_reward(&self, request: RewardRequest) -> Result<RewardResponse, String> {
        tokio::time::sleep(self.latency).await;
        debug!("Offline confirmation for {} '{}'", request.kind.reason(), request.id);
        Ok(RewardResponse::default())
    }
}
