use crate::catalog::{BoosterId, OfficerId, TechId};
use crate::models::{PlanetId, Resources};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

pub const SPY_REPORT_CAP: usize = 50;
pub const DECISION_LOG_CAP: usize = 50;

/// An agent, identified by its opaque wallet string. Created at first
/// registration, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub planets: Vec<PlanetId>,
    pub score: f64,
    pub currency: f64,
    #[serde(default)]
    pub officers: BTreeMap<OfficerId, OfficerStatus>,
    #[serde(default)]
    pub boosters: BTreeMap<BoosterId, BoosterStatus>,
    #[serde(default)]
    pub stakes: Vec<Stake>,
    pub technologies: BTreeMap<TechId, u32>,
    pub research_queue: Vec<ResearchJob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alliance: Option<String>,
    #[serde(default)]
    pub spy_reports: VecDeque<crate::models::EspionageReport>,
    #[serde(default)]
    pub decisions: VecDeque<DecisionEntry>,
}

impl Agent {
    pub fn tech_level(&self, tech: TechId) -> u32 {
        self.technologies.get(&tech).copied().unwrap_or(0)
    }

    pub fn officer_active(&self, officer: OfficerId, now: DateTime<Utc>) -> bool {
        self.officers
            .get(&officer)
            .map(|status| status.expires_at > now)
            .unwrap_or(false)
    }

    pub fn booster_active(&self, booster: BoosterId, now: DateTime<Utc>) -> bool {
        self.boosters
            .get(&booster)
            .map(|status| status.expires_at > now)
            .unwrap_or(false)
    }

    /// Prepend, evicting the oldest beyond the ring capacity.
    pub fn push_spy_report(&mut self, report: crate::models::EspionageReport) {
        self.spy_reports.push_front(report);
        self.spy_reports.truncate(SPY_REPORT_CAP);
    }

    pub fn push_decision(&mut self, entry: DecisionEntry) {
        self.decisions.push_front(entry);
        self.decisions.truncate(DECISION_LOG_CAP);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfficerStatus {
    pub hired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoosterStatus {
    pub activated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stake {
    pub id: uuid::Uuid,
    pub pool_id: crate::catalog::PoolId,
    pub amount: f64,
    pub staked_at: DateTime<Utc>,
    pub last_claim_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchJob {
    pub tech: TechId,
    pub target_level: u32,
    pub cost: Resources,
    pub started_at: DateTime<Utc>,
    pub completes_at: DateTime<Utc>,
    pub research_secs: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// One entry of the per-agent decision log (queue-actions outcomes).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionEntry {
    pub at: DateTime<Utc>,
    pub planet: PlanetId,
    pub action: String,
    pub status: String,
}
