use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One loosely-typed input row, keyed by column name.
pub type RawRow = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Sentiment {
    Delight,
    Convenience,
    Trust,
    Frustration,
    Disappointment,
    Concern,
    Hostility,
    #[default]
    Neutral,
}

impl Sentiment {
    pub const ALL: [Sentiment; 8] = [
        Sentiment::Delight,
        Sentiment::Convenience,
        Sentiment::Trust,
        Sentiment::Frustration,
        Sentiment::Disappointment,
        Sentiment::Concern,
        Sentiment::Hostility,
        Sentiment::Neutral,
    ];

    /// Case-insensitive; anything outside the fixed label set is `Neutral`.
    pub fn parse(value: &str) -> Self {
        let needle = value.trim();
        Self::ALL
            .into_iter()
            .find(|sentiment| sentiment.label().eq_ignore_ascii_case(needle))
            .unwrap_or(Sentiment::Neutral)
    }

    pub fn label(self) -> &'static str {
        match self {
            Sentiment::Delight => "Delight",
            Sentiment::Convenience => "Convenience",
            Sentiment::Trust => "Trust",
            Sentiment::Frustration => "Frustration",
            Sentiment::Disappointment => "Disappointment",
            Sentiment::Concern => "Concern",
            Sentiment::Hostility => "Hostility",
            Sentiment::Neutral => "Neutral",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SentimentCounts {
    pub delight: u32,
    pub convenience: u32,
    pub trust: u32,
    pub frustration: u32,
    pub disappointment: u32,
    pub concern: u32,
    pub hostility: u32,
    pub neutral: u32,
}

impl SentimentCounts {
    fn slot(&mut self, sentiment: Sentiment) -> &mut u32 {
        match sentiment {
            Sentiment::Delight => &mut self.delight,
            Sentiment::Convenience => &mut self.convenience,
            Sentiment::Trust => &mut self.trust,
            Sentiment::Frustration => &mut self.frustration,
            Sentiment::Disappointment => &mut self.disappointment,
            Sentiment::Concern => &mut self.concern,
            Sentiment::Hostility => &mut self.hostility,
            Sentiment::Neutral => &mut self.neutral,
        }
    }

    pub fn increment(&mut self, sentiment: Sentiment) {
        *self.slot(sentiment) += 1;
    }

    pub fn get(&self, sentiment: Sentiment) -> u32 {
        match sentiment {
            Sentiment::Delight => self.delight,
            Sentiment::Convenience => self.convenience,
            Sentiment::Trust => self.trust,
            Sentiment::Frustration => self.frustration,
            Sentiment::Disappointment => self.disappointment,
            Sentiment::Concern => self.concern,
            Sentiment::Hostility => self.hostility,
            Sentiment::Neutral => self.neutral,
        }
    }

    pub fn total(&self) -> u32 {
        Sentiment::ALL.into_iter().map(|sentiment| self.get(sentiment)).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationRecord {
    pub issue_key: String,
    pub agent_list: Vec<String>,
    pub customer_list: Vec<String>,
    pub resolved: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<f64>,
    pub first_response_minutes: Option<f64>,
    pub avg_response_minutes: Option<f64>,
    pub messages_total: u32,
    pub messages_agent: u32,
    pub messages_customer: u32,
    pub customer_abuse: bool,
    pub customer_abuse_count: u32,
    pub agent_profanity: bool,
    pub agent_profanity_count: u32,
    pub customer_toxicity: Option<f64>,
    pub agent_toxicity: Option<f64>,
    pub sentiment: Sentiment,
    /// The escalation flag as supplied by the source row, if any.
    pub escalated_flag: Option<bool>,
    pub escalated: bool,
    pub contact_reason: String,
    pub improvement_tip: String,
    pub agent_score: Option<f64>,
    pub customer_score: Option<f64>,
    pub total_score: Option<f64>,
    #[serde(skip)]
    pub raw: RawRow,
}

impl ConversationRecord {
    /// Timestamp used by every windowed view: end of conversation, else its start.
    pub fn reference_time(&self) -> Option<DateTime<Utc>> {
        self.ended_at.or(self.started_at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Role {
    Tier1,
    Tier2,
    NonAgent,
}

impl Role {
    pub fn parse_label(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "TIER1" | "TIER_1" | "T1" => Some(Role::Tier1),
            "TIER2" | "TIER_2" | "T2" => Some(Role::Tier2),
            "NON_AGENT" | "NON_USER" | "NONE" => Some(Role::NonAgent),
            _ => None,
        }
    }

    /// Label stored in the `agent_roles` table.
    pub fn storage_label(self) -> &'static str {
        match self {
            Role::Tier1 => "TIER1",
            Role::Tier2 => "TIER2",
            Role::NonAgent => "NON_AGENT",
        }
    }

    /// Label used in escalation paths.
    pub fn path_label(self) -> &'static str {
        match self {
            Role::Tier1 => "T1",
            Role::Tier2 => "T2",
            Role::NonAgent => "NON_USER",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleMapping {
    roles: HashMap<String, Role>,
}

impl RoleMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, participant: impl Into<String>, role: Role) {
        self.roles.insert(participant.into(), role);
    }

    pub fn role_of(&self, participant: &str) -> Role {
        self.roles
            .get(participant)
            .copied()
            .unwrap_or(Role::NonAgent)
    }

    /// Incoming entries win over existing ones.
    pub fn merge(&mut self, other: RoleMapping) {
        self.roles.extend(other.roles);
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Role)> {
        self.roles.iter().map(|(id, role)| (id.as_str(), *role))
    }
}

impl FromIterator<(String, Role)> for RoleMapping {
    fn from_iter<T: IntoIterator<Item = (String, Role)>>(iter: T) -> Self {
        Self {
            roles: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Settings {
    pub toxicity_threshold: f64,
    pub abusive_caps_trigger: u32,
    pub min_messages_for_toxicity: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            toxicity_threshold: 0.5,
            abusive_caps_trigger: 3,
            min_messages_for_toxicity: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EscalationDetails {
    pub legacy: bool,
    pub tier_handoff: bool,
    pub handoff_any: bool,
    pub path: String,
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineBucket {
    pub start: DateTime<Utc>,
    pub label: String,
    pub counts: SentimentCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentRanking {
    pub agent: String,
    pub mean_score: f64,
    pub conversations: usize,
    /// Daily mean score, oldest first; `None` for days without scored conversations.
    pub sparkline: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToxicParticipant {
    pub participant: String,
    pub mean_score: f64,
    pub flagged: usize,
    pub conversations: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ToxicParticipants {
    pub customers: Vec<ToxicParticipant>,
    pub agents: Vec<ToxicParticipant>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResolvedStats {
    pub count: usize,
    pub total: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactReasonSummary {
    pub reason: String,
    pub count: usize,
    pub recent_issues: Vec<String>,
    pub sparkline: Vec<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TipSummary {
    pub tip: String,
    pub count: usize,
    pub unique_issues: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImprovementTips {
    pub entries: Vec<TipSummary>,
    pub top: Vec<TipSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentPerformance {
    pub agent: String,
    pub role: Role,
    pub conversations: usize,
    pub resolved: usize,
    pub resolution_rate: f64,
    pub mean_score: Option<f64>,
    pub mean_first_response_minutes: Option<f64>,
    pub owned: usize,
    pub tier_escalations: usize,
    pub handoffs: usize,
    pub customer_abuse_received: u32,
    pub profanity_count: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EscalationStats {
    pub total: usize,
    pub owned: usize,
    pub tier_escalations: usize,
    pub handoffs: usize,
    pub legacy: usize,
    pub escalation_rate: f64,
    pub handoff_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WindowMetrics {
    pub total_conversations: usize,
    pub avg_total_score: Option<f64>,
    pub avg_agent_score: Option<f64>,
    pub resolved: usize,
    pub escalated: usize,
    pub abusive_count: usize,
    pub improvement_examples: Vec<String>,
}
