#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use crate::types::{PatternId, StageName};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Agent output stored per invocation is capped at write time.
pub const MAX_RESULT_CHARS: usize = 4_000;
/// Juror reasons and debate arguments quoted back in instructions.
pub const MAX_EXCERPT_CHARS: usize = 500;

pub const DEFAULT_JURY_THRESHOLD: f64 = 0.5;
pub const DEFAULT_DEBATE_ROUNDS: u32 = 2;
pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    Pipeline,
    Jury,
    Debate,
    #[serde(rename = "gencritic")]
    GenCritic,
}

impl PatternType {
    pub const ALL: [Self; 4] = [Self::Pipeline, Self::Jury, Self::Debate, Self::GenCritic];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pipeline => "pipeline",
            Self::Jury => "jury",
            Self::Debate => "debate",
            Self::GenCritic => "gencritic",
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PatternType {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "pipeline" => Ok(Self::Pipeline),
            "jury" => Ok(Self::Jury),
            "debate" => Ok(Self::Debate),
            "gencritic" => Ok(Self::GenCritic),
            _ => Err(format!("Unknown pattern type: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRunStatus {
    Running,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub stage: String,
    pub status: AgentRunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineData {
    pub stages: Vec<String>,
    pub current_stage: usize,
}

impl PipelineData {
    #[must_use]
    pub fn stage_index(&self, stage: &str) -> Option<usize> {
        self.stages.iter().position(|candidate| candidate == stage)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JuryVote {
    pub agent_id: String,
    pub approve: bool,
    pub reason: String,
    /// False when no verdict keyword was found and the vote defaulted to reject.
    pub parsed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JuryVerdict {
    pub approved: bool,
    pub approve_count: usize,
    pub total_voted: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JuryData {
    pub votes: Vec<JuryVote>,
    pub threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<JuryVerdict>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebateSide {
    Pro,
    Con,
}

impl DebateSide {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pro => "pro",
            Self::Con => "con",
        }
    }

    #[must_use]
    pub const fn opponent(&self) -> Self {
        match self {
            Self::Pro => Self::Con,
            Self::Con => Self::Pro,
        }
    }
}

impl TryFrom<&str> for DebateSide {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "pro" => Ok(Self::Pro),
            "con" => Ok(Self::Con),
            _ => Err(format!("Unknown debate side: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebatePosition {
    pub side: DebateSide,
    pub agent_id: String,
    pub argument: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebateData {
    pub positions: Vec<DebatePosition>,
    pub round: u32,
    pub max_rounds: u32,
}

impl DebateData {
    /// Side expected next; positions alternate starting with `pro`.
    #[must_use]
    pub const fn expected_side(&self) -> DebateSide {
        if self.positions.len() % 2 == 0 {
            DebateSide::Pro
        } else {
            DebateSide::Con
        }
    }

    /// Positions of round `round` (1-based) occupy `[2(r-1), 2r)`.
    #[must_use]
    pub fn round_positions(&self, round: u32) -> &[DebatePosition] {
        let start = (round.saturating_sub(1) as usize) * 2;
        let end = (start + 2).min(self.positions.len());
        self.positions.get(start..end).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenCriticOutcome {
    Approved,
    MaxIterationsReached,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenCriticData {
    pub iteration: u32,
    pub max_iterations: u32,
    #[serde(default)]
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<GenCriticOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_feedback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PatternKind {
    Pipeline(PipelineData),
    Jury(JuryData),
    Debate(DebateData),
    #[serde(rename = "gencritic")]
    GenCritic(GenCriticData),
}

impl PatternKind {
    #[must_use]
    pub const fn pipeline(stages: Vec<String>) -> Self {
        Self::Pipeline(PipelineData {
            stages,
            current_stage: 0,
        })
    }

    #[must_use]
    pub fn jury(threshold: f64) -> Self {
        Self::Jury(JuryData {
            votes: Vec::new(),
            threshold,
            verdict: None,
        })
    }

    #[must_use]
    pub const fn debate(max_rounds: u32) -> Self {
        Self::Debate(DebateData {
            positions: Vec::new(),
            round: 1,
            max_rounds,
        })
    }

    #[must_use]
    pub const fn gencritic(max_iterations: u32) -> Self {
        Self::GenCritic(GenCriticData {
            iteration: 1,
            max_iterations,
            approved: false,
            outcome: None,
            last_output: None,
            last_feedback: None,
        })
    }

    #[must_use]
    pub const fn pattern_type(&self) -> PatternType {
        match self {
            Self::Pipeline(_) => PatternType::Pipeline,
            Self::Jury(_) => PatternType::Jury,
            Self::Debate(_) => PatternType::Debate,
            Self::GenCritic(_) => PatternType::GenCritic,
        }
    }
}

/// One durable record per running pattern instance, keyed by `(type, id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternState {
    pub id: PatternId,
    pub session_id: String,
    pub active: bool,
    pub created: DateTime<Utc>,
    pub ttl_minutes: u32,
    /// Bumped on every save; lets a lost concurrent update show up in logs.
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub agents: BTreeMap<String, AgentRecord>,
    #[serde(flatten)]
    pub kind: PatternKind,
}

/// What a single agent invocation reported back.
#[derive(Debug, Clone, Copy)]
pub struct AgentReport<'a> {
    pub agent_id: &'a str,
    pub stage: &'a StageName,
    pub output: &'a str,
    pub at: DateTime<Utc>,
}

impl PatternState {
    #[must_use]
    pub fn new(
        id: PatternId,
        session_id: impl Into<String>,
        ttl_minutes: u32,
        kind: PatternKind,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            session_id: session_id.into(),
            active: true,
            created,
            ttl_minutes,
            revision: 0,
            agents: BTreeMap::new(),
            kind,
        }
    }

    #[must_use]
    pub const fn pattern_type(&self) -> PatternType {
        self.kind.pattern_type()
    }

    /// `<type>-<id>`, also the storage file stem.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}-{}", self.pattern_type(), self.id)
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created + Duration::minutes(i64::from(self.ttl_minutes))
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    /// Tag an agent prompt must carry to report into this instance.
    #[must_use]
    pub fn tag_for(&self, stage: &str) -> String {
        format!("[PATTERN:{}-{}:{stage}]", self.pattern_type(), self.id)
    }

    /// Records a spawned agent. Existing entries are left untouched.
    pub fn register_agent(&mut self, agent_id: &str, stage: &str, at: DateTime<Utc>) -> bool {
        if self.agents.contains_key(agent_id) {
            return false;
        }
        self.agents.insert(
            agent_id.to_string(),
            AgentRecord {
                stage: stage.to_string(),
                status: AgentRunStatus::Running,
                result: None,
                started_at: Some(at),
                completed_at: None,
            },
        );
        true
    }

    /// Moves an agent to `completed`, inserting it when it was never registered.
    pub fn complete_agent(&mut self, report: &AgentReport<'_>) {
        let record = self
            .agents
            .entry(report.agent_id.to_string())
            .or_insert_with(|| AgentRecord {
                stage: report.stage.value().to_string(),
                status: AgentRunStatus::Running,
                result: None,
                started_at: None,
                completed_at: None,
            });
        record.stage = report.stage.value().to_string();
        record.status = AgentRunStatus::Completed;
        record.result = Some(truncate_chars(report.output, MAX_RESULT_CHARS));
        record.completed_at = Some(report.at);
    }

    /// Latest completed output recorded for `stage`.
    #[must_use]
    pub fn stage_output(&self, stage: &str) -> Option<&str> {
        self.agents
            .values()
            .filter(|record| record.stage == stage && record.status == AgentRunStatus::Completed)
            .max_by_key(|record| record.completed_at)
            .and_then(|record| record.result.as_deref())
    }
}

/// Caps `text` at `max` characters on a char boundary, marking the cut.
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...[truncated]", &text[..cut]),
        None => text.to_string(),
    }
}
