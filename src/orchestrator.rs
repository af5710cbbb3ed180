#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Dispatcher between hook events and pattern state machines.
//!
//! Every guard failure degrades to [`DispatchOutcome::Ignore`]; nothing here
//! returns an error to the hook caller.

use crate::hook_protocol::{DispatchOutcome, HookEvent, HookInput, IgnoreReason};
use crate::patterns::{
    handle_report, AgentReport, KeywordClassifier, PatternKind, PatternState, PatternTag,
    PatternType, ResponseClassifier, DEFAULT_DEBATE_ROUNDS, DEFAULT_JURY_THRESHOLD,
    DEFAULT_MAX_ITERATIONS,
};
use crate::store::PatternStore;
use crate::types::{is_valid_id, PatternId, StageName};
use crate::{Result, SwarmError};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};


/// Parameters for creating a pattern instance.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternInit {
    pub pattern_type: PatternType,
    /// Generated when absent.
    pub id: Option<PatternId>,
    pub session_id: String,
    pub ttl_minutes: u32,
    pub stages: Vec<StageName>,
    pub threshold: Option<f64>,
    pub max_rounds: Option<u32>,
    pub max_iterations: Option<u32>,
}

impl PatternInit {
    #[must_use]
    pub fn new(pattern_type: PatternType, session_id: impl Into<String>, ttl_minutes: u32) -> Self {
        Self {
            pattern_type,
            id: None,
            session_id: session_id.into(),
            ttl_minutes,
            stages: Vec::new(),
            threshold: None,
            max_rounds: None,
            max_iterations: None,
        }
    }

    fn kind(&self) -> Result<PatternKind> {
        match self.pattern_type {
            PatternType::Pipeline => {
                if self.stages.is_empty() {
                    return Err(SwarmError::PatternError(
                        "pipeline needs at least one stage".to_string(),
                    ));
                }
                let mut names: Vec<String> = Vec::with_capacity(self.stages.len());
                for stage in &self.stages {
                    if names.iter().any(|seen| seen == stage.value()) {
                        return Err(SwarmError::PatternError(format!(
                            "duplicate pipeline stage '{stage}'"
                        )));
                    }
                    names.push(stage.value().to_string());
                }
                Ok(PatternKind::pipeline(names))
            }
            PatternType::Jury => {
                let threshold = self.threshold.unwrap_or(DEFAULT_JURY_THRESHOLD);
                if !(threshold > 0.0 && threshold <= 1.0) {
                    return Err(SwarmError::PatternError(format!(
                        "jury threshold must be in (0, 1], got {threshold}"
                    )));
                }
                Ok(PatternKind::jury(threshold))
            }
            PatternType::Debate => Ok(PatternKind::debate(positive(
                "max_rounds",
                self.max_rounds.unwrap_or(DEFAULT_DEBATE_ROUNDS),
            )?)),
            PatternType::GenCritic => Ok(PatternKind::gencritic(positive(
                "max_iterations",
                self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS),
            )?)),
        }
    }
}

fn positive(name: &str, value: u32) -> Result<u32> {
    if value == 0 {
        return Err(SwarmError::PatternError(format!("{name} must be at least 1")));
    }
    Ok(value)
}

/// Stage or role the first agent of a fresh instance reports under.
#[must_use]
pub fn entry_stage(kind: &PatternKind) -> &str {
    match kind {
        PatternKind::Pipeline(pipeline) => pipeline
            .stages
            .get(pipeline.current_stage)
            .map_or("", String::as_str),
        PatternKind::Jury(_) => "juror",
        PatternKind::Debate(debate) => debate.expected_side().as_str(),
        PatternKind::GenCritic(_) => "generator",
    }
}

pub struct PatternOrchestrator<S, C = KeywordClassifier> {
    store: S,
    classifier: C,
}

impl<S: PatternStore> PatternOrchestrator<S> {
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self {
            store,
            classifier: KeywordClassifier,
        }
    }
}

impl<S, C> PatternOrchestrator<S, C>
where
    S: PatternStore,
    C: ResponseClassifier,
{
    #[must_use]
    pub const fn with_classifier(store: S, classifier: C) -> Self {
        Self { store, classifier }
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Creates and persists a fresh instance.
    ///
    /// # Errors
    /// Returns `PatternError` for invalid parameters, `PatternExists` when a
    /// live active instance already holds the id, or a store error.
    pub async fn init(&self, request: &PatternInit, now: DateTime<Utc>) -> Result<PatternState> {
        let kind = request.kind()?;
        let id = match &request.id {
            Some(id) => id.clone(),
            None => generated_id()?,
        };

        if let Some(existing) = self.store.load(request.pattern_type, &id).await? {
            if existing.active && !existing.is_expired(now) {
                return Err(SwarmError::PatternExists(existing.key()));
            }
        }

        let state = PatternState::new(id, request.session_id.clone(), request.ttl_minutes, kind, now);
        self.store.save(&state).await?;
        info!(pattern = %state.key(), session = %state.session_id, "pattern created");
        Ok(state)
    }

    /// Routes one hook event. Never fails; see [`IgnoreReason`] for the
    /// no-op paths.
    pub async fn handle_event(&self, input: &HookInput, now: DateTime<Utc>) -> DispatchOutcome {
        let event = input.event();
        if !matches!(event, HookEvent::PreToolUse | HookEvent::PostToolUse) {
            return DispatchOutcome::Ignore(IgnoreReason::UnhandledEvent);
        }

        match self.store.sweep(now).await {
            Ok(removed) if !removed.is_empty() => debug!(count = removed.len(), "swept expired patterns"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "sweep failed"),
        }

        let (tag, mut state) = match self.resolve(input, now).await {
            Ok(found) => found,
            Err(reason) => return DispatchOutcome::Ignore(reason),
        };
        let invocation = invocation_key(input);

        if event == HookEvent::PreToolUse {
            // Without an invocation id the start cannot be matched to its
            // completion, so the agent is only counted when it reports.
            let Some(agent_id) = invocation else {
                debug!(tag = %tag.render(), "start without invocation id not registered");
                return DispatchOutcome::proceed(None);
            };
            return self.on_agent_started(&mut state, agent_id, &tag, now).await;
        }
        let agent_id = invocation.map_or_else(|| fallback_key(&tag, &state), ToString::to_string);
        self.on_agent_completed(&mut state, &agent_id, &tag, input, now).await
    }

    async fn on_agent_started(
        &self,
        state: &mut PatternState,
        agent_id: &str,
        tag: &PatternTag,
        now: DateTime<Utc>,
    ) -> DispatchOutcome {
        if !state.register_agent(agent_id, tag.stage.value(), now) {
            return DispatchOutcome::proceed(None);
        }
        match self.persist(state).await {
            Ok(()) => {
                debug!(pattern = %state.key(), agent = agent_id, stage = %tag.stage, "agent registered");
                DispatchOutcome::proceed(None)
            }
            Err(reason) => DispatchOutcome::Ignore(reason),
        }
    }

    async fn on_agent_completed(
        &self,
        state: &mut PatternState,
        agent_id: &str,
        tag: &PatternTag,
        input: &HookInput,
        now: DateTime<Utc>,
    ) -> DispatchOutcome {
        let output = input.response_text();
        let report = AgentReport {
            agent_id,
            stage: &tag.stage,
            output: &output,
            at: now,
        };

        let before = state.clone();
        let context = handle_report(state, &report, &self.classifier);

        if *state != before {
            if let Err(reason) = self.persist(state).await {
                return DispatchOutcome::Ignore(reason);
            }
        }
        DispatchOutcome::proceed(context)
    }

    /// Steps shared by both events: tag, identifier check, load, guards.
    async fn resolve(
        &self,
        input: &HookInput,
        now: DateTime<Utc>,
    ) -> std::result::Result<(PatternTag, PatternState), IgnoreReason> {
        let found = input.find_tag().ok_or(IgnoreReason::Untagged)?;
        let Some(tag) = found.clone().validate() else {
            warn!(
                pattern_type = %found.pattern_type,
                id = %found.raw_id,
                stage = %found.raw_stage,
                "pattern tag with invalid identifier ignored"
            );
            return Err(IgnoreReason::InvalidIdentifier);
        };

        let state = match self.store.load(tag.pattern_type, &tag.id).await {
            Ok(Some(state)) => state,
            Ok(None) => {
                debug!(tag = %tag.render(), "no state for tag");
                return Err(IgnoreReason::MissingState);
            }
            Err(e) => {
                warn!(tag = %tag.render(), error = %e, "failed to load pattern state");
                return Err(IgnoreReason::StoreFailure);
            }
        };

        if !state.active {
            return Err(IgnoreReason::Inactive);
        }
        if state.session_id != input.session_id {
            debug!(pattern = %state.key(), "tag from a foreign session ignored");
            return Err(IgnoreReason::SessionMismatch);
        }
        if state.is_expired(now) {
            return Err(IgnoreReason::Expired);
        }
        Ok((tag, state))
    }

    async fn persist(&self, state: &mut PatternState) -> std::result::Result<(), IgnoreReason> {
        state.revision += 1;
        self.store.save(state).await.map_err(|e| {
            warn!(pattern = %state.key(), revision = state.revision, error = %e, "failed to save pattern state");
            IgnoreReason::StoreFailure
        })
    }
}

/// The hook's invocation id when it is a safe id.
fn invocation_key(input: &HookInput) -> Option<&str> {
    input.invocation_id().filter(|id| is_valid_id(id))
}

/// First unused `<stage>-<n>` key for a completion that carries no id.
fn fallback_key(tag: &PatternTag, state: &PatternState) -> String {
    (state.agents.len() + 1..)
        .map(|n| format!("{}-{n}", tag.stage))
        .find(|key| !state.agents.contains_key(key))
        .unwrap_or_else(|| tag.stage.to_string())
}

fn generated_id() -> Result<PatternId> {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    let short: String = raw.chars().take(12).collect();
    PatternId::parse(short).ok_or_else(|| SwarmError::InvalidIdentifier(raw))
}
