//! Collaboration pattern state machines.
//!
//! Handlers mutate the state they are given and return instruction text for
//! the next agent. They never touch storage; persistence belongs to the
//! orchestrator.

pub mod classifier;
mod debate;
mod gencritic;
mod jury;
mod pipeline;
pub mod state;
pub mod tag;

pub use classifier::{KeywordClassifier, ResponseClassifier, VoteReading};
pub use state::{
    AgentRecord, AgentReport, AgentRunStatus, DebateData, DebatePosition, DebateSide,
    GenCriticData, GenCriticOutcome, JuryData, JuryVerdict, JuryVote, PatternKind, PatternState,
    PatternType, PipelineData, DEFAULT_DEBATE_ROUNDS, DEFAULT_JURY_THRESHOLD,
    DEFAULT_MAX_ITERATIONS,
};
pub use tag::{PatternTag, TagMatch};

/// Routes a report to the handler for the state's pattern family.
pub fn handle_report(
    state: &mut PatternState,
    report: &AgentReport<'_>,
    classifier: &dyn ResponseClassifier,
) -> Option<String> {
    match state.pattern_type() {
        PatternType::Pipeline => pipeline::handle(state, report),
        PatternType::Jury => jury::handle(state, report, classifier),
        PatternType::Debate => debate::handle(state, report),
        PatternType::GenCritic => gencritic::handle(state, report, classifier),
    }
}
