#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]
#![allow(clippy::cast_precision_loss)]

use crate::patterns::classifier::ResponseClassifier;
use crate::patterns::state::{AgentReport, JuryVerdict, JuryVote, PatternKind, PatternState};
use itertools::Itertools;
use tracing::{debug, info};

/// Collects one vote per juror and tallies once every registered agent voted.
pub fn handle(
    state: &mut PatternState,
    report: &AgentReport<'_>,
    classifier: &dyn ResponseClassifier,
) -> Option<String> {
    let PatternKind::Jury(jury) = &state.kind else {
        return None;
    };
    if jury.votes.iter().any(|vote| vote.agent_id == report.agent_id) {
        debug!(agent = report.agent_id, "duplicate jury vote ignored");
        return None;
    }

    state.complete_agent(report);
    let reading = classifier.classify_vote(report.output);
    let total_expected = state.agents.len();

    let PatternKind::Jury(jury) = &mut state.kind else {
        return None;
    };
    jury.votes.push(JuryVote {
        agent_id: report.agent_id.to_string(),
        approve: reading.approve,
        reason: reading.reason,
        parsed: reading.parsed,
    });

    let voted = jury.votes.len();
    if voted < total_expected {
        return Some(format!(
            "Jury {id}: vote recorded ({voted}/{total_expected}). Waiting for the remaining jurors.",
            id = state.id,
        ));
    }

    let approve_count = jury.votes.iter().filter(|vote| vote.approve).count();
    let approved = approve_count as f64 / voted as f64 >= jury.threshold;
    let verdict = JuryVerdict {
        approved,
        approve_count,
        total_voted: voted,
    };
    jury.verdict = Some(verdict);

    let roster = jury
        .votes
        .iter()
        .map(|vote| {
            format!(
                "- {agent}: {decision}: {reason}",
                agent = vote.agent_id,
                decision = if vote.approve { "APPROVE" } else { "REJECT" },
                reason = vote.reason,
            )
        })
        .join("\n");
    let threshold = jury.threshold;

    state.active = false;
    info!(pattern = %state.key(), approved, approve_count, voted, "jury tallied");

    Some(format!(
        "Jury {id} verdict: {label} ({approve_count}/{voted} approve, threshold {threshold:.2})\n\nVotes:\n{roster}",
        id = state.id,
        label = if verdict.approved { "APPROVED" } else { "REJECTED" },
    ))
}
