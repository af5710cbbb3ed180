#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use crate::patterns::classifier::ResponseClassifier;
use crate::patterns::state::{
    truncate_chars, AgentReport, GenCriticOutcome, PatternKind, PatternState, MAX_RESULT_CHARS,
};
use tracing::info;

const GENERATOR: &str = "generator";
const CRITIC: &str = "critic";

/// Generator and critic alternate until the critic approves or the
/// iteration budget is spent.
pub fn handle(
    state: &mut PatternState,
    report: &AgentReport<'_>,
    classifier: &dyn ResponseClassifier,
) -> Option<String> {
    if !matches!(state.kind, PatternKind::GenCritic(_)) {
        return None;
    }
    match report.stage.value() {
        GENERATOR => Some(on_generator(state, report)),
        CRITIC => Some(on_critic(state, report, classifier)),
        other => Some(format!(
            "Generator-critic {id}: unknown role '{other}'. Use '{GENERATOR}' or '{CRITIC}'.",
            id = state.id,
        )),
    }
}

fn on_generator(state: &mut PatternState, report: &AgentReport<'_>) -> String {
    state.complete_agent(report);
    let output = truncate_chars(report.output, MAX_RESULT_CHARS);
    let tag = state.tag_for(CRITIC);

    let (iteration, max_iterations) = match &mut state.kind {
        PatternKind::GenCritic(gc) => {
            gc.last_output = Some(output.clone());
            (gc.iteration, gc.max_iterations)
        }
        _ => (0, 0),
    };

    format!(
        "Generator-critic {id} iteration {iteration}/{max_iterations}: draft ready.\n\
         Next: spawn the critic with tag {tag}. Reply APPROVED if acceptable, otherwise give feedback.\n\
         Draft:\n{output}",
        id = state.id,
    )
}

fn on_critic(
    state: &mut PatternState,
    report: &AgentReport<'_>,
    classifier: &dyn ResponseClassifier,
) -> String {
    state.complete_agent(report);
    let approves = classifier.critic_approves(report.output);
    let feedback = truncate_chars(report.output, MAX_RESULT_CHARS);
    let generator_tag = state.tag_for(GENERATOR);
    let id = state.id.clone();

    let PatternKind::GenCritic(gc) = &mut state.kind else {
        return String::new();
    };
    let iteration = gc.iteration;
    let max_iterations = gc.max_iterations;
    let final_output = gc
        .last_output
        .clone()
        .unwrap_or_else(|| "(no generator output recorded)".to_string());

    if approves {
        gc.approved = true;
        gc.outcome = Some(GenCriticOutcome::Approved);
        gc.last_feedback = Some(feedback.clone());
        state.active = false;
        info!(pattern = %state.key(), iteration, "gencritic approved");
        return format!(
            "Generator-critic {id}: APPROVED at iteration {iteration}/{max_iterations}.\n\n\
             Final output:\n{final_output}\n\nCritic:\n{feedback}"
        );
    }

    gc.last_feedback = Some(feedback.clone());

    if iteration >= max_iterations {
        gc.approved = false;
        gc.outcome = Some(GenCriticOutcome::MaxIterationsReached);
        state.active = false;
        info!(pattern = %state.key(), iteration, "gencritic hit max iterations");
        return format!(
            "Generator-critic {id}: max iterations reached ({max_iterations}) without approval.\n\n\
             Last output:\n{final_output}\n\nOutstanding feedback:\n{feedback}"
        );
    }

    gc.iteration += 1;
    let next_iteration = gc.iteration;
    format!(
        "Generator-critic {id} iteration {iteration}/{max_iterations}: changes requested.\n\
         Next: spawn the generator with tag {generator_tag} for iteration {next_iteration}, \
         revising the draft to address:\n{feedback}\n\nPrevious draft:\n{final_output}"
    )
}
