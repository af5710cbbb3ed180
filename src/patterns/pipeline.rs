#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use crate::patterns::state::{AgentReport, PatternKind, PatternState};
use itertools::Itertools;
use tracing::debug;

/// Records the stage output and either hands off to the next stage or, on the
/// last stage, closes the pipeline with a synthesis instruction.
pub fn handle(state: &mut PatternState, report: &AgentReport<'_>) -> Option<String> {
    let PatternKind::Pipeline(pipeline) = &state.kind else {
        return None;
    };
    let stages = pipeline.stages.clone();
    let stage = report.stage.value();

    let Some(index) = pipeline.stage_index(stage) else {
        return Some(unknown_stage_instruction(state, stage, &stages));
    };

    state.complete_agent(report);

    if index + 1 == stages.len() {
        state.active = false;
        if let PatternKind::Pipeline(pipeline) = &mut state.kind {
            pipeline.current_stage = index;
        }
        debug!(pattern = %state.key(), "pipeline finished");
        return Some(synthesis_instruction(state, &stages));
    }

    let next = &stages[index + 1];
    if let PatternKind::Pipeline(pipeline) = &mut state.kind {
        pipeline.current_stage = index + 1;
    }

    let carried = state.stage_output(stage).unwrap_or_default();
    Some(format!(
        "Pipeline {id}: stage '{stage}' complete ({done}/{total}).\n\
         Next: spawn the '{next}' stage agent and include this tag in its prompt: {tag}\n\
         Output of '{stage}' to carry forward as input:\n{carried}",
        id = state.id,
        done = index + 1,
        total = stages.len(),
        tag = state.tag_for(next),
    ))
}

fn synthesis_instruction(state: &PatternState, stages: &[String]) -> String {
    let sections = stages
        .iter()
        .enumerate()
        .map(|(i, stage)| {
            format!(
                "## Stage {n}: {stage}\n{output}",
                n = i + 1,
                output = state.stage_output(stage).unwrap_or("(no output recorded)")
            )
        })
        .join("\n\n");

    format!(
        "Pipeline {id} complete: all {total} stages finished.\n\
         Synthesize the final result from the stage outputs below.\n\n{sections}",
        id = state.id,
        total = stages.len(),
    )
}

fn unknown_stage_instruction(state: &PatternState, stage: &str, stages: &[String]) -> String {
    let suggestion = stages
        .iter()
        .map(|candidate| (candidate, strsim::levenshtein(stage, candidate)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by_key(|(_, dist)| *dist)
        .map(|(candidate, _)| format!(" Did you mean '{candidate}'?"))
        .unwrap_or_default();

    format!(
        "Pipeline {id}: unknown stage '{stage}'. Valid stages: {valid}.{suggestion}",
        id = state.id,
        valid = stages.iter().join(", "),
    )
}
