#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use crate::patterns::state::{
    truncate_chars, AgentReport, DebatePosition, DebateSide, PatternKind, PatternState,
    MAX_EXCERPT_CHARS, MAX_RESULT_CHARS,
};
use itertools::Itertools;
use tracing::info;

pub fn handle(state: &mut PatternState, report: &AgentReport<'_>) -> Option<String> {
    let PatternKind::Debate(debate) = &state.kind else {
        return None;
    };
    let expected = debate.expected_side();
    let side = match DebateSide::try_from(report.stage.value()) {
        Ok(side) if side == expected => side,
        Ok(_) | Err(_) => {
            return Some(format!(
                "Debate {id}: expected a '{expected}' argument next, got '{stage}'. \
                 Spawn the '{expected}' agent with tag {tag}",
                id = state.id,
                expected = expected.as_str(),
                stage = report.stage,
                tag = state.tag_for(expected.as_str()),
            ));
        }
    };

    state.complete_agent(report);
    let argument = truncate_chars(report.output, MAX_RESULT_CHARS);

    let PatternKind::Debate(debate) = &mut state.kind else {
        return None;
    };
    debate.positions.push(DebatePosition {
        side,
        agent_id: report.agent_id.to_string(),
        argument,
    });

    let round = debate.round;
    let max_rounds = debate.max_rounds;
    let round_complete = debate.positions.len() >= (round as usize) * 2;
    let excerpt = truncate_chars(report.output, MAX_EXCERPT_CHARS);

    if !round_complete {
        let next = side.opponent();
        return Some(format!(
            "Debate {id} round {round}/{max_rounds}: '{side}' argued.\n\
             Next: spawn the '{next}' agent with tag {tag} and have it rebut:\n{excerpt}",
            id = state.id,
            side = side.as_str(),
            next = next.as_str(),
            tag = state.tag_for(next.as_str()),
        ));
    }

    if round < max_rounds {
        debate.round += 1;
        let next_round = debate.round;
        return Some(format!(
            "Debate {id}: round {round}/{max_rounds} complete.\n\
             Next: start round {next_round} by spawning the 'pro' agent with tag {tag}, countering:\n{excerpt}",
            id = state.id,
            tag = state.tag_for(DebateSide::Pro.as_str()),
        ));
    }

    let transcript = (1..=max_rounds)
        .map(|r| {
            let arguments = debate
                .round_positions(r)
                .iter()
                .map(|position| {
                    format!(
                        "**{side}** ({agent}):\n{argument}",
                        side = position.side.as_str().to_uppercase(),
                        agent = position.agent_id,
                        argument = position.argument,
                    )
                })
                .join("\n\n");
            format!("## Round {r}\n{arguments}")
        })
        .join("\n\n");

    state.active = false;
    info!(pattern = %state.key(), rounds = max_rounds, "debate finished");

    Some(format!(
        "Debate {id} finished after {max_rounds} rounds. Judge the arguments below and decide.\n\n{transcript}",
        id = state.id,
    ))
}

#[cfg(test)]
mod tests {
    use super::handle;
    use crate::patterns::state::{DebateSide, AgentReport, PatternKind, PatternState};
    use crate::types::{PatternId, StageName};
    use chrono::Utc;

    fn given_debate(max_rounds: u32) -> Option<PatternState> {
        Some(PatternState::new(
            PatternId::parse("d1")?,
            "s1",
            60,
            PatternKind::debate(max_rounds),
            Utc::now(),
        ))
    }

    fn argue(state: &mut PatternState, agent: &str, side: &str, text: &str) -> Option<String> {
        let stage = StageName::parse(side)?;
        handle(
            state,
            &AgentReport {
                agent_id: agent,
                stage: &stage,
                output: text,
                at: Utc::now(),
            },
        )
    }

    #[test]
    fn when_pro_argues_then_con_is_instructed_with_counter_context() -> Result<(), String> {
        let mut state = given_debate(2).ok_or("fixture")?;

        let text = argue(&mut state, "p1", "pro", "Rust is safe").ok_or("no text")?;

        assert!(text.contains("[PATTERN:debate-d1:con]"));
        assert!(text.contains("Rust is safe"));
        Ok(())
    }

    #[test]
    fn when_rounds_complete_then_debate_ends_with_two_r_alternating_positions() -> Result<(), String> {
        let rounds = 3;
        let mut state = given_debate(rounds).ok_or("fixture")?;
        let mut last = None;
        for r in 0..rounds {
            argue(&mut state, &format!("pro{r}"), "pro", &format!("pro argument {r}"));
            last = argue(&mut state, &format!("con{r}"), "con", &format!("con argument {r}"));
        }

        assert!(!state.active);
        let PatternKind::Debate(debate) = &state.kind else {
            return Err("not a debate".to_string());
        };
        assert_eq!(debate.positions.len(), (rounds as usize) * 2);
        for (i, position) in debate.positions.iter().enumerate() {
            let expected = if i % 2 == 0 { DebateSide::Pro } else { DebateSide::Con };
            assert_eq!(position.side, expected);
        }
        let transcript = last.ok_or("no transcript")?;
        assert!(transcript.contains("## Round 3"));
        assert!(transcript.contains("con argument 2"));
        Ok(())
    }

    #[test]
    fn when_round_completes_early_then_round_advances_and_pro_resumes() -> Result<(), String> {
        let mut state = given_debate(2).ok_or("fixture")?;
        argue(&mut state, "p", "pro", "a");

        let text = argue(&mut state, "c", "con", "b").ok_or("no text")?;

        assert!(text.contains("[PATTERN:debate-d1:pro]"));
        assert!(state.active);
        match &state.kind {
            PatternKind::Debate(d) => assert_eq!(d.round, 2),
            _ => return Err("not a debate".to_string()),
        }
        Ok(())
    }

    #[test]
    fn when_side_is_out_of_turn_then_position_is_not_recorded() -> Result<(), String> {
        let mut state = given_debate(1).ok_or("fixture")?;

        let text = argue(&mut state, "c", "con", "first!").ok_or("no text")?;

        assert!(text.contains("expected a 'pro' argument"));
        assert!(state.agents.is_empty());
        Ok(())
    }
}
