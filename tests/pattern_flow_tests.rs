//! End-to-end pattern flows over the file-backed store: hook events go in,
//! coordination text and on-disk state come out.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use swarm::hook_protocol::{parse_hook_input, DispatchOutcome, HookEvent, HookInput, IgnoreReason};
use swarm::patterns::{GenCriticOutcome, PatternKind, PatternType};
use swarm::types::{PatternId, StageName};
use swarm::{FilePatternStore, PatternInit, PatternOrchestrator, PatternStore};
use tempfile::TempDir;

fn hook(name: &str, prompt: &str, agent: &str, response: &str) -> HookInput {
    parse_hook_input(
        &json!({
            "hook_event_name": name,
            "session_id": "sess-1",
            "tool_name": "Task",
            "tool_input": {"prompt": prompt, "description": "agent"},
            "tool_response": response,
            "agent_id": agent,
        })
        .to_string(),
    )
    .unwrap()
}

fn started(prompt: &str, agent: &str) -> HookInput {
    hook("PreToolUse", prompt, agent, "")
}

fn completed(prompt: &str, agent: &str, response: &str) -> HookInput {
    hook("PostToolUse", prompt, agent, response)
}

fn orchestrator(dir: &TempDir) -> PatternOrchestrator<FilePatternStore> {
    PatternOrchestrator::new(FilePatternStore::new(dir.path().join("patterns")))
}

fn init(pattern_type: PatternType, id: &str) -> PatternInit {
    let mut request = PatternInit::new(pattern_type, "sess-1", 60);
    request.id = Some(PatternId::parse(id).unwrap());
    request
}

fn stages(names: &[&str]) -> Vec<StageName> {
    names.iter().map(|name| StageName::parse(*name).unwrap()).collect()
}

#[tokio::test]
async fn given_three_stage_pipeline_when_each_stage_reports_then_context_hands_off_and_synthesizes() {
    let dir = TempDir::new().unwrap();
    let orchestrator = orchestrator(&dir);
    let now = Utc::now();
    let mut request = init(PatternType::Pipeline, "feat-1");
    request.stages = stages(&["research", "draft", "review"]);
    orchestrator.init(&request, now).await.unwrap();

    let research = orchestrator
        .handle_event(&completed("[PATTERN:pipeline-feat-1:research] go", "a1", "FACTS"), now)
        .await;
    let text = research.context().unwrap();
    assert!(text.contains("(1/3)"));
    assert!(text.contains("[PATTERN:pipeline-feat-1:draft]"));
    assert!(text.contains("FACTS"));

    orchestrator
        .handle_event(&completed("[PATTERN:pipeline-feat-1:draft]", "a2", "PROSE"), now)
        .await;
    let last = orchestrator
        .handle_event(&completed("[PATTERN:pipeline-feat-1:review]", "a3", "LGTM"), now)
        .await;
    let synthesis = last.context().unwrap();
    assert!(synthesis.contains("all 3 stages finished"));
    assert!(synthesis.contains("## Stage 1: research\nFACTS"));
    assert!(synthesis.contains("## Stage 3: review\nLGTM"));

    let stored = orchestrator
        .store()
        .load(PatternType::Pipeline, &PatternId::parse("feat-1").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.active);
    assert_eq!(stored.revision, 3);
    assert_eq!(stored.agents.len(), 3);
}

#[tokio::test]
async fn given_pipeline_when_stage_name_is_misspelled_then_state_is_not_rewritten() {
    let dir = TempDir::new().unwrap();
    let orchestrator = orchestrator(&dir);
    let now = Utc::now();
    let mut request = init(PatternType::Pipeline, "p2");
    request.stages = stages(&["draft", "review"]);
    orchestrator.init(&request, now).await.unwrap();

    let outcome = orchestrator
        .handle_event(&completed("[PATTERN:pipeline-p2:reveiw]", "a1", "x"), now)
        .await;
    let text = outcome.context().unwrap();
    assert!(text.contains("unknown stage 'reveiw'"));
    assert!(text.contains("Did you mean 'review'?"));

    let stored = orchestrator
        .store()
        .load(PatternType::Pipeline, &PatternId::parse("p2").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.revision, 0);
}

#[tokio::test]
async fn given_jury_of_three_when_all_jurors_vote_then_verdict_is_reported_once() {
    let dir = TempDir::new().unwrap();
    let orchestrator = orchestrator(&dir);
    let now = Utc::now();
    let mut request = init(PatternType::Jury, "j1");
    request.threshold = Some(0.6);
    orchestrator.init(&request, now).await.unwrap();

    let tag = "[PATTERN:jury-j1:juror] evaluate";
    for agent in ["x", "y", "z"] {
        orchestrator.handle_event(&started(tag, agent), now).await;
    }

    let first = orchestrator.handle_event(&completed(tag, "x", "APPROVE\nsolid"), now).await;
    assert!(first.context().unwrap().contains("(1/3)"));
    orchestrator.handle_event(&completed(tag, "y", "reject: no tests"), now).await;
    let verdict = orchestrator.handle_event(&completed(tag, "z", "approve"), now).await;
    let text = verdict.context().unwrap();
    assert!(text.contains("APPROVED (2/3 approve"));

    let late = orchestrator.handle_event(&completed(tag, "w", "reject"), now).await;
    assert_eq!(late, DispatchOutcome::Ignore(IgnoreReason::Inactive));
}

#[tokio::test]
async fn given_two_round_debate_when_sides_alternate_then_transcript_lists_every_round() {
    let dir = TempDir::new().unwrap();
    let orchestrator = orchestrator(&dir);
    let now = Utc::now();
    let mut request = init(PatternType::Debate, "d1");
    request.max_rounds = Some(2);
    orchestrator.init(&request, now).await.unwrap();

    let turns = [
        ("pro", "p1", "tabs are faster"),
        ("con", "c1", "spaces align"),
        ("pro", "p2", "editors convert"),
    ];
    for (side, agent, argument) in turns {
        let prompt = format!("[PATTERN:debate-d1:{side}]");
        let outcome = orchestrator.handle_event(&completed(&prompt, agent, argument), now).await;
        assert!(outcome.context().is_some());
    }

    let out_of_turn = orchestrator
        .handle_event(&completed("[PATTERN:debate-d1:pro]", "p3", "again"), now)
        .await;
    assert!(out_of_turn.context().unwrap().contains("expected a 'con' argument"));

    let closing = orchestrator
        .handle_event(&completed("[PATTERN:debate-d1:con]", "c2", "diffs stay clean"), now)
        .await;
    let transcript = closing.context().unwrap();
    assert!(transcript.contains("## Round 1"));
    assert!(transcript.contains("## Round 2"));
    assert!(transcript.contains("diffs stay clean"));
    assert!(!transcript.contains("again"));

    let stored = orchestrator
        .store()
        .load(PatternType::Debate, &PatternId::parse("d1").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.active);
    match stored.kind {
        PatternKind::Debate(debate) => assert_eq!(debate.positions.len(), 4),
        other => panic!("unexpected kind {other:?}"),
    }
}

#[tokio::test]
async fn given_gencritic_when_critic_never_approves_then_loop_stops_at_max_iterations() {
    let dir = TempDir::new().unwrap();
    let orchestrator = orchestrator(&dir);
    let now = Utc::now();
    let mut request = init(PatternType::GenCritic, "g1");
    request.max_iterations = Some(2);
    orchestrator.init(&request, now).await.unwrap();

    let generator = "[PATTERN:gencritic-g1:generator]";
    let critic = "[PATTERN:gencritic-g1:critic]";

    let draft = orchestrator.handle_event(&completed(generator, "g-a", "v1"), now).await;
    assert!(draft.context().unwrap().contains(critic));
    let feedback = orchestrator
        .handle_event(&completed(critic, "c-a", "needs examples"), now)
        .await;
    assert!(feedback.context().unwrap().contains(generator));

    orchestrator.handle_event(&completed(generator, "g-b", "v2"), now).await;
    let last = orchestrator
        .handle_event(&completed(critic, "c-b", "still thin"), now)
        .await;
    let text = last.context().unwrap();
    assert!(text.contains("max iterations reached (2)"));
    assert!(text.contains("v2"));

    let stored = orchestrator
        .store()
        .load(PatternType::GenCritic, &PatternId::parse("g1").unwrap())
        .await
        .unwrap()
        .unwrap();
    match stored.kind {
        PatternKind::GenCritic(gc) => {
            assert_eq!(gc.outcome, Some(GenCriticOutcome::MaxIterationsReached));
            assert!(!gc.approved);
        }
        other => panic!("unexpected kind {other:?}"),
    }
}

#[tokio::test]
async fn given_expired_instance_when_any_hook_fires_then_it_is_swept_from_disk() {
    let dir = TempDir::new().unwrap();
    let orchestrator = orchestrator(&dir);
    let created = Utc::now() - Duration::minutes(120);
    let mut request = init(PatternType::Jury, "old");
    request.ttl_minutes = 30;
    orchestrator.init(&request, created).await.unwrap();

    let outcome = orchestrator
        .handle_event(&started("no tag here", "a"), Utc::now())
        .await;
    assert_eq!(outcome, DispatchOutcome::Ignore(IgnoreReason::Untagged));
    assert!(orchestrator.store().list().await.unwrap().is_empty());
}

#[tokio::test]
async fn given_corrupt_state_file_when_tag_arrives_then_hook_continues_without_context() {
    let dir = TempDir::new().unwrap();
    let orchestrator = orchestrator(&dir);
    let patterns = dir.path().join("patterns");
    std::fs::create_dir_all(&patterns).unwrap();
    std::fs::write(patterns.join("jury-broken.json"), "{ not json").unwrap();

    let outcome = orchestrator
        .handle_event(&completed("[PATTERN:jury-broken:juror]", "a", "approve"), Utc::now())
        .await;
    assert_eq!(outcome, DispatchOutcome::Ignore(IgnoreReason::MissingState));

    let response: Value =
        serde_json::from_str(&outcome.into_response(HookEvent::PostToolUse).to_json()).unwrap();
    assert_eq!(response, json!({"result": "continue"}));
}
