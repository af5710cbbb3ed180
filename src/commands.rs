use crate::cli::{
    Cli, Commands, DaemonCommand, HookCommand, InitArgs, PatternCommand, PatternRef,
    SwarmCommand,
};
use crate::output::{emit_error, emit_output};
use chrono::Utc;
use serde_json::{json, Value};
use std::time::Instant;
use swarm::config::Config;
use swarm::daemon::{DaemonClient, QueryOutcome};
use swarm::hook_protocol::{
    parse_hook_input, DispatchOutcome, HookEvent, HookInput, IgnoreReason,
};
use swarm::ledger::{swarm_stop, SwarmLedger};
use swarm::orchestrator::{entry_stage, PatternInit, PatternOrchestrator};
use swarm::patterns::{PatternState, PatternType};
use swarm::protocol_envelope::ProtocolEnvelope;
use swarm::store::{FilePatternStore, PatternStore};
use swarm::types::{AgentName, PatternId, StageName, SwarmId};
use swarm::{Result, SwarmError};
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Runs one CLI invocation and returns the process exit code.
pub async fn run(cli: Cli) -> i32 {
    let config = cli
        .project
        .clone()
        .map_or_else(Config::load, Config::load_from);

    if let Commands::Hook(hook) = &cli.command {
        run_hook(hook, &config).await;
        return 0;
    }

    let name = command_name(&cli.command);
    let started = Instant::now();
    match dispatch(&cli.command, &config).await {
        Ok((data, next)) => {
            let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            let mut envelope = ProtocolEnvelope::success(name, data).with_ms(elapsed);
            if let Some(next) = next {
                envelope = envelope.with_next(next);
            }
            emit_output(cli.output, &envelope);
            0
        }
        Err(error) => {
            emit_error(cli.output, name, &error);
            error.exit_code()
        }
    }
}

const fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Hook(HookCommand::Pattern) => "hook pattern",
        Commands::Hook(HookCommand::SwarmStop) => "hook swarm-stop",
        Commands::Pattern(PatternCommand::Init(_)) => "pattern init",
        Commands::Pattern(PatternCommand::Show(_)) => "pattern show",
        Commands::Pattern(PatternCommand::List) => "pattern list",
        Commands::Pattern(PatternCommand::Sweep) => "pattern sweep",
        Commands::Pattern(PatternCommand::Reset(_)) => "pattern reset",
        Commands::Swarm(SwarmCommand::Broadcast { .. }) => "swarm broadcast",
        Commands::Swarm(SwarmCommand::Status { .. }) => "swarm status",
        Commands::Swarm(SwarmCommand::Inbox { .. }) => "swarm inbox",
        Commands::Daemon(DaemonCommand::Endpoint) => "daemon endpoint",
        Commands::Daemon(DaemonCommand::Ping) => "daemon ping",
        Commands::Daemon(DaemonCommand::Status) => "daemon status",
        Commands::Daemon(DaemonCommand::Query { .. }) => "daemon query",
    }
}

type CommandOutput = (Value, Option<String>);

async fn dispatch(command: &Commands, config: &Config) -> Result<CommandOutput> {
    match command {
        Commands::Hook(_) => Ok((Value::Null, None)),
        Commands::Pattern(pattern) => pattern_command(pattern, config).await,
        Commands::Swarm(swarm) => swarm_command(swarm, config).await,
        Commands::Daemon(daemon) => daemon_command(daemon, config).await,
    }
}

// Hooks: stdout carries exactly one continue document, whatever happens.

async fn run_hook(hook: &HookCommand, config: &Config) {
    let mut raw = String::new();
    if let Err(e) = tokio::io::stdin().read_to_string(&mut raw).await {
        debug!(error = %e, "failed to read hook input");
    }
    let input = parse_hook_input(&raw);
    let event = input.as_ref().map_or(HookEvent::Other, HookInput::event);

    let outcome = match (hook, input) {
        (_, None) => DispatchOutcome::Ignore(IgnoreReason::MalformedInput),
        (HookCommand::Pattern, Some(input)) => {
            let orchestrator = PatternOrchestrator::new(FilePatternStore::new(&config.state_dir));
            orchestrator.handle_event(&input, Utc::now()).await
        }
        (HookCommand::SwarmStop, Some(input)) => swarm_stop_hook(&input, config).await,
    };
    if let DispatchOutcome::Ignore(reason) = &outcome {
        debug!(reason = reason.as_str(), "hook produced no context");
    }

    println!("{}", outcome.into_response(event).to_json());
}

fn env_id(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

async fn swarm_stop_hook(input: &HookInput, config: &Config) -> DispatchOutcome {
    let swarm = env_id("SWARM_ID")
        .or_else(|| Some(input.session_id.clone()).filter(|session| !session.is_empty()));
    let agent = env_id("AGENT_ID").or_else(|| input.invocation_id().map(ToString::to_string));
    let (Some(swarm), Some(agent)) = (swarm, agent) else {
        return DispatchOutcome::Ignore(IgnoreReason::Untagged);
    };
    let (Some(swarm), Some(agent)) = (SwarmId::parse(swarm), AgentName::parse(agent)) else {
        return DispatchOutcome::Ignore(IgnoreReason::InvalidIdentifier);
    };

    match SwarmLedger::open(&config.ledger_path).await {
        Ok(ledger) => swarm_stop(&ledger, &swarm, &agent).await,
        Err(e) => {
            tracing::warn!(error = %e, "swarm ledger unavailable");
            DispatchOutcome::Ignore(IgnoreReason::LedgerFailure)
        }
    }
}

// Pattern administration

async fn pattern_command(command: &PatternCommand, config: &Config) -> Result<CommandOutput> {
    let orchestrator = PatternOrchestrator::new(FilePatternStore::new(&config.state_dir));
    let store = orchestrator.store();
    let now = Utc::now();

    match command {
        PatternCommand::Init(args) => {
            let request = init_request(args, config)?;
            let state = orchestrator.init(&request, now).await?;
            let tag = state.tag_for(entry_stage(&state.kind));
            let next = format!("include {tag} in the first agent's prompt");
            Ok((
                json!({
                    "message": format!("created {}", state.key()),
                    "key": state.key(),
                    "tag": tag,
                    "expires_at": state.expires_at().to_rfc3339(),
                    "state": state,
                }),
                Some(next),
            ))
        }
        PatternCommand::Show(target) => {
            let (pattern_type, id) = resolve_ref(target)?;
            let state = store
                .load(pattern_type, &id)
                .await?
                .ok_or_else(|| SwarmError::PatternNotFound(format!("{pattern_type}-{id}")))?;
            Ok((serde_json::to_value(&state)?, None))
        }
        PatternCommand::List => {
            let states = store.list().await?;
            let rows: Vec<Value> = states.iter().map(|state| summary_row(state, now)).collect();
            Ok((json!({"count": rows.len(), "patterns": rows}), None))
        }
        PatternCommand::Sweep => {
            let removed = store.sweep(now).await?;
            Ok((
                json!({"message": format!("removed {} expired", removed.len()), "removed": removed}),
                None,
            ))
        }
        PatternCommand::Reset(target) => {
            let (pattern_type, id) = resolve_ref(target)?;
            if !store.delete(pattern_type, &id).await? {
                return Err(SwarmError::PatternNotFound(format!("{pattern_type}-{id}")));
            }
            Ok((json!({"message": format!("deleted {pattern_type}-{id}")}), None))
        }
    }
}

fn init_request(args: &InitArgs, config: &Config) -> Result<PatternInit> {
    let mut request = PatternInit::new(
        args.pattern_type.into(),
        args.session.clone(),
        args.ttl_minutes.unwrap_or(config.default_ttl_minutes),
    );
    request.id = args.id.as_deref().map(parse_pattern_id).transpose()?;
    request.stages = args
        .stages
        .iter()
        .map(|stage| {
            StageName::parse(stage.as_str()).ok_or_else(|| SwarmError::InvalidIdentifier(stage.clone()))
        })
        .collect::<Result<Vec<_>>>()?;
    request.threshold = args.threshold;
    request.max_rounds = args.max_rounds;
    request.max_iterations = args.max_iterations;
    Ok(request)
}

fn parse_pattern_id(raw: &str) -> Result<PatternId> {
    PatternId::parse(raw).ok_or_else(|| SwarmError::InvalidIdentifier(raw.to_string()))
}

fn resolve_ref(target: &PatternRef) -> Result<(PatternType, PatternId)> {
    Ok((target.pattern_type.into(), parse_pattern_id(&target.id)?))
}

fn summary_row(state: &PatternState, now: chrono::DateTime<Utc>) -> Value {
    json!({
        "key": state.key(),
        "type": state.pattern_type(),
        "id": state.id,
        "session_id": state.session_id,
        "active": state.active,
        "expired": state.is_expired(now),
        "agents": state.agents.len(),
        "revision": state.revision,
    })
}

// Swarm ledger

async fn swarm_command(command: &SwarmCommand, config: &Config) -> Result<CommandOutput> {
    let ledger = SwarmLedger::open(&config.ledger_path).await?;
    match command {
        SwarmCommand::Broadcast {
            swarm,
            agent,
            broadcast_type,
            payload,
        } => {
            let swarm = parse_swarm(swarm)?;
            let agent = parse_agent(agent)?;
            let id = ledger.broadcast(&swarm, &agent, broadcast_type, payload).await?;
            let completion = ledger.completion_status(&swarm).await?;
            Ok((
                json!({"id": id, "message": format!("Swarm {swarm}: {}", completion.summary()), "completion": completion}),
                None,
            ))
        }
        SwarmCommand::Status { swarm } => {
            let swarm = parse_swarm(swarm)?;
            let completion = ledger.completion_status(&swarm).await?;
            Ok((
                json!({
                    "message": format!("Swarm {swarm}: {}", completion.summary()),
                    "done": completion.done,
                    "total": completion.total,
                    "complete": completion.is_complete(),
                }),
                None,
            ))
        }
        SwarmCommand::Inbox {
            swarm,
            agent,
            limit,
        } => {
            let swarm = parse_swarm(swarm)?;
            let exclude = agent.as_deref().map(parse_agent).transpose()?;
            let broadcasts = ledger.recent_broadcasts(&swarm, exclude.as_ref(), *limit).await?;
            Ok((json!({"count": broadcasts.len(), "broadcasts": broadcasts}), None))
        }
    }
}

fn parse_swarm(raw: &str) -> Result<SwarmId> {
    SwarmId::parse(raw).ok_or_else(|| SwarmError::InvalidIdentifier(raw.to_string()))
}

fn parse_agent(raw: &str) -> Result<AgentName> {
    AgentName::parse(raw).ok_or_else(|| SwarmError::InvalidIdentifier(raw.to_string()))
}

// Daemon

async fn daemon_command(command: &DaemonCommand, config: &Config) -> Result<CommandOutput> {
    let client = DaemonClient::new(config.project_dir(), config.daemon.clone());
    match command {
        DaemonCommand::Endpoint => Ok((serde_json::to_value(client.endpoint())?, None)),
        DaemonCommand::Ping => {
            let reachable = client.probe().await;
            let next = (!reachable).then(|| {
                format!(
                    "start it with `{}`",
                    config.daemon.start_command.join(" ")
                )
            });
            Ok((
                json!({"reachable": reachable, "endpoint": client.endpoint().address.to_string()}),
                next,
            ))
        }
        DaemonCommand::Status => Ok((serde_json::to_value(client.status().await)?, None)),
        DaemonCommand::Query { cmd, params } => {
            let params = match params.as_deref() {
                Some(raw) => serde_json::from_str(raw)?,
                None => Value::Null,
            };
            let outcome = client.query(cmd, params).await;
            let next = match &outcome {
                QueryOutcome::Unavailable { .. } => Some(format!(
                    "check `daemon status`, or start it with `{}`",
                    config.daemon.start_command.join(" ")
                )),
                QueryOutcome::Indexing { .. } => Some("retry once indexing finishes".to_string()),
                QueryOutcome::Ok { .. } | QueryOutcome::Error { .. } => None,
            };
            Ok((serde_json::to_value(&outcome)?, next))
        }
    }
}
