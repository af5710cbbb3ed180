use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use swarm::patterns::PatternType;

#[derive(Parser)]
#[command(name = "swarm-hooks")]
#[command(about = "Pattern coordination and swarm ledger for hook-driven agent teams")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project root (default: $SWARM_PROJECT_DIR, $CLAUDE_PROJECT_DIR, cwd)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value = "json")]
    pub output: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Hook entry points; read the event from stdin and always continue
    #[command(subcommand)]
    Hook(HookCommand),

    #[command(subcommand)]
    Pattern(PatternCommand),

    #[command(subcommand)]
    Swarm(SwarmCommand),

    #[command(subcommand)]
    Daemon(DaemonCommand),
}

#[derive(Subcommand)]
pub enum HookCommand {
    /// PreToolUse / PostToolUse: register agents and advance tagged patterns
    Pattern,
    /// Stop: report this agent done in its swarm
    SwarmStop,
}

#[derive(Subcommand)]
pub enum PatternCommand {
    /// Create a pattern instance and print the tag its first agent must carry
    Init(InitArgs),
    Show(PatternRef),
    List,
    /// Delete expired instances
    Sweep,
    /// Delete one instance
    Reset(PatternRef),
}

#[derive(Args)]
pub struct InitArgs {
    #[arg(long = "type", value_enum)]
    pub pattern_type: PatternTypeArg,

    #[arg(long)]
    pub id: Option<String>,

    #[arg(long, env = "CLAUDE_SESSION_ID")]
    pub session: String,

    #[arg(long)]
    pub ttl_minutes: Option<u32>,

    /// Pipeline stages in order
    #[arg(long, value_delimiter = ',')]
    pub stages: Vec<String>,

    #[arg(long)]
    pub threshold: Option<f64>,

    #[arg(long)]
    pub max_rounds: Option<u32>,

    #[arg(long)]
    pub max_iterations: Option<u32>,
}

#[derive(Args)]
pub struct PatternRef {
    #[arg(long = "type", value_enum)]
    pub pattern_type: PatternTypeArg,

    #[arg(long)]
    pub id: String,
}

#[derive(Subcommand)]
pub enum SwarmCommand {
    Broadcast {
        #[arg(long, env = "SWARM_ID")]
        swarm: String,
        #[arg(long, env = "AGENT_ID")]
        agent: String,
        #[arg(long = "type", default_value = "note")]
        broadcast_type: String,
        #[arg(long, default_value = "")]
        payload: String,
    },
    Status {
        #[arg(long, env = "SWARM_ID")]
        swarm: String,
    },
    /// Latest broadcasts from other agents, newest first
    Inbox {
        #[arg(long, env = "SWARM_ID")]
        swarm: String,
        /// Skip broadcasts sent by this agent
        #[arg(long, env = "AGENT_ID")]
        agent: Option<String>,
        #[arg(long, default_value = "20")]
        limit: u32,
    },
}

#[derive(Subcommand)]
pub enum DaemonCommand {
    /// Print the resolved socket or port plus lock and pid paths
    Endpoint,
    Ping,
    Status,
    Query {
        #[arg(long)]
        cmd: String,
        /// JSON object merged into the request
        #[arg(long)]
        params: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum PatternTypeArg {
    Pipeline,
    Jury,
    Debate,
    Gencritic,
}

impl From<PatternTypeArg> for PatternType {
    fn from(arg: PatternTypeArg) -> Self {
        match arg {
            PatternTypeArg::Pipeline => Self::Pipeline,
            PatternTypeArg::Jury => Self::Jury,
            PatternTypeArg::Debate => Self::Debate,
            PatternTypeArg::Gencritic => Self::GenCritic,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}
