use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;
use war_room_core::{
    elapsed_minute, DecisionPoint, DecisionSelections, Scenario, ScenarioEvent, SessionRecord,
    SCENARIO_MAX_MINUTE,
};
use war_room_store_json::{JsonSessionStore, SessionId};

const CLI_CONTRACT_VERSION: &str = "cli.v1";
const LOG_ENV: &str = "WAR_ROOM_LOG";

#[derive(Debug, Parser)]
#[command(name = "wr")]
#[command(about = "Crisis communications war-room drill scorer")]
struct Cli {
    #[arg(long, env = "WAR_ROOM_SESSIONS_DIR", default_value = "./sessions")]
    sessions_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Score a holding statement and the three decisions, then save the session.
    Score(ScoreArgs),
    Sessions {
        #[command(subcommand)]
        command: SessionsCommand,
    },
    Scenario {
        #[command(subcommand)]
        command: ScenarioCommand,
    },
    /// Print the decision prompts and their menu choices.
    Options,
}

#[derive(Debug, Args)]
struct ScoreArgs {
    #[arg(long, conflicts_with = "statement_file")]
    statement: Option<String>,
    /// Read the statement from a file, or `-` for stdin.
    #[arg(long)]
    statement_file: Option<PathBuf>,
    #[arg(long, default_value = "")]
    respond_now: String,
    #[arg(long, default_value = "")]
    bbc_request: String,
    #[arg(long, default_value = "")]
    charity_story: String,
    /// RFC3339 UTC creation time; defaults to now.
    #[arg(long)]
    created_at: Option<String>,
}

#[derive(Debug, Subcommand)]
enum SessionsCommand {
    List,
    Show(SessionShowArgs),
}

#[derive(Debug, Args)]
struct SessionShowArgs {
    #[arg(long)]
    id: String,
}

#[derive(Debug, Subcommand)]
enum ScenarioCommand {
    Show(ScenarioArgs),
    Feed(ScenarioFeedArgs),
}

#[derive(Debug, Args)]
struct ScenarioArgs {
    #[arg(long, env = "WAR_ROOM_SCENARIO", default_value = "./scenarios/campus_speech.json")]
    scenario: PathBuf,
}

#[derive(Debug, Args)]
struct ScenarioFeedArgs {
    #[command(flatten)]
    scenario: ScenarioArgs,
    #[arg(long, conflicts_with = "started_at")]
    minute: Option<u32>,
    /// RFC3339 UTC start of the drill; the minute follows the wall clock.
    #[arg(long)]
    started_at: Option<String>,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let store = JsonSessionStore::open(cli.sessions_dir);
    match cli.command {
        Command::Score(args) => run_score(args, &store),
        Command::Sessions { command } => run_sessions(command, &store),
        Command::Scenario { command } => run_scenario(command),
        Command::Options => run_options(),
    }
}

fn run_score(args: ScoreArgs, store: &JsonSessionStore) -> Result<()> {
    let statement = match (args.statement, args.statement_file) {
        (Some(text), _) => text,
        (None, Some(path)) => read_statement_file(&path)?,
        (None, None) => String::new(),
    };
    let created_at = parse_optional_rfc3339(args.created_at.as_deref())?;
    let decisions = DecisionSelections {
        respond_now: args.respond_now,
        bbc_request: args.bbc_request,
        charity_story: args.charity_story,
    };

    let record = SessionRecord::score(statement, decisions, created_at)?;
    let session_id = store
        .save(&record)
        .with_context(|| format!("failed to save session under {}", store.root().display()))?;
    tracing::info!(session_id = %session_id, overall = record.overall, "scored session");

    emit_json(serde_json::json!({
        "session_id": session_id.as_str(),
        "path": store.path_for(&session_id),
        "record": serde_json::to_value(&record).context("failed to serialize session record")?
    }))
}

fn run_sessions(command: SessionsCommand, store: &JsonSessionStore) -> Result<()> {
    match command {
        SessionsCommand::List => {
            let sessions = store.list()?;
            emit_json(serde_json::json!({
                "sessions_dir": store.root(),
                "sessions": sessions.iter().map(SessionId::as_str).collect::<Vec<_>>()
            }))
        }
        SessionsCommand::Show(args) => {
            let session_id = SessionId::parse(&args.id)?;
            let record = store.load(&session_id)?;
            emit_json(serde_json::json!({
                "session_id": session_id.as_str(),
                "record": serde_json::to_value(&record).context("failed to serialize session record")?
            }))
        }
    }
}

fn run_scenario(command: ScenarioCommand) -> Result<()> {
    match command {
        ScenarioCommand::Show(args) => {
            let scenario = load_scenario(&args.scenario)?;
            emit_json(serde_json::json!({
                "title": &scenario.title,
                "baseline_sentiment": scenario.baseline_label(),
                "events": scenario.events.len(),
                "max_minute": SCENARIO_MAX_MINUTE
            }))
        }
        ScenarioCommand::Feed(args) => {
            let scenario = load_scenario(&args.scenario.scenario)?;
            let minute = match (args.minute, args.started_at.as_deref()) {
                (Some(minute), _) => minute.min(SCENARIO_MAX_MINUTE),
                (None, Some(raw)) => elapsed_minute(parse_rfc3339(raw)?, OffsetDateTime::now_utc()),
                (None, None) => 0,
            };
            let lines = scenario.feed_at(minute).map(ScenarioEvent::render).collect::<Vec<_>>();
            emit_json(serde_json::json!({
                "title": &scenario.title,
                "minute": minute,
                "lines": lines
            }))
        }
    }
}

fn run_options() -> Result<()> {
    let points = DecisionPoint::ALL
        .iter()
        .map(|point| {
            serde_json::json!({
                "key": point.as_str(),
                "prompt": point.prompt(),
                "choices": point.choices()
            })
        })
        .collect::<Vec<_>>();
    emit_json(serde_json::json!({ "decision_points": points }))
}

fn load_scenario(path: &Path) -> Result<Scenario> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario file {}", path.display()))?;
    let scenario = Scenario::from_json_str(&raw)
        .with_context(|| format!("failed to load scenario {}", path.display()))?;
    tracing::debug!(title = %scenario.title, events = scenario.events.len(), "loaded scenario");
    Ok(scenario)
}

fn read_statement_file(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut body = String::new();
        std::io::stdin().read_to_string(&mut body).context("failed to read statement from stdin")?;
        return Ok(body);
    }
    fs::read_to_string(path)
        .with_context(|| format!("failed to read statement file {}", path.display()))
}

fn parse_optional_rfc3339(value: Option<&str>) -> Result<OffsetDateTime> {
    match value {
        Some(raw) => parse_rfc3339(raw),
        None => Ok(OffsetDateTime::now_utc()),
    }
}

fn parse_rfc3339(value: &str) -> Result<OffsetDateTime> {
    let parsed = OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .with_context(|| format!("invalid RFC3339 UTC timestamp: {value}"))?;

    if parsed.offset() != time::UtcOffset::UTC {
        return Err(anyhow!("timestamp MUST use UTC offset Z (received: {value})"));
    }

    Ok(parsed)
}
