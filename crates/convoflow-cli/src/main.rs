//! CLI binary for running and inspecting ConvoFlow call flows.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use convoflow_engine::{
    export_dot, validate, validate_or_raise, CallFlowGraph, ConsolePrompter, EngineConfig,
    JsonlRecorder, NullRecorder, Severity, SqliteRecorder, StepRecorder, TraversalEngine,
};
use convoflow_resolver::{LexicalResolver, OpenAiResolver, TransitionResolver};
use convoflow_types::SessionId;

#[derive(Parser)]
#[command(name = "convoflow", version, about = "Keyword-routed IVR call flows authored as DOT graphs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ResolverKind {
    /// Offline keyword overlap
    Lexical,
    /// OpenAI-compatible chat completions
    Openai,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RecorderKind {
    /// Record nothing
    #[value(name = "none")]
    Null,
    /// One JSON Lines file per session
    Jsonl,
    /// SQLite sessions/routes tables
    Sqlite,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk a call flow interactively on the console
    Run {
        /// Path to the call flow .dot file
        flow: PathBuf,

        /// Start node (default: the flow's `start` attribute, else "start")
        #[arg(long, env = "CONVOFLOW_START_NODE")]
        start: Option<String>,

        /// How free-text input is mapped to a transition
        #[arg(long, value_enum, env = "CONVOFLOW_RESOLVER", default_value = "lexical")]
        resolver: ResolverKind,

        /// Where routing decisions are recorded
        #[arg(long, value_enum, env = "CONVOFLOW_RECORDER", default_value = "sqlite")]
        recorder: RecorderKind,

        /// SQLite database for --recorder sqlite
        #[arg(long, env = "CONVOFLOW_DB", default_value = ".convoflow/metrics.db")]
        db: PathBuf,

        /// Directory for --recorder jsonl
        #[arg(long, env = "CONVOFLOW_LOG_DIR", default_value = ".convoflow/sessions")]
        log_dir: PathBuf,

        /// Minimum score the lexical resolver accepts
        #[arg(long, env = "CONVOFLOW_MIN_SCORE", default_value_t = 0.5, value_parser = parse_min_score)]
        min_score: f64,

        /// Model for --resolver openai
        #[arg(long, env = "CONVOFLOW_MODEL")]
        model: Option<String>,

        /// API key for --resolver openai
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Base URL of the OpenAI-compatible endpoint
        #[arg(long, env = "OPENAI_BASE_URL")]
        base_url: Option<String>,
    },

    /// Validate a call flow .dot file
    Validate {
        /// Path to the call flow .dot file
        flow: PathBuf,
    },

    /// Show information about a call flow
    Info {
        /// Path to the call flow .dot file
        flow: PathBuf,
    },

    /// Render a call flow as Graphviz DOT for visualization
    Export {
        /// Path to the call flow .dot file
        flow: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List recorded sessions, or the steps of one session
    Sessions {
        /// SQLite database written by --recorder sqlite
        #[arg(long, env = "CONVOFLOW_DB", default_value = ".convoflow/metrics.db")]
        db: PathBuf,

        /// Show the steps of this session
        #[arg(long)]
        session: Option<String>,
    },
}

struct RunOptions {
    start: Option<String>,
    resolver: ResolverKind,
    recorder: RecorderKind,
    db: PathBuf,
    log_dir: PathBuf,
    min_score: f64,
    model: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Logs go to stderr so the conversation on stdout stays readable.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            flow,
            start,
            resolver,
            recorder,
            db,
            log_dir,
            min_score,
            model,
            api_key,
            base_url,
        } => {
            let options = RunOptions {
                start,
                resolver,
                recorder,
                db,
                log_dir,
                min_score,
                model,
                api_key,
                base_url,
            };
            cmd_run(&flow, options).await?;
        }
        Commands::Validate { flow } => {
            cmd_validate(&flow)?;
        }
        Commands::Info { flow } => {
            cmd_info(&flow)?;
        }
        Commands::Export { flow, output } => {
            cmd_export(&flow, output.as_deref())?;
        }
        Commands::Sessions { db, session } => {
            cmd_sessions(&db, session.as_deref()).await?;
        }
    }

    Ok(())
}

/// Lexical scores are fractions, so only `0.0..=1.0` can ever be met.
fn parse_min_score(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|e| format!("`{s}` is not a number: {e}"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("`{s}` is not in 0.0..=1.0"))
    }
}

fn load_flow(path: &Path) -> anyhow::Result<CallFlowGraph> {
    let source = std::fs::read_to_string(path)?;
    Ok(CallFlowGraph::parse(&source)?)
}

fn build_resolver(options: &RunOptions) -> anyhow::Result<Arc<dyn TransitionResolver>> {
    match options.resolver {
        ResolverKind::Lexical => Ok(Arc::new(LexicalResolver::with_min_score(options.min_score))),
        ResolverKind::Openai => {
            let key = options
                .api_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("--resolver openai needs OPENAI_API_KEY or --api-key"))?;
            let mut resolver = OpenAiResolver::new(key);
            if let Some(url) = &options.base_url {
                resolver = resolver.with_base_url(url.clone());
            }
            if let Some(model) = &options.model {
                resolver = resolver.with_model(model.clone());
            }
            tracing::debug!(model = resolver.model(), "Using OpenAI resolver");
            Ok(Arc::new(resolver))
        }
    }
}

async fn build_recorder(options: &RunOptions) -> anyhow::Result<Arc<dyn StepRecorder>> {
    let recorder: Arc<dyn StepRecorder> = match options.recorder {
        RecorderKind::Null => Arc::new(NullRecorder),
        RecorderKind::Jsonl => Arc::new(JsonlRecorder::new(options.log_dir.clone())),
        RecorderKind::Sqlite => Arc::new(SqliteRecorder::open(&options.db).await?),
    };
    Ok(recorder)
}

async fn cmd_run(path: &Path, options: RunOptions) -> anyhow::Result<()> {
    let mut graph = load_flow(path)?;
    if let Some(start) = &options.start {
        graph.set_start_node(start.clone());
    }

    let diagnostics = validate_or_raise(&graph)?;
    for diag in &diagnostics {
        tracing::warn!(rule = %diag.rule, "{}", diag.message);
    }

    let config = EngineConfig::new(graph.start_node());
    let resolver = build_resolver(&options)?;
    let recorder = build_recorder(&options).await?;
    tracing::info!(flow = %graph.name, start = %config.start_node, resolver = resolver.name(), recorder = ?options.recorder, "Loaded call flow");

    let engine = TraversalEngine::new(
        config,
        Arc::new(graph),
        resolver,
        recorder,
        Arc::new(ConsolePrompter),
    );
    let summary = engine.run().await?;

    tracing::info!(
        session = %summary.session_id,
        steps = summary.steps_recorded,
        path = %summary.path.join(" -> "),
        termination = ?summary.termination,
        "Session finished"
    );
    Ok(())
}

fn cmd_validate(path: &Path) -> anyhow::Result<()> {
    let graph = load_flow(path)?;
    let diagnostics = validate(&graph);

    if diagnostics.is_empty() {
        println!("Call flow is valid");
        return Ok(());
    }

    let mut has_error = false;
    for diag in &diagnostics {
        let severity = match diag.severity {
            Severity::Error => {
                has_error = true;
                "ERROR"
            }
            Severity::Warning => "WARN",
        };
        println!("[{}] {}: {}", severity, diag.rule, diag.message);
        if let Some(fix) = &diag.fix {
            println!("        fix: {fix}");
        }
    }

    if has_error {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_info(path: &Path) -> anyhow::Result<()> {
    let graph = load_flow(path)?;

    println!("Call flow: {}", graph.name);
    println!("Start: {}", graph.start_node());
    println!("Nodes: {}", graph.node_count());
    println!("Transitions: {}", graph.transition_count());

    let terminals: Vec<_> = graph
        .all_nodes()
        .filter(|n| n.is_terminal())
        .map(|n| n.id.as_str())
        .collect();
    println!("Terminal nodes: {}", terminals.join(", "));

    println!("\nNodes:");
    for node in graph.all_nodes() {
        println!("  {}: {}", node.id, node.text.as_deref().unwrap_or("(no text)"));
        for (keyword, target) in &node.transitions {
            println!("      {keyword} -> {target}");
        }
    }

    Ok(())
}

fn cmd_export(path: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let graph = load_flow(path)?;
    let dot = export_dot(&graph);
    match output {
        Some(out) => {
            std::fs::write(out, dot)?;
            println!("Wrote {}", out.display());
        }
        None => print!("{dot}"),
    }
    Ok(())
}

async fn cmd_sessions(db: &Path, session: Option<&str>) -> anyhow::Result<()> {
    if !db.exists() {
        anyhow::bail!("No session database at {}", db.display());
    }
    let recorder = SqliteRecorder::open(db).await?;

    if let Some(id) = session {
        let steps = recorder.steps_for_session(&SessionId::from(id)).await?;
        if steps.is_empty() {
            println!("No steps recorded for session {id}");
        }
        for step in &steps {
            println!(
                "{}  {:<24} {:<24} {}",
                step.timestamp.format("%Y-%m-%d %H:%M:%S"),
                step.node_id,
                step.keyword,
                step.user_input
            );
        }
        return Ok(());
    }

    let sessions = recorder.list_sessions().await?;
    if sessions.is_empty() {
        println!("No sessions recorded");
    }
    for s in &sessions {
        let steps = recorder.steps_for_session(&s.session_id).await?.len();
        let end = s
            .end_time
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "(open)".to_string());
        println!(
            "{}  {}  {}  {} steps",
            s.session_id,
            s.start_time.format("%Y-%m-%d %H:%M:%S"),
            end,
            steps
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "convoflow",
            "run",
            "flows/coolcompany.dot",
            "--resolver",
            "openai",
            "--recorder",
            "none",
            "--start",
            "billing",
            "--min-score",
            "0.75",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                flow,
                start,
                resolver,
                recorder,
                min_score,
                ..
            } => {
                assert_eq!(flow, PathBuf::from("flows/coolcompany.dot"));
                assert_eq!(start.as_deref(), Some("billing"));
                assert_eq!(resolver, ResolverKind::Openai);
                assert_eq!(recorder, RecorderKind::Null);
                assert_eq!(min_score, 0.75);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn min_score_out_of_range_rejected() {
        for bad in ["NaN", "1.5", "-0.1", "high"] {
            assert!(
                Cli::try_parse_from(["convoflow", "run", "f.dot", "--min-score", bad]).is_err(),
                "accepted --min-score {bad}"
            );
        }
        assert_eq!(parse_min_score("0"), Ok(0.0));
        assert_eq!(parse_min_score("1.0"), Ok(1.0));
    }

    #[test]
    fn unknown_resolver_rejected() {
        assert!(Cli::try_parse_from(["convoflow", "run", "f.dot", "--resolver", "magic"]).is_err());
    }

    #[test]
    fn sample_flow_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../flows/coolcompany.dot");
        let graph = load_flow(&path).unwrap();
        assert_eq!(graph.start_node(), "start");
        assert!(validate(&graph).is_empty());
    }

    #[test]
    fn openai_resolver_requires_key() {
        let options = RunOptions {
            start: None,
            resolver: ResolverKind::Openai,
            recorder: RecorderKind::Null,
            db: PathBuf::from("unused.db"),
            log_dir: PathBuf::from("unused"),
            min_score: 0.5,
            model: None,
            api_key: None,
            base_url: None,
        };
        let err = build_resolver(&options).err().unwrap();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
