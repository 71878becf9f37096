mod console;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use nodeflow_core::config::{AppConfig, ModelConfig, Schedule};
use nodeflow_core::error::FlowError;
use nodeflow_core::event::EventBus;
use nodeflow_core::traits::{LlmClient, ProjectStore, ToolSimulator};
use nodeflow_core::types::{RunMode, Scenario};
use nodeflow_engine::bridge;
use nodeflow_engine::{
    build_order, FlowRunner, GraphDocument, RunLogger, RunManifest, RunOptions, RunReport,
    StepController,
};
use nodeflow_memory::SqliteStore;
use nodeflow_tools::SimulatorHub;

#[derive(Parser)]
#[command(name = "nodeflow", version, about = "Run, step through and explain node-graph workflows")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "nodeflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a graph from its start node
    Run {
        /// Graph document (JSON)
        graph: PathBuf,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Print the dependency order of a graph
    Order {
        graph: PathBuf,
        /// Order relative to this start node
        #[arg(long)]
        start: Option<String>,
    },
    /// Show which properties a node uses and which path it would take
    Inspect {
        graph: PathBuf,
        /// Node id
        node: String,
        #[arg(long)]
        json: bool,
    },
    /// Browse saved run manifests
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Print the effective configuration (keys masked)
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List recent runs, newest first
    List {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Print one manifest as JSON
    Show { id: String },
    /// Run a saved graph again with its recorded seed and environment
    Replay {
        id: String,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Delete a manifest
    Delete { id: String },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Start node id (defaults to the document's startNodeId)
    #[arg(long)]
    start: Option<String>,
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
    /// User text fed to the start node
    #[arg(long)]
    input: Option<String>,
    #[arg(long)]
    seed: Option<u64>,
    /// Scenario description injected into the start node's context
    #[arg(long)]
    scenario: Option<String>,
    /// Execute every node in dependency order instead of following edges
    #[arg(long)]
    full_order: bool,
    /// Force tool-agent nodes onto the simulator
    #[arg(long)]
    simulate: bool,
    /// Model override applied to every LLM-backed node
    #[arg(long)]
    model: Option<String>,
    /// Start paused and drive the run from stdin
    #[arg(long)]
    step: bool,
    /// Pause before this node (repeatable)
    #[arg(long = "breakpoint", value_name = "NODE")]
    breakpoints: Vec<String>,
    /// Playback speed for stepped runs
    #[arg(long)]
    speed: Option<f32>,
    /// Print the full run report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Mock,
    Live,
}

impl From<ModeArg> for RunMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Mock => RunMode::Mock,
            ModeArg::Live => RunMode::Live,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("nodeflow=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Completions need no config
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "nodeflow", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Run { graph, run } => {
            let document = read_document(&graph)?;
            execute(&config, document, run).await
        }
        Commands::Order { graph, start } => {
            let document = read_document(&graph)?;
            let start = start.or_else(|| document.start_node_id.clone());
            let graph = document.into_graph()?;
            for (i, id) in build_order(&graph, start.as_deref()).iter().enumerate() {
                let node = graph.node(id).map(|n| n.kind.as_str()).unwrap_or("?");
                println!("{:>3}. {} ({})", i + 1, id, node);
            }
            Ok(())
        }
        Commands::Inspect { graph, node, json } => {
            let graph = read_document(&graph)?.into_graph()?;
            let node = graph
                .node(&node)
                .ok_or_else(|| FlowError::NodeNotFound(node.clone()))?;
            let plan = bridge::plan(node, &SimulatorHub::with_builtins());
            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
                return Ok(());
            }
            println!("Node:  {} ({})", plan.node_id, plan.kind.as_deref().unwrap_or("unknown kind"));
            println!("Path:  {}", plan.path);
            for prop in &plan.properties {
                let mark = if prop.configured { "x" } else { " " };
                println!("  [{}] {}", mark, prop.field);
            }
            if !plan.missing.is_empty() {
                println!("Missing: {}", plan.missing.join(", "));
            }
            Ok(())
        }
        Commands::History { action } => history(&config, action).await,
        Commands::Config => {
            let mut shown = config.clone();
            mask_key(&mut shown.model);
            shown.fallback_models.iter_mut().for_each(mask_key);
            print!("{}", toml::to_string_pretty(&shown)?);
            Ok(())
        }
        Commands::Completions { .. } => Ok(()),
    }
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        info!(path = %path.display(), "Loading config");
        return Ok(AppConfig::load(path)?);
    }
    let home_config = dirs_home().map(|h| h.join(".nodeflow").join("config.toml"));
    if let Some(home) = home_config.filter(|p| p.exists()) {
        info!(path = %home.display(), "Loading config from home directory");
        return Ok(AppConfig::load(&home)?);
    }
    warn!("No config file found, using defaults");
    Ok(create_env_config())
}

/// Defaults, with the model picked from whichever API key is exported.
fn create_env_config() -> AppConfig {
    let mut config = AppConfig::default();
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        config.model.api_key = Some(key);
    } else if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        config.model = ModelConfig {
            provider: "gemini".into(),
            model_id: "gemini-1.5-flash".into(),
            api_key: Some(key),
            ..Default::default()
        };
    }
    config
}

fn read_document(path: &Path) -> anyhow::Result<GraphDocument> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))?;
    Ok(GraphDocument::from_json(&text)?)
}

fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn ProjectStore>> {
    let path = config.data_dir().join("nodeflow.db");
    Ok(Arc::new(SqliteStore::open(&path)?))
}

fn run_options(config: &AppConfig, args: &RunArgs, scenario: Option<Scenario>) -> RunOptions {
    let mut options = RunOptions::from_config(config);
    options.scenario = match &args.scenario {
        Some(description) => Some(Scenario {
            name: scenario.as_ref().and_then(|s| s.name.clone()),
            description: Some(description.clone()),
        }),
        None => scenario,
    };
    if let Some(mode) = args.mode {
        options.mode = mode.into();
    }
    if let Some(seed) = args.seed {
        options.seed = seed;
    }
    if let Some(speed) = args.speed {
        options.speed = speed;
    }
    if args.full_order {
        options.schedule = Schedule::FullOrder;
    }
    if args.simulate {
        options.use_simulators = true;
    }
    options.overrides.model = args.model.clone();
    options.input = args.input.clone();
    options
}

async fn execute(config: &AppConfig, document: GraphDocument, args: RunArgs) -> anyhow::Result<()> {
    let start = args.start.clone().or_else(|| document.start_node_id.clone());
    let options = run_options(config, &args, document.scenario.clone());
    let graph = document.into_graph()?;

    let event_bus = Arc::new(EventBus::default());
    let llm: Arc<dyn LlmClient> = Arc::from(nodeflow_llm::client_for_run(config, options.mode));
    let tools: Arc<dyn ToolSimulator> = Arc::new(SimulatorHub::with_builtins());
    let mut runner = FlowRunner::new(llm, tools, event_bus.clone());
    if config.storage.save_runs {
        runner = runner.with_project_store(open_store(config)?);
    }

    let cancel = CancellationToken::new();
    let logger = config.log_dir().map(|dir| {
        let level = config.log.as_ref().map_or(2, |l| l.level);
        info!(dir = %dir.display(), level, "RunLogger enabled");
        RunLogger::new(dir, level).spawn(&event_bus, cancel.clone())
    });

    let stepping = args.step || !args.breakpoints.is_empty();
    let outcome = if stepping {
        let start = start.ok_or(FlowError::StartNodeMissing)?;
        let controller = StepController::new(Arc::new(runner));
        controller.set_speed(options.speed).await;
        for id in &args.breakpoints {
            controller.set_breakpoint(id).await;
        }
        if args.step {
            controller.pause().await;
        }
        let progress = console::spawn_progress(&event_bus);
        let handle = controller.spawn(graph, start, options);
        let outcome = console::drive(&controller, handle).await?;
        progress.abort();
        outcome
    } else {
        runner.run(&graph, start.as_deref(), options).await
    };

    // Runs that never published flow-finished leave the logger waiting
    if !matches!(
        outcome,
        Ok(_) | Err(FlowError::Cancelled) | Err(FlowError::PolicyViolation(_))
    ) {
        cancel.cancel();
    }
    if let Some(handle) = logger {
        if let Ok(Some(path)) = handle.await {
            info!(path = %path.display(), "Run log written");
        }
    }

    let report = outcome?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    println!(
        "Run {}  {}  {} node(s) in {}ms",
        report.run_id,
        report.status,
        report.executed.len(),
        report.duration_ms
    );
    for result in report.results.iter() {
        println!(
            "  {:<20} {:<9} {:<18} {}",
            result.node_id,
            result.result_type().to_string(),
            result.summary_tab.path.to_string(),
            truncate(&result.execution_summary, 80)
        );
    }
    for warning in &report.warnings {
        println!("  warning: {}", warning);
    }
    if let Some(key) = &report.manifest_key {
        println!("Saved {}", key);
    }
}

async fn history(config: &AppConfig, action: HistoryAction) -> anyhow::Result<()> {
    let store = open_store(config)?;
    match action {
        HistoryAction::List { limit } => {
            let runs = RunManifest::list(&store, limit).await?;
            if runs.is_empty() {
                println!("No saved runs.");
            }
            for run in &runs {
                println!("{}", run.headline());
            }
        }
        HistoryAction::Show { id } => {
            let manifest = RunManifest::load(&store, &id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no run with id {}", id))?;
            println!("{}", serde_json::to_string_pretty(&manifest)?);
        }
        HistoryAction::Replay { id, mut run } => {
            let manifest = RunManifest::load(&store, &id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no run with id {}", id))?;
            run.seed = run.seed.or(Some(manifest.seed));
            run.mode = run.mode.or(Some(match manifest.environment {
                RunMode::Mock => ModeArg::Mock,
                RunMode::Live => ModeArg::Live,
            }));
            execute(config, manifest.into_document(), run).await?;
        }
        HistoryAction::Delete { id } => {
            if RunManifest::delete(&store, &id).await? {
                println!("Deleted {}", id);
            } else {
                println!("No run with id {}", id);
            }
        }
    }
    Ok(())
}

fn mask_key(model: &mut ModelConfig) {
    if model.api_key.is_some() {
        model.api_key = Some("***".into());
    }
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", cut)
}
