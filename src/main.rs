use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use strand::sample;
use strand_core::config::AppConfig;
use strand_core::event::EventBus;
use strand_core::graph::GraphDefinition;
use strand_core::run::RunStatus;
use strand_core::types::State;
use strand_engine::{RunLogger, WorkflowService};
use strand_tools::ToolRegistry;

#[derive(Parser)]
#[command(name = "strand", version, about = "Graph workflow engine over named tools")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "strand.toml", env = "STRAND_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway (default)
    Serve,
    /// Run a graph once and print the final run as JSON
    Run {
        /// Graph definition (JSON). Defaults to the sample summarization graph.
        #[arg(long)]
        graph: Option<PathBuf>,
        /// Initial state (JSON object)
        #[arg(long, conflicts_with = "text")]
        state: Option<PathBuf>,
        /// Text for the sample graph; read from stdin when omitted
        #[arg(long)]
        text: Option<String>,
    },
    /// Validate a graph definition file
    Validate {
        /// Graph definition (JSON)
        file: PathBuf,
    },
    /// Show current configuration
    Config,
    /// List registered tools
    Tools,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("strand=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Handle commands that need no config
    match &cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "strand", &mut std::io::stdout());
            return Ok(());
        }
        Some(Commands::Validate { file }) => return validate_file(file),
        Some(Commands::Tools) => {
            for (name, description) in ToolRegistry::with_builtins().descriptions() {
                println!("{:<18} {}", name, description);
            }
            return Ok(());
        }
        _ => {}
    }

    let config = load_config(&cli.config)?;

    match cli.command {
        Some(Commands::Config) => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Some(Commands::Run { graph, state, text }) => {
            run_once(&config, graph.as_deref(), state.as_deref(), text).await?;
        }
        None | Some(Commands::Serve) => serve(config).await?,
        Some(Commands::Validate { .. } | Commands::Tools | Commands::Completions { .. }) => {
            unreachable!("handled before config load")
        }
    }

    Ok(())
}

/// Load the config file, then `~/.strand/config.toml`, then built-in defaults.
fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }

    if let Some(home_config) = dirs_home().map(|h| h.join(".strand").join("config.toml")) {
        if home_config.exists() {
            info!(path = %home_config.display(), "Loading config from home directory");
            return Ok(AppConfig::load(&home_config)?);
        }
    }

    warn!(path = %path.display(), "No config file found, using defaults");
    Ok(AppConfig::default())
}

/// Wire store, tools, and event bus into a service. Starts the JSONL run
/// logger when `[log]` is enabled.
fn build_service(
    config: &AppConfig,
    cancel: &CancellationToken,
) -> anyhow::Result<(WorkflowService, Option<tokio::task::JoinHandle<()>>)> {
    let store = strand_store::open_store(config)?;
    let tools = Arc::new(ToolRegistry::with_builtins());

    let logging = config.log.as_ref().is_some_and(|l| l.enabled);
    let event_bus = logging.then(|| Arc::new(EventBus::default()));
    let logger = event_bus
        .as_ref()
        .map(|bus| RunLogger::new(config.log_dir()).spawn(bus, cancel.clone()));

    let service = WorkflowService::new(store, tools, &config.engine, event_bus);
    Ok((service, logger))
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let (service, logger) = build_service(&config, &cancel)?;

    let sample_id = service
        .create_graph(sample::summarization_graph())
        .context("registering sample graph")?;
    info!(graph_id = %sample_id, "Sample graph registered");

    let gateway_config = config.gateway.clone().unwrap_or_default();
    info!(bind = %gateway_config.bind, "Starting HTTP gateway");
    let server = strand_gateway::GatewayServer::new(gateway_config, service, Some(sample_id));

    // Graceful shutdown on Ctrl-C
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down gateway...");
        cancel_clone.cancel();
    });

    server.run(cancel).await?;
    if let Some(handle) = logger {
        handle.await.ok();
    }
    Ok(())
}

async fn run_once(
    config: &AppConfig,
    graph_path: Option<&Path>,
    state_path: Option<&Path>,
    text: Option<String>,
) -> anyhow::Result<()> {
    let definition = match graph_path {
        Some(path) => read_json::<GraphDefinition>(path)?,
        None => sample::summarization_graph(),
    };

    let initial_state = match state_path {
        Some(path) => read_json::<State>(path)?,
        None => {
            let text = match text {
                Some(t) => t,
                None if io::stdin().is_terminal() => sample::SAMPLE_TEXT.to_string(),
                None => {
                    let mut input = String::new();
                    io::stdin().read_to_string(&mut input)?;
                    input
                }
            };
            let mut state = State::new();
            state.set_str("text", text);
            state
        }
    };

    let cancel = CancellationToken::new();
    let (service, logger) = build_service(config, &cancel)?;
    let graph_id = service.create_graph(definition)?;
    let run = service.run_graph(&graph_id, initial_state).await?;

    println!("{}", serde_json::to_string_pretty(&run)?);

    // Dropping the service closes the event bus; the logger drains and exits.
    drop(service);
    if let Some(handle) = logger {
        handle.await.ok();
    }

    if run.status == RunStatus::Failed {
        let reason = run.error.map(|e| e.message).unwrap_or_default();
        anyhow::bail!("run {} failed: {}", run.id, reason);
    }
    Ok(())
}

fn validate_file(path: &Path) -> anyhow::Result<()> {
    let definition = read_json::<GraphDefinition>(path)?;
    strand_engine::validate(&definition)
        .with_context(|| format!("{} is not a valid graph", path.display()))?;
    println!(
        "{}: valid ({} nodes, {} edges, start at '{}')",
        path.display(),
        definition.nodes.len(),
        definition.edges.len(),
        definition.start_node
    );
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
