//! Fulcrum CLI binary.
//!
//! Narrative simulation engine.
//!
//! # Commands
//!
//! - `serve` - Start the HTTP simulation server
//! - `run` - Run one simulation and print the result as JSON
//! - `config` - Print the effective configuration as TOML

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use fulcrum::{
    config::Config,
    domain::SimulationOverrides,
    engine::SimulationEngine,
    llm::CompletionGateway,
    server::{self, AppState, ServerConfig},
    store::{FileSimulationStore, InMemoryCatalog, InMemorySimulationStore, SimulationStore},
    AnalyzerKind, TriggerRequest, VERSION,
};

#[derive(Parser)]
#[command(name = "fulcrum")]
#[command(version = VERSION)]
#[command(about = "Fulcrum - multi-round narrative simulation engine", long_about = None)]
struct Cli {
    /// Config file (TOML); FULCRUM_* environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP simulation server
    Serve {
        /// Entity catalog (JSON: scenarios, entities, organizations)
        #[arg(long)]
        catalog: PathBuf,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Bind to all interfaces (0.0.0.0)
        #[arg(long)]
        bind_all: bool,

        /// Use offline collaborators (echo responder, heuristic analyzer)
        #[arg(long)]
        dry_run: bool,
    },

    /// Run one simulation
    Run {
        /// Entity catalog (JSON: scenarios, entities, organizations)
        #[arg(long)]
        catalog: PathBuf,

        /// Scenario id
        #[arg(short, long)]
        scenario: String,

        /// Explicit entity ids (comma-separated)
        #[arg(long, value_delimiter = ',')]
        entities: Option<Vec<String>>,

        /// Requesting organization id
        #[arg(long)]
        organization: Option<String>,

        /// Add the requesting organization as a client entity
        #[arg(long)]
        include_client: bool,

        /// Maximum rounds
        #[arg(long)]
        max_rounds: Option<u32>,

        /// Minimum rounds before stabilization is checked
        #[arg(long)]
        min_rounds: Option<u32>,

        /// Stabilization threshold (0.0 - 1.0)
        #[arg(long)]
        threshold: Option<f64>,

        /// Analyzer (llm, heuristic)
        #[arg(long)]
        analyzer: Option<AnalyzerKind>,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Use offline collaborators (echo responder, heuristic analyzer)
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    let logs = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json {
        logs.json().init();
    } else {
        logs.init();
    }

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Serve {
            catalog,
            port,
            host,
            bind_all,
            dry_run,
        } => cmd_serve(config, catalog, port, host, bind_all, dry_run),

        Commands::Run {
            catalog,
            scenario,
            entities,
            organization,
            include_client,
            max_rounds,
            min_rounds,
            threshold,
            analyzer,
            output,
            dry_run,
        } => {
            let mut config = config;
            if let Some(analyzer) = analyzer {
                config.llm.analyzer = analyzer;
            }
            let request = TriggerRequest {
                scenario_id: Some(scenario),
                organization_id: organization,
                entity_ids: entities,
                include_client,
                overrides: SimulationOverrides {
                    max_rounds,
                    min_rounds,
                    stabilization_threshold: threshold,
                    ..Default::default()
                },
            };
            cmd_run(config, catalog, request, output, dry_run)
        },

        Commands::Config => cmd_config(&config),
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let file = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    let config = file.merge(Config::from_env());
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn SimulationStore>> {
    if config.storage.persist {
        let dir = config.storage.resolved_dir();
        tracing::info!("Persisting simulations to {}", dir.display());
        Ok(Arc::new(FileSimulationStore::open(dir).await?))
    } else {
        Ok(Arc::new(InMemorySimulationStore::new()))
    }
}

async fn build_engine(
    config: &Config,
    catalog: PathBuf,
    dry_run: bool,
) -> anyhow::Result<(SimulationEngine, Option<CompletionGateway>)> {
    let catalog = Arc::new(
        InMemoryCatalog::from_file(&catalog)
            .with_context(|| format!("loading catalog from {}", catalog.display()))?,
    );
    let store = open_store(config).await?;

    if dry_run {
        tracing::info!("Dry run: echo responder, heuristic analyzer, template fulcrums");
        return Ok((
            SimulationEngine::offline(catalog, store, config.simulation.clone()),
            None,
        ));
    }

    let gateway = CompletionGateway::from_config(&config.llm)?;
    tracing::info!(
        "Providers: {} (analyzer: {:?})",
        gateway.provider_names().join(" -> "),
        config.llm.analyzer
    );
    let engine = SimulationEngine::with_gateway(
        catalog,
        store,
        gateway.clone(),
        config.llm.analyzer,
        config.simulation.clone(),
    );
    Ok((engine, Some(gateway)))
}

fn cmd_serve(
    config: Config,
    catalog: PathBuf,
    port: Option<u16>,
    host: Option<String>,
    bind_all: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    let mut section = config.server.clone();
    if let Some(port) = port {
        section.port = port;
    }
    if let Some(host) = host {
        section.host = host;
    }
    let mut server_config = ServerConfig::from_section(&section)?;
    if bind_all {
        server_config = server_config.bind_all();
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let (engine, gateway) = build_engine(&config, catalog, dry_run).await?;
        let mut state = AppState::new(server_config, engine);
        if let Some(gateway) = gateway {
            state = state.with_gateway(gateway);
        }

        tracing::info!("Starting Fulcrum server on {}", state.config.addr);
        server::serve(Arc::new(state)).await?;
        Ok::<_, anyhow::Error>(())
    })
}

fn cmd_run(
    config: Config,
    catalog: PathBuf,
    request: TriggerRequest,
    output: Option<PathBuf>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(async {
        let (engine, _) = build_engine(&config, catalog, dry_run).await?;
        Ok::<_, anyhow::Error>(engine.trigger(&request).await?)
    })?;

    let json = serde_json::to_string_pretty(&result)?;
    match output {
        Some(path) => {
            std::fs::write(&path, json)?;
            eprintln!("Result written to {}", path.display());
        },
        None => println!("{json}"),
    }

    if !result.success {
        anyhow::bail!(
            "simulation {} failed: {}",
            result.simulation_id,
            result.error.unwrap_or_default()
        );
    }
    Ok(())
}

fn cmd_config(config: &Config) -> anyhow::Result<()> {
    let toml = toml::to_string_pretty(config).context("serializing config")?;
    println!("{toml}");
    Ok(())
}
