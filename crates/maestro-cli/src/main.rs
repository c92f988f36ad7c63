//! The `maestro` command: serves agents over A2A and runs orchestrated turns.

mod config;
mod config_watcher;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::MaestroConfig;
use config_watcher::ConfigWatcher;
use maestro_a2a::{A2aClient, A2aServer, AuthConfig};
use maestro_agent::{NoTools, ProviderBackendFactory};
use maestro_core::Message;
use maestro_orchestrator::{
    AgentConfigCache, AgentToolProvider, EngineSettings, InMemoryAgentStore, LocalAgentHost,
    OrchestrationEngine, OrchestrationPattern, PatternExecutor, SpecialistCaller, TurnItem,
    TurnRequest,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const RELOAD_DEBOUNCE_MS: u64 = 500;

#[derive(Parser)]
#[command(name = "maestro", about = "Maestro: multi-agent orchestration over A2A")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "maestro.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve local agents over A2A
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one orchestrated turn and print its items as JSON lines
    Ask {
        /// single, sequential, concurrent, magentic or group_chat
        #[arg(long, default_value = "single")]
        pattern: String,
        /// Participating agent ids (defaults to every configured agent)
        #[arg(long, value_delimiter = ',')]
        agents: Vec<String>,
        /// Overrides orchestration.max_rounds
        #[arg(long)]
        max_rounds: Option<u32>,
        /// The user message
        message: String,
    },
    /// Inspect agents
    Agents {
        #[command(subcommand)]
        action: AgentsAction,
    },
}

#[derive(Subcommand)]
enum AgentsAction {
    /// List configured agents
    List,
    /// Fetch agent cards from an A2A server
    Discover {
        /// Base URL of the server
        url: String,
    },
}

/// Everything a running instance shares.
struct Runtime {
    store: Arc<InMemoryAgentStore>,
    cache: Arc<AgentConfigCache>,
    engine: OrchestrationEngine,
    router: axum::Router,
}

async fn build_runtime(config: &MaestroConfig, base_url: &str) -> anyhow::Result<Runtime> {
    let orchestration = &config.orchestration;
    let poll_interval = Duration::from_millis(orchestration.poll_interval_ms);

    let store = Arc::new(InMemoryAgentStore::new(config.agents.clone()));
    let cache = Arc::new(AgentConfigCache::new(store.clone()));
    let loaded = cache.refresh().await?;
    info!(agents = loaded, "Agent roster loaded");

    let backends = Arc::new(ProviderBackendFactory::new(config.backend.clone()));
    let client = A2aClient::new(Duration::from_secs(orchestration.a2a_timeout_secs))?;
    let caller = SpecialistCaller::new(Arc::new(client), base_url);

    let tools = Arc::new(AgentToolProvider::new(
        cache.clone(),
        caller.clone(),
        Arc::new(NoTools),
    ));
    let host = LocalAgentHost::new(cache.clone(), backends.clone(), tools)
        .with_concurrency(orchestration.concurrency)
        .with_poll_interval(poll_interval);

    let auth = AuthConfig::new(config.security.api_keys.clone());
    if auth.validates_keys() {
        info!(keys = config.security.api_keys.len(), "API key auth enabled");
    }
    let router = A2aServer::build(Arc::new(host), Some(base_url.to_string()), auth);

    let engine = OrchestrationEngine::new(cache.clone(), backends, PatternExecutor::new(caller))
        .with_settings(EngineSettings {
            max_rounds: orchestration.max_rounds,
            history_window: orchestration.history_window,
            poll_interval,
        });

    Ok(Runtime {
        store,
        cache,
        engine,
        router,
    })
}

fn load_config(path: &std::path::Path) -> anyhow::Result<MaestroConfig> {
    let mut config = MaestroConfig::load(path)?;
    config.apply_env();
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // stdout carries command output; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port } => {
            let mut config = load_config(&cli.config)?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            let base_url = config.server.base_url();
            let runtime = build_runtime(&config, &base_url).await?;

            let store = runtime.store.clone();
            let cache = runtime.cache.clone();
            let handle = tokio::runtime::Handle::current();
            let _watcher = match ConfigWatcher::start(
                cli.config.clone(),
                RELOAD_DEBOUNCE_MS,
                move |reloaded| {
                    let Some(agents) = reloaded.agents else {
                        return;
                    };
                    store.replace_all(agents);
                    let cache = cache.clone();
                    handle.spawn(async move {
                        if let Err(e) = cache.refresh().await {
                            warn!(error = %e, "Agent cache refresh failed");
                        }
                    });
                },
            ) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    warn!(error = %e, "Config hot-reload disabled");
                    None
                }
            };

            let addr = format!("{}:{}", config.server.host, config.server.port);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind {addr}"))?;
            info!(addr = %addr, base_url = %base_url, "Maestro A2A server listening");
            axum::serve(listener, runtime.router).await?;
        }
        Commands::Ask {
            pattern,
            agents,
            max_rounds,
            message,
        } => {
            let config = load_config(&cli.config)?;
            let pattern: OrchestrationPattern = pattern.parse()?;

            // Local specialists are reached over A2A, so serve them on an
            // ephemeral loopback port for the duration of the turn.
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
            let base_url = format!("http://{}", listener.local_addr()?);
            let Runtime { engine, router, .. } = build_runtime(&config, &base_url).await?;
            let server = tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, router).await {
                    warn!(error = %e, "Loopback A2A server stopped");
                }
            });

            let agent_ids = if agents.is_empty() {
                config.agents.iter().map(|a| a.id.clone()).collect()
            } else {
                agents
            };
            // Presented to local agents only; remote agents get their own a2a_api_key.
            let token = config
                .security
                .api_keys
                .first()
                .cloned()
                .unwrap_or_else(|| "local".to_string());
            let mut request = TurnRequest::new(pattern, agent_ids, vec![Message::user(message)])
                .with_auth_token(token);
            if let Some(rounds) = max_rounds {
                request = request.with_max_rounds(rounds);
            }

            let mut stream = engine.execute(request).await?;
            let mut failure = None;
            while let Some(item) = stream.next().await {
                println!("{}", serde_json::to_string(&item)?);
                if let TurnItem::Failed(f) = item {
                    failure = Some(f);
                }
            }
            server.abort();

            if let Some(f) = failure {
                anyhow::bail!("Turn {} failed ({}): {}", f.turn_id, f.kind, f.message);
            }
        }
        Commands::Agents { action } => match action {
            AgentsAction::List => {
                let config = load_config(&cli.config)?;
                if config.agents.is_empty() {
                    println!("No agents configured.");
                    println!("Add them to {} under [[agents]]", cli.config.display());
                } else {
                    for agent in &config.agents {
                        let location = if agent.is_local() {
                            agent.model.as_deref().unwrap_or("<no model>").to_string()
                        } else {
                            agent.a2a_url.clone().unwrap_or_default()
                        };
                        println!(
                            "  {:<20} {:<13} {} ({location})",
                            agent.id,
                            agent.role.to_string(),
                            agent.name
                        );
                    }
                    println!("\nTotal: {} agent(s)", config.agents.len());
                }
            }
            AgentsAction::Discover { url } => {
                let client = A2aClient::new(maestro_a2a::DEFAULT_CALL_TIMEOUT)?;
                let cards = client.discover(&url).await?;
                println!("{}", serde_json::to_string_pretty(&cards)?);
            }
        },
    }

    Ok(())
}
