//! Spacebot CLI entry point and composition root: wires every subsystem
//! (§4) together and runs the main owner-message loop.

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use std::sync::Arc;
use std::time::Duration;

use spacebot::agent::brain::Brain;
use spacebot::agent::specialist::{
    browser_spec, coder_spec, dev_spec, research_spec, screen_spec, Specialist, SpecialistSpec,
};
use spacebot::agent::KillSwitch;
use spacebot::comms::Comms;
use spacebot::config::{Config, RuntimeConfig};
use spacebot::conversation::history::HistoryStore;
use spacebot::daemon::{self, DaemonPaths, IpcCommand, IpcResponse};
use spacebot::dispatcher::Dispatcher;
use spacebot::event_bus::EventBus;
use spacebot::heal::HealEngine;
use spacebot::llm::LlmManager;
use spacebot::memory::lance::EmbeddingTable;
use spacebot::memory::MemoryStore;
use spacebot::messaging::multiplexer::MessageMultiplexer;
use spacebot::safety::SafetyGate;
use spacebot::tools::deploy::{DeployTool, SpecialistRunner};
use spacebot::tools::exec::ExecTool;
use spacebot::tools::file::{FileListTool, FileReadTool, FileWriteTool};
use spacebot::tools::memory_delete::MemoryDeleteTool;
use spacebot::tools::memory_list::MemoryListTool;
use spacebot::tools::memory_recall::MemoryRecallTool;
use spacebot::tools::memory_save::MemorySaveTool;
use spacebot::tools::reply::SendMessageTool;
use spacebot::tools::shell::ShellTool;
use spacebot::tools::terminal::{DoneTool, StuckTool};
use spacebot::tools::ToolServerHandle;
use spacebot::tunnel::Tunnel;
use spacebot::ChannelId;

/// How long the main loop waits for a coalesced batch before it re-checks
/// the kill switch and the daemon's shutdown signal.
const MESSAGE_WAIT: Duration = Duration::from_millis(500);
/// How long a kill-word activation stays latched before clearing, so a task
/// mid-dispatch still observes it (§4.8 "Cancellation").
const KILL_GRACE_PERIOD: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "spacebot", version)]
#[command(about = "A personal-assistant multi-agent orchestration engine")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (optional)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon (default when no subcommand is given)
    Run {
        /// Run in the foreground instead of daemonizing
        #[arg(short, long)]
        foreground: bool,
    },
    /// Kill the running daemon
    Kill,
    /// Restart the daemon (kill + run)
    Restart {
        /// Run in the foreground instead of daemonizing
        #[arg(short, long)]
        foreground: bool,
    },
    /// Show status of the running daemon
    Status,
    /// Inspect or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Load configuration and report whether it validates
    Validate,
    /// Print the default config file path
    Path,
}

fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Run { foreground: false });

    match command {
        Command::Run { foreground } => cmd_run(cli.config, cli.debug, foreground),
        Command::Kill => cmd_kill(),
        Command::Restart { foreground } => {
            cmd_kill_if_running();
            cmd_run(cli.config, cli.debug, foreground)
        }
        Command::Status => cmd_status(),
        Command::Config(ConfigCommand::Validate) => cmd_config_validate(cli.config),
        Command::Config(ConfigCommand::Path) => cmd_config_path(),
    }
}

fn cmd_run(config_path: Option<std::path::PathBuf>, debug: bool, foreground: bool) -> anyhow::Result<()> {
    let paths = DaemonPaths::from_default();

    if let Some(pid) = daemon::is_running(&paths) {
        eprintln!("spacebot is already running (pid {pid})");
        std::process::exit(1);
    }

    let config = load_config(&config_path)?;
    let config_file_path = resolved_config_path(&config_path);

    if !foreground {
        // Fork before any Tokio runtime exists — Tokio's I/O driver and
        // thread pool don't survive fork, so tracing init (and the OTLP
        // batch exporter it may build) has to happen after this returns.
        let paths = DaemonPaths::new(&config.data_dir);
        daemon::daemonize(&paths)?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build Tokio runtime")?;

    runtime.block_on(async {
        let otel_provider = if foreground {
            daemon::init_foreground_tracing(debug, &config.telemetry)
        } else {
            let paths = DaemonPaths::new(&config.data_dir);
            daemon::init_background_tracing(&paths, debug, &config.telemetry)
        };

        let result = run(config, foreground, config_file_path).await;

        if let Some(provider) = otel_provider {
            if let Err(err) = provider.shutdown() {
                tracing::warn!(%err, "otel provider shutdown failed");
            }
        }

        result
    })
}

#[tokio::main]
async fn cmd_kill() -> anyhow::Result<()> {
    let paths = DaemonPaths::from_default();

    let Some(pid) = daemon::is_running(&paths) else {
        eprintln!("spacebot is not running");
        std::process::exit(1);
    };

    match daemon::send_command(&paths, IpcCommand::Shutdown).await {
        Ok(IpcResponse::Ok) => eprintln!("stopping spacebot (pid {pid})..."),
        Ok(IpcResponse::Error { message }) => {
            eprintln!("shutdown failed: {message}");
            std::process::exit(1);
        }
        Ok(_) => {
            eprintln!("unexpected response from daemon");
            std::process::exit(1);
        }
        Err(error) => {
            eprintln!("failed to send shutdown command: {error}");
            std::process::exit(1);
        }
    }

    if daemon::wait_for_exit(pid) {
        eprintln!("spacebot stopped");
    } else {
        eprintln!("spacebot did not stop within 10 seconds (pid {pid})");
        std::process::exit(1);
    }

    Ok(())
}

/// Kill if running, don't error if not — used by `restart` on a cold start.
fn cmd_kill_if_running() {
    let paths = DaemonPaths::from_default();

    let Some(pid) = daemon::is_running(&paths) else {
        return;
    };

    let Ok(runtime) = tokio::runtime::Builder::new_current_thread().enable_all().build() else {
        return;
    };

    runtime.block_on(async {
        if let Ok(IpcResponse::Ok) = daemon::send_command(&paths, IpcCommand::Shutdown).await {
            eprintln!("stopping spacebot (pid {pid})...");
            daemon::wait_for_exit(pid);
        }
    });
}

fn cmd_status() -> anyhow::Result<()> {
    let paths = DaemonPaths::from_default();

    let Some(_pid) = daemon::is_running(&paths) else {
        eprintln!("spacebot is not running");
        std::process::exit(1);
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async {
        match daemon::send_command(&paths, IpcCommand::Status).await {
            Ok(IpcResponse::Status { pid, uptime_seconds }) => {
                let hours = uptime_seconds / 3600;
                let minutes = (uptime_seconds % 3600) / 60;
                let seconds = uptime_seconds % 60;
                eprintln!("spacebot is running");
                eprintln!("  pid:    {pid}");
                eprintln!("  uptime: {hours}h {minutes}m {seconds}s");
            }
            Ok(IpcResponse::Error { message }) => {
                eprintln!("status query failed: {message}");
                std::process::exit(1);
            }
            Ok(_) => {
                eprintln!("unexpected response from daemon");
                std::process::exit(1);
            }
            Err(error) => {
                eprintln!("failed to query daemon status: {error}");
                std::process::exit(1);
            }
        }
    });

    Ok(())
}

fn cmd_config_validate(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    match load_config(&config_path) {
        Ok(config) => {
            println!("config OK ({})", config.data_dir.display());
            Ok(())
        }
        Err(error) => {
            eprintln!("config invalid: {error}");
            std::process::exit(1);
        }
    }
}

fn cmd_config_path() -> anyhow::Result<()> {
    println!("{}", Config::default_config_path().display());
    Ok(())
}

fn load_config(config_path: &Option<std::path::PathBuf>) -> anyhow::Result<Config> {
    let config = match config_path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    Ok(config)
}

/// The TOML path this config was (or would be) read from, for the runtime
/// config watcher — honors an explicit `--config` override rather than
/// always watching the default path.
fn resolved_config_path(config_path: &Option<std::path::PathBuf>) -> std::path::PathBuf {
    config_path.clone().unwrap_or_else(Config::default_config_path)
}

/// Builds every subsystem and runs the owner-message loop until the daemon's
/// IPC shutdown signal fires.
async fn run(config: Config, foreground: bool, config_file_path: std::path::PathBuf) -> anyhow::Result<()> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), foreground, "spacebot starting");

    let paths = DaemonPaths::new(&config.data_dir);
    let (mut shutdown_rx, ipc_handle) = daemon::start_ipc_server(&paths).await?;

    let runtime_config = Arc::new(RuntimeConfig::new(&config).with_watched_path(config_file_path));
    // Watching fails when no config file exists yet (env-var-only setups);
    // that just means live reload is unavailable this run, not a fatal error.
    let _config_watcher = match runtime_config.watch() {
        Ok(watcher) => watcher,
        Err(err) => {
            tracing::warn!(%err, "config file watch unavailable, live reload disabled");
            None
        }
    };

    let event_bus = Arc::new(EventBus::new());

    #[cfg(feature = "metrics")]
    let _metrics_handle = if config.telemetry.metrics_enabled {
        let (metrics_shutdown_tx, metrics_shutdown_rx) = tokio::sync::watch::channel(false);
        let handle = spacebot::telemetry::server::start_metrics_server(&config.telemetry, metrics_shutdown_rx).await?;
        Some((metrics_shutdown_tx, handle))
    } else {
        None
    };

    // Semantic-search augmentation (§4.4's "optional") only pays off once
    // EmbeddingTable's write path is backed by a real Arrow/LanceDB schema;
    // today it's a logging-only stub, so wiring a live connection here
    // wouldn't produce real search results. Keyword recall stays the
    // default until that write path exists — see DESIGN.md.
    let memory = Arc::new(
        MemoryStore::new(config.memory_dir(), config.memory.clone())
            .await
            .context("failed to open memory store")?
            .with_semantic_index(EmbeddingTable::disabled()),
    );

    let comms = Arc::new(Comms::new());
    let safety = Arc::new(SafetyGate::new(config.safety.clone()));
    let tools = Arc::new(ToolServerHandle::new(memory.clone(), event_bus.clone()));

    register_tools(&tools, &safety, &memory).await;

    let llm_manager = Arc::new(LlmManager::new(&config).context("failed to build LLM manager")?);
    let kill = KillSwitch::new();

    let sqlite_pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&format!("sqlite://{}?mode=rwc", config.sqlite_path().display()))
        .await
        .context("failed to open sqlite database")?;
    let history = Arc::new(HistoryStore::new(sqlite_pool));
    history.initialize().await.context("failed to initialize conversation history")?;

    let deps = spacebot::AgentDeps {
        agent_id: spacebot::AgentId::from("brain"),
        memory: memory.clone(),
        llm_manager: llm_manager.clone(),
        comms: comms.clone(),
        safety: safety.clone(),
        tools: tools.clone(),
        runtime_config: runtime_config.clone(),
        event_bus: event_bus.clone(),
    };

    let max_steps = config.agent_llm.max_steps;

    let dev = Arc::new(Specialist::new(dev_spec(max_steps), deps.clone(), kill.clone()));

    let specialist_specs: [(&str, fn(u32) -> SpecialistSpec); 4] = [
        ("research", research_spec),
        ("coder", coder_spec),
        ("browser", browser_spec),
        ("screen", screen_spec),
    ];
    for (name, spec_fn) in specialist_specs {
        let specialist = Arc::new(Specialist::new(spec_fn(max_steps), deps.clone(), kill.clone()));
        let runner: Arc<dyn SpecialistRunner> = specialist;
        tools
            .register(Arc::new(DeployTool::new(
                name,
                format!("Deploys the {name} specialist on a sub-task."),
                runner,
            )))
            .await;
    }

    let brain_tool_names: Vec<String> = [
        "done",
        "stuck",
        "send_message",
        "run_quick_command",
        "run_process",
        "read_file",
        "write_file",
        "list_files",
        "save_memory",
        "recall_memory",
        "list_memory",
        "delete_memory",
        "deploy_research",
        "deploy_coder",
        "deploy_browser",
        "deploy_screen",
    ]
    .into_iter()
    .map(String::from)
    .collect();

    let brain = Arc::new(Brain::new(
        brain_tool_names,
        max_steps,
        deps,
        kill.clone(),
        history,
        config.brain.max_history_turns as i64,
    ));

    let dev_runner: Arc<dyn SpecialistRunner> = dev;
    let heal = Arc::new(HealEngine::new(
        dev_runner,
        event_bus.clone(),
        vec!["yes".to_string(), "go ahead".to_string(), "do it".to_string()],
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        brain,
        event_bus.clone(),
        heal.clone(),
        kill.clone(),
        config.runtime.max_parallel_tasks,
        &config.imessage,
    ));

    let mux = Arc::new(MessageMultiplexer::new(&config, runtime_config.clone()));
    tokio::spawn(mux.clone().run());

    let (tunnel, _tunnel_inbound_rx) = Tunnel::new(
        DaemonPaths::new(&config.data_dir),
        config.relay.url.clone(),
        config.relay.token.clone(),
        event_bus.clone(),
    );
    tokio::spawn(tunnel.run());

    tracing::info!("spacebot ready");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            batch = mux.wait_for_message(MESSAGE_WAIT) => {
                let Some(batch) = batch else {
                    // RuntimeConfig's ArcSwap is the thing the file watcher
                    // actually updates; mirror it into the SafetyGate's own
                    // snapshot here rather than threading a callback through
                    // the watcher closure.
                    safety.update_config(runtime_config.safety.load().as_ref().clone());

                    if !kill.is_set() && mux.check_for_kill(&safety.kill_words()).await {
                        kill.set();
                        event_bus.publish(spacebot::Event::StatusUpdate {
                            agent_id: spacebot::AgentId::from("brain"),
                            status: "kill word received, cancelling in-flight work".into(),
                        });
                        let kill_for_clear = kill.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(KILL_GRACE_PERIOD).await;
                            kill_for_clear.clear();
                        });
                    }
                    continue;
                };

                let channel_id: ChannelId = ChannelId::from(batch.source.clone());
                let (reply_tx, mut reply_rx) = tokio::sync::mpsc::channel(32);
                let source = batch.source.clone();
                tokio::spawn(async move {
                    while let Some(response) = reply_rx.recv().await {
                        route_reply(&source, response);
                    }
                });

                if heal.maybe_handle_approval(&channel_id, &batch.merged_text, reply_tx.clone()).await {
                    continue;
                }

                if matches!(batch.batch_type, spacebot::stream_parser::BatchType::MultiTask) && !batch.individual_tasks.is_empty() {
                    for task in &batch.individual_tasks {
                        let mut single = batch.clone();
                        single.batch_type = spacebot::stream_parser::BatchType::Single;
                        single.merged_text = task.clone();
                        dispatcher.dispatch(single, channel_id.clone(), reply_tx.clone()).await;
                    }
                } else {
                    dispatcher.dispatch(batch, channel_id, reply_tx).await;
                }
            }
        }
    }

    tracing::info!("shutting down");
    daemon::cleanup(&paths);
    ipc_handle.abort();
    Ok(())
}

async fn register_tools(tools: &Arc<ToolServerHandle>, safety: &Arc<SafetyGate>, memory: &Arc<MemoryStore>) {
    tools.register(Arc::new(DoneTool)).await;
    tools.register(Arc::new(StuckTool)).await;
    tools.register(Arc::new(SendMessageTool)).await;
    tools.register(Arc::new(ShellTool::new(safety.clone()))).await;
    tools.register(Arc::new(ExecTool::new(safety.clone()))).await;
    tools.register(Arc::new(FileReadTool::new(safety.clone()))).await;
    tools.register(Arc::new(FileWriteTool::new(safety.clone()))).await;
    tools.register(Arc::new(FileListTool::new(safety.clone()))).await;
    tools.register(Arc::new(MemorySaveTool::new(memory.clone()))).await;
    tools.register(Arc::new(MemoryRecallTool::new(memory.clone()))).await;
    tools.register(Arc::new(MemoryListTool::new(memory.clone()))).await;
    tools.register(Arc::new(MemoryDeleteTool::new(memory.clone()))).await;
}

/// Routes a dispatched task's outbound replies to wherever its batch came
/// from. Real delivery mechanics (iMessage send, a dashboard SSE push) are
/// adapter-level concerns outside this engine's scope (§9 Non-goals); this
/// logs what would have been sent so the loop above has one uniform sink.
fn route_reply(source: &str, response: spacebot::OutboundResponse) {
    match response {
        spacebot::OutboundResponse::Text(text) => {
            tracing::info!(%source, %text, "outbound reply");
        }
        spacebot::OutboundResponse::File { filename, mime_type, .. } => {
            tracing::info!(%source, %filename, %mime_type, "outbound file reply");
        }
        spacebot::OutboundResponse::StreamStart => tracing::debug!(%source, "outbound stream start"),
        spacebot::OutboundResponse::StreamChunk(chunk) => tracing::debug!(%source, %chunk, "outbound stream chunk"),
        spacebot::OutboundResponse::StreamEnd => tracing::debug!(%source, "outbound stream end"),
        spacebot::OutboundResponse::Status(status) => tracing::debug!(%source, ?status, "outbound status"),
    }
}
