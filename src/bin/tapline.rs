//! Tapline CLI - Command-line front end for the debugging console
//!
//! Streams events, script logs and toasts from an event source, injects
//! debug messages, and dry-runs scripts against a payload.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tapline::console::{
    ConnectionState, Console, ConsoleConfig, LocalCache, LogLevel, MemoryStore, Notice,
    RemoteStore, Script, StoreClient, load_config_or_default,
};
use tapline::script::{self, Limits, ScriptHost};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "tapline")]
#[command(about = "Live debugging console for framed client/server message streams", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "tapline.json")]
    config: PathBuf,

    /// Event source URL (overrides the config file)
    #[arg(long)]
    url: Option<String>,

    /// Persistence service address (overrides the config file)
    #[arg(long)]
    store: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and stream events, script logs and notices
    Watch {
        /// Script files to run on server events (added to the registry enabled)
        #[arg(short, long)]
        script: Vec<PathBuf>,

        /// Print raw payloads instead of the command name only
        #[arg(long)]
        raw: bool,
    },

    /// Queue a debug message for the observed session
    Send {
        /// Command name
        #[arg(long)]
        command: String,

        /// JSON data
        #[arg(long, default_value = "{}")]
        data: String,

        /// Seconds to wait for the connection
        #[arg(long, default_value = "5")]
        timeout: u64,
    },

    /// Compile a script and run it once against a payload
    Check {
        /// Script file
        #[arg(value_name = "SCRIPT")]
        path: PathBuf,

        /// JSON payload passed to `process`
        #[arg(long, default_value = "{}")]
        payload: String,

        /// Evaluation step budget
        #[arg(long)]
        steps: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = load_config_or_default(&cli.config)?;
    if let Some(url) = cli.url {
        config.event_source = url;
    }
    if let Some(store) = cli.store {
        config.store_addr = Some(store);
    }

    match cli.command {
        Commands::Watch { script, raw } => match config.store_addr.clone() {
            Some(addr) => {
                let remote = Arc::new(StoreClient::lazy(addr, "tapline-cli"));
                watch(config, remote, &script, raw).await?;
            }
            None => watch(config, Arc::new(MemoryStore::new()), &script, raw).await?,
        },

        Commands::Send {
            command,
            data,
            timeout,
        } => {
            let Some(addr) = config.store_addr.clone() else {
                bail!("debug send needs a persistence service; pass --store or set store_addr");
            };
            let remote = Arc::new(StoreClient::lazy(addr, "tapline-cli"));
            let console = open(config, remote).await;
            wait_connected(&console, Duration::from_secs(timeout)).await?;
            console.send_debug(&command, &data).await?;
            println!("Queued '{}'", command);
        }

        Commands::Check {
            path,
            payload,
            steps,
        } => {
            let source = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read script: {:?}", path))?;
            let payload: serde_json::Value =
                serde_json::from_str(&payload).context("Payload is not valid JSON")?;
            let compiled = script::compile(&source)?;
            if !compiled.has_entry_point() {
                println!("note: no `{}` function; only top-level code runs", script::ENTRY_POINT);
            }

            let limits = Limits::with_steps(steps.unwrap_or(config.script_step_limit));
            let result = compiled.invoke(&payload, &mut PrintHost, limits)?;
            println!("=> {}", result);
        }
    }

    Ok(())
}

async fn open<R>(config: ConsoleConfig, remote: Arc<R>) -> Arc<Console>
where
    R: RemoteStore + 'static,
{
    let cache = Arc::new(LocalCache::in_dir(config.cache_dir.clone()));
    let console = Arc::new(Console::new(config, remote, cache));
    console.spawn_ingestion();
    console.start().await;
    console.connect();
    console
}

async fn wait_connected(console: &Console, timeout: Duration) -> Result<()> {
    let mut notices = console.subscribe();
    if console.connection_state() == ConnectionState::Connected {
        return Ok(());
    }

    let wait = async {
        loop {
            match notices.recv().await {
                Ok(Notice::ConnectionChanged(ConnectionState::Connected)) => return Ok(()),
                Ok(Notice::ConnectionChanged(ConnectionState::Errored)) => {
                    bail!("could not connect to {}", console.config().event_source)
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => bail!("console shut down"),
            }
        }
    };
    tokio::time::timeout(timeout, wait)
        .await
        .context("Timed out waiting for the event source")?
}

async fn watch<R>(config: ConsoleConfig, remote: Arc<R>, scripts: &[PathBuf], raw: bool) -> Result<()>
where
    R: RemoteStore + 'static,
{
    let console = open(config, remote).await;
    let mut notices = console.subscribe();

    for path in scripts {
        let mut script = load_script(path)?;
        script.enabled = true;
        console.save_script(&script).await?;
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                console.disconnect();
                return Ok(());
            }
            notice = notices.recv() => match notice {
                Ok(notice) => print_notice(&console, notice, raw),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Display lagged; skipped {} notices", skipped);
                }
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

fn load_script(path: &Path) -> Result<Script> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script: {:?}", path))?;
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Script::new(name, content))
}

fn print_notice(console: &Console, notice: Notice, raw: bool) {
    match notice {
        Notice::EventAdded { id } => {
            let Some(event) = console.event(id) else {
                return;
            };
            if console.exclusions().excludes(&event) {
                return;
            }
            let time = event.received_at.format("%H:%M:%S%.3f");
            if raw {
                println!("{} #{} {:6} {}", time, id, event.direction.as_str(), event.raw_payload);
            } else {
                println!(
                    "{} #{} {:6} {}",
                    time,
                    id,
                    event.direction.as_str(),
                    event.command().unwrap_or("-")
                );
            }
        }
        Notice::LogAppended(record) => println!("  {}", record),
        Notice::LogsCleared => {}
        Notice::Toast { level, message } => match level {
            LogLevel::Error | LogLevel::Warning => eprintln!("[{}] {}", level, message),
            LogLevel::Info | LogLevel::Success => println!("[{}] {}", level, message),
        },
        Notice::ConnectionChanged(state) => tracing::debug!("Connection {}", state),
        Notice::ScriptsChanged | Notice::NotesChanged | Notice::ExclusionsChanged => {}
    }
}

/// Host for `check`: prints what the script reports
struct PrintHost;

impl ScriptHost for PrintHost {
    fn log(&mut self, message: &str, level: &str) {
        println!("[{}] {}", LogLevel::from_script(level), message);
    }

    fn notify(&mut self, message: &str, level: &str) {
        println!("[{} notice] {}", LogLevel::from_script(level), message);
    }
}
