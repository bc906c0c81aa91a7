use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn, Subscriber};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, EnvFilter, Registry};
use tvtime_db::{Database, DatabaseConfig};
use tvtime_engine::store::LedgerStore;
use tvtime_engine::{approval, App, AppAction, AppEvent, EngineConfig};

const CONFIG_ENV: &str = "TVTIME_CONFIG";
const DEFAULT_LOG_LEVEL: &str = "info";

type FilterHandle = reload::Handle<EnvFilter, Registry>;

#[tokio::main]
async fn main() -> Result<()> {
    let from_env = EnvFilter::try_from_default_env().ok();
    let env_filter_set = from_env.is_some();
    let (subscriber, filter) =
        subscriber(from_env.unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_LEVEL)), std::io::stderr);
    subscriber.init();

    info!("Starting TV Time engine");

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return Err(e);
        }
    };
    if !env_filter_set {
        apply_log_level(&filter, &config.general.log_level);
    }

    if let Err(e) = run(config).await {
        error!("Engine error: {:#}", e);
        return Err(e);
    }

    info!("TV Time engine stopped");
    Ok(())
}

/// Stderr logging with a filter that can be replaced once the config is read.
fn subscriber<W>(filter: EnvFilter, writer: W) -> (impl Subscriber + Send + Sync, FilterHandle)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let (filter, handle) = reload::Layer::new(filter);
    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer().with_writer(writer).with_target(false).with_line_number(true),
    );
    (subscriber, handle)
}

fn apply_log_level(filter: &FilterHandle, level: &str) {
    match filter.reload(EnvFilter::new(level)) {
        Ok(()) => debug!("Log level set to {}", level),
        Err(e) => warn!("Could not apply log level {}: {}", level, e),
    }
}

fn load_config() -> Result<EngineConfig> {
    let config = match std::env::var_os(CONFIG_ENV) {
        Some(path) => EngineConfig::load_from_path(&PathBuf::from(path))?,
        None => EngineConfig::load()?,
    };
    config.validate()?;
    Ok(config)
}

async fn run(config: EngineConfig) -> Result<()> {
    let db = Database::open(DatabaseConfig { path: config.database.path.clone() })
        .await
        .with_context(|| format!("Failed to open database {}", config.database.path))?;
    let (store, writer) = LedgerStore::spawn(db);

    let backend = approval::connect(&config.approval).await?;
    let (approval_tx, mut approval_rx) = mpsc::unbounded_channel();
    let mut app =
        App::bootstrap(&config, store.clone(), backend, approval_tx, Local::now().date_naive())
            .await?;

    let mut out = io::stdout();
    emit(&mut out, &[app.stats(Local::now())]).await?;

    let mut lines = BufReader::new(io::stdin()).lines();
    info!("Engine ready, reading actions from stdin");

    loop {
        let voice_deadline = app.voice_deadline();

        let events = tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    info!("Input closed, shutting down");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<AppAction>(&line) {
                    Ok(action) => app.handle(action, Instant::now(), Local::now()),
                    Err(e) => {
                        warn!("Ignoring malformed action: {}", e);
                        vec![AppEvent::Error {
                            kind: "bad_action".to_string(),
                            message: e.to_string(),
                            retryable: false,
                        }]
                    }
                }
            }
            Some(event) = approval_rx.recv() => app.handle_approval_event(event),
            _ = sleep_until(voice_deadline) => app.expire_voice(Instant::now()),
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down gracefully...");
                break;
            }
        };

        emit(&mut out, &events).await?;
    }

    store.flush().await;
    drop(app);
    drop(store);
    if let Err(e) = writer.await {
        warn!("Store writer ended abnormally: {}", e);
    }
    Ok(())
}

/// Sleep until `deadline`, or forever when there is none.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn emit(out: &mut io::Stdout, events: &[AppEvent]) -> Result<()> {
    for event in events {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        out.write_all(&line).await?;
    }
    out.flush().await?;
    Ok(())
}
