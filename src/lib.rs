pub mod commands;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod policy;
pub mod redaction;
pub mod runner;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod streak;
pub mod transport;

use crate::commands::CommandHandler;
use crate::config::{BotConfig, Cli};
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::redaction::Redactor;
use crate::runner::BotRunner;
use crate::scheduler::RolloverScheduler;
use crate::session::UserLocks;
use crate::store::RecordStore;
use crate::transport::telegram::TelegramTransport;
use crate::transport::Transport;
use std::path::Path;
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Loads settings, authenticates with the chat service and serves commands
/// until Ctrl-C. Any error returned before the poll loop starts is fatal.
pub async fn run(cli: Cli) -> AppResult<()> {
    let config = BotConfig::load(&cli)?;
    init_tracing(config.log_dir.as_deref())?;

    let token = config.token()?.to_string();
    let redactor = Arc::new(Redactor::new(Some(&token)));
    let transport: Arc<dyn Transport> = Arc::new(TelegramTransport::new(&token, config.poll_timeout())?);

    let bot_name = transport.authenticate().await.map_err(|error| {
        AppError::Config(format!(
            "bot token was rejected: {}",
            redactor.scrub(&error)
        ))
    })?;

    let db = Arc::new(Database::new(&config.db_path)?);
    tracing::info!(
        bot = %bot_name,
        db_path = %db.path().display(),
        duplicate_hits = config.duplicate_hit_policy.as_str(),
        "bot authenticated"
    );

    let locks = UserLocks::new();
    let store = RecordStore::new(db, config.duplicate_hit_policy, redactor.clone());
    let handler = CommandHandler::new(store.clone(), config.input_policy());

    let scheduler = RolloverScheduler::new(store, locks.clone(), config.rollover_interval());
    let scheduler_task = scheduler.start();

    let runner = BotRunner::new(handler, locks, transport, redactor);
    let result = runner
        .run_until(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %error, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await;

    scheduler_task.abort();
    tracing::info!("bot stopped");
    result
}

fn init_tracing(log_dir: Option<&Path>) -> AppResult<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let Some(log_dir) = log_dir else {
        return tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|error| AppError::Internal(error.to_string()));
    };

    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "gymbros.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Internal(error.to_string()))
}
