use crate::errors::{AppError, AppResult};
use crate::models::DuplicateHitPolicy;
use crate::policy::{InputPolicy, MAX_WEEKLY_DAYS, MIN_WEEKLY_DAYS};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "gymbros.db";
const DEFAULT_ROLLOVER_INTERVAL_SECS: u64 = 60 * 60;
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;
const MAX_POLL_TIMEOUT_SECS: u64 = 50;

#[derive(Debug, Parser)]
#[command(name = "gymbros-bot", about = "Weekly gym challenge bot", version)]
pub struct Cli {
    /// Bot API token (or set GYMBROS_BOT_TOKEN)
    #[arg(env = "GYMBROS_BOT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// YAML file with bot settings
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Directory for daily rolling JSON logs; stderr when unset
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// What to do with a second check-in in the same week
    #[arg(long, value_enum)]
    pub duplicate_hits: Option<DuplicateHitPolicy>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BotConfig {
    pub token: Option<String>,
    pub db_path: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub duplicate_hit_policy: DuplicateHitPolicy,
    pub min_weekly_days: u8,
    pub max_weekly_days: u8,
    pub rollover_interval_secs: u64,
    pub poll_timeout_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: None,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            log_dir: None,
            duplicate_hit_policy: DuplicateHitPolicy::default(),
            min_weekly_days: MIN_WEEKLY_DAYS,
            max_weekly_days: MAX_WEEKLY_DAYS,
            rollover_interval_secs: DEFAULT_ROLLOVER_INTERVAL_SECS,
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
        }
    }
}

impl BotConfig {
    pub fn from_yaml(raw: &str) -> AppResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn from_file(path: &Path) -> AppResult<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|error| AppError::Config(format!("cannot read {}: {}", path.display(), error)))?;
        Self::from_yaml(&raw)
    }

    /// File values first, command-line flags on top, then validation.
    pub fn load(cli: &Cli) -> AppResult<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(token) = &cli.token {
            self.token = Some(token.clone());
        }
        if let Some(db_path) = &cli.db_path {
            self.db_path = db_path.clone();
        }
        if let Some(log_dir) = &cli.log_dir {
            self.log_dir = Some(log_dir.clone());
        }
        if let Some(policy) = cli.duplicate_hits {
            self.duplicate_hit_policy = policy;
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        let token = self.token()?;
        if !looks_like_bot_token(token) {
            return Err(AppError::Config("bot token is malformed".to_string()));
        }
        if self.min_weekly_days < MIN_WEEKLY_DAYS
            || self.max_weekly_days > MAX_WEEKLY_DAYS
            || self.min_weekly_days > self.max_weekly_days
        {
            return Err(AppError::Config(format!(
                "weekly day bounds must satisfy {} <= min <= max <= {}",
                MIN_WEEKLY_DAYS, MAX_WEEKLY_DAYS
            )));
        }
        if self.rollover_interval_secs == 0 {
            return Err(AppError::Config("rollover_interval_secs must be positive".to_string()));
        }
        if self.poll_timeout_secs > MAX_POLL_TIMEOUT_SECS {
            return Err(AppError::Config(format!(
                "poll_timeout_secs cannot exceed {}",
                MAX_POLL_TIMEOUT_SECS
            )));
        }
        Ok(())
    }

    pub fn token(&self) -> AppResult<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::Config("a bot token is required".to_string()))
    }

    pub fn input_policy(&self) -> InputPolicy {
        InputPolicy::new(self.min_weekly_days, self.max_weekly_days)
    }

    pub fn rollover_interval(&self) -> Duration {
        Duration::from_secs(self.rollover_interval_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}

fn looks_like_bot_token(token: &str) -> bool {
    let Some((bot_id, secret)) = token.split_once(':') else {
        return false;
    };
    !bot_id.is_empty()
        && bot_id.chars().all(|c| c.is_ascii_digit())
        && !secret.is_empty()
        && secret.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
