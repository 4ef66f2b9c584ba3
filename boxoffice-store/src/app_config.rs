use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub reservations: ReservationRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

/// Which store the services run against.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

fn default_backend() -> StoreBackend { StoreBackend::Postgres }
fn default_max_connections() -> u32 { 5 }
fn default_acquire_timeout_secs() -> u64 { 3 }
fn default_lock_timeout_ms() -> u64 { 2_000 }
fn default_run_migrations() -> bool { true }

#[derive(Debug, Deserialize, Clone)]
pub struct ReservationRules {
    /// How long a pending reservation holds its ticket before expiry.
    #[serde(default = "default_hold_seconds")]
    pub hold_seconds: u64,
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: usize,
}

impl Default for ReservationRules {
    fn default() -> Self {
        Self {
            hold_seconds: default_hold_seconds(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
            sweep_batch_size: default_sweep_batch_size(),
        }
    }
}

impl ReservationRules {
    /// Capped at a year so oversized settings cannot overflow time math.
    pub fn hold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.hold_seconds.min(MAX_HOLD_SECONDS) as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

const MAX_HOLD_SECONDS: u64 = 365 * 24 * 60 * 60;

fn default_hold_seconds() -> u64 { 900 }
fn default_sweep_interval_seconds() -> u64 { 30 }
fn default_sweep_batch_size() -> usize { 100 }

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = config::Config::builder()
            .add_source(File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Developer overrides, not checked in
            .add_source(File::with_name("config/local").required(false))
            // Eg. `BOXOFFICE__DATABASE__BACKEND=memory`
            .add_source(Environment::with_prefix("BOXOFFICE").separator("__"))
            .set_override_option("database.url", env::var("DATABASE_URL").ok())?;

        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder.build()?.try_deserialize()
    }
}
