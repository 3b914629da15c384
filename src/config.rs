use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub dev_mode: bool,
    pub db: DbSettings,
    /// How often unused codes past their expiry are swept to `expired` (None = never)
    pub expiry_sweep_interval: Option<Duration>,
}

/// Connection pool settings, passed explicitly into `db::create_pool`.
#[derive(Debug, Clone, Copy)]
pub struct DbSettings {
    pub pool_size: u32,
    pub busy_timeout: Duration,
}

impl Default for DbSettings {
    fn default() -> Self {
        Self {
            pool_size: 10,
            busy_timeout: Duration::from_millis(5000),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("ACTIVATOR_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let defaults = DbSettings::default();
        let db = DbSettings {
            pool_size: parse_var::<u32>("DB_POOL_SIZE")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.pool_size),
            busy_timeout: parse_var::<u64>("DB_BUSY_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.busy_timeout),
        };

        let sweep_secs = parse_var::<u64>("EXPIRY_SWEEP_INTERVAL_SECS").unwrap_or(300);

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_var("PORT").unwrap_or(3000),
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "activator.db".to_string()),
            dev_mode,
            db,
            expiry_sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
