use std::env;
use std::time::Duration;

use crate::error::{GeonumError, Result};

/// 默认过期窗口：30 分钟
pub const DEFAULT_EXPIRATION_MS: i64 = 1_800_000;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub redis_url: String,
    /// Redis 连接池大小
    pub pool_size: usize,
    /// 后台写队列分片数
    pub write_shards: usize,
    pub expiration_window_ms: i64,
    pub sweep_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379/".to_string(),
            pool_size: 8,
            write_shards: 16,
            expiration_window_ms: DEFAULT_EXPIRATION_MS,
            sweep_interval_secs: 60,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let defaults = Config::default();
        let redis_url = env::var("REDIS_URL")
            .map_err(|e| GeonumError::Config(format!("REDIS_URL: {}", e)))?;

        let config = Config {
            redis_url,
            pool_size: parse_or("GEONUM_POOL_SIZE", defaults.pool_size),
            write_shards: parse_or("GEONUM_WRITE_SHARDS", defaults.write_shards),
            expiration_window_ms: parse_or("GEONUM_EXPIRATION_MS", defaults.expiration_window_ms),
            sweep_interval_secs: parse_or(
                "GEONUM_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval_secs,
            ),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(GeonumError::Config("pool_size must be positive".into()));
        }
        if self.write_shards == 0 {
            return Err(GeonumError::Config("write_shards must be positive".into()));
        }
        if self.expiration_window_ms < 0 {
            return Err(GeonumError::Config(
                "expiration_window_ms must not be negative".into(),
            ));
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
