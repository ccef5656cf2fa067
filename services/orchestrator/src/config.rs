use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub ollama_url: String,
    pub bind_addr: String,

    /// How long finished pull jobs stay queryable. Zero keeps them forever.
    pub job_retention: Duration,
    pub sweep_interval: Duration,
    /// Concurrent pull ceiling, 0 = unbounded.
    pub max_active_pulls: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let ollama_url = get("OLLAMA_URL")
            .unwrap_or_else(|| "http://127.0.0.1:11434".to_string())
            .trim_end_matches('/')
            .to_string();
        let bind_addr = get("ORCH_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let retention_secs: u64 = parse_or(&get, "PULL_JOB_RETENTION_SECS", 3600)?;
        let sweep_secs: u64 = parse_or(&get, "PULL_SWEEP_INTERVAL_SECS", 300)?;
        let max_active_pulls: usize = parse_or(&get, "PULL_MAX_ACTIVE", 0)?;

        // Tiny sanity checks (fail fast, fail loud)
        if !ollama_url.starts_with("http://") && !ollama_url.starts_with("https://") {
            bail!("OLLAMA_URL must start with http:// or https://");
        }
        if sweep_secs == 0 {
            bail!("PULL_SWEEP_INTERVAL_SECS must be greater than 0");
        }

        Ok(Self {
            ollama_url,
            bind_addr,
            job_retention: Duration::from_secs(retention_secs),
            sweep_interval: Duration::from_secs(sweep_secs),
            max_active_pulls,
        })
    }
}

fn parse_or<T, F>(get: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for env var {key}: {raw:?}")),
        None => Ok(default),
    }
}
