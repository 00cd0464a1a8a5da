use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DbConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

fn default_api_host() -> String {
    "0.0.0.0".into()
}

fn default_api_port() -> u16 {
    8080
}

/// Tunables for the rollup engine. Compressor thresholds are not here: they
/// belong to each compressor's profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Billing rate applied when a client record carries none. Left unset,
    /// such clients fail with a configuration error instead of costing 0.
    #[serde(default)]
    pub fallback_rate_usd_per_kwh: Option<f64>,
    #[serde(default = "default_bucket_width_secs")]
    pub bucket_width_secs: u32,
    #[serde(default = "default_weekly_bucket_width_secs")]
    pub weekly_bucket_width_secs: u32,
    /// Gaps between consecutive samples longer than this are not credited
    /// to any operating state.
    #[serde(default = "default_max_sample_gap_secs")]
    pub max_sample_gap_secs: u32,
    #[serde(default)]
    pub timezone_offset_hours: i32,
    #[serde(default = "default_section_timeout_ms")]
    pub section_timeout_ms: u64,
    #[serde(default = "default_comparison_weeks")]
    pub comparison_weeks: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fallback_rate_usd_per_kwh: None,
            bucket_width_secs: default_bucket_width_secs(),
            weekly_bucket_width_secs: default_weekly_bucket_width_secs(),
            max_sample_gap_secs: default_max_sample_gap_secs(),
            timezone_offset_hours: 0,
            section_timeout_ms: default_section_timeout_ms(),
            comparison_weeks: default_comparison_weeks(),
        }
    }
}

fn default_bucket_width_secs() -> u32 {
    30
}

fn default_weekly_bucket_width_secs() -> u32 {
    3600
}

fn default_max_sample_gap_secs() -> u32 {
    900
}

fn default_section_timeout_ms() -> u64 {
    5000
}

fn default_comparison_weeks() -> u32 {
    4
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        anyhow::ensure!(
            self.bucket_width_secs > 0,
            "engine.bucket_width_secs must be positive"
        );
        anyhow::ensure!(
            self.weekly_bucket_width_secs > 0,
            "engine.weekly_bucket_width_secs must be positive"
        );
        anyhow::ensure!(
            self.max_sample_gap_secs > 0,
            "engine.max_sample_gap_secs must be positive"
        );
        anyhow::ensure!(
            self.section_timeout_ms > 0,
            "engine.section_timeout_ms must be positive"
        );
        anyhow::ensure!(
            (-23..=23).contains(&self.timezone_offset_hours),
            "engine.timezone_offset_hours must be between -23 and 23"
        );
        if let Some(rate) = self.fallback_rate_usd_per_kwh {
            anyhow::ensure!(
                rate.is_finite() && rate >= 0.0,
                "engine.fallback_rate_usd_per_kwh must be a non-negative number"
            );
        }
        Ok(())
    }
}

impl Config {
    /// Load YAML from disk, substitute $(VAR)/${VAR} with env vars, then parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, anyhow::Error> {
        let expanded = expand_env_placeholders(raw)?;
        let mut cfg: Self = serde_yaml::from_str(&expanded)?;

        // Optional: allow DATABASE_URL env to override whatever YAML had
        if let Ok(url) = std::env::var("DATABASE_URL") {
            cfg.database.url = url;
        }

        cfg.engine.validate()?;
        Ok(cfg)
    }

    pub fn api_bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

/// Expand $(VAR) and ${VAR} placeholders using environment variables.
/// "$$" becomes a literal "$".
fn expand_env_placeholders(input: &str) -> Result<String, anyhow::Error> {
    use anyhow::Context;

    let mut out = String::with_capacity(input.len());
    let mut it = input.chars().peekable();

    while let Some(c) = it.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match it.peek().copied() {
            Some('$') => {
                it.next();
                out.push('$');
            }
            Some(open @ ('(' | '{')) => {
                it.next();
                let close = if open == '(' { ')' } else { '}' };
                let var = read_until(&mut it, close)
                    .with_context(|| format!("unterminated env placeholder: missing '{}'", close))?;
                let val = std::env::var(&var)
                    .with_context(|| format!("missing environment variable: {}", var))?;
                out.push_str(&val);
            }
            _ => out.push('$'),
        }
    }

    Ok(out)
}

/// Read characters until we hit `end`, returning the collected string.
fn read_until<I>(it: &mut std::iter::Peekable<I>, end: char) -> Option<String>
where
    I: Iterator<Item = char>,
{
    let mut buf = String::new();
    for ch in it.by_ref() {
        if ch == end {
            return Some(buf);
        }
        buf.push(ch);
    }
    None
}
