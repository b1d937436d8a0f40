use anyhow::{Context, Result};
use serde::Deserialize;

use crate::session::SessionSettings;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub session: SessionSettings,
    pub nats: NatsConfig,
    pub api: ApiConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct NatsConfig {
    pub url: String,
    /// User whose result subjects are subscribed
    pub user_id: String,
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Question generation is slow (LLM backed)
    #[serde(default = "default_generate_timeout")]
    pub generate_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `SESSION_<id>.json` handoff records
    pub handoff_dir: String,
}

fn default_subject_prefix() -> String {
    "users".to_string()
}

fn default_request_timeout() -> u64 {
    15
}

fn default_generate_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    1000
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("INTERVIEW").separator("__"))
            .build()
            .with_context(|| format!("Failed to read config from {}", path))?;

        Ok(settings.try_deserialize()?)
    }
}
