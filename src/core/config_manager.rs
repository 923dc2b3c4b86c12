// src/core/config_manager.rs
//! Unified configuration: defaults, optional config.yaml, then environment variables

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{info, warn};

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_DATABASE_PATH: &str = "truemirror.db";
const DEFAULT_JWT_SECRET: &str = "truemirror-dev-secret-change-me";
const DEFAULT_DEPLOYMENT: &str = "gpt-5-mini";
const DEFAULT_API_VERSION: &str = "2024-10-21";

#[derive(Debug, Clone)]
pub struct ConfigManager {
    pub environment: String,
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub azure: AzureSettings,
    pub chat: ChatSettings,
    pub uploads: UploadSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub address: String,
    pub port: u16,
    pub database_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub bcrypt_cost: u32,
}

#[derive(Debug, Clone)]
pub struct AzureSettings {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
    pub timeout_seconds: u64,
}

impl AzureSettings {
    pub fn is_configured(&self) -> bool {
        !self.endpoint.is_empty() && !self.api_key.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// Pause after each chunk relayed on the real-time channel
    pub chunk_delay_ms: u64,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub max_files: usize,
    pub max_file_size: usize,
}

/// One environment section of config.yaml. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FileSettings {
    address: Option<String>,
    port: Option<u16>,
    database_path: Option<String>,
    jwt_secret_key: Option<String>,
    azure_openai_endpoint: Option<String>,
    azure_openai_key: Option<String>,
    azure_openai_deployment: Option<String>,
    azure_openai_api_version: Option<String>,
    stream_chunk_delay_ms: Option<u64>,
    bcrypt_cost: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    local: FileSettings,
    production: FileSettings,
}

impl ConfigManager {
    /// Load configuration from the process environment and config file
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("TRUEMIRROR_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.yaml"));

        let yaml = if config_path.exists() {
            info!("Reading configuration file: {}", config_path.display());
            Some(
                std::fs::read_to_string(&config_path)
                    .with_context(|| format!("Failed to read {}", config_path.display()))?,
            )
        } else {
            None
        };

        let config = Self::from_sources(yaml.as_deref(), |key| std::env::var(key).ok())?;

        if !config.azure.is_configured() {
            warn!("Azure OpenAI endpoint or key is not set; AI calls will fail");
        }

        Ok(config)
    }

    /// Resolve settings from optional YAML text and an environment lookup
    pub fn from_sources<F>(yaml: Option<&str>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = env("ENVIRONMENT").unwrap_or_else(|| "local".to_string());
        info!("Loading configuration for environment: {}", environment);

        let file = match yaml {
            Some(content) => {
                let parsed: ConfigFile =
                    serde_yaml::from_str(content).context("Failed to parse config file")?;
                match environment.as_str() {
                    "production" => parsed.production,
                    _ => parsed.local,
                }
            }
            None => FileSettings::default(),
        };

        let port = match env("PORT").or_else(|| env("ROCKET_PORT")) {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("PORT must be a valid port number, got '{}'", raw))?,
            None => file.port.unwrap_or(DEFAULT_PORT),
        };

        let database_path = env("DATABASE_PATH")
            .or(file.database_path)
            .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string());

        let chunk_delay_ms = match env("STREAM_CHUNK_DELAY_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .context("STREAM_CHUNK_DELAY_MS must be a number of milliseconds")?,
            None => file.stream_chunk_delay_ms.unwrap_or(20),
        };

        let bcrypt_cost = match env("BCRYPT_COST") {
            Some(raw) => raw.parse::<u32>().context("BCRYPT_COST must be a number")?,
            None => file.bcrypt_cost.unwrap_or(bcrypt::DEFAULT_COST),
        };

        Ok(Self {
            environment,
            server: ServerSettings {
                address: env("ADDRESS")
                    .or(file.address)
                    .unwrap_or_else(|| "0.0.0.0".to_string()),
                port,
                database_path: PathBuf::from(strip_sqlite_scheme(&database_path)),
            },
            auth: AuthSettings {
                jwt_secret: env("JWT_SECRET_KEY")
                    .or(file.jwt_secret_key)
                    .unwrap_or_else(|| DEFAULT_JWT_SECRET.to_string()),
                token_ttl_hours: 24,
                bcrypt_cost,
            },
            azure: AzureSettings {
                endpoint: env("AZURE_OPENAI_ENDPOINT")
                    .or(file.azure_openai_endpoint)
                    .unwrap_or_default()
                    .trim_end_matches('/')
                    .to_string(),
                api_key: env("AZURE_OPENAI_KEY")
                    .or(file.azure_openai_key)
                    .unwrap_or_default(),
                deployment: env("AZURE_OPENAI_DEPLOYMENT")
                    .or(file.azure_openai_deployment)
                    .unwrap_or_else(|| DEFAULT_DEPLOYMENT.to_string()),
                api_version: env("AZURE_OPENAI_API_VERSION")
                    .or(file.azure_openai_api_version)
                    .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
                timeout_seconds: 120,
            },
            chat: ChatSettings { chunk_delay_ms },
            uploads: UploadSettings {
                max_files: 4,
                max_file_size: 1024 * 1024,
            },
        })
    }
}

/// Accept `sqlite:///path`, `sqlite://path` and `sqlite:path` as well as plain paths
fn strip_sqlite_scheme(raw: &str) -> &str {
    raw.strip_prefix("sqlite:///")
        .or_else(|| raw.strip_prefix("sqlite://"))
        .or_else(|| raw.strip_prefix("sqlite:"))
        .unwrap_or(raw)
}
