use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure loaded from campaign_mailer.toml and environment variables
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Runtime configuration loaded from environment variables
    #[serde(skip)]
    pub runtime: RuntimeConfig,
    /// Problems noticed while loading, logged once tracing is up
    #[serde(skip)]
    pub load_warnings: Vec<String>,
}

/// HTTP surface of the control panel
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: std::net::SocketAddr,
    pub allow_token_in_url: bool,
}

/// Transactional email provider settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub api_base: String,
    pub default_batch_size: i64,
    pub default_cooldown_minutes: f64,
    pub request_timeout_ms: u64,
}

/// Chat-completion provider settings for draft generation
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    pub default_model: String,
    pub temperature: f32,
    pub default_instructions: String,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
}

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_INSTRUCTIONS: &str =
    "Write a concise, friendly email that ends with a clear call to action.";
pub const DEFAULT_BATCH_SIZE: i64 = 20;
pub const DEFAULT_COOLDOWN_MINUTES: f64 = 5.0;

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8790"
                .parse()
                .expect("default bind address should parse"),
            allow_token_in_url: false,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            api_base: "https://send.api.mailtrap.io/api/send".to_string(),
            default_batch_size: DEFAULT_BATCH_SIZE,
            default_cooldown_minutes: DEFAULT_COOLDOWN_MINUTES,
            request_timeout_ms: 30_000,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            default_instructions: DEFAULT_INSTRUCTIONS.to_string(),
            request_timeout_ms: 60_000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            path: base.join("campaign-mailer").join("campaigns.json"),
        }
    }
}

/// Runtime configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub delivery_api_key: Option<String>,
    pub llm_api_key: Option<String>,
    pub bearer_token: Option<String>,
    pub log_level: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            delivery_api_key: None,
            llm_api_key: None,
            bearer_token: None,
            log_level: "campaign_mailer=info,tower_http=info".to_string(),
        }
    }
}

fn non_empty(v: String) -> Option<String> {
    let v = v.trim().to_string();
    if v.is_empty() { None } else { Some(v) }
}

impl Config {
    /// Load configuration from TOML file and environment variables
    /// Uses CAMPAIGN_MAILER_CONFIG or defaults to "campaign_mailer.toml"
    pub fn load() -> anyhow::Result<Self> {
        if let Ok(env_path) = std::env::var("CAMPAIGN_ENV_FILE") {
            let _ = dotenvy::from_path(env_path);
        } else {
            let _ = dotenvy::dotenv();
        }

        let config_path = std::env::var("CAMPAIGN_MAILER_CONFIG")
            .unwrap_or_else(|_| "campaign_mailer.toml".to_string());

        let mut config: Config = if let Ok(content) = std::fs::read_to_string(&config_path) {
            toml::from_str(&content)?
        } else {
            let mut config = Self::default();
            config
                .load_warnings
                .push(format!("Config file {} not found, using defaults", config_path));
            config
        };

        config.apply_env_overrides();
        config.runtime = RuntimeConfig::load_from_env();
        config.normalize();

        Ok(config)
    }

    /// Apply env overrides for file-backed settings (env-first)
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CAMPAIGN_HTTP_BIND") {
            match v.parse::<std::net::SocketAddr>() {
                Ok(bind) => self.server.bind = bind,
                Err(_) => self
                    .load_warnings
                    .push(format!("Ignoring invalid CAMPAIGN_HTTP_BIND '{}'", v)),
            }
        }
        if let Ok(allow) = std::env::var("CAMPAIGN_ALLOW_TOKEN_IN_URL") {
            self.server.allow_token_in_url = allow == "1" || allow.eq_ignore_ascii_case("true");
        }
        if let Ok(base) = std::env::var("DELIVERY_API_BASE") {
            self.delivery.api_base = base;
        }
        if let Some(n) = std::env::var("CAMPAIGN_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
        {
            self.delivery.default_batch_size = n;
        }
        if let Some(m) = std::env::var("CAMPAIGN_COOLDOWN_MINUTES")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
        {
            self.delivery.default_cooldown_minutes = m;
        }
        if let Ok(base) = std::env::var("LLM_API_BASE") {
            self.llm.api_base = base;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            self.llm.default_model = model;
        }
        if let Ok(path) = std::env::var("CAMPAIGN_STORE_PATH") {
            self.storage.path = PathBuf::from(path);
        }
    }

    /// Clamp out-of-range values
    fn normalize(&mut self) {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            self.load_warnings.push(format!(
                "llm.temperature {} outside 0.0..=2.0, clamping",
                self.llm.temperature
            ));
            self.llm.temperature = self.llm.temperature.clamp(0.0, 2.0);
        }
        if self.delivery.request_timeout_ms == 0 {
            self.load_warnings
                .push("delivery.request_timeout_ms of 0 replaced with 30000".to_string());
            self.delivery.request_timeout_ms = 30_000;
        }
        if self.llm.request_timeout_ms == 0 {
            self.load_warnings
                .push("llm.request_timeout_ms of 0 replaced with 60000".to_string());
            self.llm.request_timeout_ms = 60_000;
        }
        if self.llm.default_model.trim().is_empty() {
            self.llm.default_model = DEFAULT_MODEL.to_string();
        }
        if self.llm.default_instructions.trim().is_empty() {
            self.llm.default_instructions = DEFAULT_INSTRUCTIONS.to_string();
        }
    }
}

impl RuntimeConfig {
    /// Load runtime configuration from environment variables
    pub fn load_from_env() -> Self {
        Self {
            delivery_api_key: std::env::var("DELIVERY_API_KEY").ok().and_then(non_empty),
            llm_api_key: std::env::var("LLM_API_KEY")
                .ok()
                .and_then(non_empty)
                .or_else(|| std::env::var("OPENAI_API_KEY").ok().and_then(non_empty)),
            bearer_token: std::env::var("CAMPAIGN_BEARER_TOKEN")
                .ok()
                .and_then(non_empty),
            log_level: std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "campaign_mailer=info,tower_http=info".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [delivery]
            api_base = "http://localhost:9000/send"
            default_batch_size = 5
            default_cooldown_minutes = 0.5
            request_timeout_ms = 1000
            "#,
        )
        .unwrap();
        assert_eq!(cfg.delivery.default_batch_size, 5);
        assert_eq!(cfg.llm.default_model, DEFAULT_MODEL);
        assert_eq!(cfg.server.bind.port(), 8790);
    }

    #[test]
    fn test_normalize_clamps() {
        let mut cfg = Config::default();
        cfg.llm.temperature = 9.0;
        cfg.llm.default_model = "  ".into();
        cfg.delivery.request_timeout_ms = 0;
        cfg.normalize();
        assert_eq!(cfg.llm.temperature, 2.0);
        assert_eq!(cfg.llm.default_model, DEFAULT_MODEL);
        assert_eq!(cfg.delivery.request_timeout_ms, 30_000);
        assert_eq!(cfg.load_warnings.len(), 2);
        assert!(cfg.load_warnings[0].contains("temperature"));
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty("  ".into()), None);
        assert_eq!(non_empty(" k ".into()), Some("k".into()));
    }
}
