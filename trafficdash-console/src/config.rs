use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ConsoleConfig {
    pub backend: BackendConf,
    pub polling: PollingConf,
    pub alerts: AlertsConf,
    pub http: HttpConf,
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BackendConf {
    pub base_url: String, // ex: "http://127.0.0.1:5000"
    pub request_timeout_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PollingConf {
    pub stats_interval_ms: u64,
    pub signal_interval_ms: u64,
    pub streetlight_interval_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AlertsConf {
    pub default_duration_ms: u64,
    pub priority_duration_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConf {
    pub bind: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            backend: BackendConf::default(),
            polling: PollingConf::default(),
            alerts: AlertsConf::default(),
            http: HttpConf::default(),
            api_key: None,
        }
    }
}

impl Default for BackendConf {
    fn default() -> Self {
        Self { base_url: "http://127.0.0.1:5000".into(), request_timeout_ms: 5_000 }
    }
}

impl Default for PollingConf {
    fn default() -> Self {
        Self { stats_interval_ms: 3_000, signal_interval_ms: 1_000, streetlight_interval_ms: 2_000 }
    }
}

impl Default for AlertsConf {
    fn default() -> Self {
        Self { default_duration_ms: 4_000, priority_duration_ms: 10_000 }
    }
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { bind: "0.0.0.0:8080".into() }
    }
}

impl PollingConf {
    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    pub fn signal_interval(&self) -> Duration {
        Duration::from_millis(self.signal_interval_ms)
    }

    pub fn streetlight_interval(&self) -> Duration {
        Duration::from_millis(self.streetlight_interval_ms)
    }
}

impl ConsoleConfig {
    /// Vérifie les valeurs qui rendraient la console inutilisable
    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("polling.stats_interval_ms", self.polling.stats_interval_ms),
            ("polling.signal_interval_ms", self.polling.signal_interval_ms),
            ("polling.streetlight_interval_ms", self.polling.streetlight_interval_ms),
            ("backend.request_timeout_ms", self.backend.request_timeout_ms),
        ];
        for (field, value) in intervals {
            if value == 0 {
                return Err(ConfigError::Invalid { field, reason: "must be greater than zero".into() });
            }
        }
        if !self.backend.base_url.starts_with("http://") && !self.backend.base_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                field: "backend.base_url",
                reason: format!("expected an http(s) URL, got {:?}", self.backend.base_url),
            });
        }
        Ok(())
    }
}

/// Parse une config YAML; un document vide donne la config par défaut.
pub fn parse_config(txt: &str) -> Result<ConsoleConfig, ConfigError> {
    if txt.trim().is_empty() {
        return Ok(ConsoleConfig::default());
    }
    let cfg: ConsoleConfig = serde_yaml::from_str(txt)?;
    cfg.validate()?;
    Ok(cfg)
}

pub async fn load_config_from(path: &Path) -> ConsoleConfig {
    let mut cfg = if path.exists() {
        match fs::read_to_string(path).await {
            Ok(txt) => parse_config(&txt).unwrap_or_else(|e| {
                warn!("config invalide ({}): {e}, usage config par défaut", path.display());
                ConsoleConfig::default()
            }),
            Err(e) => {
                warn!("lecture config {} impossible: {e}", path.display());
                ConsoleConfig::default()
            }
        }
    } else {
        warn!("pas de {}, usage config par défaut", path.display());
        ConsoleConfig::default()
    };

    if let Ok(key) = std::env::var("TRAFFICDASH_API_KEY") {
        if !key.is_empty() {
            cfg.api_key = Some(key);
        }
    }
    cfg
}

pub async fn load_config() -> ConsoleConfig {
    let path = std::env::var("TRAFFICDASH_CONFIG").unwrap_or_else(|_| "console.yaml".into());
    load_config_from(Path::new(&path)).await
}
