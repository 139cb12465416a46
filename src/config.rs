//! Service configuration.
//!
//! Values come from an optional TOML file, then environment overrides.
//! The API key is normally only supplied through `OPENAI_API_KEY`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Application-level constants
pub const APP_NAME: &str = "nearmiss";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable pointing at an explicit config file.
pub const CONFIG_PATH_ENV: &str = "NEARMISS_CONFIG";

/// Hazard categories used when the config file does not define a taxonomy.
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "가스중독 및 질식",
    "감전",
    "교통",
    "기타",
    "낙하 및 비래",
    "무리한동작",
    "베임",
    "붕괴 및 도괴",
    "업무상질병",
    "유해물접촉",
    "이상온도접촉",
    "전도",
    "찔림",
    "추락",
    "충돌 및 격돌",
    "파열",
    "폭발",
    "협착",
    "화재",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("OPENAI_API_KEY is not set")]
    MissingApiKey,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Get the application data directory
pub fn app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default `EnvFilter` directive when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "nearmiss_lib=info,nearmiss=info,tower_http=info"
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub inference: InferenceConfig,
    pub storage: StorageConfig,
    pub documents: DocumentsConfig,
    pub notification: NotificationConfig,
    pub logging: LoggingConfig,
    pub taxonomy: TaxonomyConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub api_key: Option<String>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "gpt-4o-2024-11-20".to_string(),
            timeout_secs: 120,
            api_key: None,
        }
    }
}

// Manual Debug so the key never reaches a log line.
impl std::fmt::Debug for InferenceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    /// Recorded in `created_by` on every stored report.
    pub author: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: app_data_dir().join("nearmiss.db"),
            author: APP_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DocumentsConfig {
    /// Directory of reference case documents, one text file per category.
    pub dir: PathBuf,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            dir: app_data_dir().join("documents"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// When unset, notifications are only logged.
    pub recipient: Option<String>,
    pub subject: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            recipient: None,
            subject: "유해위험 신고 알림".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: Option<String>,
    /// When set, a JSON log file is written here in addition to stderr.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaxonomyConfig {
    pub categories: Vec<String>,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl AppConfig {
    /// Load from `NEARMISS_CONFIG` (or the default location when present),
    /// apply environment overrides, and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        let path = explicit
            .clone()
            .unwrap_or_else(|| app_data_dir().join("nearmiss.toml"));

        let mut config = if explicit.is_some() || path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw).map_err(|reason| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, String> {
        toml::from_str(raw).map_err(|e| e.to_string())
    }

    /// Apply environment-style overrides through `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.inference.api_key = Some(key);
        }
        if let Some(url) = lookup("NEARMISS_BASE_URL") {
            self.inference.base_url = url;
        }
        if let Some(model) = lookup("NEARMISS_MODEL") {
            self.inference.model = model;
        }
        if let Some(raw) = lookup("NEARMISS_TIMEOUT_SECS") {
            self.inference.timeout_secs = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!(
                    "NEARMISS_TIMEOUT_SECS must be a whole number of seconds, got {raw:?}"
                ))
            })?;
        }
        if let Some(bind) = lookup("NEARMISS_BIND") {
            self.server.bind = bind;
        }
        if let Some(path) = lookup("NEARMISS_DB_PATH") {
            self.storage.db_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("NEARMISS_DOCS_DIR") {
            self.documents.dir = PathBuf::from(dir);
        }
        if let Some(to) = lookup("NEARMISS_NOTIFY_TO") {
            self.notification.recipient = Some(to);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.inference.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => {}
            _ => return Err(ConfigError::MissingApiKey),
        }
        if self.inference.timeout_secs == 0 {
            return Err(ConfigError::Invalid("inference.timeout_secs must be > 0".into()));
        }
        if self.inference.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("inference.base_url is empty".into()));
        }
        if self.taxonomy.categories.is_empty() {
            return Err(ConfigError::Invalid("taxonomy.categories is empty".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for category in &self.taxonomy.categories {
            if category.trim().is_empty() {
                return Err(ConfigError::Invalid("taxonomy contains a blank category".into()));
            }
            if !seen.insert(category.trim()) {
                return Err(ConfigError::Invalid(format!(
                    "taxonomy category '{category}' is listed twice"
                )));
            }
        }
        Ok(())
    }

    pub fn log_filter(&self) -> &str {
        self.logging
            .filter
            .as_deref()
            .unwrap_or(default_log_filter())
    }
}
