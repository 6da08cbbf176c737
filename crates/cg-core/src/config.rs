use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Top-level configuration loaded from `chatgate.toml`.
///
/// **Security**: this struct never stores the API key, login password or token
/// secret. Those are read from environment variables at startup through
/// [`CredentialProvider`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub auto_reply: AutoReplyConfig,
}

/// Env var naming an alternate config file.
pub const CONFIG_PATH_ENV: &str = "CHATGATE_CONFIG";

impl Config {
    /// Load from `$CHATGATE_CONFIG` (or `./chatgate.toml`), falling back to
    /// defaults when the file does not exist, then apply env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        let mut cfg = if path.exists() {
            Self::load_from(&path)?
        } else {
            tracing::info!(path = %path.display(), "no config file found, using defaults");
            Config::default()
        };
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// `PORT` wins over `server.port`, matching common hosting conventions.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::Validation(format!("PORT is not a valid port: {port}")))?;
        }
        Ok(())
    }

    /// Semantic validation for settings that are not fully expressible via type checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.credentials_dir.trim().is_empty() {
            return Err(ConfigError::Validation(
                "session.credentials_dir must not be empty".to_string(),
            ));
        }
        if self.documents.max_bytes == 0 {
            return Err(ConfigError::Validation(
                "documents.max_bytes must be greater than zero".to_string(),
            ));
        }
        self.auto_reply.validate()?;
        Ok(())
    }

    fn default_path() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("chatgate.toml"))
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
        }
    }
}

fn default_port() -> u16 {
    3000
}
fn default_bind() -> String {
    "0.0.0.0".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Directory where the protocol client keeps its pairing credentials.
    #[serde(default = "default_credentials_dir")]
    pub credentials_dir: String,
    /// Delay between `POST /session/logout` and the fresh pairing attempt.
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
    /// WebSocket address of the protocol sidecar.
    #[serde(default = "default_sidecar_url")]
    pub sidecar_url: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credentials_dir: default_credentials_dir(),
            restart_delay_ms: default_restart_delay_ms(),
            sidecar_url: default_sidecar_url(),
        }
    }
}

fn default_credentials_dir() -> String {
    "./auth_info".into()
}
fn default_restart_delay_ms() -> u64 {
    2000
}
fn default_sidecar_url() -> String {
    "ws://127.0.0.1:3010".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentsConfig {
    /// When set, `path` sources must resolve inside this directory.
    #[serde(default)]
    pub local_root: Option<String>,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            local_root: None,
            max_bytes: default_max_bytes(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

fn default_max_bytes() -> usize {
    16 * 1024 * 1024
}
fn default_fetch_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

/// Keyword flows answered automatically for inbound messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoReplyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_flows")]
    pub flows: Vec<ReplyFlow>,
}

impl Default for AutoReplyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            flows: default_flows(),
        }
    }
}

impl AutoReplyConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (idx, flow) in self.flows.iter().enumerate() {
            if flow.keywords.iter().all(|k| k.trim().is_empty()) {
                return Err(ConfigError::Validation(format!(
                    "auto_reply.flows[{idx}] must have at least one keyword"
                )));
            }
            if flow.answers.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "auto_reply.flows[{idx}] must have at least one answer"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyFlow {
    pub keywords: Vec<String>,
    pub answers: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_flows() -> Vec<ReplyFlow> {
    let flow = |keywords: &[&str], answers: &[&str]| ReplyFlow {
        keywords: keywords.iter().map(|s| s.to_string()).collect(),
        answers: answers.iter().map(|s| s.to_string()).collect(),
    };
    vec![
        flow(
            &["hola", "buenas", "hi", "hello"],
            &[
                "Hi! I'm the chatgate bot.",
                "Send \"help\" to see the available commands.",
            ],
        ),
        flow(
            &["info", "información"],
            &["*chatgate*", concat!("Version: ", env!("CARGO_PKG_VERSION")), "Status: running"],
        ),
        flow(
            &["ayuda", "help", "comandos"],
            &[
                "*Available commands*",
                "• hello → greeting\n• info → bot information\n• help → this list",
            ],
        ),
    ]
}

// ---------------------------------------------------------------------------
// Credential provider: reads secrets from environment at runtime
// ---------------------------------------------------------------------------

pub const API_KEY_ENV: &str = "CHATGATE_API_KEY";
pub const LOGIN_USER_ENV: &str = "CHATGATE_LOGIN_USER";
pub const LOGIN_PASSWORD_ENV: &str = "CHATGATE_LOGIN_PASSWORD";
pub const TOKEN_SECRET_ENV: &str = "CHATGATE_TOKEN_SECRET";

/// Secrets needed by the HTTP surface. Zeroed from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secrets {
    pub api_key: String,
    pub login_user: String,
    pub login_password: String,
    pub token_secret: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("api_key", &"<redacted>")
            .field("login_user", &self.login_user)
            .field("login_password", &"<redacted>")
            .field("token_secret", &"<redacted>")
            .finish()
    }
}

/// Reads credentials from environment variables at runtime.
pub struct CredentialProvider;

impl CredentialProvider {
    /// Resolve every secret, failing on the first required one that is unset.
    ///
    /// The login user defaults to `admin`; everything else is mandatory.
    pub fn secrets() -> Result<Secrets, ConfigError> {
        Self::secrets_with(|name| std::env::var(name).ok())
    }

    /// Same as [`secrets`](Self::secrets) with an injectable lookup.
    pub fn secrets_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Secrets, ConfigError> {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::Validation(format!("{name} must be set")))
        };
        Ok(Secrets {
            api_key: required(API_KEY_ENV)?,
            login_user: lookup(LOGIN_USER_ENV)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "admin".to_string()),
            login_password: required(LOGIN_PASSWORD_ENV)?,
            token_secret: required(TOKEN_SECRET_ENV)?,
        })
    }
}
