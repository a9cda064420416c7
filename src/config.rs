use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

/// Default ceiling for a single document payload (10 MiB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 10 * 1024 * 1024;
/// Default timeout applied to remote document retrieval.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
/// Default minimum sentence length (exclusive) kept by reduction mode.
pub const DEFAULT_REDUCTION_MIN_CHARS: usize = 20;
/// Decompressed content allowed per document, as a multiple of the payload ceiling.
pub const DEFAULT_EXPANSION_FACTOR: usize = 10;

/// Default cap on decompressed document content for a given payload ceiling.
pub fn default_expansion_limit(max_payload_bytes: usize) -> usize {
    max_payload_bytes.saturating_mul(DEFAULT_EXPANSION_FACTOR)
}

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Set of credentials accepted in the `API-Key` request header.
///
/// The `Debug` output only reports how many keys are loaded so the values never reach logs.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ApiKeys(BTreeSet<String>);

impl ApiKeys {
    /// Build a key set from raw values, trimming whitespace and dropping empties.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            keys.into_iter()
                .map(|key| key.as_ref().trim().to_string())
                .filter(|key| !key.is_empty())
                .collect(),
        )
    }

    /// Parse a comma-separated list such as `key-one,key-two`.
    pub fn parse_list(raw: &str) -> Self {
        Self::new(raw.split(','))
    }

    /// Whether the presented key is one of the accepted credentials.
    pub fn contains(&self, candidate: &str) -> bool {
        self.0.contains(candidate)
    }

    /// Number of accepted credentials.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no credentials are configured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeys").field("count", &self.0.len()).finish()
    }
}

/// Runtime configuration for the docsift server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Credentials accepted in the `API-Key` header.
    pub api_keys: ApiKeys,
    /// Hard ceiling on the decoded, fetched, or uploaded document size.
    pub max_payload_bytes: usize,
    /// Cap on decompressed content (DOCX parts, PDF streams) read from one document.
    pub max_expanded_bytes: usize,
    /// Timeout in seconds for URL retrieval.
    pub fetch_timeout_secs: u64,
    /// Sentences must be strictly longer than this many characters to survive reduction.
    pub reduction_min_chars: usize,
    /// Optional override for the scratch directory used while materializing downloads.
    pub scratch_dir: Option<PathBuf>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_keys = ApiKeys::parse_list(&load_env("DOCSIFT_API_KEYS")?);
        if api_keys.is_empty() {
            return Err(ConfigError::InvalidValue("DOCSIFT_API_KEYS".to_string()));
        }

        let fetch_timeout_secs =
            parse_optional("FETCH_TIMEOUT_SECS")?.unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);
        if fetch_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("FETCH_TIMEOUT_SECS".to_string()));
        }

        let max_payload_bytes =
            parse_optional("MAX_PAYLOAD_BYTES")?.unwrap_or(DEFAULT_MAX_PAYLOAD_BYTES);
        if max_payload_bytes == 0 {
            return Err(ConfigError::InvalidValue("MAX_PAYLOAD_BYTES".to_string()));
        }
        let max_expanded_bytes = parse_optional("MAX_EXPANDED_BYTES")?
            .unwrap_or_else(|| default_expansion_limit(max_payload_bytes));
        if max_expanded_bytes == 0 {
            return Err(ConfigError::InvalidValue("MAX_EXPANDED_BYTES".to_string()));
        }

        Ok(Self {
            api_keys,
            max_payload_bytes,
            max_expanded_bytes,
            fetch_timeout_secs,
            reduction_min_chars: parse_optional("REDUCTION_MIN_CHARS")?
                .unwrap_or(DEFAULT_REDUCTION_MIN_CHARS),
            scratch_dir: load_env_optional("SCRATCH_DIR").map(PathBuf::from),
            server_port: parse_optional("SERVER_PORT")?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        api_keys = config.api_keys.len(),
        max_payload_bytes = config.max_payload_bytes,
        max_expanded_bytes = config.max_expanded_bytes,
        fetch_timeout_secs = config.fetch_timeout_secs,
        reduction_min_chars = config.reduction_min_chars,
        scratch_dir = ?config.scratch_dir,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
