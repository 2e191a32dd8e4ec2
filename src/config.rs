use serde::{Deserialize, Serialize};

/// Default OpenAI-compatible embeddings endpoint base
const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
/// Environment variable read for the provider API key
const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
/// Default embedding model
const DEFAULT_MODEL: &str = "text-embedding-3-small";
/// Default embedding dimension, validated against every vector
const DEFAULT_DIMENSIONS: usize = 768;
/// Default per-request provider timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Default retry attempts for transient provider failures
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default result limit for full-text semantic search
const DEFAULT_SEARCH_LIMIT: usize = 10;
/// Default result limit for related-notes queries
const DEFAULT_RELATED_LIMIT: usize = 5;
/// Minimum draft length before live suggestions run
const DEFAULT_MIN_LIVE_CHARS: usize = 30;
/// Similarity score a candidate must strictly exceed to count as a duplicate
const DEFAULT_DUPLICATE_THRESHOLD: f32 = 0.75;
/// Debounce window for live typing, in milliseconds
const DEFAULT_DEBOUNCE_MS: u64 = 800;

const DEFAULT_LISTEN: &str = "127.0.0.1:5309";

/// Which embedding backend to construct.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible HTTP endpoint
    Openai,
    /// Deterministic offline embedder, useful without network access
    Hash,
}

/// Configuration for the embedding provider boundary
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_kind")]
    pub kind: ProviderKind,

    /// Base URL of the OpenAI-compatible API (e.g. "https://api.openai.com/v1")
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Embedding model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Embedding dimension D; every stored and loaded vector must match
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Retry attempts for transient failures (timeouts, 429, 5xx)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Openai,
            api_base: DEFAULT_API_BASE.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            model: DEFAULT_MODEL.to_string(),
            dimensions: DEFAULT_DIMENSIONS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

fn default_provider_kind() -> ProviderKind {
    ProviderKind::Openai
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_dimensions() -> usize {
    DEFAULT_DIMENSIONS
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// Tunables for the retrieval operations.
///
/// The thresholds and windows here are deliberately configuration, not
/// constants: different collections want different sensitivity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    #[serde(default = "default_related_limit")]
    pub related_limit: usize,

    /// Drafts shorter than this never reach the provider
    #[serde(default = "default_min_live_chars")]
    pub min_live_chars: usize,

    /// Duplicate filter keeps scores strictly above this [0.0, 1.0]
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: f32,

    /// Live query debounce window in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            search_limit: DEFAULT_SEARCH_LIMIT,
            related_limit: DEFAULT_RELATED_LIMIT,
            min_live_chars: DEFAULT_MIN_LIVE_CHARS,
            duplicate_threshold: DEFAULT_DUPLICATE_THRESHOLD,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

fn default_related_limit() -> usize {
    DEFAULT_RELATED_LIMIT
}

fn default_min_live_chars() -> usize {
    DEFAULT_MIN_LIVE_CHARS
}

fn default_duplicate_threshold() -> f32 {
    DEFAULT_DUPLICATE_THRESHOLD
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
        }
    }
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

impl Config {
    fn validate(&self) {
        let p = &self.provider;
        if p.dimensions == 0 {
            panic!("provider.dimensions must be greater than 0");
        }
        // the vector snapshot header stores dimensions as u16
        if p.dimensions > u16::MAX as usize {
            panic!(
                "provider.dimensions must not exceed {}, got {}",
                u16::MAX,
                p.dimensions
            );
        }
        if p.timeout_secs == 0 {
            panic!("provider.timeout_secs must be greater than 0");
        }
        if p.max_retries == 0 {
            panic!("provider.max_retries must be at least 1");
        }
        if p.kind == ProviderKind::Openai && p.api_base.trim().is_empty() {
            panic!("provider.api_base must not be empty");
        }
        if p.kind == ProviderKind::Openai && p.model.trim().is_empty() {
            panic!("provider.model must not be empty");
        }

        let r = &self.retrieval;
        if !(0.0..=1.0).contains(&r.duplicate_threshold) {
            panic!(
                "retrieval.duplicate_threshold must be between 0.0 and 1.0, got {}",
                r.duplicate_threshold
            );
        }
        if r.search_limit == 0 {
            panic!("retrieval.search_limit must be greater than 0");
        }
        if r.related_limit == 0 {
            panic!("retrieval.related_limit must be greater than 0");
        }
        if r.debounce_ms == 0 {
            panic!("retrieval.debounce_ms must be greater than 0");
        }

        if self.server.listen.parse::<std::net::SocketAddr>().is_err() {
            panic!(
                "server.listen is not a valid socket address: {:?}",
                self.server.listen
            );
        }
    }

    pub fn load_with(base_path: &str) -> Self {
        let path = format!("{base_path}/config.yaml");

        // create new if does not exist
        if std::fs::metadata(&path).is_err() {
            std::fs::write(&path, serde_yml::to_string(&Self::default()).unwrap())
                .expect("could not write default config");
        }

        let config_str = std::fs::read_to_string(&path).expect("config file is not readable");
        let mut config: Self = serde_yml::from_str(&config_str).expect("config is malformed");

        config.base_path = base_path.to_string();

        config.validate();

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config).unwrap() {
            config.save();
        }

        config
    }

    pub fn save(&self) {
        let path = format!("{}/config.yaml", self.base_path);
        let config_str = serde_yml::to_string(&self).unwrap();
        std::fs::write(&path, config_str).expect("could not write config");
    }
}
