//! Configuration for the summarizer, the coordinator, and the binaries.
//!
//! Every type has a `Default` with working values and `with_*` builders for
//! the settings callers commonly change:
//!
//! ```
//! use explainx::config::{CoordinatorConfig, SummarizerConfig};
//!
//! let config = CoordinatorConfig::default().with_summarizer(
//!     SummarizerConfig::default()
//!         .with_model("anthropic/claude-3.5-haiku")
//!         .with_max_input_chars(8_000),
//! );
//! assert_eq!(config.summarizer.max_input_chars, 8_000);
//! ```

use std::path::PathBuf;
use std::time::Duration;

/// Settings for the remote summarization call.
#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    /// Chat completions endpoint. Default: OpenRouter.
    pub endpoint: String,
    /// Model identifier. Default: [`DEFAULT_MODEL`](crate::DEFAULT_MODEL).
    pub model: String,
    /// Maximum tokens in the summary. Default: `600`.
    pub max_tokens: u32,
    /// Sampling temperature. Default: `0.3`.
    pub temperature: f32,
    /// HTTP timeout for one call. Default: 60 s.
    pub http_timeout: Duration,
    /// Page text beyond this many characters is dropped before sending.
    /// Default: [`MAX_INPUT_CHARS`](crate::MAX_INPUT_CHARS).
    pub max_input_chars: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            endpoint: crate::OPENROUTER_URL.to_string(),
            model: crate::DEFAULT_MODEL.to_string(),
            max_tokens: 600,
            temperature: 0.3,
            http_timeout: Duration::from_secs(60),
            max_input_chars: crate::MAX_INPUT_CHARS,
        }
    }
}

impl SummarizerConfig {
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_max_input_chars(mut self, max_chars: usize) -> Self {
        self.max_input_chars = max_chars;
        self
    }
}

/// Settings for the [`Coordinator`](crate::coordinator::Coordinator).
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub summarizer: SummarizerConfig,
    /// Capacity of the request queue. Senders wait when it is full. Default: `64`.
    pub queue_capacity: usize,
    /// Capacity of the store-change broadcast channel. Default: `32`.
    pub event_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            summarizer: SummarizerConfig::default(),
            queue_capacity: 64,
            event_capacity: 32,
        }
    }
}

impl CoordinatorConfig {
    pub fn with_summarizer(mut self, summarizer: SummarizerConfig) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

/// Default data directory, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = ".explainx";

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "EXPLAINX_DATA_DIR";

/// Settings shared by the `explainx` and `explainx-web` binaries.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Where the summary history and credential are persisted.
    pub data_dir: PathBuf,
    pub coordinator: CoordinatorConfig,
    /// How long the page dialog waits for a summary before showing an error.
    pub summary_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            coordinator: CoordinatorConfig::default(),
            summary_timeout: Duration::from_secs(60),
        }
    }
}

impl AppConfig {
    /// Build from optional command-line overrides.
    pub fn from_overrides(
        data_dir: Option<PathBuf>,
        model: Option<String>,
        endpoint: Option<String>,
    ) -> Self {
        let mut config = Self::default();
        if let Some(dir) = data_dir {
            config.data_dir = dir;
        }
        let mut summarizer = config.coordinator.summarizer.clone();
        if let Some(model) = model {
            summarizer = summarizer.with_model(model);
        }
        if let Some(endpoint) = endpoint {
            summarizer = summarizer.with_endpoint(endpoint);
        }
        config.coordinator.summarizer = summarizer;
        config
    }

    pub fn with_summary_timeout(mut self, timeout: Duration) -> Self {
        self.summary_timeout = timeout;
        self
    }
}
