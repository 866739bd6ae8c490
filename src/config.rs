//! Configuration types for tablepull

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Remote API access configuration (endpoint, paging, timeouts)
///
/// Groups settings related to how pages are requested from the upstream API.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the API, up to where the endpoint identifier is appended
    pub base_url: String,

    /// Static bearer token sent as the `token` request header
    pub token: String,

    /// Endpoint identifier appended verbatim to the base URL
    pub endpoint: String,

    /// Ordering clause passed as the `orderby` query parameter
    /// (e.g., "snapshot_date desc")
    pub order_by: String,

    /// Records requested per page (default: 15000)
    ///
    /// Fixed for the lifetime of a run; the offset advances by exactly this
    /// amount per page.
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    /// Timeout for a single page request (default: 60 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Fixed delay between successive page fetches (default: 20 seconds)
    ///
    /// This is the sole backpressure mechanism against the upstream API.
    #[serde(default = "default_request_delay", with = "duration_serde")]
    pub request_delay: Duration,

    /// Hard ceiling on pages fetched per run (None = no ceiling)
    ///
    /// A safety cap against runaway pagination, not a tuning knob.
    #[serde(default)]
    pub max_pages: Option<u32>,

    /// What to do when a single page request times out
    #[serde(default)]
    pub on_timeout: TimeoutPolicy,

    /// Accept degraded response shapes: the first array-valued field of the
    /// body, or the whole object as a single record when no array is present
    #[serde(default)]
    pub permissive_shapes: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: String::new(),
            endpoint: String::new(),
            order_by: String::new(),
            page_size: default_page_size(),
            request_timeout: default_request_timeout(),
            request_delay: default_request_delay(),
            max_pages: None,
            on_timeout: TimeoutPolicy::default(),
            permissive_shapes: false,
        }
    }
}

/// Policy applied when a page request times out.
///
/// A timeout is ambiguous: the upstream may still hold more data. The
/// original heuristic is optimistic continuation — skip to the next offset
/// and keep going — but a run can opt into treating it as terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Move on to the next offset (default)
    #[default]
    Continue,
    /// Stop the run and persist what has been accumulated
    Stop,
}

/// Text repair and record shaping configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NormalizeConfig {
    /// Repair mis-decoded text fields (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Flatten nested objects into dotted field names before accumulation
    /// (default: false)
    #[serde(default)]
    pub flatten_nested: bool,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            flatten_nested: false,
        }
    }
}

/// Chunked CSV output configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory output files are written to (default: "./data")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Fixed filename prefix for every output file (default: "export")
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// Maximum data rows per chunk file (default: 300000)
    #[serde(default = "default_max_rows_per_chunk")]
    pub max_rows_per_chunk: usize,

    /// Quote every CSV field, not only those that need it (default: true)
    ///
    /// Full quoting keeps multibyte sequences and embedded delimiters
    /// unambiguous for downstream consumers.
    #[serde(default = "default_true")]
    pub quote_all: bool,

    /// Which field names form the header row
    #[serde(default)]
    pub header_mode: HeaderMode,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            file_prefix: default_file_prefix(),
            max_rows_per_chunk: default_max_rows_per_chunk(),
            quote_all: true,
            header_mode: HeaderMode::default(),
        }
    }
}

/// Which field names form the CSV header row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderMode {
    /// Union of all field names seen across the dataset, in first-seen
    /// order (default)
    #[default]
    Union,
    /// Field order of the first accumulated record only
    FirstPage,
}

/// Main configuration for [`crate::TablePuller`]
///
/// An explicit immutable value constructed once at startup and passed by
/// reference into every component; no component reads ambient global state.
///
/// Sub-config fields are flattened for serialization, so the JSON/TOML
/// format stays un-nested.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote API access settings
    #[serde(flatten)]
    pub api: ApiConfig,

    /// Text repair and record shaping settings
    #[serde(flatten)]
    pub normalize: NormalizeConfig,

    /// Chunked CSV output settings
    #[serde(flatten)]
    pub output: OutputConfig,
}

impl Config {
    /// Check the configuration for values that cannot produce a usable run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.is_empty() {
            return Err(config_error("base_url must not be empty", "base_url"));
        }
        if url::Url::parse(&self.api.base_url).is_err() {
            return Err(config_error("base_url is not a valid URL", "base_url"));
        }
        if self.api.endpoint.is_empty() {
            return Err(config_error("endpoint must not be empty", "endpoint"));
        }
        if self.api.page_size == 0 {
            return Err(config_error("page_size must be at least 1", "page_size"));
        }
        if self.api.max_pages == Some(0) {
            return Err(config_error("max_pages must be at least 1 when set", "max_pages"));
        }
        if self.output.max_rows_per_chunk == 0 {
            return Err(config_error(
                "max_rows_per_chunk must be at least 1",
                "max_rows_per_chunk",
            ));
        }
        if self.output.file_prefix.is_empty() {
            return Err(config_error("file_prefix must not be empty", "file_prefix"));
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

fn default_page_size() -> u64 {
    15_000
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_request_delay() -> Duration {
    Duration::from_secs(20)
}

fn default_true() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_file_prefix() -> String {
    "export".to_string()
}

fn default_max_rows_per_chunk() -> usize {
    300_000
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
