//! Configuration loading and management.
//!
//! Configuration is layered with figment, loaded from (in order of priority):
//! 1. Default values (compiled in)
//! 2. Config file: `newrelic-telemetry.toml` (optional)
//! 3. Standard New Relic environment variables (`NEW_RELIC_*`)
//! 4. Crate-specific environment variables (`NR_TELEMETRY_*`, nested keys
//!    separated by `__`)
//!
//! # Supported Standard Environment Variables
//!
//! | Variable | Config Path | Description |
//! |----------|-------------|-------------|
//! | `NEW_RELIC_API_KEY` | `api_key` | Ingest or license key |
//! | `NEW_RELIC_METRIC_URL` | `endpoints.metrics` | Metric API endpoint |
//! | `NEW_RELIC_TRACE_URL` | `endpoints.spans` | Trace API endpoint |
//! | `NEW_RELIC_EVENT_URL` | `endpoints.events` | Event API endpoint |
//! | `NEW_RELIC_LOG_URL` | `endpoints.logs` | Log API endpoint |

use crate::error::{Error, Result};
use crate::telemetry::TelemetryKind;
use crate::transport::{DEFAULT_USER_AGENT, build_user_agent};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "newrelic-telemetry.toml";
const ENV_PREFIX: &str = "NR_TELEMETRY_";

/// Default metric API endpoint.
pub const DEFAULT_METRICS_ENDPOINT: &str = "https://metric-api.newrelic.com/metric/v1";
/// Default trace API endpoint.
pub const DEFAULT_SPANS_ENDPOINT: &str = "https://trace-api.newrelic.com/trace/v1";
/// Default event API endpoint.
pub const DEFAULT_EVENTS_ENDPOINT: &str =
    "https://insights-collector.newrelic.com/v1/accounts/events";
/// Default log API endpoint.
pub const DEFAULT_LOGS_ENDPOINT: &str = "https://log-api.newrelic.com/log/v1";
/// Default cap on records held by the telemetry client awaiting delivery.
pub const DEFAULT_MAX_PENDING_RECORDS: usize = 1_000_000;

/// Main configuration struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Key sent as the `Api-Key` header.
    pub api_key: Option<String>,
    /// Ingest endpoint per telemetry kind.
    pub endpoints: EndpointsConfig,
    /// Base `User-Agent`.
    pub user_agent: String,
    /// Product token appended to the base `User-Agent`.
    pub secondary_user_agent: Option<String>,
    /// Log every uncompressed payload at debug level.
    pub audit_logging: bool,
    /// Request timeout in milliseconds.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    /// Retry backoff used by the telemetry client.
    pub backoff: BackoffConfig,
    /// Records the telemetry client may hold in flight before it refuses
    /// new batches.
    pub max_pending_records: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoints: EndpointsConfig::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            secondary_user_agent: None,
            audit_logging: false,
            timeout: Duration::from_secs(10),
            backoff: BackoffConfig::default(),
            max_pending_records: DEFAULT_MAX_PENDING_RECORDS,
        }
    }
}

impl Config {
    /// Loads configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Loads configuration from a custom config file path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if config_path.as_ref().exists() {
            figment = figment.merge(Toml::file(config_path));
        }

        figment = figment.merge(standard_env());
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        Ok(figment.extract()?)
    }

    /// Creates a new config builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Returns the API key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingApiKey`] if no non-blank key is configured.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(Error::MissingApiKey)
    }

    /// The full `User-Agent` header value.
    pub fn full_user_agent(&self) -> String {
        build_user_agent(&self.user_agent, self.secondary_user_agent.as_deref())
    }
}

/// Ingest endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    /// Metric API URL.
    pub metrics: String,
    /// Trace API URL.
    pub spans: String,
    /// Event API URL.
    pub events: String,
    /// Log API URL.
    pub logs: String,
}

impl EndpointsConfig {
    /// The endpoint receiving batches of `kind`.
    pub fn for_kind(&self, kind: TelemetryKind) -> &str {
        match kind {
            TelemetryKind::Metric => &self.metrics,
            TelemetryKind::Span => &self.spans,
            TelemetryKind::Event => &self.events,
            TelemetryKind::Log => &self.logs,
        }
    }
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            metrics: DEFAULT_METRICS_ENDPOINT.to_string(),
            spans: DEFAULT_SPANS_ENDPOINT.to_string(),
            events: DEFAULT_EVENTS_ENDPOINT.to_string(),
            logs: DEFAULT_LOGS_ENDPOINT.to_string(),
        }
    }
}

/// Exponential backoff settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Base wait in milliseconds, doubled on each retry.
    #[serde(with = "duration_ms")]
    pub factor: Duration,
    /// Largest wait in milliseconds.
    #[serde(with = "duration_ms")]
    pub max: Duration,
    /// Attempts after which the batch is dropped.
    pub max_retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            factor: Duration::from_secs(1),
            max: Duration::from_secs(15),
            max_retries: 10,
        }
    }
}

/// Builder for constructing configuration programmatically.
#[must_use = "builders do nothing unless .build() is called"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Creates a new config builder with default values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Sets the API key.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.api_key = Some(api_key.into());
        self
    }

    /// Sets the metric endpoint.
    pub fn metrics_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoints.metrics = url.into();
        self
    }

    /// Sets the span endpoint.
    pub fn spans_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoints.spans = url.into();
        self
    }

    /// Sets the event endpoint.
    pub fn events_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoints.events = url.into();
        self
    }

    /// Sets the log endpoint.
    pub fn logs_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoints.logs = url.into();
        self
    }

    /// Sets the base user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Sets the secondary user agent.
    pub fn secondary_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.secondary_user_agent = Some(user_agent.into());
        self
    }

    /// Enables or disables payload audit logging.
    pub fn audit_logging(mut self, enabled: bool) -> Self {
        self.config.audit_logging = enabled;
        self
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Sets the retry backoff.
    pub fn backoff(mut self, factor: Duration, max: Duration, max_retries: u32) -> Self {
        self.config.backoff = BackoffConfig {
            factor,
            max,
            max_retries,
        };
        self
    }

    /// Sets the in-flight record limit of the telemetry client.
    pub fn max_pending_records(mut self, max: usize) -> Self {
        self.config.max_pending_records = max;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Partial endpoints for standard env var overrides.
#[derive(Debug, Default, Serialize)]
struct PartialEndpoints {
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    spans: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    events: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    logs: Option<String>,
}

/// Partial config for standard env var overrides.
#[derive(Debug, Default, Serialize)]
struct PartialConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
    #[serde(skip_serializing_if = "is_partial_endpoints_empty")]
    endpoints: PartialEndpoints,
}

fn is_partial_endpoints_empty(endpoints: &PartialEndpoints) -> bool {
    endpoints.metrics.is_none()
        && endpoints.spans.is_none()
        && endpoints.events.is_none()
        && endpoints.logs.is_none()
}

fn standard_env() -> Serialized<PartialConfig> {
    let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

    let config = PartialConfig {
        api_key: var("NEW_RELIC_API_KEY"),
        endpoints: PartialEndpoints {
            metrics: var("NEW_RELIC_METRIC_URL"),
            spans: var("NEW_RELIC_TRACE_URL"),
            events: var("NEW_RELIC_EVENT_URL"),
            logs: var("NEW_RELIC_LOG_URL"),
        },
    };

    Serialized::defaults(config)
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const STANDARD_VARS: [&str; 5] = [
        "NEW_RELIC_API_KEY",
        "NEW_RELIC_METRIC_URL",
        "NEW_RELIC_TRACE_URL",
        "NEW_RELIC_EVENT_URL",
        "NEW_RELIC_LOG_URL",
    ];

    fn without_standard_vars<F: FnOnce()>(f: F) {
        temp_env::with_vars(STANDARD_VARS.map(|name| (name, None::<&str>)), f);
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.api_key.is_none());
        assert_eq!(config.endpoints.metrics, DEFAULT_METRICS_ENDPOINT);
        assert_eq!(config.endpoints.spans, DEFAULT_SPANS_ENDPOINT);
        assert_eq!(config.endpoints.events, DEFAULT_EVENTS_ENDPOINT);
        assert_eq!(config.endpoints.logs, DEFAULT_LOGS_ENDPOINT);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert!(!config.audit_logging);
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.backoff.factor, Duration::from_secs(1));
        assert_eq!(config.backoff.max, Duration::from_secs(15));
        assert_eq!(config.backoff.max_retries, 10);
        assert_eq!(config.max_pending_records, DEFAULT_MAX_PENDING_RECORDS);
    }

    #[test]
    fn test_config_builder() {
        let config = Config::builder()
            .api_key("key")
            .metrics_endpoint("http://localhost:1/metric")
            .spans_endpoint("http://localhost:1/trace")
            .events_endpoint("http://localhost:1/events")
            .logs_endpoint("http://localhost:1/log")
            .secondary_user_agent("myapp/1.2")
            .audit_logging(true)
            .timeout(Duration::from_millis(250))
            .backoff(Duration::from_millis(10), Duration::from_millis(40), 3)
            .max_pending_records(500)
            .build();

        assert_eq!(config.require_api_key().unwrap(), "key");
        assert_eq!(config.endpoints.metrics, "http://localhost:1/metric");
        assert_eq!(config.endpoints.logs, "http://localhost:1/log");
        assert_eq!(config.full_user_agent(), format!("{DEFAULT_USER_AGENT} myapp/1.2"));
        assert!(config.audit_logging);
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert_eq!(config.backoff.max_retries, 3);
        assert_eq!(config.max_pending_records, 500);
    }

    #[test]
    fn test_endpoint_per_kind() {
        let endpoints = EndpointsConfig::default();
        assert_eq!(endpoints.for_kind(TelemetryKind::Metric), DEFAULT_METRICS_ENDPOINT);
        assert_eq!(endpoints.for_kind(TelemetryKind::Span), DEFAULT_SPANS_ENDPOINT);
        assert_eq!(endpoints.for_kind(TelemetryKind::Event), DEFAULT_EVENTS_ENDPOINT);
        assert_eq!(endpoints.for_kind(TelemetryKind::Log), DEFAULT_LOGS_ENDPOINT);
    }

    #[test]
    fn test_missing_api_key() {
        assert!(matches!(
            Config::default().require_api_key(),
            Err(Error::MissingApiKey)
        ));
        let blank = Config::builder().api_key("  ").build();
        assert!(matches!(blank.require_api_key(), Err(Error::MissingApiKey)));
    }

    #[test]
    #[serial]
    fn test_load_from_toml() {
        let toml_content = r#"
api_key = "from-file"
audit_logging = true
timeout = 2500
secondary_user_agent = "agent/9"

[endpoints]
metrics = "https://eu.example/metric/v1"

[backoff]
factor = 200
max = 5000
max_retries = 4
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        without_standard_vars(|| {
            let config = Config::load_from_path(temp_file.path()).unwrap();

            assert_eq!(config.api_key.as_deref(), Some("from-file"));
            assert!(config.audit_logging);
            assert_eq!(config.timeout, Duration::from_millis(2500));
            assert_eq!(config.secondary_user_agent.as_deref(), Some("agent/9"));
            assert_eq!(config.endpoints.metrics, "https://eu.example/metric/v1");
            assert_eq!(config.endpoints.spans, DEFAULT_SPANS_ENDPOINT);
            assert_eq!(config.backoff.factor, Duration::from_millis(200));
            assert_eq!(config.backoff.max, Duration::from_secs(5));
            assert_eq!(config.backoff.max_retries, 4);
        });
    }

    #[test]
    #[serial]
    fn test_load_nonexistent_file_uses_defaults() {
        without_standard_vars(|| {
            let config = Config::load_from_path("/nonexistent/path/config.toml").unwrap();

            assert!(config.api_key.is_none());
            assert_eq!(config.endpoints, EndpointsConfig::default());
        });
    }

    #[test]
    #[serial]
    fn test_standard_env_overrides_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"api_key = \"from-file\"\n[endpoints]\nlogs = \"https://file/log\"\n")
            .unwrap();

        temp_env::with_vars(
            [
                ("NEW_RELIC_API_KEY", Some("from-env")),
                ("NEW_RELIC_LOG_URL", Some("https://env/log")),
                ("NEW_RELIC_TRACE_URL", Some("https://env/trace")),
                ("NEW_RELIC_METRIC_URL", None),
                ("NEW_RELIC_EVENT_URL", None),
            ],
            || {
                let config = Config::load_from_path(temp_file.path()).unwrap();

                assert_eq!(config.api_key.as_deref(), Some("from-env"));
                assert_eq!(config.endpoints.logs, "https://env/log");
                assert_eq!(config.endpoints.spans, "https://env/trace");
                assert_eq!(config.endpoints.metrics, DEFAULT_METRICS_ENDPOINT);
            },
        );
    }

    #[test]
    #[serial]
    fn test_prefixed_env_takes_precedence() {
        temp_env::with_vars(
            [
                ("NEW_RELIC_API_KEY", Some("standard")),
                ("NEW_RELIC_METRIC_URL", None),
                ("NEW_RELIC_TRACE_URL", None),
                ("NEW_RELIC_EVENT_URL", None),
                ("NEW_RELIC_LOG_URL", None),
                ("NR_TELEMETRY_API_KEY", Some("prefixed")),
                ("NR_TELEMETRY_ENDPOINTS__EVENTS", Some("https://prefixed/events")),
                ("NR_TELEMETRY_BACKOFF__MAX_RETRIES", Some("2")),
                ("NR_TELEMETRY_MAX_PENDING_RECORDS", Some("42")),
            ],
            || {
                let config = Config::load_from_path("/nonexistent/path/config.toml").unwrap();

                assert_eq!(config.api_key.as_deref(), Some("prefixed"));
                assert_eq!(config.endpoints.events, "https://prefixed/events");
                assert_eq!(config.backoff.max_retries, 2);
                assert_eq!(config.max_pending_records, 42);
            },
        );
    }

    #[test]
    #[serial]
    fn test_invalid_value_is_a_config_error() {
        without_standard_vars(|| {
            temp_env::with_var("NR_TELEMETRY_TIMEOUT", Some("soon"), || {
                let error = Config::load_from_path("/nonexistent/path/config.toml").unwrap_err();
                assert!(matches!(error, Error::Config(_)));
            });
        });
    }
}
