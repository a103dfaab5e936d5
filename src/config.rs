use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::error::{FeedError, FeedResult};
use crate::ingest::{KeyScheme, RetryPolicy};
use crate::query::{DecodePolicy, SearchRequest};

/// Upper bound on one page; larger windows belong to scroll APIs.
const MAX_QUERY_LIMIT: usize = 10_000;

/// Longest accepted pause between steady-phase writes: one day.
const MAX_INTERVAL_SECS: f64 = 86_400.0;

// ─── Command line / environment ──────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum KeyMode {
    /// Document key = counter value (restarts overwrite earlier documents)
    #[default]
    Counter,
    /// Document key = <run uuid>-<counter>
    RunScoped,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "search-feeder")]
#[command(about = "Feeds normally distributed samples into a document store and queries them back")]
#[command(version)]
pub struct Args {
    /// Backend URL: http(s):// for Elasticsearch, redis:// for Redis, memory:// for in-process
    #[arg(long = "store-url", env = "ELASTIC_URL")]
    pub store_url: Option<String>,

    /// Collection (index) receiving the samples
    #[arg(long, env = "FEEDER_COLLECTION", default_value = "random")]
    pub collection: String,

    /// Producer names, comma separated
    #[arg(
        long,
        env = "FEEDER_ROSTER",
        value_delimiter = ',',
        default_values = ["Pavel", "John", "Mark", "Patrick", "Rex", "Julia"]
    )]
    pub roster: Vec<String>,

    /// Samples written back to back before the first query
    #[arg(long, env = "FEEDER_BURST_COUNT", default_value_t = 10_000)]
    pub burst_count: u64,

    /// Seconds between writes once the burst is done
    #[arg(long, env = "FEEDER_INTERVAL_SECS", default_value_t = 1.0)]
    pub interval_secs: f64,

    /// Creator searched for after the burst
    #[arg(long, env = "FEEDER_QUERY_CREATOR", default_value = "Pavel")]
    pub query_creator: String,

    /// Page size of the post-burst query
    #[arg(long, env = "FEEDER_QUERY_LIMIT", default_value_t = SearchRequest::DEFAULT_LIMIT)]
    pub query_limit: usize,

    /// Attempts per write; 1 means the first failure is final
    #[arg(long, env = "FEEDER_WRITE_ATTEMPTS", default_value_t = 1)]
    pub write_attempts: u32,

    #[arg(long, env = "FEEDER_KEY_MODE", value_enum, default_value_t = KeyMode::Counter)]
    pub key_mode: KeyMode,

    /// Skip search hits that do not decode instead of failing the query
    #[arg(long, env = "FEEDER_SKIP_MALFORMED")]
    pub skip_malformed: bool,

    /// Kibana base URL; the dashboard import is skipped when unset
    #[arg(long = "dashboard-url", env = "KIBANA_URL")]
    pub dashboard_url: Option<String>,

    /// Saved-objects export posted to Kibana
    #[arg(long, env = "FEEDER_DASHBOARD_FILE", default_value = "kibana.json")]
    pub dashboard_file: PathBuf,

    /// Serve the read API on this address (e.g. 0.0.0.0:3000)
    #[arg(long, env = "FEEDER_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Emit logs as JSON lines
    #[arg(long, env = "FEEDER_LOG_JSON")]
    pub log_json: bool,
}

// ─── Validated configuration ─────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    pub base_url: String,
    pub file: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeederConfig {
    pub store_url: String,
    pub roster_names: Vec<String>,
    pub burst_count: u64,
    pub interval_secs: f64,
    pub collection_name: String,
    pub query_creator: String,
    pub query_limit: usize,
    pub write_attempts: u32,
    pub key_mode: KeyMode,
    pub skip_malformed: bool,
    pub dashboard: Option<DashboardConfig>,
    pub listen: Option<SocketAddr>,
}

impl FeederConfig {
    /// Defaults of the command line with the given backend.
    pub fn with_store_url(store_url: impl Into<String>) -> Self {
        Self {
            store_url: store_url.into(),
            roster_names: ["Pavel", "John", "Mark", "Patrick", "Rex", "Julia"]
                .map(String::from)
                .to_vec(),
            burst_count: 10_000,
            interval_secs: 1.0,
            collection_name: "random".into(),
            query_creator: "Pavel".into(),
            query_limit: SearchRequest::DEFAULT_LIMIT,
            write_attempts: 1,
            key_mode: KeyMode::Counter,
            skip_malformed: false,
            dashboard: None,
            listen: None,
        }
    }

    pub fn validate(&self) -> FeedResult<()> {
        if self.store_url.trim().is_empty() {
            return Err(config_error("backend URL (ELASTIC_URL) is missing or empty"));
        }
        if self.roster_names.is_empty() {
            return Err(config_error("creator roster is empty"));
        }
        if self.roster_names.iter().any(|n| n.trim().is_empty()) {
            return Err(config_error("creator roster contains an empty name"));
        }
        if !self.interval_secs.is_finite()
            || self.interval_secs <= 0.0
            || self.interval_secs > MAX_INTERVAL_SECS
            || Duration::try_from_secs_f64(self.interval_secs).is_err()
        {
            return Err(config_error(format!(
                "interval must be between 0 and {MAX_INTERVAL_SECS} seconds, got {}",
                self.interval_secs
            )));
        }
        validate_collection_name(&self.collection_name)?;
        if self.query_limit > MAX_QUERY_LIMIT {
            return Err(config_error(format!(
                "query limit {} exceeds {MAX_QUERY_LIMIT}",
                self.query_limit
            )));
        }
        if self.write_attempts == 0 {
            return Err(config_error("write attempts must be at least 1"));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        // validate() rejects anything this clamps.
        Duration::try_from_secs_f64(self.interval_secs.min(MAX_INTERVAL_SECS))
            .unwrap_or(Duration::from_secs(1))
    }

    pub fn key_scheme(&self) -> KeyScheme {
        match self.key_mode {
            KeyMode::Counter => KeyScheme::Counter,
            KeyMode::RunScoped => KeyScheme::run_scoped(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::attempts(self.write_attempts)
    }

    pub fn decode_policy(&self) -> DecodePolicy {
        if self.skip_malformed {
            DecodePolicy::SkipMalformed
        } else {
            DecodePolicy::Strict
        }
    }

    /// The query run once after the burst.
    pub fn demo_query(&self) -> SearchRequest {
        SearchRequest::by_creator(self.query_creator.clone()).page(0, self.query_limit)
    }
}

impl Args {
    /// Validated configuration; a missing backend URL is a configuration error.
    pub fn into_config(self) -> FeedResult<FeederConfig> {
        let dashboard = self
            .dashboard_url
            .filter(|url| !url.trim().is_empty())
            .map(|base_url| DashboardConfig {
                base_url,
                file: self.dashboard_file,
            });

        let config = FeederConfig {
            store_url: self.store_url.unwrap_or_default().trim().to_string(),
            roster_names: self
                .roster
                .into_iter()
                .map(|n| n.trim().to_string())
                .collect(),
            burst_count: self.burst_count,
            interval_secs: self.interval_secs,
            collection_name: self.collection,
            query_creator: self.query_creator,
            query_limit: self.query_limit,
            write_attempts: self.write_attempts,
            key_mode: self.key_mode,
            skip_malformed: self.skip_malformed,
            dashboard,
            listen: self.listen,
        };
        config.validate()?;
        Ok(config)
    }
}

fn config_error(msg: impl Into<String>) -> FeedError {
    FeedError::Configuration(msg.into())
}

/// Names every backend accepts: non-empty, lowercase, no separators that
/// clash with URL paths or Redis key layout.
fn validate_collection_name(name: &str) -> FeedResult<()> {
    if name.is_empty() {
        return Err(config_error("collection name is empty"));
    }
    let valid = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'));
    if !valid || name.starts_with(['-', '_', '.']) {
        return Err(config_error(format!(
            "collection name '{name}' must be lowercase alphanumerics, '-', '_' or '.'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        let mut argv = vec!["search-feeder"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_match_the_command_line() {
        let config = parse(&["--store-url", "http://localhost:9200"])
            .into_config()
            .unwrap();

        assert_eq!(config, FeederConfig::with_store_url("http://localhost:9200"));
        assert_eq!(config.interval(), Duration::from_secs(1));
        assert_eq!(config.demo_query(), SearchRequest::by_creator("Pavel"));
        assert_eq!(config.retry_policy().attempts, 1);
        assert_eq!(config.decode_policy(), DecodePolicy::Strict);
    }

    #[test]
    fn roster_is_comma_separated() {
        let config = parse(&["--store-url", "memory://", "--roster", "Pavel, John"])
            .into_config()
            .unwrap();
        assert_eq!(config.roster_names, ["Pavel", "John"]);
    }

    #[test]
    fn missing_or_blank_url_is_a_configuration_error() {
        // Built explicitly so an ELASTIC_URL in the environment cannot leak in.
        let missing = Args {
            store_url: None,
            ..parse(&["--store-url", "memory://"])
        };
        let blank = parse(&["--store-url", "  "]);

        for args in [missing, blank] {
            let err = args.into_config().unwrap_err();
            assert!(matches!(err, FeedError::Configuration(_)), "{err}");
        }
    }

    #[test]
    fn rejects_bad_values() {
        let base = FeederConfig::with_store_url("memory://");

        let mut c = base.clone();
        c.interval_secs = 0.0;
        assert!(c.validate().is_err());

        for huge in [1e20, MAX_INTERVAL_SECS + 1.0, f64::INFINITY] {
            let mut c = base.clone();
            c.interval_secs = huge;
            assert!(
                matches!(c.validate(), Err(FeedError::Configuration(_))),
                "{huge}"
            );
            assert_eq!(c.interval(), Duration::from_secs(86_400));
        }

        let mut c = base.clone();
        c.roster_names = vec!["Pavel".into(), "".into()];
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.collection_name = "Random".into();
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.write_attempts = 0;
        assert!(c.validate().is_err());

        let mut c = base;
        c.query_limit = MAX_QUERY_LIMIT + 1;
        assert!(c.validate().is_err());
    }

    #[test]
    fn dashboard_needs_a_base_url() {
        let config = parse(&["--store-url", "memory://", "--dashboard-url", "http://kibana:5601"])
            .into_config()
            .unwrap();
        assert_eq!(
            config.dashboard,
            Some(DashboardConfig {
                base_url: "http://kibana:5601".into(),
                file: PathBuf::from("kibana.json"),
            })
        );

        let config = parse(&["--store-url", "memory://"]).into_config().unwrap();
        assert_eq!(config.dashboard, None);
    }

    #[test]
    fn run_scoped_key_mode() {
        let config = parse(&["--store-url", "memory://", "--key-mode", "run-scoped"])
            .into_config()
            .unwrap();
        assert!(matches!(config.key_scheme(), KeyScheme::RunScoped(_)));
    }
}
