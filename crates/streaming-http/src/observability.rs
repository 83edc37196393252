use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::config::env_value;

/// Dependencies (hyper, reqwest, rustls) stay at `warn`; this crate logs at `info`.
pub const DEFAULT_DIRECTIVES: &str = "warn,streaming_http=info";

const CRATE_TARGET: &str = "streaming_http";
const DEFAULT_JSON_FILE: &str = "streaming-http.logs.jsonl";

static INIT: OnceCell<()> = OnceCell::new();

/// How [`init_tracing_with`] installs the global subscriber.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TracingConfig {
    pub enabled: bool,
    /// `EnvFilter` directives.
    pub filter: String,
    /// When set, events are written as JSON lines to this file instead of stderr.
    pub json_log_path: Option<PathBuf>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            filter: DEFAULT_DIRECTIVES.to_string(),
            json_log_path: None,
        }
    }
}

impl TracingConfig {
    /// Reads the config from the environment:
    ///
    /// - `STREAMING_HTTP_OBSERVABILITY_ENABLED`: enable/disable flag (default enabled).
    /// - `STREAMING_HTTP_LOG_LEVEL`, then `RUST_LOG`: filter. A bare level such as
    ///   `debug` applies to this crate only; full directives are used as given.
    /// - `STREAMING_HTTP_JSON_LOG_PATH`: JSONL output file.
    pub fn from_env() -> Self {
        let enabled = env_value("STREAMING_HTTP_OBSERVABILITY_ENABLED")
            .map(|value| parse_bool(&value).unwrap_or(true))
            .unwrap_or(true);
        let filter = resolve_filter(
            env_value("STREAMING_HTTP_LOG_LEVEL").or_else(|| env_value("RUST_LOG")),
        );
        Self {
            enabled,
            filter,
            json_log_path: env_value("STREAMING_HTTP_JSON_LOG_PATH").map(PathBuf::from),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn resolve_filter(raw: Option<String>) -> String {
    match raw {
        None => DEFAULT_DIRECTIVES.to_string(),
        Some(level) if !level.contains(['=', ',']) => format!("warn,{CRATE_TARGET}={level}"),
        Some(directives) => directives,
    }
}

fn split_log_path(path: &Path) -> (&Path, &str) {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(DEFAULT_JSON_FILE);
    (dir, file)
}

/// Installs a global subscriber configured from the environment, once per process.
///
/// Does nothing if another subscriber is already installed.
pub fn init_tracing() {
    init_tracing_with(TracingConfig::from_env());
}

/// Installs a global subscriber from `config`. Only the first call in a
/// process has any effect.
pub fn init_tracing_with(config: TracingConfig) {
    INIT.get_or_init(|| {
        if !config.enabled {
            return;
        }
        let filter = config.env_filter();
        match &config.json_log_path {
            Some(path) => {
                let (dir, file) = split_log_path(path);
                let _ = std::fs::create_dir_all(dir);
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_writer(tracing_appender::rolling::never(dir, file));
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(json_layer)
                    .try_init();
            }
            None => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(console_layer)
                    .try_init();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_env_values() {
        assert_eq!(parse_bool(" Yes "), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn bare_level_is_scoped_to_this_crate() {
        assert_eq!(resolve_filter(None), DEFAULT_DIRECTIVES);
        assert_eq!(
            resolve_filter(Some("debug".into())),
            "warn,streaming_http=debug"
        );
        assert_eq!(
            resolve_filter(Some("info,reqwest=debug".into())),
            "info,reqwest=debug"
        );
    }

    #[test]
    fn log_path_splits_into_dir_and_file() {
        assert_eq!(
            split_log_path(Path::new("logs/run.jsonl")),
            (Path::new("logs"), "run.jsonl")
        );
        assert_eq!(
            split_log_path(Path::new("run.jsonl")),
            (Path::new("."), "run.jsonl")
        );
    }

    #[test]
    fn init_is_idempotent() {
        init_tracing_with(TracingConfig {
            enabled: false,
            ..TracingConfig::default()
        });
        init_tracing();
    }
}
