use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<LogSink> = OnceCell::new();

const DEFAULT_LOG_FILE: &str = "taskstream.logs.jsonl";

/// Where log records go, resolved once from the environment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogSink {
    Disabled,
    /// Compact human-readable lines on stderr.
    Console,
    /// JSON lines appended to a file.
    JsonFile(PathBuf),
}

impl LogSink {
    fn resolve(enabled: Option<&str>, json_path: Option<&str>) -> Self {
        if enabled.and_then(parse_flag) == Some(false) {
            return Self::Disabled;
        }
        match json_path.map(str::trim).filter(|p| !p.is_empty()) {
            Some(path) => Self::JsonFile(PathBuf::from(path)),
            None => Self::Console,
        }
    }

    fn from_env() -> Self {
        Self::resolve(
            std::env::var("TASKSTREAM_OBSERVABILITY_ENABLED").ok().as_deref(),
            std::env::var("TASKSTREAM_JSON_LOG_PATH").ok().as_deref(),
        )
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_filter() -> EnvFilter {
    if let Ok(level) = std::env::var("TASKSTREAM_LOG_LEVEL")
        && let Ok(filter) = EnvFilter::try_new(level)
    {
        return filter;
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn split_log_path(path: &Path) -> (&Path, &str) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_LOG_FILE);
    (dir, file_name)
}

/// Installs the global tracing subscriber once per process and returns the
/// sink chosen by the first call.
///
/// - `TASKSTREAM_OBSERVABILITY_ENABLED`: `false`/`0`/`off` skips installation.
/// - `TASKSTREAM_LOG_LEVEL`, then `RUST_LOG`: filter directives (default `info`).
/// - `TASKSTREAM_JSON_LOG_PATH`: write JSON lines to this file instead of
///   stderr. Stdout is left to the caller.
pub fn init_observability() -> LogSink {
    INIT.get_or_init(|| {
        let sink = LogSink::from_env();
        match &sink {
            LogSink::Disabled => {}
            LogSink::Console => {
                let layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(env_filter())
                    .with(layer)
                    .try_init();
            }
            LogSink::JsonFile(path) => {
                let (dir, file_name) = split_log_path(path);
                let _ = std::fs::create_dir_all(dir);
                let layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(false)
                    .with_writer(tracing_appender::rolling::never(dir, file_name));
                let _ = tracing_subscriber::registry()
                    .with(env_filter())
                    .with(layer)
                    .try_init();
            }
        }
        sink
    })
    .clone()
}
