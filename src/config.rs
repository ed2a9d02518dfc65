use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_INTERPRETER: &str = "python3";
const DEFAULT_WORK_DIR: &str = "diagram_code";
const DEFAULT_EXEC_TIMEOUT_SECS: u64 = 30;

/// Runtime configuration loaded from environment variables.
///
/// Built once in `main` and handed to the client, runner and pipeline
/// constructors; nothing below `main` reads the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub interpreter: PathBuf,
    pub work_dir: PathBuf,
    pub exec_timeout: Duration,
    pub sentry_dsn: Option<String>,
    pub environment: String,
}

/// Raw string values as they come from the environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawValues<'a> {
    pub api_key: Option<&'a str>,
    pub api_base: Option<&'a str>,
    pub model: Option<&'a str>,
    pub interpreter: Option<&'a str>,
    pub work_dir: Option<&'a str>,
    pub exec_timeout_secs: Option<&'a str>,
    pub sentry_dsn: Option<&'a str>,
    pub environment: Option<&'a str>,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty()).map(String::from)
}

impl Config {
    pub fn from_env() -> Self {
        let api_key = std::env::var("GEMINI_API_KEY").ok();
        let api_base = std::env::var("GEMINI_API_BASE").ok();
        let model = std::env::var("GEMINI_MODEL").ok();
        let interpreter = std::env::var("SKETCHDOC_PYTHON").ok();
        let work_dir = std::env::var("SKETCHDOC_WORK_DIR").ok();
        let exec_timeout_secs = std::env::var("SKETCHDOC_EXEC_TIMEOUT_SECS").ok();
        let sentry_dsn = std::env::var("SENTRY_DSN").ok();
        let environment = std::env::var("ENVIRONMENT").ok();

        Self::from_raw_values(RawValues {
            api_key: api_key.as_deref(),
            api_base: api_base.as_deref(),
            model: model.as_deref(),
            interpreter: interpreter.as_deref(),
            work_dir: work_dir.as_deref(),
            exec_timeout_secs: exec_timeout_secs.as_deref(),
            sentry_dsn: sentry_dsn.as_deref(),
            environment: environment.as_deref(),
        })
    }

    /// Build a Config from raw string values (as they would come from env vars).
    /// Used directly in tests to avoid mutating process-global environment.
    pub fn from_raw_values(raw: RawValues<'_>) -> Self {
        let exec_timeout_secs = raw
            .exec_timeout_secs
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_EXEC_TIMEOUT_SECS);

        Config {
            api_key: non_empty(raw.api_key),
            api_base: non_empty(raw.api_base)
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            model: non_empty(raw.model).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            interpreter: non_empty(raw.interpreter)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_INTERPRETER)),
            work_dir: non_empty(raw.work_dir)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_DIR)),
            exec_timeout: Duration::from_secs(exec_timeout_secs),
            sentry_dsn: non_empty(raw.sentry_dsn),
            environment: non_empty(raw.environment).unwrap_or_else(|| "local".to_string()),
        }
    }
}
