use std::env;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::workflows::whitelist::interview::StaticQuestions;
use crate::workflows::whitelist::ledger::WritePolicy;

/// Distinguishes runtime behavior for different stages of the desk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the review desk.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub ledger: LedgerConfig,
    pub interview: InterviewConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let path = env::var("DESK_LEDGER_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/wl-log.json"));
        let write_attempts = parse_var("DESK_WRITE_ATTEMPTS", 3u32)?;
        if write_attempts == 0 {
            return Err(ConfigError::InvalidNumber {
                variable: "DESK_WRITE_ATTEMPTS",
            });
        }
        let write_deadline_ms = parse_var("DESK_WRITE_DEADLINE_MS", 2000u64)?;

        let questions_path = env::var("DESK_QUESTIONS_PATH").ok().map(PathBuf::from);
        let idle_secs = parse_var("DESK_SESSION_IDLE_SECS", 1800u64)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            ledger: LedgerConfig {
                path,
                write_attempts,
                write_deadline: Duration::from_millis(write_deadline_ms),
            },
            interview: InterviewConfig {
                questions_path,
                idle_timeout: (idle_secs > 0).then(|| Duration::from_secs(idle_secs)),
            },
            telemetry: TelemetryConfig {
                log_level,
                ansi: environment == AppEnvironment::Development,
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(variable: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(variable) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { variable }),
        Err(_) => Ok(default),
    }
}

/// Where the submission ledger lives and how hard writes are retried.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub path: PathBuf,
    pub write_attempts: u32,
    pub write_deadline: Duration,
}

impl LedgerConfig {
    pub fn write_policy(&self) -> WritePolicy {
        WritePolicy::new(self.write_attempts, self.write_deadline)
    }
}

/// Oral interview settings.
#[derive(Debug, Clone)]
pub struct InterviewConfig {
    pub questions_path: Option<PathBuf>,
    pub idle_timeout: Option<Duration>,
}

impl InterviewConfig {
    /// Prompts from the configured JSON array, or the built-in set when no file is set.
    pub fn question_source(&self) -> Result<StaticQuestions, ConfigError> {
        let Some(path) = &self.questions_path else {
            return Ok(StaticQuestions::standard());
        };
        let questions_error = |reason: String| ConfigError::Questions {
            path: path.clone(),
            reason,
        };

        let raw = fs::read_to_string(path).map_err(|err| questions_error(err.to_string()))?;
        let prompts: Vec<String> =
            serde_json::from_str(&raw).map_err(|err| questions_error(err.to_string()))?;
        Ok(StaticQuestions(prompts))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    /// Colored output, only for local development terminals.
    pub ansi: bool,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidNumber { variable: &'static str },
    Questions { path: PathBuf, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidNumber { variable } => {
                write!(f, "{variable} must be a valid positive number")
            }
            ConfigError::Questions { path, reason } => {
                write!(
                    f,
                    "unable to read interview questions from {}: {reason}",
                    path.display()
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}
