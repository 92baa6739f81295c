//! Command line and environment → [`WatcherConfig`].
//!
//! This is the only place that reads the process environment. Lookups go
//! through a closure so resolution can be tested without touching real env vars.

use thiserror::Error;
use watchbot_model::{
    DEFAULT_MAX_JOB_DURATION_SECS, ModelError, RedeliveryPolicy, WatcherConfig, WorkerOptions,
};
use watchbot_observe::{LoggerConfig, LoggerError};

pub const ENV_QUEUE_URL: &str = "QueueUrl";
pub const ENV_VOLUMES: &str = "Volumes";
pub const ENV_MAX_JOB_DURATION: &str = "maxJobDuration";
pub const ENV_WRITABLE_FILESYSTEM: &str = "writableFilesystem";
pub const ENV_CONCURRENCY: &str = "Concurrency";
pub const ENV_MAX_RECEIVE_COUNT: &str = "maxReceiveCount";
pub const ENV_DEAD_LETTER_URL: &str = "DeadLetterQueueUrl";
pub const ENV_REDELIVERY: &str = "RedeliveryPolicy";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}: not a number")]
    NotANumber(&'static str),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Logger(#[from] LoggerError),
}

/// Supported subcommands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `listen <command...>`: run the watcher with the joined worker command.
    Listen { command: String },
}

impl Command {
    /// Parses arguments after the program name.
    pub fn parse(args: &[String]) -> Result<Self, ConfigError> {
        match args.split_first() {
            Some((sub, rest)) if sub == "listen" && !rest.is_empty() => Ok(Command::Listen {
                command: rest.join(" "),
            }),
            _ => Err(ConfigError::InvalidArguments(args.join(" "))),
        }
    }
}

/// Everything the binary needs after resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub command: Command,
    pub watcher: WatcherConfig,
}

pub struct ConfigResolver<F> {
    lookup: F,
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

impl ConfigResolver<fn(&str) -> Option<String>> {
    pub fn from_env() -> Self {
        Self::new(env_lookup)
    }
}

impl<F> ConfigResolver<F>
where
    F: Fn(&str) -> Option<String>,
{
    pub fn new(lookup: F) -> Self {
        Self { lookup }
    }

    /// Logger settings from `LOG_LEVEL` and `LOG_FORMAT`.
    pub fn logger(&self) -> Result<LoggerConfig, ConfigError> {
        let level = (self.lookup)(ENV_LOG_LEVEL);
        let format = (self.lookup)(ENV_LOG_FORMAT);
        Ok(LoggerConfig::from_values(level.as_deref(), format.as_deref())?)
    }

    pub fn resolve(&self, args: &[String]) -> Result<Settings, ConfigError> {
        let command = Command::parse(args)?;
        let Command::Listen { command: line } = &command;

        let queue_url = (self.lookup)(ENV_QUEUE_URL).unwrap_or_default();
        let volumes = match (self.lookup)(ENV_VOLUMES) {
            Some(v) if !v.is_empty() => v.split(',').map(str::to_string).collect(),
            _ => Vec::new(),
        };
        let max_job_duration = self
            .positive(ENV_MAX_JOB_DURATION)?
            .unwrap_or(DEFAULT_MAX_JOB_DURATION_SECS);

        let options = WorkerOptions::new(line.clone(), volumes, max_job_duration)?;
        let mut builder = WatcherConfig::builder(queue_url, options)
            .with_writable_filesystem(self.flag(ENV_WRITABLE_FILESYSTEM)?);

        if let Some(n) = self.positive(ENV_CONCURRENCY)? {
            let n = usize::try_from(n).map_err(|_| out_of_range(ENV_CONCURRENCY))?;
            builder = builder.with_concurrency(n);
        }
        if let Some(n) = self.positive(ENV_MAX_RECEIVE_COUNT)? {
            let n = u32::try_from(n).map_err(|_| out_of_range(ENV_MAX_RECEIVE_COUNT))?;
            builder = builder.with_max_receive_count(n);
        }
        if let Some(url) = (self.lookup)(ENV_DEAD_LETTER_URL) {
            builder = builder.with_dead_letter_url(url);
        }
        if let Some(policy) = (self.lookup)(ENV_REDELIVERY) {
            builder = builder.with_redelivery(policy.parse::<RedeliveryPolicy>()?);
        }

        Ok(Settings {
            command,
            watcher: builder.build()?,
        })
    }

    /// Reads a positive integer. Anything that is not a number at all is
    /// `not a number`; fractional, zero or negative numbers are rejected as such.
    fn positive(&self, field: &'static str) -> Result<Option<u64>, ConfigError> {
        let Some(raw) = (self.lookup)(field) else {
            return Ok(None);
        };
        let n: f64 = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::NotANumber(field))?;
        if n.is_nan() {
            return Err(ConfigError::NotANumber(field));
        }
        if !n.is_finite() || n < 1.0 || n.fract() != 0.0 || n > u64::MAX as f64 {
            return Err(ModelError::NotPositive { field }.into());
        }
        Ok(Some(n as u64))
    }

    fn flag(&self, field: &'static str) -> Result<bool, ConfigError> {
        match (self.lookup)(field).as_deref().map(str::trim) {
            None | Some("") => Ok(false),
            Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => Ok(true),
            Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => Ok(false),
            Some(v) => Err(ModelError::Invalid {
                field,
                reason: format!("expected true or false, got {v:?}"),
            }
            .into()),
        }
    }
}

fn out_of_range(field: &'static str) -> ConfigError {
    ModelError::Invalid {
        field,
        reason: "out of range".into(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn resolver(vars: &[(&str, &str)]) -> ConfigResolver<impl Fn(&str) -> Option<String>> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ConfigResolver::new(move |k: &str| map.get(k).cloned())
    }

    fn args(line: &str) -> Vec<String> {
        line.split(' ').map(str::to_string).collect()
    }

    fn base() -> Vec<(&'static str, &'static str)> {
        vec![("QueueUrl", "https://faker"), ("Volumes", "/tmp,/mnt")]
    }

    #[test]
    fn listen_builds_expected_config() {
        let mut vars = base();
        vars.push(("maxJobDuration", "180"));

        let settings = resolver(&vars)
            .resolve(&args("listen echo hello world"))
            .unwrap();

        let expected = WatcherConfig::builder(
            "https://faker",
            WorkerOptions::new("echo hello world", vec!["/tmp".into(), "/mnt".into()], 180)
                .unwrap(),
        )
        .build()
        .unwrap();
        assert_eq!(settings.watcher, expected);
        assert!(!settings.watcher.writable_filesystem());
        assert_eq!(
            settings.command,
            Command::Listen {
                command: "echo hello world".into()
            }
        );
    }

    #[test]
    fn unknown_subcommand_names_all_arguments() {
        let err = resolver(&base())
            .resolve(&args("watch echo hello world"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid arguments: watch echo hello world");
    }

    #[test]
    fn empty_arguments_are_invalid() {
        let err = resolver(&base()).resolve(&[]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid arguments: ");
        let err = resolver(&base()).resolve(&args("listen")).unwrap_err();
        assert_eq!(err.to_string(), "Invalid arguments: listen");
    }

    #[test]
    fn non_numeric_duration_is_rejected() {
        let mut vars = base();
        vars.push(("maxJobDuration", "not a number here"));
        let err = resolver(&vars)
            .resolve(&args("listen echo hello world"))
            .unwrap_err();
        assert_eq!(err.to_string(), "maxJobDuration: not a number");
    }

    #[test]
    fn non_positive_duration_is_rejected() {
        for bad in ["0", "-5", "1.5", "inf"] {
            let mut vars = base();
            vars.push(("maxJobDuration", bad));
            let err = resolver(&vars).resolve(&args("listen true")).unwrap_err();
            assert_eq!(
                err.to_string(),
                "maxJobDuration: must be a positive integer",
                "value {bad:?}"
            );
        }
    }

    #[test]
    fn duration_defaults_when_absent() {
        let settings = resolver(&base()).resolve(&args("listen true")).unwrap();
        assert_eq!(
            settings.watcher.worker_options().max_job_duration_secs(),
            DEFAULT_MAX_JOB_DURATION_SECS
        );
    }

    #[test]
    fn missing_queue_url_is_required() {
        let err = resolver(&[]).resolve(&args("listen true")).unwrap_err();
        assert_eq!(err.to_string(), "QueueUrl: required");
    }

    #[test]
    fn volumes_split_without_trimming() {
        let vars = [("QueueUrl", "q"), ("Volumes", "/a, /b")];
        let settings = resolver(&vars).resolve(&args("listen true")).unwrap();
        assert_eq!(settings.watcher.worker_options().volumes(), ["/a", " /b"]);

        let vars = [("QueueUrl", "q"), ("Volumes", "")];
        let settings = resolver(&vars).resolve(&args("listen true")).unwrap();
        assert!(settings.watcher.worker_options().volumes().is_empty());
    }

    #[test]
    fn optional_settings_are_applied() {
        let vars = [
            ("QueueUrl", "q"),
            ("writableFilesystem", "TRUE"),
            ("Concurrency", "4"),
            ("maxReceiveCount", "5"),
            ("DeadLetterQueueUrl", "dlq"),
            ("RedeliveryPolicy", "release"),
        ];
        let cfg = resolver(&vars).resolve(&args("listen true")).unwrap().watcher;
        assert!(cfg.writable_filesystem());
        assert_eq!(cfg.concurrency(), 4);
        assert_eq!(cfg.max_receive_count(), Some(5));
        assert_eq!(cfg.dead_letter_url(), Some("dlq"));
        assert_eq!(cfg.redelivery(), RedeliveryPolicy::Release);
    }

    #[test]
    fn bad_optional_values_name_their_field() {
        let cases = [
            ("Concurrency", "many", "Concurrency: not a number"),
            ("Concurrency", "0", "Concurrency: must be a positive integer"),
            ("maxReceiveCount", "x", "maxReceiveCount: not a number"),
        ];
        for (key, value, message) in cases {
            let vars = [("QueueUrl", "q"), (key, value)];
            let err = resolver(&vars).resolve(&args("listen true")).unwrap_err();
            assert_eq!(err.to_string(), message);
        }

        let vars = [("QueueUrl", "q"), ("writableFilesystem", "maybe")];
        let err = resolver(&vars).resolve(&args("listen true")).unwrap_err();
        assert!(err.to_string().starts_with("writableFilesystem:"));

        let vars = [("QueueUrl", "q"), ("RedeliveryPolicy", "never")];
        let err = resolver(&vars).resolve(&args("listen true")).unwrap_err();
        assert!(err.to_string().starts_with("RedeliveryPolicy:"));
    }

    #[test]
    fn logger_settings_come_from_env() {
        let cfg = resolver(&[("LOG_LEVEL", "debug"), ("LOG_FORMAT", "json")])
            .logger()
            .unwrap();
        assert_eq!(cfg.level, "debug");
        assert_eq!(cfg.format, watchbot_observe::LoggerFormat::Json);

        assert!(resolver(&[("LOG_FORMAT", "xml")]).logger().is_err());
    }
}
