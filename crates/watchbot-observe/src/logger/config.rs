use std::io::IsTerminal;

use crate::logger::{error::LoggerError, format::LoggerFormat};

/// Filter applied when no `LOG_LEVEL` is given.
pub const DEFAULT_LEVEL: &str = "info";

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directive string, e.g. `info` or `watchbot=debug,aws_smithy_runtime=warn`.
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        let use_color = cfg!(test) || std::io::stdout().is_terminal();
        Self {
            format: LoggerFormat::Text,
            level: DEFAULT_LEVEL.to_string(),
            with_targets: true,
            use_color,
        }
    }
}

impl LoggerConfig {
    /// Builds a config from optional `LOG_LEVEL` / `LOG_FORMAT` values.
    pub fn from_values(level: Option<&str>, format: Option<&str>) -> Result<Self, LoggerError> {
        let mut cfg = Self::default();
        if let Some(level) = level.map(str::trim).filter(|l| !l.is_empty()) {
            cfg.level = level.to_string();
        }
        if let Some(format) = format.filter(|f| !f.trim().is_empty()) {
            cfg.format = format.parse()?;
        }
        Ok(cfg)
    }
}
