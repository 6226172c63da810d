use std::{fmt, str::FromStr};

use crate::logger::error::LoggerError;

/// Output encoding of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoggerFormat {
    /// Human readable, one event per line.
    #[default]
    Text,
    /// One JSON object per line, for log shippers.
    Json,
    /// Native systemd journal fields.
    Journald,
}

impl LoggerFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            LoggerFormat::Text => "text",
            LoggerFormat::Json => "json",
            LoggerFormat::Journald => "journald",
        }
    }

    fn journald() -> Result<Self, LoggerError> {
        if cfg!(all(target_os = "linux", feature = "journald")) {
            Ok(LoggerFormat::Journald)
        } else {
            Err(LoggerError::JournaldUnavailable)
        }
    }
}

impl fmt::Display for LoggerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoggerFormat {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "text" | "plain" | "pretty" => Ok(LoggerFormat::Text),
            "json" => Ok(LoggerFormat::Json),
            "journald" | "journal" | "systemd" => Self::journald(),
            _ => Err(LoggerError::UnknownFormat {
                given: s.to_string(),
            }),
        }
    }
}
