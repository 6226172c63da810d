use std::io::IsTerminal;

use crate::logger::{error::LoggerError, format::LoggerFormat};

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directive, e.g. `info` or `camrelay_core=debug,info`.
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
}

impl LoggerConfig {
    /// Builds a config from optional format and level strings.
    ///
    /// Missing values fall back to [`LoggerConfig::default`].
    pub fn from_parts(format: Option<&str>, level: Option<&str>) -> Result<Self, LoggerError> {
        let mut cfg = Self::default();
        if let Some(format) = format {
            cfg.format = format.parse()?;
        }
        if let Some(level) = level
            && !level.trim().is_empty()
        {
            cfg.level = level.trim().to_string();
        }
        Ok(cfg)
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        let use_color = cfg!(test) || std::io::stdout().is_terminal();
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_parts_defaults() {
        let cfg = LoggerConfig::from_parts(None, None).unwrap();
        assert_eq!(cfg.format, LoggerFormat::Text);
        assert_eq!(cfg.level, "info");
    }

    #[test]
    fn from_parts_overrides() {
        let cfg = LoggerConfig::from_parts(Some("JSON"), Some(" debug ")).unwrap();
        assert_eq!(cfg.format, LoggerFormat::Json);
        assert_eq!(cfg.level, "debug");
    }

    #[test]
    fn from_parts_rejects_unknown_format() {
        let err = LoggerConfig::from_parts(Some("xml"), None).unwrap_err();
        assert!(matches!(err, LoggerError::UnknownFormat { given } if given == "xml"));
    }
}
