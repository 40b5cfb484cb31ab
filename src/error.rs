//! Error types returned by logging calls and configuration loading.

use std::fmt;

use crate::sink::SinkError;
use crate::template::FormatError;

/// Errors that can abort a logging call.
///
/// Only formatting and persistence failures reach the caller of
/// [`AuditLogger::log`](crate::AuditLogger::log). Resolution problems degrade
/// to empty defaults, and policy suppression is reported as
/// [`LogOutcome::Suppressed`](crate::LogOutcome::Suppressed) rather than an error.
#[derive(Debug)]
pub enum Error {
    /// The message template did not match its arguments.
    Format(FormatError),
    /// The persistence sink rejected the record.
    Sink(SinkError),
    /// The logger or its settings were misconfigured.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Format(e) => write!(f, "format error: {}", e),
            Error::Sink(e) => write!(f, "{}", e),
            Error::Config(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Format(e) => Some(e),
            Error::Sink(e) => Some(e),
            Error::Config(e) => Some(e),
        }
    }
}

impl From<FormatError> for Error {
    fn from(e: FormatError) -> Self {
        Error::Format(e)
    }
}

impl From<SinkError> for Error {
    fn from(e: SinkError) -> Self {
        Error::Sink(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

/// A configuration problem with details about what failed.
///
/// Malformed exclusion rules produce a `ConfigError` that is logged and kept
/// on the loaded [`Settings`](crate::Settings); the remaining rules still load.
///
/// # Examples
///
/// ```
/// use audit_core::{ConfigError, ConfigErrorKind};
///
/// let error = ConfigError::new(ConfigErrorKind::MalformedRule { index: 2 }, "action is a table");
/// assert_eq!(error.kind(), &ConfigErrorKind::MalformedRule { index: 2 });
/// assert!(error.to_string().contains("rule #2"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    kind: ConfigErrorKind,
    message: String,
}

impl ConfigError {
    /// Creates a new configuration error.
    pub fn new(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Returns the error kind.
    pub fn kind(&self) -> &ConfigErrorKind {
        &self.kind
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration error ({}): {}", self.kind, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// The kind of configuration error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// An exclusion rule carried a value that is not a scalar.
    MalformedRule {
        /// Position of the rule in the configured sequence
        index: usize,
    },
    /// The settings document could not be parsed.
    Parse,
    /// A required collaborator was not supplied to the builder.
    MissingCollaborator {
        /// Name of the missing collaborator
        name: &'static str,
    },
}

impl fmt::Display for ConfigErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErrorKind::MalformedRule { index } => write!(f, "malformed rule #{}", index),
            ConfigErrorKind::Parse => write!(f, "unparsable settings"),
            ConfigErrorKind::MissingCollaborator { name } => {
                write!(f, "missing collaborator '{}'", name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SinkErrorKind;

    #[test]
    fn config_error_display_names_kind() {
        let error = ConfigError::new(
            ConfigErrorKind::MissingCollaborator { name: "sink" },
            "no record sink configured",
        );

        assert_eq!(
            error.to_string(),
            "configuration error (missing collaborator 'sink'): no record sink configured"
        );
        assert_eq!(error.message(), "no record sink configured");
    }

    #[test]
    fn error_wraps_sources() {
        let sink = SinkError::new(SinkErrorKind::Full);
        let error: Error = sink.clone().into();

        assert!(matches!(error, Error::Sink(ref e) if *e == sink));
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn format_error_converts() {
        let error: Error = FormatError::MissingArgument { position: 2 }.into();
        assert!(error.to_string().starts_with("format error:"));
    }
}
