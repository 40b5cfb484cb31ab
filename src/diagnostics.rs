//! Developer diagnostics for assembled records.
//!
//! When enabled, every assembled record produces a trace: a summary of the
//! record followed by the call stack that produced it. Traces go to a
//! [`DiagnosticSink`]. Sink failures are logged and dropped; they never reach
//! the caller and never change the record.

use std::backtrace::Backtrace;
use std::fmt;

use serde::Deserialize;

use crate::record::Record;
use crate::sanitizer::{MetaValue, Metadata};

/// Whether diagnostic traces are produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Emit a trace for every assembled record
    pub enabled: bool,
}

/// Error returned by a [`DiagnosticSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticError {
    message: String,
}

impl DiagnosticError {
    /// Creates a new diagnostic error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for DiagnosticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "diagnostic sink error: {}", self.message)
    }
}

impl std::error::Error for DiagnosticError {}

/// Receives diagnostic trace text.
pub trait DiagnosticSink: Send + Sync {
    /// Emits one trace.
    ///
    /// # Errors
    ///
    /// Returns a [`DiagnosticError`] if the trace could not be written. The
    /// caller discards it.
    fn emit(&self, trace: &str) -> Result<(), DiagnosticError>;
}

/// Emits traces as `tracing` events on the `audit_core::diagnostics` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn emit(&self, trace: &str) -> Result<(), DiagnosticError> {
        tracing::info!(target: "audit_core::diagnostics", "{}", trace);
        Ok(())
    }
}

/// Produces traces for records when enabled.
pub(crate) struct Diagnostics {
    config: DiagnosticsConfig,
    sink: Box<dyn DiagnosticSink>,
}

impl Diagnostics {
    pub(crate) fn new(config: DiagnosticsConfig, sink: Box<dyn DiagnosticSink>) -> Self {
        Self { config, sink }
    }

    pub(crate) fn trace(&self, record: &Record) {
        if !self.config.enabled {
            return;
        }

        let text = render_trace(record, &Backtrace::force_capture());
        if let Err(err) = self.sink.emit(&text) {
            tracing::debug!(error = %err, "dropping diagnostic trace");
        }
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Formats the trace text for a record.
pub(crate) fn render_trace(record: &Record, backtrace: &Backtrace) -> String {
    let mut record_meta = record.meta().clone();
    let actor_meta = record_meta
        .remove(crate::record::ACTOR_META_KEY)
        .and_then(|v| v.as_map().cloned())
        .unwrap_or_default();

    let frames = backtrace.to_string();
    let frames: Vec<&str> = frames.lines().filter(|l| !l.trim().is_empty()).collect();

    format!(
        "Audit Record Debug Backtrace\n\n    Summary | {}\n     Author | {}\n  Connector | {}\n    Context | {}\n     Action | {}\nRecord Meta | {}\n Actor Meta | {}\n\n{}\n",
        record.summary(),
        record.user_id(),
        record.connector(),
        record.context(),
        record.action(),
        flatten(&record_meta),
        flatten(&actor_meta),
        frames.join("\n"),
    )
}

fn flatten(meta: &Metadata) -> String {
    meta.iter()
        .map(|(key, value)| {
            let value = match value {
                MetaValue::Text(s) if s.is_empty() => "null".to_string(),
                MetaValue::Text(s) => s.clone(),
                MetaValue::Map(m) => serde_json::to_string(m).unwrap_or_default(),
            };
            format!("{}: {}", key, value)
        })
        .collect::<Vec<_>>()
        .join(", ")
}
