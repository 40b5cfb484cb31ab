//! Logger configuration.
//!
//! Settings are validated once, when they are loaded. Exclusion rules become
//! typed [`ExclusionRule`]s; rows that cannot be converted are skipped and
//! kept in [`Settings::rejected`] so they can be reported.
//!
//! # Format
//!
//! ```toml
//! track_scheduled_events = false
//!
//! [diagnostics]
//! enabled = false
//!
//! [[exclude_rules]]
//! connector = "users"
//! action = "login"
//!
//! [[exclude_rules]]
//! author_or_role = "administrator"
//! ip_address = "192.0.2.10"
//! ```

use std::sync::{Arc, PoisonError, RwLock};

use serde::Deserialize;

use crate::diagnostics::DiagnosticsConfig;
use crate::error::{ConfigError, ConfigErrorKind};
use crate::exclusion::{ExclusionRule, RawRule};

/// Flag enabling records for scheduled (background) agents.
pub const TRACK_SCHEDULED_EVENTS: &str = "track_scheduled_events";

/// Flag enabling diagnostic traces for every assembled record.
pub const DIAGNOSTICS: &str = "diagnostics";

/// Supplies exclusion rules and flags to the logger.
///
/// Implementations hand out immutable rule snapshots. Updating the rules
/// means publishing a new snapshot; evaluations already holding the old one
/// are unaffected.
pub trait SettingsStore: Send + Sync {
    /// Returns the configured exclusion rules in order.
    fn exclusion_rules(&self) -> Arc<[ExclusionRule]>;

    /// Returns a boolean flag. Unknown flags are `false`.
    fn flag(&self, name: &str) -> bool;
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    track_scheduled_events: bool,
    diagnostics: DiagnosticsConfig,
    exclude_rules: Vec<RawRule>,
}

/// Validated logger settings.
///
/// # Examples
///
/// ```
/// use audit_core::{Settings, SettingsStore, TRACK_SCHEDULED_EVENTS};
///
/// let settings = Settings::from_toml_str(r#"
///     track_scheduled_events = true
///
///     [[exclude_rules]]
///     connector = "auth"
///     action = "login"
///
///     [[exclude_rules]]
///     connector = ["not", "a", "scalar"]
/// "#).unwrap();
///
/// assert!(settings.flag(TRACK_SCHEDULED_EVENTS));
/// assert_eq!(settings.exclusion_rules().len(), 1);
/// assert_eq!(settings.rejected().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Settings {
    track_scheduled_events: bool,
    diagnostics: DiagnosticsConfig,
    rules: Arc<[ExclusionRule]>,
    rejected: Vec<ConfigError>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl Settings {
    /// Creates settings with no rules and every flag off.
    pub fn new() -> Self {
        Self {
            track_scheduled_events: false,
            diagnostics: DiagnosticsConfig::default(),
            rules: Arc::from(Vec::new()),
            rejected: Vec::new(),
        }
    }

    /// Parses and validates a TOML settings document.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] with [`ConfigErrorKind::Parse`] if the
    /// document is not valid TOML or has the wrong shape. Malformed rules do
    /// not fail the load; they are skipped and listed in [`Settings::rejected`].
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let file: SettingsFile = toml::from_str(source)
            .map_err(|e| ConfigError::new(ConfigErrorKind::Parse, e.to_string()))?;

        Ok(Self::new()
            .track_scheduled_events(file.track_scheduled_events)
            .diagnostics(file.diagnostics)
            .with_raw_rules(&file.exclude_rules))
    }

    /// Sets whether scheduled agents are recorded.
    pub fn track_scheduled_events(mut self, enabled: bool) -> Self {
        self.track_scheduled_events = enabled;
        self
    }

    /// Sets the diagnostics configuration.
    pub fn diagnostics(mut self, diagnostics: DiagnosticsConfig) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Replaces the rule set.
    pub fn with_rules(mut self, rules: impl IntoIterator<Item = ExclusionRule>) -> Self {
        self.rules = rules.into_iter().collect();
        self
    }

    /// Replaces the rule set with validated configuration rows.
    ///
    /// Rows that fail validation are logged, skipped, and recorded in
    /// [`Settings::rejected`].
    pub fn with_raw_rules(mut self, raw: &[RawRule]) -> Self {
        let mut rules = Vec::with_capacity(raw.len());
        let mut rejected = Vec::new();

        for (index, row) in raw.iter().enumerate() {
            match ExclusionRule::from_raw(index, row) {
                Ok(rule) => rules.push(rule),
                Err(err) => {
                    tracing::warn!(rule = index, error = %err, "skipping malformed exclusion rule");
                    rejected.push(err);
                }
            }
        }

        self.rules = rules.into();
        self.rejected = rejected;
        self
    }

    /// Returns the diagnostics configuration.
    pub fn diagnostics_config(&self) -> DiagnosticsConfig {
        self.diagnostics
    }

    /// Returns the errors for rules skipped during loading.
    pub fn rejected(&self) -> &[ConfigError] {
        &self.rejected
    }
}

impl SettingsStore for Settings {
    fn exclusion_rules(&self) -> Arc<[ExclusionRule]> {
        Arc::clone(&self.rules)
    }

    fn flag(&self, name: &str) -> bool {
        match name {
            TRACK_SCHEDULED_EVENTS => self.track_scheduled_events,
            DIAGNOSTICS => self.diagnostics.enabled,
            _ => false,
        }
    }
}

/// Settings that can be replaced while the logger is running.
///
/// Readers take a snapshot; [`SharedSettings::replace`] publishes a new one
/// without disturbing evaluations that hold the previous snapshot.
#[derive(Debug, Default)]
pub struct SharedSettings {
    current: RwLock<Arc<Settings>>,
}

impl SharedSettings {
    /// Creates shared settings with an initial snapshot.
    pub fn new(settings: Settings) -> Self {
        Self {
            current: RwLock::new(Arc::new(settings)),
        }
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Arc<Settings> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Publishes new settings.
    pub fn replace(&self, settings: Settings) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(settings);
    }
}

impl SettingsStore for SharedSettings {
    fn exclusion_rules(&self) -> Arc<[ExclusionRule]> {
        self.snapshot().exclusion_rules()
    }

    fn flag(&self, name: &str) -> bool {
        self.snapshot().flag(name)
    }
}

impl<S: SettingsStore + ?Sized> SettingsStore for Arc<S> {
    fn exclusion_rules(&self) -> Arc<[ExclusionRule]> {
        (**self).exclusion_rules()
    }

    fn flag(&self, name: &str) -> bool {
        (**self).flag(name)
    }
}
