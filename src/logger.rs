//! The logging entry point.
//!
//! [`AuditLogger`] runs the full pipeline for one event: resolve the actor,
//! sanitize metadata, decide exclusion, assemble the record, and hand it to
//! the sink. Loggers are built with [`LoggerBuilder`] and hold no state
//! between calls.

use std::fmt;

use crate::actor::{ActorResolver, Resolution, SuppressReason};
use crate::clock::{Clock, SystemClock};
use crate::diagnostics::{DiagnosticSink, DiagnosticsConfig, TracingDiagnostics};
use crate::error::{ConfigError, ConfigErrorKind, Error};
use crate::event::Event;
use crate::exclusion::{ExclusionEngine, Subject};
use crate::identity::{AgentDetector, IdentityProvider, ProcessOwner, SystemIdentity};
use crate::record::RecordAssembler;
use crate::request::{normalize_ip, NoRequest, RequestContext, RequestInfo};
use crate::sanitizer::MetadataSanitizer;
use crate::settings::{SettingsStore, DIAGNOSTICS, TRACK_SCHEDULED_EVENTS};
use crate::sink::{RecordId, RecordSink};

/// What happened to a logged event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutcome {
    /// The record was stored under this id.
    Stored(RecordId),
    /// Policy said not to record the event.
    Suppressed(SuppressReason),
}

/// Accepts events for recording.
///
/// [`AuditLogger`] is the standard backend. Hosts may substitute their own,
/// for example to fan events out or to drop them in tests.
pub trait LoggingBackend: Send + Sync {
    /// Records one event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`] if the message template does not match its
    /// arguments and [`Error::Sink`] if the record could not be stored.
    fn log(&self, event: Event) -> Result<LogOutcome, Error>;
}

/// Records events through injected collaborators.
///
/// # Examples
///
/// ```
/// use audit_core::{
///     Agent, AuditLogger, Event, ExclusionRule, FixedAgent, LogOutcome, MemorySink,
///     Settings, StaticIdentity, Visibility,
/// };
/// use std::sync::Arc;
///
/// let sink = Arc::new(MemorySink::new());
/// let logger = AuditLogger::builder()
///     .with_identity(StaticIdentity::new(1))
///     .with_agents(FixedAgent(Agent::Web))
///     .with_settings(Settings::new().with_rules([ExclusionRule::new().connector("auth")]))
///     .with_sink(Arc::clone(&sink))
///     .build()
///     .unwrap();
///
/// let outcome = logger
///     .log(Event::new("auth", "sessions", "login").with_message("%s logged in").with_arg("admin"))
///     .unwrap();
///
/// assert_eq!(outcome, LogOutcome::Stored(1));
/// assert_eq!(sink.records()[0].visibility(), Visibility::Private);
/// ```
pub struct AuditLogger {
    identity: Box<dyn IdentityProvider>,
    agents: Box<dyn AgentDetector>,
    settings: Box<dyn SettingsStore>,
    sink: Box<dyn RecordSink>,
    request: Box<dyn RequestContext>,
    system: Box<dyn SystemIdentity>,
    sanitizer: MetadataSanitizer,
    engine: ExclusionEngine,
    assembler: RecordAssembler,
}

impl AuditLogger {
    /// Starts building a logger.
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::new()
    }

    /// Records one event.
    ///
    /// Events from a scheduled agent are suppressed unless
    /// `track_scheduled_events` is set. Excluded events are still stored,
    /// with private visibility.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`] if the message template does not match its
    /// arguments; nothing is stored in that case. Sink failures are returned
    /// unchanged as [`Error::Sink`].
    pub fn log(&self, event: Event) -> Result<LogOutcome, Error> {
        let resolver = ActorResolver::new(
            &*self.identity,
            &*self.agents,
            &*self.system,
            self.settings.flag(TRACK_SCHEDULED_EVENTS),
        );

        let actor = match resolver.resolve(event.user_id()) {
            Resolution::Resolved(actor) => actor,
            Resolution::Suppressed(reason) => return Ok(LogOutcome::Suppressed(reason)),
        };

        let meta = self.sanitizer.sanitize(event.meta());
        let request = RequestInfo::capture(&*self.request);

        let subject = Subject::new(event.connector(), event.context(), event.action())
            .user_id(actor.user_id())
            .role(actor.role())
            .ip(request.client_ip.as_str());
        let rules = self.settings.exclusion_rules();
        let excluded = self.engine.evaluate(&subject, &rules);

        let record = self
            .assembler
            .build(&event, &actor, excluded, meta, &request)?;
        let id = self.sink.insert(record)?;

        tracing::debug!(
            record_id = id,
            connector = %event.connector(),
            context = %event.context(),
            action = %event.action(),
            excluded,
            "record stored"
        );

        Ok(LogOutcome::Stored(id))
    }

    /// Returns whether an event with these fields would be stored as private.
    ///
    /// `user_id` defaults to the current user. An explicit `ip` is validated
    /// like a request address; without one the request context is used.
    ///
    /// # Examples
    ///
    /// ```
    /// use audit_core::{Agent, AuditLogger, ExclusionRule, FixedAgent, MemorySink, Settings, StaticIdentity};
    ///
    /// let logger = AuditLogger::builder()
    ///     .with_identity(StaticIdentity::new(1))
    ///     .with_agents(FixedAgent(Agent::Web))
    ///     .with_settings(Settings::new().with_rules([ExclusionRule::new().ip_address("192.0.2.1")]))
    ///     .with_sink(MemorySink::new())
    ///     .build()
    ///     .unwrap();
    ///
    /// assert!(logger.is_record_excluded("posts", "post", "updated", None, Some("192.0.2.1")));
    /// assert!(!logger.is_record_excluded("posts", "post", "updated", None, Some("bogus")));
    /// ```
    pub fn is_record_excluded(
        &self,
        connector: &str,
        context: &str,
        action: &str,
        user_id: Option<u64>,
        ip: Option<&str>,
    ) -> bool {
        let user_id = user_id.unwrap_or_else(|| self.identity.current_user_id());
        let role = self
            .identity
            .lookup_user(user_id)
            .and_then(|profile| profile.roles.into_iter().next())
            .unwrap_or_default();
        let ip = match ip {
            Some(ip) => normalize_ip(Some(ip)),
            None => RequestInfo::capture(&*self.request).client_ip,
        };

        let subject = Subject::new(connector, context, action)
            .user_id(user_id)
            .role(role)
            .ip(ip);

        self.engine
            .evaluate(&subject, &self.settings.exclusion_rules())
    }
}

impl LoggingBackend for AuditLogger {
    fn log(&self, event: Event) -> Result<LogOutcome, Error> {
        AuditLogger::log(self, event)
    }
}

impl fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLogger")
            .field("assembler", &self.assembler)
            .finish_non_exhaustive()
    }
}

/// Assembles an [`AuditLogger`] from its collaborators.
///
/// Identity, agent detection, settings, and the sink are required. The
/// request context defaults to [`NoRequest`], the platform identity to
/// [`ProcessOwner`], the clock to [`SystemClock`], and diagnostics follow the
/// `diagnostics` settings flag and go to [`TracingDiagnostics`].
#[derive(Default)]
pub struct LoggerBuilder {
    identity: Option<Box<dyn IdentityProvider>>,
    agents: Option<Box<dyn AgentDetector>>,
    settings: Option<Box<dyn SettingsStore>>,
    sink: Option<Box<dyn RecordSink>>,
    request: Option<Box<dyn RequestContext>>,
    system: Option<Box<dyn SystemIdentity>>,
    clock: Option<Box<dyn Clock>>,
    diagnostics: Option<DiagnosticsConfig>,
    diagnostic_sink: Option<Box<dyn DiagnosticSink>>,
}

impl LoggerBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the identity provider.
    pub fn with_identity(mut self, identity: impl IdentityProvider + 'static) -> Self {
        self.identity = Some(Box::new(identity));
        self
    }

    /// Sets the agent detector.
    pub fn with_agents(mut self, agents: impl AgentDetector + 'static) -> Self {
        self.agents = Some(Box::new(agents));
        self
    }

    /// Sets the settings store.
    pub fn with_settings(mut self, settings: impl SettingsStore + 'static) -> Self {
        self.settings = Some(Box::new(settings));
        self
    }

    /// Sets the record sink.
    pub fn with_sink(mut self, sink: impl RecordSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Sets the request context.
    pub fn with_request(mut self, request: impl RequestContext + 'static) -> Self {
        self.request = Some(Box::new(request));
        self
    }

    /// Sets the platform identity.
    pub fn with_system_identity(mut self, system: impl SystemIdentity + 'static) -> Self {
        self.system = Some(Box::new(system));
        self
    }

    /// Sets the clock.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    /// Overrides the `diagnostics` settings flag.
    pub fn with_diagnostics(mut self, config: DiagnosticsConfig) -> Self {
        self.diagnostics = Some(config);
        self
    }

    /// Sets where diagnostic traces go.
    pub fn with_diagnostic_sink(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.diagnostic_sink = Some(Box::new(sink));
        self
    }

    /// Builds the logger.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] with [`ConfigErrorKind::MissingCollaborator`]
    /// naming the first required collaborator that was not provided.
    pub fn build(self) -> Result<AuditLogger, ConfigError> {
        let identity = required(self.identity, "identity")?;
        let agents = required(self.agents, "agents")?;
        let settings = required(self.settings, "settings")?;
        let sink = required(self.sink, "sink")?;

        let diagnostics = self.diagnostics.unwrap_or(DiagnosticsConfig {
            enabled: settings.flag(DIAGNOSTICS),
        });
        let diagnostic_sink = self
            .diagnostic_sink
            .unwrap_or_else(|| Box::new(TracingDiagnostics));
        let clock = self.clock.unwrap_or_else(|| Box::new(SystemClock));

        Ok(AuditLogger {
            identity,
            agents,
            settings,
            sink,
            request: self.request.unwrap_or_else(|| Box::new(NoRequest)),
            system: self.system.unwrap_or_else(|| Box::new(ProcessOwner)),
            sanitizer: MetadataSanitizer,
            engine: ExclusionEngine::new(),
            assembler: RecordAssembler::from_parts(clock, diagnostics, diagnostic_sink),
        })
    }
}

impl fmt::Debug for LoggerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerBuilder")
            .field("identity", &self.identity.is_some())
            .field("agents", &self.agents.is_some())
            .field("settings", &self.settings.is_some())
            .field("sink", &self.sink.is_some())
            .field("diagnostics", &self.diagnostics)
            .finish_non_exhaustive()
    }
}

fn required<T: ?Sized>(value: Option<Box<T>>, name: &'static str) -> Result<Box<T>, ConfigError> {
    value.ok_or_else(|| {
        ConfigError::new(
            ConfigErrorKind::MissingCollaborator { name },
            format!("no {} was provided", name),
        )
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::exclusion::ExclusionRule;
    use crate::identity::{Agent, FixedAgent, StaticIdentity, UserProfile};
    use crate::request::StaticRequest;
    use crate::settings::Settings;
    use crate::sink::{MemorySink, SinkError, SinkErrorKind};

    fn identity() -> StaticIdentity {
        StaticIdentity::new(2).with_user(
            2,
            UserProfile {
                email: "ed@example.com".to_string(),
                login: "ed".to_string(),
                display_name: "Ed".to_string(),
                roles: vec!["editor".to_string()],
            },
        )
    }

    fn logger(settings: Settings, sink: Arc<MemorySink>) -> AuditLogger {
        AuditLogger::builder()
            .with_identity(identity())
            .with_agents(FixedAgent(Agent::Web))
            .with_settings(settings)
            .with_sink(sink)
            .with_request(StaticRequest::new().with_remote_addr("203.0.113.5"))
            .build()
            .unwrap()
    }

    #[test]
    fn builder_requires_collaborators() {
        let err = LoggerBuilder::new()
            .with_identity(identity())
            .with_agents(FixedAgent(Agent::Web))
            .with_sink(MemorySink::new())
            .build()
            .unwrap_err();

        assert_eq!(
            err.kind(),
            &ConfigErrorKind::MissingCollaborator { name: "settings" }
        );
    }

    #[test]
    fn logs_public_record() {
        let sink = Arc::new(MemorySink::new());
        let outcome = logger(Settings::new(), Arc::clone(&sink))
            .log(
                Event::new("posts", "post", "updated")
                    .with_message("\"%s\" updated")
                    .with_arg("Hello")
                    .with_meta("post_title", "Hello")
                    .with_meta("parent", json!(null)),
            )
            .unwrap();

        assert_eq!(outcome, LogOutcome::Stored(1));

        let record = &sink.records()[0];
        assert_eq!(record.summary(), "\"Hello\" updated");
        assert_eq!(record.user_id(), 2);
        assert_eq!(record.user_role(), "editor");
        assert_eq!(record.ip(), "203.0.113.5");
        assert_eq!(record.meta().get_text("post_title"), Some("Hello"));
        assert!(!record.meta().contains_key("parent"));
    }

    #[test]
    fn role_rule_excludes_current_user() {
        let sink = Arc::new(MemorySink::new());
        let settings = Settings::new().with_rules([ExclusionRule::new().author_or_role("editor")]);
        let logger = logger(settings, Arc::clone(&sink));

        assert!(logger.is_record_excluded("posts", "post", "updated", None, None));
        assert!(!logger.is_record_excluded("posts", "post", "updated", Some(9), None));
    }

    #[test]
    fn explicit_ip_is_validated() {
        let settings = Settings::new().with_rules([ExclusionRule::new().ip_address("203.0.113.5")]);
        let logger = logger(settings, Arc::new(MemorySink::new()));

        assert!(logger.is_record_excluded("a", "b", "c", None, None));
        assert!(!logger.is_record_excluded("a", "b", "c", None, Some("not an ip")));
    }

    #[test]
    fn sink_errors_pass_through() {
        let logger = logger(Settings::new(), Arc::new(MemorySink::with_capacity(0)));
        let err = logger.log(Event::new("posts", "post", "updated")).unwrap_err();

        match err {
            Error::Sink(e) => assert_eq!(e, SinkError::with_message(SinkErrorKind::Full, "capacity of 0 records reached")),
            other => panic!("expected sink error, got {:?}", other),
        }
    }

    #[test]
    fn backend_trait_delegates() {
        let sink = Arc::new(MemorySink::new());
        let backend: Box<dyn LoggingBackend> = Box::new(logger(Settings::new(), Arc::clone(&sink)));

        backend.log(Event::new("users", "sessions", "logout")).unwrap();
        assert_eq!(sink.len(), 1);
    }
}
