//! Canonical records and their assembly.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use crate::actor::Actor;
use crate::clock::{Clock, SystemClock};
use crate::diagnostics::{DiagnosticSink, Diagnostics, DiagnosticsConfig, TracingDiagnostics};
use crate::event::Event;
use crate::request::RequestInfo;
use crate::sanitizer::Metadata;
use crate::template::{render, FormatError};

/// Metadata key holding the actor sub-mapping. Event metadata under this key is replaced.
pub const ACTOR_META_KEY: &str = "user_meta";

/// Record type discriminator.
pub const RECORD_TYPE: &str = "record";

/// Whether a record is publicly listed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Visibility {
    /// Listed normally
    #[default]
    Public,
    /// Matched an exclusion rule; stored but hidden
    Private,
}

impl Visibility {
    /// Returns the stored label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "publish",
            Visibility::Private => "private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Visibility {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A persistence-ready record.
///
/// Records are immutable once assembled and are moved into the
/// [`RecordSink`](crate::RecordSink). Serializing a record yields the field
/// set every sink stores:
///
/// ```json
/// {
///   "object_id": 0, "site_id": 1, "blog_id": 1, "user_id": 1,
///   "user_role": "administrator", "created": "2024-05-01T12:00:00.000Z",
///   "visibility": "publish", "type": "record", "summary": "...",
///   "connector": "users", "context": "sessions", "action": "login",
///   "ip": "192.0.2.1", "meta": { "user_meta": { "agent": "web" } }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    object_id: u64,
    site_id: u64,
    blog_id: u64,
    user_id: u64,
    user_role: String,
    #[serde(serialize_with = "serialize_created")]
    created: DateTime<Utc>,
    visibility: Visibility,
    #[serde(rename = "type")]
    record_type: &'static str,
    summary: String,
    connector: String,
    context: String,
    action: String,
    ip: String,
    meta: Metadata,
}

impl Record {
    /// Returns the affected object id (0 when none).
    pub fn object_id(&self) -> u64 {
        self.object_id
    }

    /// Returns the site id.
    pub fn site_id(&self) -> u64 {
        self.site_id
    }

    /// Returns the blog id.
    pub fn blog_id(&self) -> u64 {
        self.blog_id
    }

    /// Returns the acting user id.
    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    /// Returns the acting user's primary role (empty when none).
    pub fn user_role(&self) -> &str {
        &self.user_role
    }

    /// Returns the creation instant.
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Returns the creation instant as extended ISO-8601 with milliseconds.
    pub fn created_iso(&self) -> String {
        format_created(&self.created)
    }

    /// Returns the visibility.
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Returns the record type discriminator.
    pub fn record_type(&self) -> &'static str {
        self.record_type
    }

    /// Returns the rendered summary.
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Returns the connector.
    pub fn connector(&self) -> &str {
        &self.connector
    }

    /// Returns the context.
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Returns the action.
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Returns the client IP (empty when unknown).
    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// Returns the metadata, including the actor sub-mapping.
    pub fn meta(&self) -> &Metadata {
        &self.meta
    }

    /// Returns the actor sub-mapping.
    pub fn actor_meta(&self) -> Option<&Metadata> {
        self.meta.get(ACTOR_META_KEY).and_then(|v| v.as_map())
    }
}

fn format_created(created: &DateTime<Utc>) -> String {
    created.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn serialize_created<S: Serializer>(created: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_created(created))
}

/// Combines an event, its actor, and the exclusion verdict into a [`Record`].
///
/// # Examples
///
/// ```
/// use audit_core::{Actor, Agent, Event, FixedClock, Metadata, RecordAssembler, RequestInfo, Visibility};
/// use chrono::{TimeZone, Utc};
///
/// let assembler = RecordAssembler::new(FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()));
/// let event = Event::new("users", "sessions", "login")
///     .with_message("%s logged in")
///     .with_arg("admin");
///
/// let record = assembler
///     .build(&event, &Actor::unknown(1, Agent::Web), true, Metadata::new(), &RequestInfo::default())
///     .unwrap();
///
/// assert_eq!(record.summary(), "admin logged in");
/// assert_eq!(record.visibility(), Visibility::Private);
/// assert_eq!(record.created_iso(), "2024-05-01T12:00:00.000Z");
/// ```
pub struct RecordAssembler {
    clock: Box<dyn Clock>,
    diagnostics: Diagnostics,
}

impl Default for RecordAssembler {
    fn default() -> Self {
        Self::new(SystemClock)
    }
}

impl RecordAssembler {
    /// Creates an assembler with diagnostics off.
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self::from_parts(
            Box::new(clock),
            DiagnosticsConfig::default(),
            Box::new(TracingDiagnostics),
        )
    }

    /// Sets the diagnostics configuration and trace sink.
    pub fn with_diagnostics(
        mut self,
        config: DiagnosticsConfig,
        sink: impl DiagnosticSink + 'static,
    ) -> Self {
        self.diagnostics = Diagnostics::new(config, Box::new(sink));
        self
    }

    pub(crate) fn from_parts(
        clock: Box<dyn Clock>,
        config: DiagnosticsConfig,
        sink: Box<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            clock,
            diagnostics: Diagnostics::new(config, sink),
        }
    }

    /// Assembles a record.
    ///
    /// `meta` is the sanitized event metadata; the actor sub-mapping is added
    /// under [`ACTOR_META_KEY`], replacing any event value with that key.
    ///
    /// # Errors
    ///
    /// Returns a [`FormatError`] if the event's message template does not
    /// match its arguments. No record is produced in that case.
    pub fn build(
        &self,
        event: &Event,
        actor: &Actor,
        excluded: bool,
        mut meta: Metadata,
        request: &RequestInfo,
    ) -> Result<Record, FormatError> {
        let summary = render(event.message(), event.args())?;

        if meta.insert(ACTOR_META_KEY, actor.metadata()).is_some() {
            tracing::debug!(
                connector = %event.connector(),
                "event metadata key '{}' replaced by actor metadata",
                ACTOR_META_KEY
            );
        }

        let record = Record {
            object_id: event.object_id().unwrap_or(0),
            site_id: request.site_id,
            blog_id: request.blog_id,
            user_id: actor.user_id(),
            user_role: actor.role().to_string(),
            created: self.clock.now(),
            visibility: if excluded {
                Visibility::Private
            } else {
                Visibility::Public
            },
            record_type: RECORD_TYPE,
            summary,
            connector: event.connector().to_string(),
            context: event.context().to_string(),
            action: event.action().to_string(),
            ip: request.client_ip.clone(),
            meta,
        };

        self.diagnostics.trace(&record);

        Ok(record)
    }
}

impl fmt::Debug for RecordAssembler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordAssembler")
            .field("diagnostics", &self.diagnostics)
            .finish_non_exhaustive()
    }
}
