//! Audit-event logging: actor resolution, exclusion rules, and record assembly.
//!
//! This crate turns raw activity events into persistence-ready records:
//! - **Actor resolution**: who did it, through which agent, with scheduled
//!   jobs suppressed unless tracked
//! - **Metadata sanitization**: free-form values flattened to strings
//! - **Exclusion rules**: configured constraints that mark matching records private
//! - **Record assembly**: rendered summary, timestamp, visibility, actor metadata
//!
//! Every host dependency (users, agents, settings, request, storage, clock)
//! is a trait object supplied when the logger is built. There is no global
//! logger; [`context`] offers an explicitly installed, thread-scoped handle.
//!
//! # Core Types
//!
//! - [`AuditLogger`]: runs the pipeline for each [`Event`]
//! - [`ExclusionEngine`]: evaluates a [`Subject`] against [`ExclusionRule`]s
//! - [`RecordAssembler`]: builds a [`Record`]
//! - [`Settings`]: validated configuration, loadable from TOML
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use audit_core::{
//!     Agent, AuditLogger, Event, FixedAgent, LogOutcome, MemorySink, Settings,
//!     StaticIdentity, Visibility,
//! };
//!
//! let settings = Settings::from_toml_str(r#"
//!     [[exclude_rules]]
//!     connector = "auth"
//!     action = "login"
//! "#).unwrap();
//!
//! let sink = Arc::new(MemorySink::new());
//! let logger = AuditLogger::builder()
//!     .with_identity(StaticIdentity::new(1))
//!     .with_agents(FixedAgent(Agent::Web))
//!     .with_settings(settings)
//!     .with_sink(Arc::clone(&sink))
//!     .build()
//!     .unwrap();
//!
//! let event = Event::new("auth", "sessions", "login")
//!     .with_message("%s logged in")
//!     .with_arg("admin")
//!     .with_meta("tags", serde_json::json!(["a", "b"]));
//!
//! assert_eq!(logger.log(event).unwrap(), LogOutcome::Stored(1));
//!
//! let record = &sink.records()[0];
//! assert_eq!(record.visibility(), Visibility::Private);
//! assert_eq!(record.meta().get_text("tags"), Some(r#"["a","b"]"#));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod actor;
mod clock;
pub mod context;
mod diagnostics;
mod error;
mod event;
mod exclusion;
mod identity;
mod logger;
mod record;
mod request;
mod sanitizer;
mod settings;
mod sink;
mod template;

pub use actor::{Actor, ActorResolver, Resolution, SuppressReason};
pub use clock::{Clock, FixedClock, SystemClock};
pub use context::ContextGuard;
pub use diagnostics::{DiagnosticError, DiagnosticSink, DiagnosticsConfig, TracingDiagnostics};
pub use error::{ConfigError, ConfigErrorKind, Error};
pub use event::Event;
pub use exclusion::{AuthorOrRole, ExclusionEngine, ExclusionRule, RawRule, Subject};
pub use identity::{
    Agent, AgentDetector, FixedAgent, IdentityProvider, PlatformError, ProcessOwner,
    StaticIdentity, SystemIdentity, SystemUser, UserProfile,
};
pub use logger::{AuditLogger, LogOutcome, LoggerBuilder, LoggingBackend};
pub use record::{Record, RecordAssembler, Visibility, ACTOR_META_KEY, RECORD_TYPE};
pub use request::{normalize_ip, NoRequest, RequestContext, RequestInfo, StaticRequest};
pub use sanitizer::{MetaValue, Metadata, MetadataSanitizer};
pub use settings::{
    Settings, SettingsStore, SharedSettings, DIAGNOSTICS, TRACK_SCHEDULED_EVENTS,
};
pub use sink::{JsonLinesSink, MemorySink, RecordId, RecordSink, SinkError, SinkErrorKind};
pub use template::{render, FormatError, MAX_FIELD_WIDTH};
