//! Raw activity events.
//!
//! An [`Event`] is what a connector reports: which subsystem, what happened,
//! to which object, and a message template for the human readable summary.
//! Events are consumed by [`AuditLogger::log`](crate::AuditLogger::log).

use std::fmt;

use serde_json::{Map, Value};

/// A raw activity event.
///
/// # Example
///
/// ```
/// use audit_core::Event;
/// use serde_json::json;
///
/// let event = Event::new("posts", "post", "updated")
///     .with_message("\"%s\" post updated")
///     .with_arg("Hello world")
///     .with_object_id(42)
///     .with_meta("post_title", "Hello world")
///     .with_meta("revision", json!({ "id": 7 }));
///
/// assert_eq!(event.connector(), "posts");
/// assert_eq!(event.object_id(), Some(42));
/// assert_eq!(event.meta().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Subsystem that produced the event (e.g., "users", "posts")
    connector: String,
    /// Category within the connector
    context: String,
    /// Verb performed (e.g., "created", "login")
    action: String,
    /// printf-style summary template
    message: String,
    /// Positional arguments for the template
    args: Vec<Value>,
    /// Affected object, if any
    object_id: Option<u64>,
    /// Acting user, when not the current user
    user_id: Option<u64>,
    /// Event-specific metadata
    meta: Map<String, Value>,
}

impl Event {
    /// Creates an event with required fields and an empty message.
    pub fn new(
        connector: impl Into<String>,
        context: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            connector: connector.into(),
            context: context.into(),
            action: action.into(),
            message: String::new(),
            args: Vec::new(),
            object_id: None,
            user_id: None,
            meta: Map::new(),
        }
    }

    /// Sets the summary template.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Appends a template argument.
    pub fn with_arg(mut self, arg: impl Into<Value>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Replaces the template arguments.
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Sets the affected object id.
    pub fn with_object_id(mut self, object_id: u64) -> Self {
        self.object_id = Some(object_id);
        self
    }

    /// Attributes the event to a specific user instead of the current one.
    pub fn with_user_id(mut self, user_id: u64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Adds a metadata entry. `null` values are dropped when the record is built.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Replaces all metadata.
    pub fn with_meta_map(mut self, meta: Map<String, Value>) -> Self {
        self.meta = meta;
        self
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

    /// Returns the summary template.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the template arguments.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Returns the affected object id, if set.
    pub fn object_id(&self) -> Option<u64> {
        self.object_id
    }

    /// Returns the explicitly attributed user id, if set.
    pub fn user_id(&self) -> Option<u64> {
        self.user_id
    }

    /// Returns the raw metadata.
    pub fn meta(&self) -> &Map<String, Value> {
        &self.meta
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event[connector={}, context={}, action={}",
            self.connector, self.context, self.action
        )?;

        if let Some(object_id) = self.object_id {
            write!(f, ", object_id={}", object_id)?;
        }
        if let Some(user_id) = self.user_id {
            write!(f, ", user_id={}", user_id)?;
        }

        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_minimal() {
        let event = Event::new("users", "sessions", "login");

        assert_eq!(event.connector(), "users");
        assert_eq!(event.context(), "sessions");
        assert_eq!(event.action(), "login");
        assert_eq!(event.message(), "");
        assert!(event.args().is_empty());
        assert!(event.object_id().is_none());
        assert!(event.user_id().is_none());
        assert!(event.meta().is_empty());
    }

    #[test]
    fn event_builder_pattern() {
        let event = Event::new("posts", "page", "deleted")
            .with_message("\"%s\" deleted")
            .with_args(vec![json!("About")])
            .with_object_id(9)
            .with_user_id(2)
            .with_meta("post_title", "About")
            .with_meta("parent", Value::Null);

        assert_eq!(event.args(), &[json!("About")]);
        assert_eq!(event.object_id(), Some(9));
        assert_eq!(event.user_id(), Some(2));
        assert_eq!(event.meta().get("parent"), Some(&Value::Null));
    }

    #[test]
    fn event_display() {
        let event = Event::new("posts", "post", "updated").with_object_id(3);
        assert_eq!(
            event.to_string(),
            "Event[connector=posts, context=post, action=updated, object_id=3]"
        );
    }
}
