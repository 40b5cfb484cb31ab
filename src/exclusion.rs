//! Exclusion rules and the engine that evaluates them.
//!
//! An [`ExclusionRule`] is a set of optional constraints. A rule matches an
//! event when every constraint it carries equals the corresponding field of
//! the event's [`Subject`]. Matching events are still recorded but become
//! [`Visibility::Private`](crate::Visibility::Private).
//!
//! A rule with no constraints at all is inert: it never matches. Empty
//! configuration rows therefore cannot suppress everything.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ConfigError, ConfigErrorKind};
use crate::template::{parse_numeric, Numeric};

/// The author-or-role constraint of a rule.
///
/// A configured value is either a user id or a role key, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorOrRole {
    /// Matches the acting user's id
    Author(u64),
    /// Matches the acting user's primary role key
    Role(String),
}

impl AuthorOrRole {
    /// Classifies a configured value.
    ///
    /// Numeric values (integers or decimals, surrounding whitespace allowed)
    /// become an author id using the absolute value of their integer part.
    /// Anything else non-empty is a role name. Empty values yield `None`.
    ///
    /// # Examples
    ///
    /// ```
    /// use audit_core::AuthorOrRole;
    ///
    /// assert_eq!(AuthorOrRole::classify("5"), Some(AuthorOrRole::Author(5)));
    /// assert_eq!(AuthorOrRole::classify("-5"), Some(AuthorOrRole::Author(5)));
    /// assert_eq!(
    ///     AuthorOrRole::classify("editor"),
    ///     Some(AuthorOrRole::Role("editor".to_string()))
    /// );
    /// assert_eq!(AuthorOrRole::classify(""), None);
    /// ```
    pub fn classify(value: &str) -> Option<Self> {
        if let Some(n) = parse_numeric(value) {
            return Some(AuthorOrRole::Author(n.truncate().unsigned_abs()));
        }
        let value = value.trim();
        if value.is_empty() {
            None
        } else {
            Some(AuthorOrRole::Role(value.to_string()))
        }
    }
}

/// A configured exclusion rule.
///
/// # Examples
///
/// ```
/// use audit_core::{ExclusionRule, Subject};
///
/// let rule = ExclusionRule::new().connector("auth").action("login");
///
/// assert!(rule.matches(&Subject::new("auth", "sessions", "login")));
/// assert!(!rule.matches(&Subject::new("posts", "sessions", "login")));
/// assert!(ExclusionRule::new().is_inert());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionRule {
    connector: Option<String>,
    context: Option<String>,
    action: Option<String>,
    ip_address: Option<String>,
    author_or_role: Option<AuthorOrRole>,
}

impl ExclusionRule {
    /// Creates an unconstrained (inert) rule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Constrains the connector. An empty value removes the constraint.
    pub fn connector(mut self, connector: impl Into<String>) -> Self {
        self.connector = non_empty(connector.into());
        self
    }

    /// Constrains the context. An empty value removes the constraint.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = non_empty(context.into());
        self
    }

    /// Constrains the action. An empty value removes the constraint.
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = non_empty(action.into());
        self
    }

    /// Constrains the client IP address. An empty value removes the constraint.
    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = non_empty(ip.into());
        self
    }

    /// Constrains the acting user id, replacing any role constraint.
    pub fn author(mut self, user_id: u64) -> Self {
        self.author_or_role = Some(AuthorOrRole::Author(user_id));
        self
    }

    /// Constrains the acting user's primary role, replacing any author constraint.
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.author_or_role = non_empty(role.into()).map(AuthorOrRole::Role);
        self
    }

    /// Sets the author-or-role constraint from a configured value.
    ///
    /// See [`AuthorOrRole::classify`].
    pub fn author_or_role(mut self, value: &str) -> Self {
        self.author_or_role = AuthorOrRole::classify(value);
        self
    }

    /// Returns the connector constraint.
    pub fn connector_constraint(&self) -> Option<&str> {
        self.connector.as_deref()
    }

    /// Returns the context constraint.
    pub fn context_constraint(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Returns the action constraint.
    pub fn action_constraint(&self) -> Option<&str> {
        self.action.as_deref()
    }

    /// Returns the IP address constraint.
    pub fn ip_constraint(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }

    /// Returns the author-or-role constraint.
    pub fn author_or_role_constraint(&self) -> Option<&AuthorOrRole> {
        self.author_or_role.as_ref()
    }

    /// Returns `true` if the rule carries no constraint and can never match.
    pub fn is_inert(&self) -> bool {
        self.connector.is_none()
            && self.context.is_none()
            && self.action.is_none()
            && self.ip_address.is_none()
            && self.author_or_role.is_none()
    }

    /// Returns `true` if every constraint equals the subject's field.
    ///
    /// Inert rules never match.
    pub fn matches(&self, subject: &Subject) -> bool {
        if self.is_inert() {
            return false;
        }

        let author_or_role = match &self.author_or_role {
            None => true,
            Some(AuthorOrRole::Author(id)) => *id == subject.user_id,
            Some(AuthorOrRole::Role(role)) => subject.role.as_deref() == Some(role.as_str()),
        };

        author_or_role
            && equals(&self.connector, &subject.connector)
            && equals(&self.context, &subject.context)
            && equals(&self.action, &subject.action)
            && equals(&self.ip_address, &subject.ip)
    }

    /// Converts a loosely typed configuration row into a rule.
    ///
    /// `index` is the row's position and is only used for error reporting.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] with [`ConfigErrorKind::MalformedRule`] when
    /// a field holds an array, table, or boolean.
    pub fn from_raw(index: usize, raw: &RawRule) -> Result<Self, ConfigError> {
        let text = |field: &str, value: &Option<Value>| scalar_text(index, field, value);

        let author_or_role = match &raw.author_or_role {
            Some(Value::Number(n)) => {
                let id = n
                    .as_i64()
                    .map(i64::unsigned_abs)
                    .or_else(|| n.as_u64())
                    .or_else(|| n.as_f64().map(|x| Numeric::Float(x).truncate().unsigned_abs()));
                id.map(AuthorOrRole::Author)
            }
            other => text("author_or_role", other)?
                .as_deref()
                .and_then(AuthorOrRole::classify),
        };

        if author_or_role == Some(AuthorOrRole::Author(0)) {
            tracing::debug!(
                rule = index,
                "author_or_role is numeric zero and matches anonymous users, not a role"
            );
        }

        Ok(Self {
            connector: text("connector", &raw.connector)?,
            context: text("context", &raw.context)?,
            action: text("action", &raw.action)?,
            ip_address: text("ip_address", &raw.ip_address)?,
            author_or_role,
        })
    }
}

/// An exclusion rule as it appears in configuration, before validation.
///
/// Every field is optional and may hold any value; [`ExclusionRule::from_raw`]
/// accepts strings and numbers and rejects anything else.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawRule {
    /// Connector to match
    pub connector: Option<Value>,
    /// Context to match
    pub context: Option<Value>,
    /// Action to match
    pub action: Option<Value>,
    /// Client IP address to match
    pub ip_address: Option<Value>,
    /// User id (numeric) or role key (anything else)
    pub author_or_role: Option<Value>,
}

/// The fields of an event that exclusion rules are matched against.
///
/// # Examples
///
/// ```
/// use audit_core::Subject;
///
/// let subject = Subject::new("posts", "post", "updated")
///     .user_id(7)
///     .role("editor")
///     .ip("203.0.113.9");
///
/// assert_eq!(subject.connector(), "posts");
/// assert_eq!(subject.user(), 7);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    connector: String,
    context: String,
    action: String,
    user_id: u64,
    role: Option<String>,
    ip: String,
}

impl Subject {
    /// Creates a subject for an anonymous user with no client IP.
    pub fn new(
        connector: impl Into<String>,
        context: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            connector: connector.into(),
            context: context.into(),
            action: action.into(),
            user_id: 0,
            role: None,
            ip: String::new(),
        }
    }

    /// Sets the acting user id.
    pub fn user_id(mut self, user_id: u64) -> Self {
        self.user_id = user_id;
        self
    }

    /// Sets the acting user's primary role. An empty role means none.
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = non_empty(role.into());
        self
    }

    /// Sets the normalized client IP address.
    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = ip.into();
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

    /// Returns the acting user id.
    pub fn user(&self) -> u64 {
        self.user_id
    }

    /// Returns the primary role, if the user has one.
    pub fn primary_role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    /// Returns the client IP address (empty when unknown).
    pub fn client_ip(&self) -> &str {
        &self.ip
    }
}

/// Evaluates subjects against an ordered rule sequence.
///
/// The engine holds no state. Rules are borrowed per call and never
/// modified, so one engine can serve concurrent callers.
///
/// # Examples
///
/// ```
/// use audit_core::{ExclusionEngine, ExclusionRule, Subject};
///
/// let rules = vec![ExclusionRule::new().author(5)];
/// let engine = ExclusionEngine::new();
///
/// assert!(engine.evaluate(&Subject::new("posts", "post", "deleted").user_id(5), &rules));
/// assert!(!engine.evaluate(&Subject::new("posts", "post", "deleted").user_id(7), &rules));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ExclusionEngine;

impl ExclusionEngine {
    /// Creates an engine.
    pub fn new() -> Self {
        Self
    }

    /// Returns `true` if any rule matches the subject.
    pub fn evaluate(&self, subject: &Subject, rules: &[ExclusionRule]) -> bool {
        self.first_match(subject, rules).is_some()
    }

    /// Returns the index of the first matching rule.
    ///
    /// Evaluation stops at the first match.
    pub fn first_match(&self, subject: &Subject, rules: &[ExclusionRule]) -> Option<usize> {
        let index = rules.iter().position(|rule| rule.matches(subject))?;

        tracing::debug!(
            rule = index,
            connector = %subject.connector,
            context = %subject.context,
            action = %subject.action,
            "record matched exclusion rule"
        );

        Some(index)
    }
}

fn equals(constraint: &Option<String>, field: &str) -> bool {
    constraint.as_deref().map_or(true, |c| c == field)
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn scalar_text(
    index: usize,
    field: &str,
    value: &Option<Value>,
) -> Result<Option<String>, ConfigError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(non_empty(s.trim().to_string())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => {
            let found = match other {
                Value::Bool(_) => "a boolean",
                Value::Array(_) => "an array",
                _ => "a table",
            };
            Err(ConfigError::new(
                ConfigErrorKind::MalformedRule { index },
                format!("{} must be a string or number, found {}", field, found),
            ))
        }
    }
}
