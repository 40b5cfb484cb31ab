//! Identity collaborators.
//!
//! The engine never looks up users, sessions, or processes itself. It asks
//! an [`IdentityProvider`], an [`AgentDetector`], and a [`SystemIdentity`]
//! and shapes their answers into an [`Actor`](crate::Actor).

use std::collections::HashMap;
use std::fmt;

/// Profile fields of a user known to the identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    /// Email address
    pub email: String,
    /// Login name
    pub login: String,
    /// Display name
    pub display_name: String,
    /// Role keys, primary role first
    pub roles: Vec<String>,
}

/// Resolves the current user and user profiles.
pub trait IdentityProvider: Send + Sync {
    /// Returns the id of the user the current call runs as (0 when anonymous).
    fn current_user_id(&self) -> u64;

    /// Returns the profile for a user id, or `None` if the user is unknown.
    fn lookup_user(&self, user_id: u64) -> Option<UserProfile>;

    /// Returns the human readable label for a role key.
    fn role_label(&self, _role: &str) -> Option<String> {
        None
    }
}

/// The channel through which an action was performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Agent {
    /// Interactive web request
    Web,
    /// Command-line invocation
    Cli,
    /// Scheduled or background job
    Scheduled,
    /// Anything else
    Unknown,
}

impl Agent {
    /// Returns the label stored in actor metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            Agent::Web => "web",
            Agent::Cli => "wp_cli",
            Agent::Scheduled => "wp_cron",
            Agent::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detects the agent of the current call.
pub trait AgentDetector: Send + Sync {
    /// Returns the agent the current call runs under.
    fn detect_agent(&self) -> Agent;
}

/// An agent detector that always reports the same agent.
#[derive(Debug, Clone, Copy)]
pub struct FixedAgent(pub Agent);

impl AgentDetector for FixedAgent {
    fn detect_agent(&self) -> Agent {
        self.0
    }
}

/// The operating-system account that owns the current process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemUser {
    /// Numeric user id
    pub id: u32,
    /// Account name
    pub name: String,
}

/// Error returned when the platform cannot report the process owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformError {
    message: String,
}

impl PlatformError {
    /// Creates a new platform error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "platform identity unavailable: {}", self.message)
    }
}

impl std::error::Error for PlatformError {}

/// Reports the operating-system identity of the current process.
pub trait SystemIdentity: Send + Sync {
    /// Returns the process owner.
    ///
    /// # Errors
    ///
    /// Returns a [`PlatformError`] when the platform has no such concept or
    /// the lookup fails.
    fn process_owner(&self) -> Result<SystemUser, PlatformError>;
}

/// Reads the process owner from the host.
///
/// On unix this is the real user id and its passwd entry. Other platforms
/// always report an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOwner;

impl SystemIdentity for ProcessOwner {
    #[cfg(unix)]
    fn process_owner(&self) -> Result<SystemUser, PlatformError> {
        use nix::unistd::{getuid, User};

        let uid = getuid();
        match User::from_uid(uid) {
            Ok(Some(user)) => Ok(SystemUser {
                id: uid.as_raw(),
                name: user.name,
            }),
            Ok(None) => Err(PlatformError::new(format!("no account for uid {}", uid))),
            Err(errno) => Err(PlatformError::new(errno.to_string())),
        }
    }

    #[cfg(not(unix))]
    fn process_owner(&self) -> Result<SystemUser, PlatformError> {
        Err(PlatformError::new("process owner lookup is not supported"))
    }
}

/// An in-memory identity provider.
///
/// # Examples
///
/// ```
/// use audit_core::{IdentityProvider, StaticIdentity, UserProfile};
///
/// let identity = StaticIdentity::new(1)
///     .with_user(1, UserProfile {
///         email: "admin@example.com".to_string(),
///         login: "admin".to_string(),
///         display_name: "Admin".to_string(),
///         roles: vec!["administrator".to_string()],
///     })
///     .with_role_label("administrator", "Administrator");
///
/// assert_eq!(identity.current_user_id(), 1);
/// assert_eq!(identity.lookup_user(1).unwrap().login, "admin");
/// assert_eq!(identity.role_label("administrator").as_deref(), Some("Administrator"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    current: u64,
    users: HashMap<u64, UserProfile>,
    role_labels: HashMap<String, String>,
}

impl StaticIdentity {
    /// Creates a provider whose current user is `current`.
    pub fn new(current: u64) -> Self {
        Self {
            current,
            ..Self::default()
        }
    }

    /// Adds a user profile.
    pub fn with_user(mut self, user_id: u64, profile: UserProfile) -> Self {
        self.users.insert(user_id, profile);
        self
    }

    /// Adds a role label.
    pub fn with_role_label(mut self, role: impl Into<String>, label: impl Into<String>) -> Self {
        self.role_labels.insert(role.into(), label.into());
        self
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user_id(&self) -> u64 {
        self.current
    }

    fn lookup_user(&self, user_id: u64) -> Option<UserProfile> {
        self.users.get(&user_id).cloned()
    }

    fn role_label(&self, role: &str) -> Option<String> {
        self.role_labels.get(role).cloned()
    }
}
