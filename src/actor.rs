//! Actor resolution.
//!
//! The actor is whoever is responsible for an event: a user id, their
//! profile fields, and the agent the call came through. Resolution also
//! applies the scheduled-agent policy: background jobs are not recorded
//! unless tracking them is switched on.

use std::fmt;

use crate::identity::{Agent, AgentDetector, IdentityProvider, SystemIdentity, SystemUser, UserProfile};
use crate::sanitizer::Metadata;

/// The identity responsible for an event.
///
/// String fields are never absent; unknown values are empty strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    user_id: u64,
    email: String,
    display_name: String,
    login: String,
    role_label: String,
    role: String,
    agent: Agent,
    system_user: Option<SystemUser>,
}

impl Actor {
    /// Creates an actor from a user profile.
    ///
    /// The primary role is the first of the profile's roles.
    pub fn from_profile(
        user_id: u64,
        agent: Agent,
        profile: UserProfile,
        role_label: impl Into<String>,
    ) -> Self {
        let role = profile.roles.into_iter().next().unwrap_or_default();
        Self {
            user_id,
            email: profile.email,
            display_name: profile.display_name,
            login: profile.login,
            role_label: role_label.into(),
            role,
            agent,
            system_user: None,
        }
    }

    /// Creates an actor with no profile information.
    pub fn unknown(user_id: u64, agent: Agent) -> Self {
        Self::from_profile(user_id, agent, UserProfile::default(), "")
    }

    /// Attaches the operating-system identity of the process.
    pub fn with_system_user(mut self, system_user: SystemUser) -> Self {
        self.system_user = Some(system_user);
        self
    }

    /// Returns the user id.
    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    /// Returns the email address.
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Returns the display name.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Returns the login name.
    pub fn login(&self) -> &str {
        &self.login
    }

    /// Returns the label of the primary role.
    pub fn role_label(&self) -> &str {
        &self.role_label
    }

    /// Returns the primary role key, or an empty string.
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Returns the agent.
    pub fn agent(&self) -> Agent {
        self.agent
    }

    /// Returns the process owner, recorded for command-line agents.
    pub fn system_user(&self) -> Option<&SystemUser> {
        self.system_user.as_ref()
    }

    /// Returns the actor metadata stored with every record.
    ///
    /// # Examples
    ///
    /// ```
    /// use audit_core::{Actor, Agent};
    ///
    /// let meta = Actor::unknown(0, Agent::Web).metadata();
    /// assert_eq!(meta.get_text("agent"), Some("web"));
    /// assert_eq!(meta.get_text("user_email"), Some(""));
    /// assert!(!meta.contains_key("system_user_id"));
    /// ```
    pub fn metadata(&self) -> Metadata {
        let mut meta = Metadata::new();
        meta.insert("user_email", self.email.as_str());
        meta.insert("display_name", self.display_name.as_str());
        meta.insert("user_login", self.login.as_str());
        meta.insert("user_role_label", self.role_label.as_str());
        meta.insert("agent", self.agent.as_str());

        if let Some(system_user) = &self.system_user {
            meta.insert("system_user_id", system_user.id.to_string());
            meta.insert("system_user_name", system_user.name.as_str());
        }

        meta
    }
}

/// Why an event was deliberately not recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// The event came from a scheduled agent and scheduled tracking is off.
    ScheduledAgent,
}

impl fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuppressReason::ScheduledAgent => write!(f, "scheduled events are not tracked"),
        }
    }
}

/// The result of resolving an actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The actor was resolved and the event may be recorded.
    Resolved(Actor),
    /// Policy says the event must not be recorded.
    Suppressed(SuppressReason),
}

/// Resolves actors from identity collaborators.
///
/// # Examples
///
/// ```
/// use audit_core::{ActorResolver, Agent, FixedAgent, ProcessOwner, Resolution, StaticIdentity};
///
/// let identity = StaticIdentity::new(3);
/// let agent = FixedAgent(Agent::Scheduled);
/// let resolver = ActorResolver::new(&identity, &agent, &ProcessOwner, false);
///
/// assert!(matches!(resolver.resolve(None), Resolution::Suppressed(_)));
/// ```
pub struct ActorResolver<'a> {
    identity: &'a dyn IdentityProvider,
    agents: &'a dyn AgentDetector,
    system: &'a dyn SystemIdentity,
    track_scheduled: bool,
}

impl<'a> ActorResolver<'a> {
    /// Creates a resolver.
    pub fn new(
        identity: &'a dyn IdentityProvider,
        agents: &'a dyn AgentDetector,
        system: &'a dyn SystemIdentity,
        track_scheduled: bool,
    ) -> Self {
        Self {
            identity,
            agents,
            system,
            track_scheduled,
        }
    }

    /// Resolves the actor for a user id, or for the current user when `None`.
    ///
    /// Lookup failures never fail resolution: unknown users get empty
    /// profile fields and a missing process owner is simply left out.
    pub fn resolve(&self, user_id: Option<u64>) -> Resolution {
        let agent = self.agents.detect_agent();
        if agent == Agent::Scheduled && !self.track_scheduled {
            tracing::info!(agent = %agent, "event suppressed by scheduled agent policy");
            return Resolution::Suppressed(SuppressReason::ScheduledAgent);
        }

        let user_id = user_id.unwrap_or_else(|| self.identity.current_user_id());

        let mut actor = match self.identity.lookup_user(user_id) {
            Some(profile) => {
                let label = profile
                    .roles
                    .first()
                    .and_then(|role| self.identity.role_label(role))
                    .unwrap_or_default();
                Actor::from_profile(user_id, agent, profile, label)
            }
            None => {
                if user_id != 0 {
                    tracing::warn!(user_id, "user lookup failed, recording empty profile");
                }
                Actor::unknown(user_id, agent)
            }
        };

        if agent == Agent::Cli {
            match self.system.process_owner() {
                Ok(owner) => actor = actor.with_system_user(owner),
                Err(err) => tracing::warn!(error = %err, "process owner unavailable"),
            }
        }

        Resolution::Resolved(actor)
    }
}

impl fmt::Debug for ActorResolver<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorResolver")
            .field("track_scheduled", &self.track_scheduled)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{FixedAgent, PlatformError, StaticIdentity};

    struct Owner(Result<SystemUser, PlatformError>);

    impl SystemIdentity for Owner {
        fn process_owner(&self) -> Result<SystemUser, PlatformError> {
            self.0.clone()
        }
    }

    fn root() -> Owner {
        Owner(Ok(SystemUser {
            id: 0,
            name: "root".to_string(),
        }))
    }

    fn identity() -> StaticIdentity {
        StaticIdentity::new(1)
            .with_user(
                1,
                UserProfile {
                    email: "admin@example.com".to_string(),
                    login: "admin".to_string(),
                    display_name: "Site Admin".to_string(),
                    roles: vec!["administrator".to_string(), "editor".to_string()],
                },
            )
            .with_role_label("administrator", "Administrator")
    }

    fn resolve(agent: Agent, track: bool, user_id: Option<u64>) -> Resolution {
        let identity = identity();
        let agents = FixedAgent(agent);
        let owner = root();
        ActorResolver::new(&identity, &agents, &owner, track).resolve(user_id)
    }

    fn resolved(resolution: Resolution) -> Actor {
        match resolution {
            Resolution::Resolved(actor) => actor,
            other => panic!("expected actor, got {:?}", other),
        }
    }

    #[test]
    fn resolves_current_user() {
        let actor = resolved(resolve(Agent::Web, false, None));

        assert_eq!(actor.user_id(), 1);
        assert_eq!(actor.email(), "admin@example.com");
        assert_eq!(actor.login(), "admin");
        assert_eq!(actor.display_name(), "Site Admin");
        assert_eq!(actor.role(), "administrator");
        assert_eq!(actor.role_label(), "Administrator");
        assert_eq!(actor.agent(), Agent::Web);
        assert!(actor.system_user().is_none());
    }

    #[test]
    fn explicit_user_overrides_current() {
        let actor = resolved(resolve(Agent::Web, false, Some(9)));
        assert_eq!(actor.user_id(), 9);
        assert_eq!(actor.email(), "");
        assert_eq!(actor.role(), "");
        assert_eq!(actor.role_label(), "");
    }

    #[test]
    fn scheduled_agent_is_suppressed_by_default() {
        assert_eq!(
            resolve(Agent::Scheduled, false, None),
            Resolution::Suppressed(SuppressReason::ScheduledAgent)
        );
    }

    #[test]
    fn scheduled_agent_tracked_when_enabled() {
        let actor = resolved(resolve(Agent::Scheduled, true, None));
        assert_eq!(actor.agent(), Agent::Scheduled);
    }

    #[test]
    fn cli_agent_records_process_owner() {
        let actor = resolved(resolve(Agent::Cli, false, Some(0)));

        let meta = actor.metadata();
        assert_eq!(meta.get_text("agent"), Some("wp_cli"));
        assert_eq!(meta.get_text("system_user_id"), Some("0"));
        assert_eq!(meta.get_text("system_user_name"), Some("root"));
    }

    #[test]
    fn cli_agent_tolerates_platform_failure() {
        let identity = identity();
        let agents = FixedAgent(Agent::Cli);
        let owner = Owner(Err(PlatformError::new("unsupported")));

        let actor = resolved(ActorResolver::new(&identity, &agents, &owner, false).resolve(None));
        assert!(actor.system_user().is_none());
        assert!(!actor.metadata().contains_key("system_user_name"));
    }

    #[test]
    fn metadata_key_order() {
        let actor = resolved(resolve(Agent::Web, false, None));
        let meta = actor.metadata();
        let keys: Vec<&str> = meta.keys().collect();
        assert_eq!(
            keys,
            vec!["user_email", "display_name", "user_login", "user_role_label", "agent"]
        );
    }
}
