use std::sync::Arc;

use audit_core::{
    Agent, AuditLogger, ConfigErrorKind, Error, Event, ExclusionRule, FixedAgent, FixedClock,
    FormatError, JsonLinesSink, LogOutcome, MemorySink, PlatformError, Settings, SharedSettings,
    SinkErrorKind, StaticIdentity, StaticRequest, SuppressReason, SystemIdentity, SystemUser,
    UserProfile, Visibility,
};
use chrono::{TimeZone, Utc};
use serde_json::json;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn identity() -> StaticIdentity {
    StaticIdentity::new(1)
        .with_user(
            1,
            UserProfile {
                email: "admin@example.com".to_string(),
                login: "admin".to_string(),
                display_name: "Site Admin".to_string(),
                roles: vec!["administrator".to_string()],
            },
        )
        .with_user(
            5,
            UserProfile {
                email: "five@example.com".to_string(),
                login: "five".to_string(),
                display_name: "Five".to_string(),
                roles: vec!["author".to_string()],
            },
        )
        .with_role_label("administrator", "Administrator")
}

struct Root;

impl SystemIdentity for Root {
    fn process_owner(&self) -> Result<SystemUser, PlatformError> {
        Ok(SystemUser {
            id: 0,
            name: "root".to_string(),
        })
    }
}

fn logger(agent: Agent, settings: Settings, sink: Arc<MemorySink>) -> AuditLogger {
    AuditLogger::builder()
        .with_identity(identity())
        .with_agents(FixedAgent(agent))
        .with_settings(settings)
        .with_sink(sink)
        .with_request(StaticRequest::new().with_remote_addr("192.0.2.44"))
        .with_system_identity(Root)
        .with_clock(FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()))
        .build()
        .unwrap()
}

fn login() -> Event {
    Event::new("auth", "sessions", "login")
        .with_message("%s logged in")
        .with_arg("admin")
}

#[test]
fn connector_and_action_rule_makes_record_private() {
    init_tracing();
    let sink = Arc::new(MemorySink::new());
    let settings = Settings::new().with_rules([ExclusionRule::new().connector("auth").action("login")]);

    let outcome = logger(Agent::Web, settings, Arc::clone(&sink)).log(login()).unwrap();

    assert_eq!(outcome, LogOutcome::Stored(1));
    let record = &sink.records()[0];
    assert_eq!(record.visibility(), Visibility::Private);
    assert_eq!(record.summary(), "admin logged in");
}

#[test]
fn rule_on_other_connector_leaves_record_public() {
    init_tracing();
    let sink = Arc::new(MemorySink::new());
    let settings = Settings::new().with_rules([ExclusionRule::new().connector("auth")]);

    logger(Agent::Web, settings, Arc::clone(&sink))
        .log(Event::new("posts", "post", "login"))
        .unwrap();

    assert_eq!(sink.records()[0].visibility(), Visibility::Public);
}

#[test]
fn author_rule_matches_only_that_user() {
    init_tracing();
    let sink = Arc::new(MemorySink::new());
    let settings = Settings::new().with_rules([ExclusionRule::new().author(5)]);
    let logger = logger(Agent::Web, settings, Arc::clone(&sink));

    logger
        .log(Event::new("posts", "post", "updated").with_user_id(7))
        .unwrap();
    logger
        .log(Event::new("comments", "comment", "spam").with_user_id(5))
        .unwrap();

    let visibility: Vec<Visibility> = sink.records().iter().map(|r| r.visibility()).collect();
    assert_eq!(visibility, vec![Visibility::Public, Visibility::Private]);
}

#[test]
fn scheduled_agent_without_tracking_is_suppressed() {
    init_tracing();
    let sink = Arc::new(MemorySink::new());

    let outcome = logger(Agent::Scheduled, Settings::new(), Arc::clone(&sink))
        .log(login())
        .unwrap();

    assert_eq!(outcome, LogOutcome::Suppressed(SuppressReason::ScheduledAgent));
    assert!(sink.is_empty());
}

#[test]
fn scheduled_agent_with_tracking_is_recorded() {
    init_tracing();
    let sink = Arc::new(MemorySink::new());
    let settings = Settings::new().track_scheduled_events(true);

    logger(Agent::Scheduled, settings, Arc::clone(&sink))
        .log(login())
        .unwrap();

    let record = &sink.records()[0];
    assert_eq!(record.actor_meta().unwrap().get_text("agent"), Some("wp_cron"));
}

#[test]
fn template_mismatch_stores_nothing() {
    init_tracing();
    let sink = Arc::new(MemorySink::new());

    let err = logger(Agent::Web, Settings::new(), Arc::clone(&sink))
        .log(
            Event::new("posts", "post", "deleted")
                .with_message("Deleted %s items by %s")
                .with_arg("3"),
        )
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Format(FormatError::MissingArgument { position: 2 })
    ));
    assert!(sink.is_empty());
}

#[test]
fn metadata_is_flattened_and_nulls_dropped() {
    init_tracing();
    let sink = Arc::new(MemorySink::new());

    logger(Agent::Web, Settings::new(), Arc::clone(&sink))
        .log(
            Event::new("posts", "post", "updated")
                .with_meta("tags", json!(["a", "b"]))
                .with_meta("empty", json!(null)),
        )
        .unwrap();

    let record = &sink.records()[0];
    let keys: Vec<&str> = record.meta().keys().collect();
    assert_eq!(keys, vec!["tags", "user_meta"]);
    assert_eq!(record.meta().get_text("tags"), Some(r#"["a","b"]"#));
}

#[test]
fn record_carries_actor_and_request() {
    init_tracing();
    let sink = Arc::new(MemorySink::new());

    logger(Agent::Cli, Settings::new(), Arc::clone(&sink))
        .log(login().with_object_id(12))
        .unwrap();

    let record = &sink.records()[0];
    assert_eq!(record.object_id(), 12);
    assert_eq!(record.user_id(), 1);
    assert_eq!(record.user_role(), "administrator");
    assert_eq!(record.ip(), "192.0.2.44");
    assert_eq!(record.created_iso(), "2024-05-01T12:00:00.000Z");

    let actor = record.actor_meta().unwrap();
    assert_eq!(actor.get_text("user_email"), Some("admin@example.com"));
    assert_eq!(actor.get_text("display_name"), Some("Site Admin"));
    assert_eq!(actor.get_text("user_login"), Some("admin"));
    assert_eq!(actor.get_text("user_role_label"), Some("Administrator"));
    assert_eq!(actor.get_text("agent"), Some("wp_cli"));
    assert_eq!(actor.get_text("system_user_id"), Some("0"));
    assert_eq!(actor.get_text("system_user_name"), Some("root"));
}

#[test]
fn sink_failure_is_returned_unchanged() {
    init_tracing();
    let sink = Arc::new(MemorySink::with_capacity(1));
    let logger = logger(Agent::Web, Settings::new(), Arc::clone(&sink));

    logger.log(login()).unwrap();
    match logger.log(login()) {
        Err(Error::Sink(err)) => assert_eq!(err.kind(), SinkErrorKind::Full),
        other => panic!("expected sink error, got {:?}", other),
    }
    assert_eq!(sink.len(), 1);
}

#[test]
fn settings_from_toml_drive_exclusion() {
    init_tracing();
    let settings = Settings::from_toml_str(
        r#"
        [[exclude_rules]]
        connector = ""
        action = ""

        [[exclude_rules]]
        author_or_role = "administrator"
        ip_address = "192.0.2.44"

        [[exclude_rules]]
        context = { nested = true }
        "#,
    )
    .unwrap();

    assert_eq!(settings.rejected().len(), 1);
    assert_eq!(
        settings.rejected()[0].kind(),
        &ConfigErrorKind::MalformedRule { index: 2 }
    );

    let sink = Arc::new(MemorySink::new());
    let logger = logger(Agent::Web, settings, Arc::clone(&sink));

    logger.log(login()).unwrap();
    logger.log(login().with_user_id(5)).unwrap();

    let visibility: Vec<Visibility> = sink.records().iter().map(|r| r.visibility()).collect();
    assert_eq!(visibility, vec![Visibility::Private, Visibility::Public]);
}

#[test]
fn replaced_settings_apply_to_later_events() {
    init_tracing();
    let shared = Arc::new(SharedSettings::new(Settings::new()));
    let sink = Arc::new(MemorySink::new());
    let logger = AuditLogger::builder()
        .with_identity(identity())
        .with_agents(FixedAgent(Agent::Web))
        .with_settings(Arc::clone(&shared))
        .with_sink(Arc::clone(&sink))
        .build()
        .unwrap();

    logger.log(login()).unwrap();
    shared.replace(Settings::new().with_rules([ExclusionRule::new().connector("auth")]));
    logger.log(login()).unwrap();

    let visibility: Vec<Visibility> = sink.records().iter().map(|r| r.visibility()).collect();
    assert_eq!(visibility, vec![Visibility::Public, Visibility::Private]);
}

#[test]
fn json_lines_sink_stores_serialized_records() {
    init_tracing();
    let sink = Arc::new(JsonLinesSink::new(Vec::new()));
    let logger = AuditLogger::builder()
        .with_identity(identity())
        .with_agents(FixedAgent(Agent::Web))
        .with_settings(Settings::new())
        .with_sink(Arc::clone(&sink))
        .with_clock(FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()))
        .build()
        .unwrap();

    assert_eq!(logger.log(login()).unwrap(), LogOutcome::Stored(1));
    drop(logger);

    let sink = Arc::try_unwrap(sink).unwrap();
    let out = String::from_utf8(sink.into_inner()).unwrap();
    let value: serde_json::Value = serde_json::from_str(out.trim_end()).unwrap();

    assert_eq!(value["summary"], "admin logged in");
    assert_eq!(value["visibility"], "publish");
    assert_eq!(value["created"], "2024-05-01T12:00:00.000Z");
    assert_eq!(value["ip"], "");
    assert_eq!(value["meta"]["user_meta"]["user_login"], "admin");
}
