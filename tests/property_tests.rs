//! Property tests for exclusion matching and metadata sanitization.

use audit_core::{AuthorOrRole, ExclusionEngine, ExclusionRule, MetadataSanitizer, Subject};
use proptest::prelude::*;
use serde_json::{Map, Value};

// Small alphabets so generated rules and subjects collide often
fn arb_name() -> impl Strategy<Value = String> {
    prop_oneof![Just("auth"), Just("posts"), Just("users"), Just("login")].prop_map(String::from)
}

fn arb_role() -> impl Strategy<Value = String> {
    prop_oneof![Just("administrator"), Just("editor"), Just("")].prop_map(String::from)
}

fn arb_ip() -> impl Strategy<Value = String> {
    prop_oneof![Just("192.0.2.1"), Just("::1"), Just("")].prop_map(String::from)
}

fn arb_subject() -> impl Strategy<Value = Subject> {
    (arb_name(), arb_name(), arb_name(), 0u64..4, arb_role(), arb_ip()).prop_map(
        |(connector, context, action, user, role, ip)| {
            Subject::new(connector, context, action)
                .user_id(user)
                .role(role)
                .ip(ip)
        },
    )
}

fn arb_rule() -> impl Strategy<Value = ExclusionRule> {
    (
        prop::option::of(arb_name()),
        prop::option::of(arb_name()),
        prop::option::of(arb_name()),
        prop::option::of(arb_ip()),
        prop::option::of(prop_oneof![
            (0u64..4).prop_map(|id| id.to_string()),
            arb_role(),
        ]),
    )
        .prop_map(|(connector, context, action, ip, author_or_role)| {
            let mut rule = ExclusionRule::new();
            if let Some(c) = connector {
                rule = rule.connector(c);
            }
            if let Some(c) = context {
                rule = rule.context(c);
            }
            if let Some(a) = action {
                rule = rule.action(a);
            }
            if let Some(ip) = ip {
                rule = rule.ip_address(ip);
            }
            if let Some(value) = author_or_role {
                rule = rule.author_or_role(&value);
            }
            rule
        })
}

// Independent statement of the matching rule
fn expected_match(rule: &ExclusionRule, subject: &Subject) -> bool {
    if rule.is_inert() {
        return false;
    }

    let eq = |constraint: Option<&str>, field: &str| constraint.map_or(true, |c| c == field);
    let author_or_role = match rule.author_or_role_constraint() {
        None => true,
        Some(AuthorOrRole::Author(id)) => *id == subject.user(),
        Some(AuthorOrRole::Role(role)) => subject.primary_role() == Some(role.as_str()),
    };

    eq(rule.connector_constraint(), subject.connector())
        && eq(rule.context_constraint(), subject.context())
        && eq(rule.action_constraint(), subject.action())
        && eq(rule.ip_constraint(), subject.client_ip())
        && author_or_role
}

fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-z ]{0,8}".prop_map(Value::String),
    ];
    leaf.prop_recursive(2, 8, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,4}", inner, 0..3)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

proptest! {
    /// Property: evaluate is true iff some rule's constraints all hold
    #[test]
    fn proptest_evaluate_matches_any_rule(
        subject in arb_subject(),
        rules in prop::collection::vec(arb_rule(), 0..5)
    ) {
        let expected = rules.iter().any(|rule| expected_match(rule, &subject));
        prop_assert_eq!(ExclusionEngine::new().evaluate(&subject, &rules), expected);
    }

    /// Property: a rule without constraints never excludes anything
    #[test]
    fn proptest_inert_rule_never_matches(subject in arb_subject()) {
        let rules = vec![ExclusionRule::new(); 3];
        prop_assert!(!ExclusionEngine::new().evaluate(&subject, &rules));
    }

    /// Property: numeric values are author ids and never match a role
    #[test]
    fn proptest_numeric_author_or_role_is_author(id in 0u64..10_000, subject in arb_subject()) {
        let rule = ExclusionRule::new().author_or_role(&id.to_string());

        prop_assert_eq!(rule.author_or_role_constraint(), Some(&AuthorOrRole::Author(id)));
        prop_assert_eq!(rule.matches(&subject), subject.user() == id);
    }

    /// Property: non-numeric values are roles and never match by user id
    #[test]
    fn proptest_role_author_or_role_is_role(role in "[a-z_]{1,12}", user in 0u64..10) {
        let rule = ExclusionRule::new().author_or_role(&role);
        let subject = Subject::new("a", "b", "c").user_id(user);

        prop_assert_eq!(rule.author_or_role_constraint(), Some(&AuthorOrRole::Role(role.clone())));
        prop_assert!(!rule.matches(&subject));
        prop_assert!(rule.matches(&subject.role(role)));
    }

    /// Property: sanitizing sanitized metadata changes nothing
    #[test]
    fn proptest_sanitize_is_idempotent(
        raw in prop::collection::btree_map("[a-z]{1,6}", arb_value(), 0..6)
    ) {
        let raw: Map<String, Value> = raw.into_iter().collect();
        let sanitizer = MetadataSanitizer;

        let once = sanitizer.sanitize(&raw);
        let twice = sanitizer.sanitize(&once.to_json());

        prop_assert_eq!(&once, &twice);
        prop_assert!(once.iter().all(|(_, v)| v.as_text().is_some()));
        prop_assert!(once.keys().all(|k| raw.get(k).is_some_and(|v| !v.is_null())));
    }
}
