//! End-to-end scenarios for the ability façade.
//!
//! These tests drive `Ability` the way an application does: decode a rule
//! payload produced by a backend, then ask questions about subjects.
//!
//! Scenarios:
//! 1. default deny for unmatched queries
//! 2. higher-priority forbid flips a grant
//! 3. wildcard subject narrowed by a concrete rule
//! 4. permitted fields with and without restrictions
//! 5. JSON round-trip of rule semantics
//! 6. nested `$and`/`$or`/`$not` conditions
//! 7. the conditional author scenario
//! 8. empty rule sets and deferred abilities

use serde_json::json;
use std::collections::BTreeSet;
use warden::{Ability, AbilityError, AbilityOptions, GenericSubject, LoadState};
use warden_rules::{codec, Conditions, Rule, SubjectType};

/// Rule payload used by the author scenarios.
const AUTHOR_RULES: &str = r#"[
    { "action": "read", "subject": "Article" },
    { "action": ["create", "update"], "subject": "Article",
      "conditions": { "authorId": "u1" } }
]"#;

fn article(author_id: &str) -> GenericSubject {
    GenericSubject::from_json("Article", json!({ "authorId": author_id, "title": "Hello" }))
}

fn fields(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[tokio::test]
async fn test_unmatched_queries_are_denied() {
    let ability = Ability::new(vec![
        Rule::can("read", "Article"),
        Rule::can("update", "Comment"),
    ]);

    assert!(!ability.can_type("delete", "Article").await);
    assert!(!ability.can_type("read", "Comment").await);
    assert!(!ability.can_type("read", "Invoice").await);
    assert!(ability.cannot("read", &GenericSubject::from_json("Invoice", json!({}))).await);
}

#[tokio::test]
async fn test_higher_priority_forbid_flips_grant() {
    let ability = Ability::new(vec![Rule::can("read", "Article")]);
    assert!(ability.can("read", &article("u1")).await);

    ability
        .add_rule(Rule::cannot("read", "Article").with_priority(5))
        .unwrap();
    assert!(!ability.can("read", &article("u1")).await);
}

#[tokio::test]
async fn test_wildcard_subject_narrowed_by_concrete_rule() {
    let ability = Ability::new(vec![Rule::can("read", "all")]);
    for subject in ["Article", "Comment", "Invoice"] {
        assert!(ability.can_type("read", subject).await, "{subject}");
    }

    // Declared before or after the wildcard, the concrete rule wins.
    for rules in [
        vec![Rule::can("read", "all"), Rule::cannot("read", "Invoice")],
        vec![Rule::cannot("read", "Invoice"), Rule::can("read", "all")],
    ] {
        let ability = Ability::new(rules);
        assert!(!ability.can_type("read", "Invoice").await);
        assert!(ability.can_type("read", "Article").await);
    }
}

#[tokio::test]
async fn test_permitted_fields() {
    let unrestricted = Ability::new(vec![Rule::can("read", "Article")]);
    assert_eq!(unrestricted.permitted_fields_by("read", &article("u1")).await, None);

    let restricted = Ability::new(vec![Rule::can("read", "Article").with_fields(["title", "authorId"])]);
    assert_eq!(
        restricted.permitted_fields_by("read", &article("u1")).await,
        Some(fields(&["authorId", "title"]))
    );

    let forbidden = Ability::new(vec![
        Rule::can("read", "Article").with_fields(["title"]),
        Rule::cannot("read", "Article"),
    ]);
    assert_eq!(
        forbidden.permitted_fields_by("read", &article("u1")).await,
        Some(BTreeSet::new())
    );
}

#[tokio::test]
async fn test_round_trip_preserves_semantics() {
    let payload = json!([
        { "action": ["read", "list"], "subject": ["Article", "Comment"] },
        { "action": "update", "subject": "Article",
          "conditions": { "authorId": "u1", "status": { "$in": ["draft", "review"] } },
          "fields": ["title", "body"] },
        { "action": "delete", "subject": "Article", "inverted": true, "reason": "append-only" },
        { "action": "moderate" }
    ]);

    let decoded = codec::decode_value(payload).unwrap();
    let again = codec::decode_value(codec::encode_rules(&decoded)).unwrap();
    let split = codec::decode_value(codec::encode_split(&decoded)).unwrap();

    let key = |rule: &Rule| {
        (
            rule.action().clone(),
            rule.subject().clone(),
            rule.conditions().cloned(),
            rule.fields().map(<[String]>::to_vec),
            rule.is_inverted(),
        )
    };
    let mut original: Vec<_> = decoded.iter().map(key).collect();
    let mut inline: Vec<_> = again.iter().map(key).collect();
    let mut split: Vec<_> = split.iter().map(key).collect();
    original.sort_by(|a, b| format!("{a:?}").cmp(&format!("{b:?}")));
    inline.sort_by(|a, b| format!("{a:?}").cmp(&format!("{b:?}")));
    split.sort_by(|a, b| format!("{a:?}").cmp(&format!("{b:?}")));

    assert_eq!(original.len(), 7);
    assert_eq!(original, inline);
    assert_eq!(original, split);
}

#[tokio::test]
async fn test_nested_logical_conditions() {
    let adults = Conditions::from_json(json!({
        "$and": [{ "age": { "$gte": 18 } }, { "age": { "$lte": 65 } }]
    }))
    .unwrap();
    let ability = Ability::new(vec![Rule::can("enroll", "Member").with_conditions(adults)]);

    let member = |age: i64| GenericSubject::from_json("Member", json!({ "age": age }));
    assert!(ability.can("enroll", &member(30)).await);
    assert!(!ability.can("enroll", &member(10)).await);
    assert!(!ability.can("enroll", &member(70)).await);

    let not_banned = Conditions::from_json(json!({
        "$or": [{ "role": "admin" }, { "$not": { "banned": true } }]
    }))
    .unwrap();
    let ability = Ability::new(vec![Rule::can("post", "Member").with_conditions(not_banned)]);
    let subject = |role: &str, banned: bool| {
        GenericSubject::from_json("Member", json!({ "role": role, "banned": banned }))
    };
    assert!(ability.can("post", &subject("user", false)).await);
    assert!(!ability.can("post", &subject("user", true)).await);
    assert!(ability.can("post", &subject("admin", true)).await);
}

#[tokio::test]
async fn test_author_scenario() {
    let ability = Ability::from_json(AUTHOR_RULES, AbilityOptions::default()).unwrap();

    assert!(ability.can("update", &article("u1")).await);
    assert!(ability.can("create", &article("u1")).await);
    assert!(!ability.can("update", &article("u2")).await);
    assert!(ability.can("read", &article("u1")).await);
    assert!(ability.can("read", &article("u2")).await);
}

#[tokio::test]
async fn test_empty_rule_set() {
    let ability = Ability::from_json("[]", AbilityOptions::default()).unwrap();
    assert!(!ability.can("read", &article("u1")).await);
    assert_eq!(
        ability.permitted_fields_by("read", &article("u1")).await,
        Some(BTreeSet::new())
    );

    let catch_all = Ability::new(vec![Rule::cannot("manage", "all")]);
    assert_eq!(
        catch_all.permitted_fields_by("read", &article("u1")).await,
        Some(BTreeSet::new())
    );
}

#[tokio::test]
async fn test_deferred_never_initialized_queries_do_not_raise() {
    let ability = Ability::from_json(AUTHOR_RULES, AbilityOptions::default().deferred(true)).unwrap();
    assert_eq!(ability.state(), LoadState::Uninitialized);

    assert_eq!(ability.try_can("read", &article("u1")), None);
    assert_eq!(ability.try_cannot("read", &article("u1")), None);
    assert_eq!(ability.try_permitted_fields_by("read", &article("u1")), None);
    assert_eq!(ability.state(), LoadState::Uninitialized);
}

#[tokio::test]
async fn test_failed_ability_denies_without_raising() {
    let ability = Ability::from_json(
        r#"[{ "action": "read", "subject": "Article",
              "conditions": { "title": { "$regex": "[" } } }]"#,
        AbilityOptions::default().deferred(true),
    )
    .unwrap();

    // The first explicit initialization reports the failure.
    let err = ability.initialize().await.unwrap_err();
    assert!(matches!(err, AbilityError::Initialization(_)));
    assert!(ability.state().is_failed());

    // Later queries are denied without retrying.
    assert!(!ability.can("read", &article("u1")).await);
    assert!(!ability.can_type("read", "Article").await);
    assert_eq!(ability.try_can("read", &article("u1")), None);
    assert!(ability.authorize("read", &article("u1")).await.unwrap_err().is_forbidden());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_queries_share_one_initialization() {
    let ability = Ability::deferred(vec![Rule::can("read", "Article")]);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let ability = ability.clone();
            tokio::spawn(async move { ability.can_type("read", "Article").await })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap());
    }
    assert_eq!(ability.rules().len(), 1);
    assert!(ability.is_ready());
}

#[tokio::test]
async fn test_updates_are_atomic_for_readers() {
    let ability = Ability::new(vec![Rule::can("read", "Article")]);
    let snapshot = ability.snapshot();

    ability
        .update_json(r#"{ "can": [{ "action": "update", "subject": "Article" }], "cannot": [] }"#)
        .unwrap();

    // The old snapshot still answers from the old rule set.
    assert_eq!(snapshot.rules(), &[Rule::can("read", "Article")]);
    assert!(!ability.can_type("read", "Article").await);
    assert!(ability.can_type("update", "Article").await);

    assert!(ability.update_json("{ not json").is_err());
    assert!(ability.can_type("update", "Article").await);
}

#[tokio::test]
async fn test_envelope_decoding() {
    let ability = Ability::from_json(
        r#"{ "version": "3", "metadata": { "user": "u1" },
             "rules": [{ "action": "read", "subject": "Article", "fields": "title" }] }"#,
        AbilityOptions::default(),
    )
    .unwrap();

    assert!(ability.can_field("read", &SubjectType::new("Article"), "title").await);
    assert!(!ability.can_field("read", &SubjectType::new("Article"), "body").await);
}

#[tokio::test]
async fn test_uninterpretable_or_absent_data_never_grants() {
    let ability = Ability::from_json(
        r#"[
            { "action": "delete", "subject": "Article", "conditions": { "$not": { "$bogus": 1 } } },
            { "action": "archive", "subject": "Article", "conditions": { "age": { "$not": { "$in": 5 } } } },
            { "action": "publish", "subject": "Article", "conditions": { "status": { "$ne": "archived" } } }
        ]"#,
        AbilityOptions::default(),
    )
    .unwrap();

    let untagged = GenericSubject::from_json("Article", json!({ "age": 5 }));
    assert!(!ability.can("delete", &untagged).await);
    assert!(!ability.can("archive", &untagged).await);
    assert!(!ability.can("publish", &untagged).await);

    let live = GenericSubject::from_json("Article", json!({ "status": "live" }));
    assert!(ability.can("publish", &live).await);
}
