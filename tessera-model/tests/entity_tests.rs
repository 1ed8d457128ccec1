use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use tessera_model::{EntityType, IdentityMap, ModelError, Reconciler, Schema, Value, ValueType};

fn make_reconciler() -> Reconciler {
    let mut user = EntityType::new("user");
    user.declare_primary_identifier("id").unwrap();
    user.declare_secondary_identifier("email").unwrap();
    user.declare_secondary_identifier("username").unwrap();
    user.declare_nullable_attribute("name", ValueType::String).unwrap();

    let mut movie = EntityType::new("movie");
    movie.declare_attribute("title", ValueType::String).unwrap();

    let schema = Schema::new().with_type(user).unwrap().with_type(movie).unwrap();
    Reconciler::new(Arc::new(schema), Arc::new(IdentityMap::new()))
}

fn make_user(r: &Reconciler, email: &str, username: &str) -> tessera_model::Entity {
    r.create("user", [("email", email), ("username", username)])
        .unwrap()
}

// ── Construction ─────────────────────────────────────────────────

#[test]
fn creation_generates_primary_identifier() {
    let r = make_reconciler();
    let user = make_user(&r, "hi@hello.com", "hi");

    assert!(user.is_new());
    assert_eq!(user.type_name(), "user");

    let id = user.id().unwrap();
    assert!(id.len() >= 21);
    assert!(user.is_set("id").unwrap());
    assert_eq!(user.get_str("email").unwrap().as_deref(), Some("hi@hello.com"));
    assert_eq!(user.get_str("username").unwrap().as_deref(), Some("hi"));
}

#[test]
fn creation_without_required_attribute_fails() {
    let r = make_reconciler();
    let err = r.create("user", Vec::<(&str, Value)>::new()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Cannot assign a value of an unexpected type to the attribute 'email' (expected type: 'string', received type: 'undefined')"
    );
}

#[test]
fn creation_reports_each_missing_required_attribute() {
    let r = make_reconciler();
    let err = r.create("user", [("email", "a@b.c")]).unwrap_err();
    assert!(matches!(
        err,
        ModelError::TypeMismatch { ref attribute, ref received, .. }
            if attribute == "username" && received == "undefined"
    ));

    let err = r.create("movie", Vec::<(&str, Value)>::new()).unwrap_err();
    assert!(matches!(err, ModelError::TypeMismatch { ref attribute, .. } if attribute == "title"));
}

#[test]
fn creation_of_unknown_type_fails() {
    let r = make_reconciler();
    let err = r.create("robot", [("email", "x")]).unwrap_err();
    assert!(matches!(err, ModelError::UnknownEntityType(ref name) if name == "robot"));
}

#[test]
fn creation_with_taken_identifier_fails_and_registers_nothing() {
    let r = make_reconciler();
    let existing = make_user(&r, "taken@x.com", "first");
    let entries_before = r.identity_map().len();

    let err = r
        .create("user", [("email", "free@x.com"), ("username", "first")])
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Duplicate value found in an identifier attribute (attribute name: 'username')"
    );
    assert_eq!(r.identity_map().len(), entries_before);
    assert!(r.identity_map().lookup("user", "email", "free@x.com").is_none());
    assert_eq!(existing.get_str("username").unwrap().as_deref(), Some("first"));
}

#[test]
fn creation_with_explicit_primary_identifier() {
    let r = make_reconciler();
    let _a = r.reconcile(&json!({"_type": "user", "id": "abc123"})).unwrap();
    let err = r
        .create("user", [("id", "abc123"), ("email", "e"), ("username", "u")])
        .unwrap_err();
    assert!(matches!(err, ModelError::DuplicateIdentifierValue { ref attribute, .. } if attribute == "id"));
}

// ── Primary identifier generation ────────────────────────────────

#[test]
fn primary_identifier_is_generated_lazily() {
    let r = make_reconciler();
    let user = make_user(&r, "lazy@x.com", "lazy");
    assert!(!user.is_set("id").unwrap());

    let id = user.get_str("id").unwrap().unwrap();
    assert!(user.is_set("id").unwrap());
    assert_eq!(user.id().unwrap(), id);

    let found = r.identity_map().lookup("user", "id", &id).unwrap();
    assert_eq!(found, user);
}

#[test]
fn generated_identifiers_differ() {
    let r = make_reconciler();
    let a = make_user(&r, "a@x.com", "a");
    let b = make_user(&r, "b@x.com", "b");
    assert_ne!(a.id().unwrap(), b.id().unwrap());
}

#[test]
fn id_on_type_without_primary_fails() {
    let r = make_reconciler();
    let movie = r.create("movie", [("title", "Alien")]).unwrap();
    assert!(matches!(
        movie.id(),
        Err(ModelError::NoPrimaryIdentifierDeclared { .. })
    ));
}

// ── Identifier writes ────────────────────────────────────────────

#[test]
fn duplicate_identifier_write_fails_until_holder_moves() {
    let r = make_reconciler();
    let a = make_user(&r, "a@x.com", "a");
    let b = make_user(&r, "b@x.com", "b");

    let err = b.set("email", "a@x.com").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Duplicate value found in an identifier attribute (attribute name: 'email')"
    );
    assert_eq!(b.get_str("email").unwrap().as_deref(), Some("b@x.com"));

    a.set("email", "moved@x.com").unwrap();
    b.set("email", "a@x.com").unwrap();
    assert_eq!(r.identity_map().lookup("user", "email", "a@x.com").unwrap(), b);
    assert_eq!(r.identity_map().lookup("user", "email", "moved@x.com").unwrap(), a);
    assert!(r.identity_map().lookup("user", "email", "b@x.com").is_none());
}

#[test]
fn rewriting_same_identifier_value_is_a_no_op() {
    let r = make_reconciler();
    let a = make_user(&r, "same@x.com", "same");
    a.set("email", "same@x.com").unwrap();
    assert_eq!(r.identity_map().lookup("user", "email", "same@x.com").unwrap(), a);
}

#[test]
fn setting_primary_identifier_rekeys() {
    let r = make_reconciler();
    let a = make_user(&r, "p@x.com", "p");
    let generated = a.id().unwrap();
    a.set("id", "custom-id").unwrap();
    assert!(r.identity_map().lookup("user", "id", &generated).is_none());
    assert_eq!(r.identity_map().lookup("user", "id", "custom-id").unwrap(), a);
}

#[test]
fn identifiers_cannot_be_unset() {
    let r = make_reconciler();
    let a = make_user(&r, "u@x.com", "u");
    assert!(matches!(a.unset("email"), Err(ModelError::TypeMismatch { .. })));
    assert_eq!(r.identity_map().lookup("user", "email", "u@x.com").unwrap(), a);
}

#[test]
fn plain_attribute_writes_do_not_touch_the_map() {
    let r = make_reconciler();
    let a = make_user(&r, "plain@x.com", "plain");
    let before = r.identity_map().len();
    a.set("name", "Plain").unwrap();
    a.unset("name").unwrap();
    assert_eq!(r.identity_map().len(), before);
}

// ── Lifetime ─────────────────────────────────────────────────────

#[test]
fn map_does_not_keep_instances_alive() {
    let r = make_reconciler();
    {
        let _temp = make_user(&r, "temp@x.com", "temp");
        assert!(r.identity_map().lookup("user", "email", "temp@x.com").is_some());
    }
    assert!(r.identity_map().lookup("user", "email", "temp@x.com").is_none());

    // The identity is free again.
    let again = make_user(&r, "temp@x.com", "temp");
    assert_eq!(r.identity_map().lookup("user", "email", "temp@x.com").unwrap(), again);
}

#[test]
fn retire_frees_every_identity() {
    let r = make_reconciler();
    let a = make_user(&r, "retired@x.com", "retired");
    let id = a.id().unwrap();

    assert_eq!(a.retire(), 3);
    assert!(r.identity_map().lookup("user", "id", &id).is_none());
    assert!(r.identity_map().lookup("user", "email", "retired@x.com").is_none());
    assert_eq!(a.get_str("email").unwrap().as_deref(), Some("retired@x.com"));

    let b = make_user(&r, "retired@x.com", "retired");
    assert_ne!(a, b);
}

#[test]
fn clones_share_the_instance() {
    let r = make_reconciler();
    let a = make_user(&r, "c@x.com", "c");
    let a2 = a.clone();
    a2.set("name", "Shared").unwrap();
    assert_eq!(a.get_str("name").unwrap().as_deref(), Some("Shared"));
    assert!(tessera_model::Entity::ptr_eq(&a, &a2));
}

#[test]
fn mark_persisted_clears_newness() {
    let r = make_reconciler();
    let a = make_user(&r, "n@x.com", "n");
    assert!(a.is_new());
    a.mark_persisted();
    assert!(!a.is_new());
}

// ── Serialization ────────────────────────────────────────────────

#[test]
fn to_record_includes_type_newness_and_set_values() {
    let r = make_reconciler();
    let a = make_user(&r, "rec@x.com", "rec");
    let record = a.to_record().unwrap();
    let id = a.id().unwrap();
    assert_eq!(
        record,
        json!({
            "_type": "user",
            "_new": true,
            "id": id,
            "email": "rec@x.com",
            "username": "rec",
        })
    );

    a.mark_persisted();
    a.set("name", "Rec").unwrap();
    let record = a.to_record().unwrap();
    assert_eq!(record.get("_new"), None);
    assert_eq!(record["name"], "Rec");
}

#[test]
fn to_record_round_trips_through_reconcile() {
    let r = make_reconciler();
    let a = make_user(&r, "round@x.com", "round");
    let back = r.reconcile(&a.to_record().unwrap()).unwrap();
    assert_eq!(back, a);
}

#[test]
fn debug_shows_identifiers() {
    let r = make_reconciler();
    let a = make_user(&r, "dbg@x.com", "dbg");
    let rendered = format!("{a:?}");
    assert!(rendered.contains("user"));
    assert!(rendered.contains("dbg@x.com"));
}

// ── Concurrency ──────────────────────────────────────────────────

#[test]
fn concurrent_claims_of_one_identity_have_one_winner() {
    let r = Arc::new(make_reconciler());
    let users: Vec<_> = (0..8)
        .map(|i| make_user(&r, &format!("u{i}@x.com"), &format!("u{i}")))
        .collect();

    let handles: Vec<_> = users
        .iter()
        .cloned()
        .map(|user| std::thread::spawn(move || user.set("username", "contested").is_ok()))
        .collect();
    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();

    assert_eq!(winners, 1);
    let holder = r.identity_map().lookup("user", "username", "contested").unwrap();
    assert!(users.contains(&holder));
}
