use serde_json::json;
use std::sync::Arc;
use tessera_model::{
    Entity, EntityType, IdFormat, IdentityKey, IdentityMap, ModelConfig, ModelError, Reconciler,
    Schema, ValueType,
};

fn make_schema() -> Schema {
    let mut user = EntityType::new("user");
    user.declare_primary_identifier("id").unwrap();
    user.declare_secondary_identifier("email").unwrap();
    user.declare_nullable_attribute("name", ValueType::String).unwrap();
    user.declare_nullable_attribute("team", ValueType::Entity("team".into())).unwrap();

    let mut team = EntityType::new("team");
    team.declare_primary_identifier("id").unwrap();

    Schema::new().with_type(user).unwrap().with_type(team).unwrap()
}

fn make_reconciler() -> Reconciler {
    Reconciler::new(Arc::new(make_schema()), Arc::new(IdentityMap::new()))
}

fn make_user(r: &Reconciler, email: &str) -> Entity {
    r.create("user", [("email", email)]).unwrap()
}

// ── register / lookup ────────────────────────────────────────────

#[test]
fn register_then_lookup() {
    let r = make_reconciler();
    let map = r.identity_map();
    let user = make_user(&r, "a@x.com");

    map.register(&user, "id", "manual").unwrap();
    assert_eq!(map.lookup("user", "id", "manual").unwrap(), user);
    assert!(map.lookup("team", "id", "manual").is_none());
    assert!(map.lookup("user", "email", "manual").is_none());
}

#[test]
fn register_same_instance_twice_is_allowed() {
    let r = make_reconciler();
    let user = make_user(&r, "twice@x.com");
    r.identity_map().register(&user, "email", "twice@x.com").unwrap();
}

#[test]
fn register_collision_names_the_attribute() {
    let r = make_reconciler();
    let a = make_user(&r, "a@x.com");
    let b = make_user(&r, "b@x.com");
    let err = r.identity_map().register(&b, "email", "a@x.com").unwrap_err();
    assert!(matches!(
        err,
        ModelError::DuplicateIdentifierValue { ref attribute, ref value }
            if attribute == "email" && value == "a@x.com"
    ));
    assert_eq!(r.identity_map().lookup("user", "email", "a@x.com").unwrap(), a);
}

#[test]
fn register_on_plain_attribute_fails() {
    let r = make_reconciler();
    let a = make_user(&r, "a@x.com");
    assert!(matches!(
        r.identity_map().register(&a, "name", "x"),
        Err(ModelError::NotAnIdentifierAttribute { .. })
    ));
}

#[test]
fn register_rejects_entities_of_another_map() {
    let r1 = make_reconciler();
    let r2 = make_reconciler();
    let a = make_user(&r1, "a@x.com");
    assert!(matches!(
        r2.identity_map().register(&a, "email", "a@x.com"),
        Err(ModelError::ForeignEntity(_))
    ));
}

#[test]
fn same_value_under_different_types_or_attributes_does_not_collide() {
    let r = make_reconciler();
    let user = r.create("user", [("id", "shared"), ("email", "shared")]).unwrap();
    let team = r.create("team", [("id", "shared")]).unwrap();
    assert_eq!(r.identity_map().lookup("user", "id", "shared").unwrap(), user);
    assert_eq!(r.identity_map().lookup("user", "email", "shared").unwrap(), user);
    assert_eq!(r.identity_map().lookup("team", "id", "shared").unwrap(), team);
}

// ── rekey ────────────────────────────────────────────────────────

#[test]
fn rekey_moves_the_entry() {
    let r = make_reconciler();
    let map = r.identity_map();
    let a = make_user(&r, "old@x.com");
    map.rekey(&a, "email", Some("old@x.com"), "new@x.com").unwrap();
    assert!(map.lookup("user", "email", "old@x.com").is_none());
    assert_eq!(map.lookup("user", "email", "new@x.com").unwrap(), a);
}

#[test]
fn failed_rekey_keeps_old_entry() {
    let r = make_reconciler();
    let map = r.identity_map();
    let a = make_user(&r, "a@x.com");
    let b = make_user(&r, "b@x.com");

    assert!(map.rekey(&b, "email", Some("b@x.com"), "a@x.com").is_err());
    assert_eq!(map.lookup("user", "email", "b@x.com").unwrap(), b);
    assert_eq!(map.lookup("user", "email", "a@x.com").unwrap(), a);
}

#[test]
fn rekey_leaves_foreign_old_entry_alone() {
    let r = make_reconciler();
    let map = r.identity_map();
    let a = make_user(&r, "a@x.com");
    let b = make_user(&r, "b@x.com");
    map.rekey(&b, "email", Some("a@x.com"), "c@x.com").unwrap();
    assert_eq!(map.lookup("user", "email", "a@x.com").unwrap(), a);
    assert_eq!(map.lookup("user", "email", "c@x.com").unwrap(), b);
}

// ── forget / purge ───────────────────────────────────────────────

#[test]
fn forget_removes_all_entries_of_an_instance() {
    let r = make_reconciler();
    let map = r.identity_map();
    let a = make_user(&r, "a@x.com");
    let b = make_user(&r, "b@x.com");
    a.id().unwrap();

    assert_eq!(map.forget(&a), 2);
    assert!(map.lookup("user", "email", "a@x.com").is_none());
    assert_eq!(map.lookup("user", "email", "b@x.com").unwrap(), b);
    assert_eq!(map.forget(&a), 0);
}

#[test]
fn purge_drops_dead_entries() {
    let r = make_reconciler();
    let map = r.identity_map();
    let keep = make_user(&r, "keep@x.com");
    for i in 0..5 {
        let user = make_user(&r, &format!("gone{i}@x.com"));
        // Keys registered by hand are not released when the instance drops.
        map.register(&user, "id", &format!("alias{i}")).unwrap();
    }
    assert_eq!(map.len(), 1);
    assert_eq!(map.entry_count(), 6);
    assert_eq!(map.purge(), 5);
    assert_eq!(map.purge(), 0);
    assert_eq!(map.lookup("user", "email", "keep@x.com").unwrap(), keep);
    assert!(!map.is_empty());
}

// ── Pruning ──────────────────────────────────────────────────────

#[test]
fn dropped_instances_release_their_entries() {
    let r = make_reconciler();
    let map = r.identity_map();
    for i in 0..1000 {
        let user = r
            .reconcile(&json!({"_type": "user", "id": format!("u{i}"), "email": format!("u{i}@x.com")}))
            .unwrap();
        assert_eq!(map.entry_count(), 2);
        drop(user);
    }
    assert_eq!(map.entry_count(), 0);
    assert!(map.is_empty());
}

#[test]
fn entries_dropped_while_the_map_is_busy_are_swept() {
    let r = make_reconciler();
    let map = r.identity_map();
    let keep = make_user(&r, "keep@x.com");

    // Each record replaces the user's team inside reconciliation, so the
    // previous team is dropped while the map is locked.
    for i in 0..1000 {
        r.reconcile(&json!({
            "_type": "user",
            "email": "keep@x.com",
            "team": {"_type": "team", "id": format!("t{i}")}
        }))
        .unwrap();
        assert!(map.entry_count() < 100, "table grew to {}", map.entry_count());
    }

    assert_eq!(map.len(), 2);
    let team = keep.get("team").unwrap().unwrap();
    assert_eq!(&map.lookup("team", "id", "t999").unwrap(), team.as_entity().unwrap());
    assert!(map.lookup("team", "id", "t998").is_none());
}

// ── Configuration ────────────────────────────────────────────────

#[test]
fn configured_map_uses_its_generator() {
    let config = ModelConfig {
        id_format: IdFormat::UuidV4,
        id_length: 0,
    };
    let r = Reconciler::with_config(make_schema(), &config).unwrap();
    let user = make_user(&r, "uuid@x.com");
    let id = user.id().unwrap();
    assert_eq!(id.len(), 36);
    assert!(uuid_like(&id));
}

#[test]
fn invalid_configuration_is_rejected() {
    let config = ModelConfig {
        id_format: IdFormat::UrlSafe,
        id_length: 4,
    };
    assert!(matches!(
        IdentityMap::with_config(&config),
        Err(ModelError::Types(_))
    ));
}

#[test]
fn identity_key_equality() {
    assert_eq!(
        IdentityKey::new("user", "email", "a"),
        IdentityKey::new("user", "email", "a")
    );
    assert_ne!(
        IdentityKey::new("user", "email", "a"),
        IdentityKey::new("user", "username", "a")
    );
}

fn uuid_like(s: &str) -> bool {
    s.split('-').map(str::len).collect::<Vec<_>>() == [8, 4, 4, 4, 12]
}
