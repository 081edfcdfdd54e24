use quarry_core::db::open_db_in_memory;
use quarry_core::{AuditAction, AuditEntry, AuditPredicate, AuditRepository, Entity, RepoError};

fn setup() -> rusqlite::Connection {
    open_db_in_memory().unwrap()
}

#[test]
fn append_assigns_identity_and_roundtrips() {
    let conn = setup();
    let repo = AuditRepository::try_new(&conn).unwrap();

    let mut entry = AuditEntry::new(7, AuditAction::Save, "editor", "published page", 1_000);
    assert!(!entry.has_identity());

    repo.append(&mut entry).unwrap();
    assert!(entry.has_identity());

    let id = entry.id().unwrap();
    let loaded = repo.get(&id).unwrap().unwrap();
    assert_eq!(loaded.node_id(), 7);
    assert_eq!(loaded.action(), AuditAction::Save);
    assert_eq!(loaded.actor(), "editor");
    assert_eq!(loaded.message(), "published page");
    assert_eq!(loaded.logged_at(), 1_000);
}

#[test]
fn updates_and_deletes_are_not_supported() {
    let conn = setup();
    let repo = AuditRepository::try_new(&conn).unwrap();

    let mut entry = AuditEntry::new(7, AuditAction::New, "editor", "created page", 1_000);
    repo.append(&mut entry).unwrap();

    let err = repo.save_existing(&mut entry).unwrap_err();
    assert!(matches!(
        err,
        RepoError::NotSupported { operation } if operation == "audit.update"
    ));

    let err = repo.delete(&mut entry).unwrap_err();
    assert!(matches!(
        err,
        RepoError::NotSupported { operation } if operation == "audit.delete"
    ));

    // The entry is untouched.
    assert!(repo.get(&entry.id().unwrap()).unwrap().is_some());
}

#[test]
fn blank_actor_is_rejected_before_the_write() {
    let conn = setup();
    let repo = AuditRepository::try_new(&conn).unwrap();

    let mut entry = AuditEntry::new(7, AuditAction::New, "   ", "created page", 1_000);
    assert!(matches!(
        repo.append(&mut entry).unwrap_err(),
        RepoError::Validation(_)
    ));
    assert_eq!(repo.count(None).unwrap(), 0);
}

#[test]
fn predicate_filters_by_node_action_and_window() {
    let conn = setup();
    let repo = AuditRepository::try_new(&conn).unwrap();

    let mut created = AuditEntry::new(1, AuditAction::New, "editor", "created", 1_000);
    let mut saved = AuditEntry::new(1, AuditAction::Save, "editor", "saved", 2_000);
    let mut other_node = AuditEntry::new(2, AuditAction::Save, "editor", "saved other", 3_000);
    repo.append(&mut created).unwrap();
    repo.append(&mut saved).unwrap();
    repo.append(&mut other_node).unwrap();

    let node_trail = repo
        .get_by_predicate(&AuditPredicate {
            node_id: Some(1),
            ..AuditPredicate::default()
        })
        .unwrap();
    assert_eq!(node_trail.len(), 2);
    // Most recent first.
    assert_eq!(node_trail[0].message(), "saved");

    let saves = repo
        .get_by_predicate(&AuditPredicate {
            action: Some(AuditAction::Save),
            ..AuditPredicate::default()
        })
        .unwrap();
    assert_eq!(saves.len(), 2);

    let recent = repo
        .get_by_predicate(&AuditPredicate {
            since: Some(2_000),
            ..AuditPredicate::default()
        })
        .unwrap();
    assert_eq!(recent.len(), 2);

    let counted = repo
        .count(Some(&AuditPredicate {
            node_id: Some(1),
            action: Some(AuditAction::Save),
            since: None,
        }))
        .unwrap();
    assert_eq!(counted, 1);
}

#[test]
fn reads_always_pass_through_to_the_store() {
    let conn = setup();
    let repo = AuditRepository::try_new(&conn).unwrap();

    let mut entry = AuditEntry::new(5, AuditAction::System, "system", "maintenance", 9_000);
    repo.append(&mut entry).unwrap();
    let id = entry.id().unwrap();

    // Out-of-band removal is visible immediately; nothing was cached.
    conn.execute("DELETE FROM audit_entries WHERE id = ?1;", [id.to_string()])
        .unwrap();
    assert!(repo.get(&id).unwrap().is_none());
    assert!(!repo.exists(&id).unwrap());
}

#[test]
fn get_many_preserves_store_ordering() {
    let conn = setup();
    let repo = AuditRepository::try_new(&conn).unwrap();

    let mut first = AuditEntry::new(1, AuditAction::New, "editor", "first", 1_000);
    let mut second = AuditEntry::new(1, AuditAction::Save, "editor", "second", 2_000);
    repo.append(&mut first).unwrap();
    repo.append(&mut second).unwrap();

    let entries = repo
        .get_many(&[first.id().unwrap(), second.id().unwrap()])
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].message(), "second");
    assert_eq!(entries[1].message(), "first");
}
