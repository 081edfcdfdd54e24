use quarry_core::db::open_db_in_memory;
use quarry_core::{
    AppCaches, CacheAccess, CacheEntry, CacheIsolation, CacheIsolationProvider, EntityCache,
    Language, LanguageRepository, Scope,
};
use std::sync::Arc;

fn global_store() -> Arc<EntityCache<String>> {
    Arc::new(EntityCache::new())
}

#[test]
fn default_isolation_targets_the_global_store_directly() {
    let global = global_store();
    let scope = Scope::new(CacheIsolation::Default);
    let handle = CacheIsolationProvider::resolve(&scope, global.clone());

    handle.set("k:1", CacheEntry::Hit("value".to_string()));

    assert!(matches!(global.get("k:1"), Some(CacheEntry::Hit(_))));
    scope.complete();
}

#[test]
fn none_isolation_never_stores_anything() {
    let global = global_store();
    let scope = Scope::new(CacheIsolation::None);
    let handle = CacheIsolationProvider::resolve(&scope, global.clone());

    handle.set("k:1", CacheEntry::Hit("value".to_string()));

    assert!(handle.get("k:1").is_none());
    assert!(global.is_empty());
    scope.complete();
}

#[test]
fn scoped_write_is_visible_in_scope_but_not_globally_until_commit() {
    let global = global_store();
    let scope = Scope::new(CacheIsolation::Scoped);
    let handle = CacheIsolationProvider::resolve(&scope, global.clone());

    handle.set("k:1", CacheEntry::Hit("buffered".to_string()));

    // Visible to subsequent reads in the same scope.
    assert!(matches!(handle.get("k:1"), Some(CacheEntry::Hit(value)) if value == "buffered"));
    // Invisible to everyone else.
    assert!(global.get("k:1").is_none());

    scope.complete();
    assert!(matches!(global.get("k:1"), Some(CacheEntry::Hit(value)) if value == "buffered"));
}

#[test]
fn rollback_discards_buffered_writes() {
    let global = global_store();
    let scope = Scope::new(CacheIsolation::Scoped);
    let handle = CacheIsolationProvider::resolve(&scope, global.clone());

    handle.set("k:1", CacheEntry::Hit("phantom".to_string()));
    scope.rollback();

    assert!(global.get("k:1").is_none());
}

#[test]
fn dropping_an_incomplete_scope_rolls_back() {
    let global = global_store();
    {
        let scope = Scope::new(CacheIsolation::Scoped);
        let handle = CacheIsolationProvider::resolve(&scope, global.clone());
        handle.set("k:1", CacheEntry::Hit("phantom".to_string()));
    }

    assert!(global.get("k:1").is_none());
}

#[test]
fn scoped_reads_fall_through_to_the_global_store() {
    let global = global_store();
    global.set("k:1", CacheEntry::Hit("shared".to_string()));

    let scope = Scope::new(CacheIsolation::Scoped);
    let handle = CacheIsolationProvider::resolve(&scope, global.clone());

    assert!(matches!(handle.get("k:1"), Some(CacheEntry::Hit(value)) if value == "shared"));
    scope.complete();
}

#[test]
fn scoped_clear_shadows_the_global_entry_until_commit() {
    let global = global_store();
    global.set("k:1", CacheEntry::Hit("shared".to_string()));

    let scope = Scope::new(CacheIsolation::Scoped);
    let handle = CacheIsolationProvider::resolve(&scope, global.clone());

    handle.clear("k:1");
    assert!(handle.get("k:1").is_none());
    assert!(global.get("k:1").is_some());

    scope.complete();
    assert!(global.get("k:1").is_none());
}

#[test]
fn scoped_clear_prefix_buffers_and_applies_on_commit() {
    let global = global_store();
    global.set("k:1", CacheEntry::Hit("one".to_string()));
    global.set("k:2", CacheEntry::Hit("two".to_string()));
    global.set("other:1", CacheEntry::Hit("kept".to_string()));

    let scope = Scope::new(CacheIsolation::Scoped);
    let handle = CacheIsolationProvider::resolve(&scope, global.clone());

    handle.clear_prefix("k:");
    // A re-set after the prefix clear survives the commit.
    handle.set("k:2", CacheEntry::Hit("replaced".to_string()));

    assert!(handle.get("k:1").is_none());
    assert!(matches!(handle.get("k:2"), Some(CacheEntry::Hit(value)) if value == "replaced"));

    scope.complete();
    assert!(global.get("k:1").is_none());
    assert!(matches!(global.get("k:2"), Some(CacheEntry::Hit(value)) if value == "replaced"));
    assert!(global.get("other:1").is_some());
}

#[test]
fn hits_with_prefix_merges_scoped_and_global_views() {
    let global = global_store();
    global.set("k:1", CacheEntry::Hit("global".to_string()));

    let scope = Scope::new(CacheIsolation::Scoped);
    let handle = CacheIsolationProvider::resolve(&scope, global.clone());
    handle.set("k:2", CacheEntry::Hit("scoped".to_string()));

    let hits = handle.hits_with_prefix("k:");
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].0, "k:1");
    assert_eq!(hits[1].0, "k:2");

    scope.rollback();
    assert_eq!(global.hits_with_prefix("k:").len(), 1);
}

#[test]
fn repository_reads_under_a_scoped_cache_merge_on_commit_only() {
    let conn = open_db_in_memory().unwrap();
    let caches = AppCaches::new();

    let mut default_language = Language::new("en-US", "English (United States)");
    default_language.set_default(true);
    {
        let bootstrap = LanguageRepository::try_new(&conn, caches.languages()).unwrap();
        bootstrap.save(&mut default_language).unwrap();
    }
    caches.clear_all();

    let scope = Scope::new(CacheIsolation::Scoped);
    let handle = CacheIsolationProvider::resolve(&scope, caches.languages());
    let repo = LanguageRepository::try_new(&conn, handle).unwrap();

    // The read populates the scoped buffer, not the global store.
    assert_eq!(repo.get_all().unwrap().len(), 1);
    assert!(caches.languages().is_empty());

    scope.complete();
    assert_eq!(caches.languages().len(), 1);
}
