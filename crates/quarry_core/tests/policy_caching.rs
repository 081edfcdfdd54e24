use quarry_core::{
    CacheAccess, CachePolicyKind, Entity, EntityCache, EntityGateway, EntityMeta, RepoError,
    RepoResult, Repository, MAX_BATCH_IDS,
};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Widget {
    id: Option<i64>,
    label: String,
    meta: EntityMeta,
}

impl Widget {
    fn new(label: &str) -> Self {
        Self {
            id: None,
            label: label.to_string(),
            meta: EntityMeta::new(),
        }
    }
}

impl Entity for Widget {
    type Id = i64;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
}

#[derive(Default)]
struct StubGateway {
    rows: RefCell<BTreeMap<i64, Widget>>,
    next_id: Cell<i64>,
    fetch_by_id_calls: Cell<usize>,
    fetch_by_ids_calls: Cell<usize>,
    count_calls: Cell<usize>,
    last_batch: RefCell<Vec<i64>>,
    fail_writes: Cell<bool>,
}

impl StubGateway {
    fn seeded(labels: &[&str]) -> Self {
        let gateway = Self::default();
        for label in labels {
            let mut widget = Widget::new(label);
            gateway.persist_new(&mut widget).unwrap();
        }
        gateway.fetch_by_id_calls.set(0);
        gateway.fetch_by_ids_calls.set(0);
        gateway.count_calls.set(0);
        gateway
    }
}

impl EntityGateway for StubGateway {
    type Id = i64;
    type Entity = Widget;
    type Predicate = ();

    fn node_type(&self) -> &'static str {
        "widget"
    }

    fn cache_prefix(&self) -> &str {
        "widget:"
    }

    fn fetch_by_id(&self, id: &i64) -> RepoResult<Option<Widget>> {
        self.fetch_by_id_calls.set(self.fetch_by_id_calls.get() + 1);
        Ok(self.rows.borrow().get(id).cloned())
    }

    fn fetch_by_ids(&self, ids: &[i64]) -> RepoResult<Vec<Widget>> {
        self.fetch_by_ids_calls
            .set(self.fetch_by_ids_calls.get() + 1);
        *self.last_batch.borrow_mut() = ids.to_vec();

        let rows = self.rows.borrow();
        if ids.is_empty() {
            return Ok(rows.values().cloned().collect());
        }
        Ok(ids.iter().filter_map(|id| rows.get(id).cloned()).collect())
    }

    fn fetch_by_predicate(&self, _predicate: &()) -> RepoResult<Vec<Widget>> {
        Ok(self.rows.borrow().values().cloned().collect())
    }

    fn count(&self, _predicate: Option<&()>) -> RepoResult<u64> {
        self.count_calls.set(self.count_calls.get() + 1);
        Ok(self.rows.borrow().len() as u64)
    }

    fn persist_new(&self, entity: &mut Widget) -> RepoResult<()> {
        if self.fail_writes.get() {
            return Err(RepoError::InvalidData("write refused by stub".into()));
        }
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        entity.id = Some(id);
        entity.meta_mut().mark_persisted();
        self.rows.borrow_mut().insert(id, entity.clone());
        Ok(())
    }

    fn persist_updated(&self, entity: &mut Widget) -> RepoResult<()> {
        if self.fail_writes.get() {
            return Err(RepoError::InvalidData("write refused by stub".into()));
        }
        let id = entity.id().unwrap();
        self.rows.borrow_mut().insert(id, entity.clone());
        entity.meta_mut().clear_dirty();
        Ok(())
    }

    fn persist_deleted(&self, entity: &mut Widget) -> RepoResult<()> {
        if self.fail_writes.get() {
            return Err(RepoError::InvalidData("write refused by stub".into()));
        }
        let id = entity.id().unwrap();
        self.rows.borrow_mut().remove(&id);
        entity.meta_mut().mark_deleted(1);
        Ok(())
    }
}

fn default_repo(gateway: StubGateway) -> Repository<StubGateway> {
    Repository::new(
        gateway,
        Arc::new(EntityCache::new()),
        CachePolicyKind::Default {
            validate_count: false,
        },
    )
}

#[test]
fn get_issues_at_most_one_round_trip_per_id() {
    let repo = default_repo(StubGateway::seeded(&["alpha"]));

    let first = repo.get(&1).unwrap().unwrap();
    let second = repo.get(&1).unwrap().unwrap();

    assert_eq!(first.label, "alpha");
    assert_eq!(first, second);
    assert_eq!(repo.gateway().fetch_by_id_calls.get(), 1);
}

#[test]
fn get_caches_not_found_marker() {
    let repo = default_repo(StubGateway::seeded(&[]));

    assert!(repo.get(&99).unwrap().is_none());
    assert!(repo.get(&99).unwrap().is_none());
    assert_eq!(repo.gateway().fetch_by_id_calls.get(), 1);
}

#[test]
fn get_many_batches_only_missing_ids_and_preserves_input_order() {
    let repo = default_repo(StubGateway::seeded(&["a", "b", "c"]));

    repo.get(&2).unwrap();
    let widgets = repo.get_many(&[3, 2, 1]).unwrap();

    assert_eq!(
        widgets.iter().map(|w| w.label.as_str()).collect::<Vec<_>>(),
        vec!["c", "b", "a"]
    );
    assert_eq!(repo.gateway().fetch_by_ids_calls.get(), 1);
    assert_eq!(*repo.gateway().last_batch.borrow(), vec![3, 1]);
}

#[test]
fn get_many_drops_absent_ids_and_remembers_them() {
    let repo = default_repo(StubGateway::seeded(&["a"]));

    let widgets = repo.get_many(&[1, 99]).unwrap();
    assert_eq!(widgets.len(), 1);

    // The absent id got a not-found marker; no further single fetch runs.
    assert!(repo.get(&99).unwrap().is_none());
    assert_eq!(repo.gateway().fetch_by_id_calls.get(), 0);
}

#[test]
fn get_many_deduplicates_identifiers() {
    let repo = default_repo(StubGateway::seeded(&["a"]));

    let widgets = repo.get_many(&[1, 1, 1]).unwrap();

    assert_eq!(widgets.len(), 1);
    assert_eq!(*repo.gateway().last_batch.borrow(), vec![1]);
}

#[test]
fn get_many_rejects_oversized_batches_before_any_store_call() {
    let repo = default_repo(StubGateway::seeded(&[]));
    let ids: Vec<i64> = (0..(MAX_BATCH_IDS as i64 + 1)).collect();

    let err = repo.get_many(&ids).unwrap_err();

    assert!(matches!(
        err,
        RepoError::Capacity { requested, max }
            if requested == MAX_BATCH_IDS + 1 && max == MAX_BATCH_IDS
    ));
    assert_eq!(repo.gateway().fetch_by_ids_calls.get(), 0);
}

#[test]
fn save_without_identity_inserts_and_caches_under_new_id() {
    let repo = default_repo(StubGateway::seeded(&[]));

    let mut widget = Widget::new("fresh");
    assert!(!widget.has_identity());

    repo.save(&mut widget).unwrap();

    assert!(widget.has_identity());
    let id = widget.id().unwrap();
    let cached = repo.get(&id).unwrap().unwrap();
    assert_eq!(cached.label, "fresh");
    assert_eq!(repo.gateway().fetch_by_id_calls.get(), 0);
}

#[test]
fn save_with_identity_updates_and_repopulates_cache() {
    let repo = default_repo(StubGateway::seeded(&["old"]));

    let mut widget = repo.get(&1).unwrap().unwrap();
    widget.label = "new".to_string();
    repo.save(&mut widget).unwrap();

    let cached = repo.get(&1).unwrap().unwrap();
    assert_eq!(cached.label, "new");
    assert_eq!(repo.gateway().fetch_by_id_calls.get(), 1);
}

#[test]
fn failed_write_leaves_cache_untouched() {
    let repo = default_repo(StubGateway::seeded(&["stable"]));

    let mut widget = repo.get(&1).unwrap().unwrap();
    widget.label = "mutated".to_string();
    repo.gateway().fail_writes.set(true);

    assert!(repo.save(&mut widget).is_err());

    let cached = repo.get(&1).unwrap().unwrap();
    assert_eq!(cached.label, "stable");
    assert_eq!(repo.gateway().fetch_by_id_calls.get(), 1);
}

#[test]
fn delete_clears_the_cached_entry() {
    let repo = default_repo(StubGateway::seeded(&["doomed"]));

    let mut widget = repo.get(&1).unwrap().unwrap();
    repo.delete(&mut widget).unwrap();

    assert!(repo.get(&1).unwrap().is_none());
    assert_eq!(repo.gateway().fetch_by_id_calls.get(), 2);
}

#[test]
fn exists_is_served_by_positive_cache_hits() {
    let repo = default_repo(StubGateway::seeded(&["here"]));

    repo.get(&1).unwrap();
    assert!(repo.exists(&1).unwrap());
    assert_eq!(repo.gateway().fetch_by_id_calls.get(), 1);

    assert!(!repo.exists(&2).unwrap());
    assert!(!repo.exists(&2).unwrap());
    assert_eq!(repo.gateway().fetch_by_id_calls.get(), 2);
}

#[test]
fn count_always_executes_against_the_store() {
    let repo = default_repo(StubGateway::seeded(&["a", "b"]));

    assert_eq!(repo.count(None).unwrap(), 2);
    assert_eq!(repo.count(None).unwrap(), 2);
    assert_eq!(repo.gateway().count_calls.get(), 2);
}

#[test]
fn validated_get_all_detects_out_of_band_deletes() {
    let repo = Repository::new(
        StubGateway::seeded(&["a", "b", "c"]),
        Arc::new(EntityCache::new()),
        CachePolicyKind::Default {
            validate_count: true,
        },
    );

    assert_eq!(repo.get_all().unwrap().len(), 3);
    assert_eq!(repo.gateway().fetch_by_ids_calls.get(), 1);

    // Validated and served from cache.
    assert_eq!(repo.get_all().unwrap().len(), 3);
    assert_eq!(repo.gateway().fetch_by_ids_calls.get(), 1);
    assert_eq!(repo.gateway().count_calls.get(), 1);

    // Out-of-band delete: the cached view is silently incomplete.
    repo.gateway().rows.borrow_mut().remove(&2);

    let refreshed = repo.get_all().unwrap();
    assert_eq!(refreshed.len(), 2);
    assert_eq!(repo.gateway().fetch_by_ids_calls.get(), 2);
}
