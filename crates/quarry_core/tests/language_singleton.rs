use quarry_core::db::open_db_in_memory;
use quarry_core::{
    AppCaches, Entity, IntegrityViolation, Language, LanguageRepository, RepoError,
    ValidationError,
};

fn setup() -> (rusqlite::Connection, AppCaches) {
    (open_db_in_memory().unwrap(), AppCaches::new())
}

#[test]
fn first_language_must_be_the_default() {
    let (conn, caches) = setup();
    let repo = LanguageRepository::try_new(&conn, caches.languages()).unwrap();

    let mut language = Language::new("en-US", "English (United States)");
    let err = repo.save(&mut language).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Integrity(IntegrityViolation::DefaultRequired)
    ));

    language.set_default(true);
    repo.save(&mut language).unwrap();
    assert!(language.has_identity());
}

#[test]
fn inserting_a_new_default_demotes_the_previous_one() {
    let (conn, caches) = setup();
    let repo = LanguageRepository::try_new(&conn, caches.languages()).unwrap();

    let mut english = Language::new("en-US", "English (United States)");
    english.set_default(true);
    repo.save(&mut english).unwrap();

    let mut french = Language::new("fr-FR", "French (France)");
    french.set_default(true);
    repo.save(&mut french).unwrap();

    let reloaded = repo.get_by_iso_code("en-US").unwrap().unwrap();
    assert!(!reloaded.is_default());
    assert_eq!(repo.get_default_iso_code().unwrap().as_deref(), Some("fr-FR"));

    let defaults = repo
        .get_all()
        .unwrap()
        .into_iter()
        .filter(|language| language.is_default())
        .count();
    assert_eq!(defaults, 1);
}

#[test]
fn unsetting_the_current_default_without_replacement_is_rejected() {
    let (conn, caches) = setup();
    let repo = LanguageRepository::try_new(&conn, caches.languages()).unwrap();

    let mut english = Language::new("en-US", "English (United States)");
    english.set_default(true);
    repo.save(&mut english).unwrap();

    english.set_default(false);
    let err = repo.save(&mut english).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Integrity(IntegrityViolation::DefaultRequired)
    ));

    // The store still has a default.
    assert_eq!(repo.get_default_iso_code().unwrap().as_deref(), Some("en-US"));
}

#[test]
fn deleting_the_current_default_is_rejected() {
    let (conn, caches) = setup();
    let repo = LanguageRepository::try_new(&conn, caches.languages()).unwrap();

    let mut english = Language::new("en-US", "English (United States)");
    english.set_default(true);
    repo.save(&mut english).unwrap();

    let err = repo.delete(&mut english).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Integrity(IntegrityViolation::DefaultRequired)
    ));

    // The sole remaining language is necessarily the default, so the set
    // can never be emptied either.
    assert_eq!(repo.count().unwrap(), 1);
}

#[test]
fn deleting_a_non_default_language_soft_deletes_it() {
    let (conn, caches) = setup();
    let repo = LanguageRepository::try_new(&conn, caches.languages()).unwrap();

    let mut english = Language::new("en-US", "English (United States)");
    english.set_default(true);
    repo.save(&mut english).unwrap();

    let mut french = Language::new("fr-FR", "French (France)");
    repo.save(&mut french).unwrap();
    let french_id = french.id().unwrap();

    repo.delete(&mut french).unwrap();
    assert!(french.meta().is_deleted());

    assert!(repo.get(french_id).unwrap().is_none());
    assert!(!repo.exists(french_id).unwrap());
    assert_eq!(repo.get_all().unwrap().len(), 1);
}

#[test]
fn duplicate_iso_codes_are_rejected_case_insensitively() {
    let (conn, caches) = setup();
    let repo = LanguageRepository::try_new(&conn, caches.languages()).unwrap();

    let mut english = Language::new("en-US", "English (United States)");
    english.set_default(true);
    repo.save(&mut english).unwrap();

    let mut shadow = Language::new("en-us", "English (Shadow)");
    let err = repo.save(&mut shadow).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Integrity(IntegrityViolation::DuplicateKey { key }) if key == "en-us"
    ));
    assert!(!shadow.has_identity());
}

#[test]
fn malformed_iso_codes_are_rejected_before_any_write() {
    let (conn, caches) = setup();
    let repo = LanguageRepository::try_new(&conn, caches.languages()).unwrap();

    let mut bad = Language::new("English", "English");
    bad.set_default(true);
    let err = repo.save(&mut bad).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(ValidationError::InvalidIsoCode { .. })
    ));
    assert_eq!(repo.count().unwrap(), 0);
}

#[test]
fn predicate_reads_are_not_supported_for_languages() {
    let (conn, caches) = setup();
    let repo = LanguageRepository::try_new(&conn, caches.languages()).unwrap();
    drop(repo);

    let gateway = quarry_core::SqliteLanguageGateway::new(&conn);
    let err = quarry_core::EntityGateway::fetch_by_predicate(&gateway, &()).unwrap_err();
    assert!(matches!(err, RepoError::NotSupported { .. }));
}

#[test]
fn reads_are_served_from_the_cached_dataset() {
    let (conn, caches) = setup();
    let repo = LanguageRepository::try_new(&conn, caches.languages()).unwrap();

    let mut english = Language::new("en-US", "English (United States)");
    english.set_default(true);
    repo.save(&mut english).unwrap();

    repo.get_all().unwrap();
    assert_eq!(caches.languages().len(), 1);

    // Any write clears the single dataset entry.
    let mut french = Language::new("fr-FR", "French (France)");
    repo.save(&mut french).unwrap();
    assert!(caches.languages().is_empty());
}

#[test]
fn create_then_get_reproduces_all_persisted_fields() {
    let (conn, caches) = setup();
    let repo = LanguageRepository::try_new(&conn, caches.languages()).unwrap();

    let mut english = Language::new("en-US", "English (United States)");
    english.set_default(true);
    repo.save(&mut english).unwrap();

    let reloaded = repo.get(english.id().unwrap()).unwrap().unwrap();
    assert_eq!(reloaded.iso_code(), "en-US");
    assert_eq!(reloaded.culture_name(), "English (United States)");
    assert!(reloaded.is_default());
    assert_eq!(reloaded.id(), english.id());
}
