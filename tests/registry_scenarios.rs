//! End-to-end lifecycle tests against the public registry API

use std::sync::Arc;
use std::thread;

use exchange_schemas::{
    ActivateOptions, ChangeRecordKind, ChangeType, ContractTest, Context, ErrorKind, FileVersionStore,
    MemoryVersionStore, SchemaRegistry, Submission, VersionStatus,
};
use semver::Version;
use tempfile::tempdir;

const V1: &str = "type Query { name: String }";
const V2: &str = "type Query { name: String, age: Int }";
const V3: &str = "type Query { age: Int }";

fn ctx() -> Context {
    Context::background().with_actor("integration")
}

fn memory_registry() -> SchemaRegistry {
    SchemaRegistry::new(Arc::new(MemoryVersionStore::new())).unwrap()
}

fn promote(registry: &SchemaRegistry, version: &str, sdl: &str, declared: ChangeType) {
    registry.submit(&Submission::new(version, sdl, declared), &ctx()).unwrap();
    registry.evaluate(version, &ctx()).unwrap();
    registry.activate(version, ActivateOptions::default(), &ctx()).unwrap();
}

fn active_count(registry: &SchemaRegistry) -> usize {
    registry.list(Some(VersionStatus::Active), 0, 0).unwrap().total
}

#[test]
fn test_first_version_becomes_active() {
    let registry = memory_registry();

    let v1 = registry.submit(&Submission::new("v1", V1, ChangeType::Major), &ctx()).unwrap();
    assert_eq!(v1.status, VersionStatus::Draft);

    let report = registry.evaluate("v1", &ctx()).unwrap();
    assert!(report.compatible);
    assert_eq!(registry.get("v1").unwrap().status, VersionStatus::Inactive);

    registry.activate("v1", ActivateOptions::default(), &ctx()).unwrap();
    let active = registry.get_active().unwrap();
    assert_eq!(active.version, Version::new(1, 0, 0));
    assert_eq!(active.sdl, V1);
}

#[test]
fn test_additive_version_replaces_active() {
    let registry = memory_registry();
    promote(&registry, "v1", V1, ChangeType::Major);

    registry.submit(&Submission::new("v2", V2, ChangeType::Minor), &ctx()).unwrap();
    let report = registry.evaluate("v2", &ctx()).unwrap();
    assert!(report.compatible);
    assert_eq!(report.inferred_change_type, ChangeType::Minor);
    assert_eq!(registry.get("v2").unwrap().status, VersionStatus::Inactive);

    let activation = registry.activate("v2", ActivateOptions::default(), &ctx()).unwrap();
    assert_eq!(activation.previous, Some(Version::new(1, 0, 0)));
    assert_eq!(registry.get("v1").unwrap().status, VersionStatus::Deprecated);
    assert_eq!(registry.get("v2").unwrap().status, VersionStatus::Active);

    let old = registry.resolve("v1", &ctx()).unwrap();
    assert!(old.field("Query", "age").is_none());
    let current = registry.resolve("", &ctx()).unwrap();
    assert!(current.field("Query", "age").is_some());
}

#[test]
fn test_undeclared_removal_is_rejected() {
    let registry = memory_registry();
    promote(&registry, "v1", V1, ChangeType::Major);
    promote(&registry, "v2", V2, ChangeType::Minor);

    registry.submit(&Submission::new("v3", V3, ChangeType::Minor), &ctx()).unwrap();
    let err = registry.evaluate("v3", &ctx()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Compatibility);

    let report = err.report().unwrap();
    assert!(!report.compatible);
    assert_eq!(report.breaking_changes, vec!["Field 'Query.name' removed".to_string()]);
    assert_eq!(registry.get("v3").unwrap().status, VersionStatus::Rejected);
    assert_eq!(registry.get_active().unwrap().version, Version::new(2, 0, 0));
}

#[test]
fn test_resubmitting_same_pair_is_idempotent() {
    let registry = memory_registry();
    promote(&registry, "v1", V1, ChangeType::Major);

    let again = registry.submit(&Submission::new("v1", V1, ChangeType::Major), &ctx()).unwrap();
    assert_eq!(again.id, registry.get("v1").unwrap().id);
    assert_eq!(again.status, VersionStatus::Active);
    assert_eq!(registry.list(None, 0, 0).unwrap().total, 1);
}

#[test]
fn test_delete_blocked_by_successor() {
    let registry = memory_registry();
    promote(&registry, "v1", V1, ChangeType::Major);
    let v2 = registry.submit(&Submission::new("v2", V2, ChangeType::Minor), &ctx()).unwrap();
    assert_eq!(v2.previous_version_id, Some(registry.get("v1").unwrap().id));

    registry.deactivate("v1", &ctx()).unwrap();
    let err = registry.delete("v1", &ctx()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(registry.get("v1").is_ok());

    registry.delete("v2", &ctx()).unwrap();
    assert_eq!(registry.get("v2").unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn test_concurrent_activation_leaves_one_active() {
    let registry = Arc::new(memory_registry());
    promote(&registry, "v1", V1, ChangeType::Major);

    let candidates = ["v2", "v3", "v4", "v5"];
    for (i, version) in candidates.iter().enumerate() {
        let sdl = format!("type Query {{ name: String, extra{}: Int }}", i);
        registry.submit(&Submission::new(*version, sdl, ChangeType::Minor), &ctx()).unwrap();
        registry.evaluate(version, &ctx()).unwrap();
    }

    let handles: Vec<_> = candidates
        .iter()
        .map(|version| {
            let registry = Arc::clone(&registry);
            let version = version.to_string();
            thread::spawn(move || registry.activate(&version, ActivateOptions::default(), &ctx()))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(active_count(&registry), 1);
    let active = registry.get_active().unwrap();
    assert_eq!(
        registry.resolve("", &ctx()).unwrap(),
        registry.resolve(&active.version_string(), &ctx()).unwrap()
    );
    assert_eq!(
        registry.list(Some(VersionStatus::Deprecated), 0, 0).unwrap().total,
        candidates.len()
    );
}

#[test]
fn test_resolve_follows_each_activation() {
    let registry = memory_registry();
    promote(&registry, "v1", V1, ChangeType::Major);
    assert_eq!(registry.resolve("", &ctx()).unwrap(), registry.resolve("v1", &ctx()).unwrap());

    promote(&registry, "v2", V2, ChangeType::Minor);
    assert_eq!(registry.resolve("", &ctx()).unwrap(), registry.resolve("v2", &ctx()).unwrap());
    assert_ne!(registry.resolve("", &ctx()).unwrap(), registry.resolve("v1", &ctx()).unwrap());
}

#[test]
fn test_contract_fixtures_run_on_activation() {
    let store = Arc::new(MemoryVersionStore::new());
    store.add_contract_test(ContractTest::new("name lookup", "{ name }"));
    let registry = SchemaRegistry::new(store).unwrap();
    promote(&registry, "v1", V1, ChangeType::Major);

    registry.submit(&Submission::new("v2", V3, ChangeType::Major), &ctx()).unwrap();
    registry.evaluate("v2", &ctx()).unwrap();

    let strict = ActivateOptions {
        run_contract_tests: true,
        strict: true,
    };
    let err = registry.activate("v2", strict, &ctx()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ContractTests);
    assert_eq!(registry.get_active().unwrap().version, Version::new(1, 0, 0));

    let lenient = ActivateOptions {
        run_contract_tests: true,
        strict: false,
    };
    let activation = registry.activate("v2", lenient, &ctx()).unwrap();
    let results = activation.contract_tests.unwrap();
    assert_eq!(results.failed, 1);
    assert_eq!(registry.get_active().unwrap().version, Version::new(2, 0, 0));
}

#[test]
fn test_file_store_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state").join("registry.json");

    {
        let store = Arc::new(FileVersionStore::open(&path, None).unwrap());
        let registry = SchemaRegistry::new(store).unwrap();
        promote(&registry, "v1", V1, ChangeType::Major);
        promote(&registry, "v2", V2, ChangeType::Minor);
    }
    assert!(path.exists());

    let store = Arc::new(FileVersionStore::open(&path, None).unwrap());
    let registry = SchemaRegistry::new(store).unwrap();
    assert_eq!(registry.get_active().unwrap().version, Version::new(2, 0, 0));
    assert_eq!(registry.get("v1").unwrap().status, VersionStatus::Deprecated);
    assert!(registry.resolve("", &ctx()).unwrap().field("Query", "age").is_some());

    let history = registry.history("v2").unwrap();
    let kinds: Vec<_> = history.iter().map(|r| r.kind).collect();
    assert_eq!(kinds, vec![ChangeRecordKind::Evaluation, ChangeRecordKind::Activation]);
    assert!(history.iter().all(|r| r.created_by == "integration"));
}
