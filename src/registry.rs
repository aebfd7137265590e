//! Schema Registry
//!
//! Owns the version lifecycle:
//!
//! ```text
//! submit ──> Draft ──evaluate──> Inactive ──activate──> Active ──activate(other)──> Deprecated
//!              │                    │  ▲                   │
//!              └──> Rejected        │  └───deactivate──────┘
//!                                   └──deactivate──> Deprecated
//! ```
//!
//! Writers serialize on one mutex for the whole read-check-commit sequence.
//! The cache's own lock is only taken for the final map swap, so request
//! routing through [`SchemaRegistry::resolve`] never waits on store I/O.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audit::{AuditAction, AuditEvent, AuditSink, TracingAuditSink};
use crate::cache::{CacheState, SchemaCache};
use crate::checksum::Checksum;
use crate::compatibility::{CompatibilityChecker, CompatibilityReport};
use crate::config::{ContractTestConfig, LifecycleConfig, RegistryConfig};
use crate::context::Context;
use crate::contract::{ContractTestResults, ContractTester, QueryExecutor};
use crate::error::{RegistryError, Result};
use crate::schema::ParsedSchema;
use crate::sdl;
use crate::store::{ChangeRecord, ChangeRecordKind, FileVersionStore, VersionStore, VersionUpdate};
use crate::version::{bump, parse_version, ChangeType, SchemaVersion, VersionStatus};

/// Audit outcome for a deactivation that leaves no Active version
pub const NO_ACTIVE_VERSION: &str = "no_active_version";

/// A request to register new SDL
#[derive(Debug, Clone)]
pub struct Submission {
    /// Requested version; empty means derive it from the declared change type
    pub version: String,
    pub sdl: String,
    pub created_by: Option<String>,
    pub declared_change_type: ChangeType,
    pub notes: Option<String>,
}

impl Submission {
    pub fn new(version: impl Into<String>, sdl: impl Into<String>, declared: ChangeType) -> Self {
        Self {
            version: version.into(),
            sdl: sdl.into(),
            created_by: None,
            declared_change_type: declared,
            notes: None,
        }
    }

    pub fn by(mut self, actor: impl Into<String>) -> Self {
        self.created_by = Some(actor.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivateOptions {
    /// Replay contract-test fixtures before committing
    pub run_contract_tests: bool,
    /// Abort activation when any fixture fails
    pub strict: bool,
}

impl From<&ContractTestConfig> for ActivateOptions {
    fn from(config: &ContractTestConfig) -> Self {
        Self {
            run_contract_tests: config.run_on_activate,
            strict: config.strict,
        }
    }
}

/// What an activation changed
#[derive(Debug, Clone)]
pub struct Activation {
    pub version: SchemaVersion,
    /// The version demoted to Deprecated, if one was Active
    pub previous: Option<Version>,
    /// Present when contract tests ran
    pub contract_tests: Option<ContractTestResults>,
}

/// One page of [`SchemaRegistry::list`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionPage {
    pub versions: Vec<SchemaVersion>,
    /// Rows matching the filter, across all pages
    pub total: usize,
}

/// Builder for [`SchemaRegistry`]
pub struct RegistryBuilder {
    store: Arc<dyn VersionStore>,
    settings: LifecycleConfig,
    retain_deprecated: usize,
    audit: Arc<dyn AuditSink>,
    tester: ContractTester,
}

impl RegistryBuilder {
    pub fn config(mut self, config: &RegistryConfig) -> Self {
        self.settings = config.registry.clone();
        self.retain_deprecated = config.cache.retain_deprecated;
        self
    }

    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    pub fn executor(mut self, executor: Arc<dyn QueryExecutor>) -> Self {
        self.tester = ContractTester::with_executor(executor);
        self
    }

    /// Build the registry and load its cache from the store
    pub fn build(self) -> Result<SchemaRegistry> {
        let registry = SchemaRegistry {
            store: self.store,
            cache: SchemaCache::new(self.retain_deprecated),
            checker: CompatibilityChecker::new(),
            tester: self.tester,
            audit: self.audit,
            writer: Mutex::new(()),
            settings: self.settings,
        };
        registry.reload(&Context::background())?;
        Ok(registry)
    }
}

/// The main schema registry
pub struct SchemaRegistry {
    store: Arc<dyn VersionStore>,
    cache: SchemaCache,
    checker: CompatibilityChecker,
    tester: ContractTester,
    audit: Arc<dyn AuditSink>,
    /// Serializes every mutation end to end
    writer: Mutex<()>,
    settings: LifecycleConfig,
}

impl SchemaRegistry {
    pub fn builder(store: Arc<dyn VersionStore>) -> RegistryBuilder {
        let defaults = RegistryConfig::default();
        RegistryBuilder {
            store,
            settings: defaults.registry,
            retain_deprecated: defaults.cache.retain_deprecated,
            audit: Arc::new(TracingAuditSink),
            tester: ContractTester::new(),
        }
    }

    /// Registry with default settings over `store`
    pub fn new(store: Arc<dyn VersionStore>) -> Result<Self> {
        Self::builder(store).build()
    }

    /// Open the file-backed registry described by `config`
    pub fn open(config: &RegistryConfig) -> Result<Self> {
        let store = FileVersionStore::open(config.store_path(), config.contracts_dir())
            .map_err(RegistryError::store("open"))?;
        Self::builder(Arc::new(store)).config(config).build()
    }

    // ------------------------------------------------------------------
    // Lifecycle operations
    // ------------------------------------------------------------------

    /// Register SDL as a new Draft version.
    ///
    /// Resubmitting the same SDL under the same version returns the stored
    /// record unchanged. The same version with different SDL, or the same
    /// SDL under a different version, is a conflict.
    pub fn submit(&self, submission: &Submission, ctx: &Context) -> Result<SchemaVersion> {
        let actor = self.actor(submission.created_by.as_deref(), ctx);
        let result = self.submit_inner(submission, &actor, ctx);
        let label = match &result {
            Ok(row) => row.version_string(),
            Err(_) => submission.version.clone(),
        };
        self.emit(AuditAction::Submit, &label, &actor, outcome(&result));
        result
    }

    fn submit_inner(&self, submission: &Submission, actor: &str, ctx: &Context) -> Result<SchemaVersion> {
        ctx.check("submit")?;
        sdl::parse(&submission.sdl)?;
        let checksum = Checksum::of_sdl(&submission.sdl);

        let _writer = self.writer.lock();
        let active = self.store.get_active().map_err(RegistryError::store("get_active"))?;

        let auto = submission.version.trim().is_empty();
        let version = if auto {
            if !self.settings.auto_version {
                return Err(RegistryError::InvalidVersion("a version is required".to_string()));
            }
            self.next_version(submission.declared_change_type)?
        } else {
            parse_version(&submission.version)?
        };

        if let Some(existing) = self.store.get_by_version(&version).map_err(RegistryError::store("get_by_version"))? {
            if existing.checksum == checksum {
                debug!(version = %version, "Resubmission matches stored checksum");
                return Ok(existing);
            }
            return Err(RegistryError::Conflict(format!(
                "version {} already exists with different SDL",
                version
            )));
        }
        if let Some(existing) = self.store.get_by_checksum(&checksum).map_err(RegistryError::store("get_by_checksum"))? {
            if auto {
                return Ok(existing);
            }
            return Err(RegistryError::Conflict(format!(
                "identical SDL already registered as version {}",
                existing.version
            )));
        }

        if let Some(active) = &active {
            if version <= active.version {
                return Err(RegistryError::InvalidVersion(format!(
                    "{} must be greater than the Active version {}",
                    version, active.version
                )));
            }
        }

        let mut row = SchemaVersion::draft(version, submission.sdl.clone(), actor, submission.declared_change_type);
        row.previous_version_id = active.as_ref().map(|a| a.id);
        row.notes = submission.notes.clone();

        ctx.check("submit")?;
        self.store.insert(&row).map_err(RegistryError::store("insert"))?;

        info!(
            version = %row.version,
            declared = %row.declared_change_type,
            checksum = row.checksum.short(),
            previous = ?active.as_ref().map(|a| a.version_string()),
            "Submitted schema version"
        );
        Ok(row)
    }

    /// Highest stored version bumped by `change`; `1.0.0` for an empty registry
    fn next_version(&self, change: ChangeType) -> Result<Version> {
        let (rows, _) = self
            .store
            .list_by_status(None, 0, 0)
            .map_err(RegistryError::store("list"))?;
        Ok(rows
            .iter()
            .map(|r| &r.version)
            .max()
            .map(|latest| bump(latest, change))
            .unwrap_or_else(|| Version::new(1, 0, 0)))
    }

    /// Compare a Draft against the Active schema and accept or reject it.
    ///
    /// Accepted versions become Inactive and are cached. A version whose
    /// inferred severity exceeds its declared one becomes Rejected and the
    /// report is returned inside [`RegistryError::Compatibility`].
    pub fn evaluate(&self, version: &str, ctx: &Context) -> Result<CompatibilityReport> {
        let actor = self.actor(None, ctx);
        let result = self.evaluate_inner(version, &actor, ctx);
        self.emit(AuditAction::Evaluate, version, &actor, outcome(&result));
        result
    }

    fn evaluate_inner(&self, version: &str, actor: &str, ctx: &Context) -> Result<CompatibilityReport> {
        ctx.check("evaluate")?;
        let version = parse_version(version)?;

        let _writer = self.writer.lock();
        let row = self.require(&version)?;
        if row.status != VersionStatus::Draft {
            return Err(RegistryError::State {
                version: row.version_string(),
                status: row.status,
                operation: "evaluate",
            });
        }

        let candidate = Arc::new(sdl::parse(&row.sdl)?);
        let active = self.store.get_active().map_err(RegistryError::store("get_active"))?;
        let report = match &active {
            Some(active) => {
                let current = self.schema_for(active)?;
                self.checker.compare(&current, &candidate)
            }
            None => CompatibilityReport::baseline(row.declared_change_type),
        };

        let accepted = report.inferred_change_type.within(row.declared_change_type);
        let status = if accepted {
            VersionStatus::Inactive
        } else {
            VersionStatus::Rejected
        };

        ctx.check("evaluate")?;
        self.store
            .apply(&[VersionUpdate::status(version.clone(), status).with_change_type(report.inferred_change_type)])
            .map_err(RegistryError::store("evaluate"))?;

        let mut record = ChangeRecord::new(
            ChangeRecordKind::Evaluation,
            active.as_ref().map(|a| a.version.clone()),
            version.clone(),
            report.inferred_change_type,
            actor,
        );
        record.breaking_changes = report.breaking_changes.clone();
        record.warnings = report.warnings.clone();

        if accepted {
            self.cache.insert(version.clone(), candidate);
        }
        self.record_history(&record);

        if accepted {
            info!(
                version = %version,
                inferred = %report.inferred_change_type,
                declared = %row.declared_change_type,
                warnings = report.warnings.len(),
                "Schema version accepted"
            );
            Ok(report)
        } else {
            warn!(
                version = %version,
                inferred = %report.inferred_change_type,
                declared = %row.declared_change_type,
                breaking = ?report.breaking_changes,
                "Schema version rejected"
            );
            Err(RegistryError::Compatibility {
                version: version.to_string(),
                declared: row.declared_change_type,
                report: Box::new(report),
            })
        }
    }

    /// Make an Inactive version the Active one, demoting the current Active
    /// version to Deprecated in the same store transaction.
    pub fn activate(&self, version: &str, options: ActivateOptions, ctx: &Context) -> Result<Activation> {
        let actor = self.actor(None, ctx);
        let result = self.activate_inner(version, options, &actor, ctx);
        self.emit(AuditAction::Activate, version, &actor, outcome(&result));
        result
    }

    fn activate_inner(&self, version: &str, options: ActivateOptions, actor: &str, ctx: &Context) -> Result<Activation> {
        ctx.check("activate")?;
        let version = parse_version(version)?;

        let _writer = self.writer.lock();
        let mut row = self.require(&version)?;
        if row.status != VersionStatus::Inactive {
            return Err(RegistryError::State {
                version: row.version_string(),
                status: row.status,
                operation: "activate",
            });
        }
        let schema = self.schema_for(&row)?;

        let contract_tests = if options.run_contract_tests {
            let results = self.run_fixtures(&schema)?;
            if !results.all_passed() {
                if options.strict {
                    return Err(RegistryError::ContractTests {
                        version: row.version_string(),
                        results: Box::new(results),
                    });
                }
                warn!(
                    version = %version,
                    failed = results.failed,
                    total = results.total,
                    "Activating despite contract test failures"
                );
            }
            Some(results)
        } else {
            None
        };

        let previous = self.store.get_active().map_err(RegistryError::store("get_active"))?;
        let now = Utc::now();
        let mut updates = Vec::with_capacity(2);
        if let Some(previous) = &previous {
            updates.push(VersionUpdate::status(previous.version.clone(), VersionStatus::Deprecated));
        }
        updates.push(VersionUpdate::status(version.clone(), VersionStatus::Active).activated_at(now));

        // Last point where cancellation is honored
        ctx.check("activate")?;
        self.store.apply(&updates).map_err(RegistryError::store("activate"))?;
        self.cache.set_active(version.clone(), schema);

        let previous = previous.map(|p| p.version);
        let record = ChangeRecord::new(
            ChangeRecordKind::Activation,
            previous.clone(),
            version.clone(),
            row.change_type,
            actor,
        );
        self.record_history(&record);

        info!(
            version = %version,
            previous = ?previous.as_ref().map(|p| p.to_string()),
            "Activated schema version"
        );

        row.status = VersionStatus::Active;
        row.activated_at = Some(now);
        Ok(Activation {
            version: row,
            previous,
            contract_tests,
        })
    }

    /// Step a version down: Active becomes Inactive, Inactive becomes
    /// Deprecated. Returns the new status.
    pub fn deactivate(&self, version: &str, ctx: &Context) -> Result<VersionStatus> {
        let actor = self.actor(None, ctx);
        let result = self.deactivate_inner(version, ctx);
        let outcome = match &result {
            Ok(VersionStatus::Inactive) => NO_ACTIVE_VERSION.to_string(),
            other => outcome(other),
        };
        self.emit(AuditAction::Deactivate, version, &actor, outcome);
        result
    }

    fn deactivate_inner(&self, version: &str, ctx: &Context) -> Result<VersionStatus> {
        ctx.check("deactivate")?;
        let version = parse_version(version)?;

        let _writer = self.writer.lock();
        let row = self.require(&version)?;
        let next = match row.status {
            VersionStatus::Active if !self.settings.allow_empty_active => {
                return Err(RegistryError::State {
                    version: row.version_string(),
                    status: row.status,
                    operation: "deactivate without a replacement",
                });
            }
            VersionStatus::Active => VersionStatus::Inactive,
            VersionStatus::Inactive => VersionStatus::Deprecated,
            status => {
                return Err(RegistryError::State {
                    version: row.version_string(),
                    status,
                    operation: "deactivate",
                })
            }
        };

        ctx.check("deactivate")?;
        self.store
            .apply(&[VersionUpdate::status(version.clone(), next)])
            .map_err(RegistryError::store("deactivate"))?;

        if next == VersionStatus::Inactive {
            self.cache.clear_active(&version);
            warn!(version = %version, "Deactivated the Active version; registry has no Active schema");
        } else {
            self.cache.deprecate(&version);
            info!(version = %version, "Deprecated schema version");
        }
        Ok(next)
    }

    /// Remove a version that was never Active and that nothing derives from
    pub fn delete(&self, version: &str, ctx: &Context) -> Result<()> {
        let actor = self.actor(None, ctx);
        let result = self.delete_inner(version, ctx);
        self.emit(AuditAction::Delete, version, &actor, outcome(&result));
        result
    }

    fn delete_inner(&self, version: &str, ctx: &Context) -> Result<()> {
        ctx.check("delete")?;
        let version = parse_version(version)?;

        let _writer = self.writer.lock();
        let row = self.require(&version)?;
        if row.is_active() {
            return Err(RegistryError::Conflict(format!("version {} is Active", version)));
        }
        if self.store.is_referenced(row.id).map_err(RegistryError::store("is_referenced"))? {
            return Err(RegistryError::Conflict(format!(
                "version {} is the previous version of another version",
                version
            )));
        }
        if row.was_ever_active() {
            return Err(RegistryError::Conflict(format!("version {} has been Active", version)));
        }

        ctx.check("delete")?;
        self.store.delete(&version).map_err(RegistryError::store("delete"))?;
        self.cache.remove(&version);
        info!(version = %version, status = %row.status, "Deleted schema version");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn get_active(&self) -> Result<SchemaVersion> {
        self.store
            .get_active()
            .map_err(RegistryError::store("get_active"))?
            .ok_or_else(|| RegistryError::NotFound("no Active schema version".to_string()))
    }

    pub fn get(&self, version: &str) -> Result<SchemaVersion> {
        self.require(&parse_version(version)?)
    }

    /// Newest first. `limit` 0 means all rows.
    pub fn list(&self, status: Option<VersionStatus>, limit: usize, offset: usize) -> Result<VersionPage> {
        let (versions, total) = self
            .store
            .list_by_status(status, limit, offset)
            .map_err(RegistryError::store("list"))?;
        Ok(VersionPage { versions, total })
    }

    /// Schema for a version hint. Empty resolves to the Active schema; any
    /// other hint must name a cached version.
    pub fn resolve(&self, hint: &str, ctx: &Context) -> Result<Arc<ParsedSchema>> {
        ctx.check("resolve")?;
        if hint.trim().is_empty() {
            return self
                .cache
                .resolve(None)
                .ok_or_else(|| RegistryError::NotFound("no Active schema version".to_string()));
        }
        let version = parse_version(hint)
            .map_err(|_| RegistryError::NotFound(format!("version {} is not loaded", hint.trim())))?;
        self.cache
            .resolve(Some(&version))
            .ok_or_else(|| RegistryError::NotFound(format!("version {} is not loaded", version)))
    }

    /// Rebuild the cache from the store. On failure the previous cache
    /// stays in place. Returns the number of cached versions.
    pub fn reload(&self, ctx: &Context) -> Result<usize> {
        ctx.check("reload")?;
        let _writer = self.writer.lock();

        let (rows, _) = self
            .store
            .list_by_status(None, 0, 0)
            .map_err(RegistryError::store("reload"))?;
        let next = CacheState::build(&rows, self.cache.retain_deprecated()).map_err(|e| {
            warn!(error = %e, "Cache rebuild failed; keeping previous cache");
            e
        })?;

        ctx.check("reload")?;
        self.cache.replace(next);
        let cached = self.cache.len();
        info!(rows = rows.len(), cached, "Schema cache reloaded");
        Ok(cached)
    }

    /// Evaluation and activation history involving `version`
    pub fn history(&self, version: &str) -> Result<Vec<ChangeRecord>> {
        let version = parse_version(version)?;
        self.require(&version)?;
        self.store.changes_for(&version).map_err(RegistryError::store("history"))
    }

    /// Cached versions in ascending order
    pub fn cached_versions(&self) -> Vec<Version> {
        self.cache.versions()
    }

    // ------------------------------------------------------------------
    // Stateless checks
    // ------------------------------------------------------------------

    /// Parse and validate SDL without storing it
    pub fn validate_sdl(&self, sdl: &str) -> Result<ParsedSchema> {
        sdl::parse(sdl)
    }

    /// Compare SDL against the Active schema without storing it. With no
    /// Active version there is nothing to break.
    pub fn check_compatibility(&self, sdl: &str) -> Result<CompatibilityReport> {
        let candidate = sdl::parse(sdl)?;
        Ok(match self.cache.resolve(None) {
            Some(active) => self.checker.compare(&active, &candidate),
            None => CompatibilityReport::baseline(ChangeType::Patch),
        })
    }

    /// Replay contract-test fixtures against a stored version
    pub fn run_contract_tests(&self, version: &str) -> Result<ContractTestResults> {
        let row = self.get(version)?;
        let schema = self.schema_for(&row)?;
        self.run_fixtures(&schema)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn require(&self, version: &Version) -> Result<SchemaVersion> {
        self.store
            .get_by_version(version)
            .map_err(RegistryError::store("get_by_version"))?
            .ok_or_else(|| RegistryError::NotFound(format!("version {}", version)))
    }

    /// Cached schema for a row, parsing its SDL on a miss
    fn schema_for(&self, row: &SchemaVersion) -> Result<Arc<ParsedSchema>> {
        match self.cache.resolve(Some(&row.version)) {
            Some(schema) => Ok(schema),
            None => Ok(Arc::new(sdl::parse(&row.sdl)?)),
        }
    }

    fn run_fixtures(&self, schema: &ParsedSchema) -> Result<ContractTestResults> {
        let fixtures = self
            .store
            .list_active_contract_tests()
            .map_err(RegistryError::store("list_contract_tests"))?;
        Ok(self.tester.run(schema, &fixtures))
    }

    /// History follows a committed transition; losing it does not undo the transition
    fn record_history(&self, record: &ChangeRecord) {
        if let Err(e) = self.store.record_change(record) {
            warn!(
                version = %record.to_version,
                kind = ?record.kind,
                error = %e,
                "Failed to record schema change history"
            );
        }
    }

    fn actor(&self, explicit: Option<&str>, ctx: &Context) -> String {
        explicit
            .or_else(|| ctx.actor())
            .unwrap_or(self.settings.default_author.as_str())
            .to_string()
    }

    fn emit(&self, action: AuditAction, version: &str, actor: &str, outcome: String) {
        self.audit.record(AuditEvent::new(action, version, actor, outcome));
    }
}

fn outcome<T>(result: &Result<T>) -> String {
    match result {
        Ok(_) => "ok".to_string(),
        Err(e) => e.kind().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::tests::RecordingSink;
    use crate::contract::ContractTest;
    use crate::error::{ErrorKind, StoreError, StoreResult};
    use crate::store::MemoryVersionStore;
    use uuid::Uuid;

    const V1: &str = "type Query { name: String }";
    const V2: &str = "type Query { name: String, age: Int }";
    const V3: &str = "type Query { age: Int }";

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new(Arc::new(MemoryVersionStore::new())).unwrap()
    }

    fn ctx() -> Context {
        Context::background().with_actor("tester")
    }

    fn promote(registry: &SchemaRegistry, version: &str, sdl: &str, declared: ChangeType) {
        registry.submit(&Submission::new(version, sdl, declared), &ctx()).unwrap();
        registry.evaluate(version, &ctx()).unwrap();
        registry.activate(version, ActivateOptions::default(), &ctx()).unwrap();
    }

    #[test]
    fn test_first_version_lifecycle() {
        let registry = registry();
        let row = registry.submit(&Submission::new("v1", V1, ChangeType::Major), &ctx()).unwrap();
        assert_eq!(row.status, VersionStatus::Draft);
        assert_eq!(row.version, Version::new(1, 0, 0));
        assert_eq!(row.created_by, "tester");
        assert!(row.previous_version_id.is_none());

        let report = registry.evaluate("v1", &ctx()).unwrap();
        assert!(report.compatible);
        assert_eq!(registry.get("v1").unwrap().status, VersionStatus::Inactive);

        let activation = registry.activate("v1", ActivateOptions::default(), &ctx()).unwrap();
        assert!(activation.previous.is_none());
        assert_eq!(registry.get_active().unwrap().version, Version::new(1, 0, 0));
    }

    #[test]
    fn test_minor_addition_then_activate() {
        let registry = registry();
        promote(&registry, "v1", V1, ChangeType::Major);

        let v2 = registry.submit(&Submission::new("v2", V2, ChangeType::Minor), &ctx()).unwrap();
        assert_eq!(v2.previous_version_id, Some(registry.get("v1").unwrap().id));
        let report = registry.evaluate("v2", &ctx()).unwrap();
        assert!(report.compatible);
        assert_eq!(report.inferred_change_type, ChangeType::Minor);

        let activation = registry.activate("v2", ActivateOptions::default(), &ctx()).unwrap();
        assert_eq!(activation.previous, Some(Version::new(1, 0, 0)));
        assert_eq!(registry.get("v1").unwrap().status, VersionStatus::Deprecated);
        assert_eq!(registry.get("v2").unwrap().status, VersionStatus::Active);

        assert!(registry.resolve("v1", &ctx()).is_ok());
        assert_eq!(registry.resolve("", &ctx()).unwrap(), registry.resolve("v2", &ctx()).unwrap());
    }

    #[test]
    fn test_undeclared_breaking_change_rejected() {
        let registry = registry();
        promote(&registry, "v1", V1, ChangeType::Major);
        promote(&registry, "v2", V2, ChangeType::Minor);

        registry.submit(&Submission::new("v3", V3, ChangeType::Minor), &ctx()).unwrap();
        let err = registry.evaluate("v3", &ctx()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Compatibility);
        let report = err.report().unwrap();
        assert!(!report.compatible);
        assert_eq!(report.breaking_changes, vec!["Field 'Query.name' removed"]);
        assert_eq!(registry.get("v3").unwrap().status, VersionStatus::Rejected);
        assert_eq!(registry.get("v3").unwrap().change_type, ChangeType::Major);
    }

    #[test]
    fn test_declared_major_accepts_breaking_change() {
        let registry = registry();
        promote(&registry, "v1", V1, ChangeType::Major);
        registry.submit(&Submission::new("v2", V3, ChangeType::Major), &ctx()).unwrap();
        let report = registry.evaluate("v2", &ctx()).unwrap();
        assert!(!report.compatible);
        assert_eq!(registry.get("v2").unwrap().status, VersionStatus::Inactive);
    }

    #[test]
    fn test_resubmission_is_idempotent() {
        let registry = registry();
        let first = registry.submit(&Submission::new("v1", V1, ChangeType::Major), &ctx()).unwrap();
        let again = registry.submit(&Submission::new("1.0.0", V1, ChangeType::Major), &ctx()).unwrap();
        assert_eq!(first.id, again.id);

        let err = registry.submit(&Submission::new("v1", V2, ChangeType::Major), &ctx()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = registry.submit(&Submission::new("v5", V1, ChangeType::Major), &ctx()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_submit_rejects_bad_input() {
        let registry = registry();
        let parse = registry.submit(&Submission::new("v1", "type Query {", ChangeType::Major), &ctx());
        assert_eq!(parse.unwrap_err().kind(), ErrorKind::Parse);
        let invalid = registry.submit(&Submission::new("v1", "type Person { a: Int }", ChangeType::Major), &ctx());
        assert_eq!(invalid.unwrap_err().kind(), ErrorKind::Validation);

        promote(&registry, "v2", V1, ChangeType::Major);
        let older = registry.submit(&Submission::new("v1.5", V2, ChangeType::Minor), &ctx());
        assert!(matches!(older, Err(RegistryError::InvalidVersion(_))));
    }

    #[test]
    fn test_auto_version() {
        let registry = registry();
        let first = registry.submit(&Submission::new("", V1, ChangeType::Major), &ctx()).unwrap();
        assert_eq!(first.version, Version::new(1, 0, 0));
        registry.evaluate("1.0.0", &ctx()).unwrap();
        registry.activate("1.0.0", ActivateOptions::default(), &ctx()).unwrap();

        let next = registry.submit(&Submission::new("", V2, ChangeType::Minor), &ctx()).unwrap();
        assert_eq!(next.version, Version::new(1, 1, 0));
        let retry = registry.submit(&Submission::new("", V2, ChangeType::Minor), &ctx()).unwrap();
        assert_eq!(retry.id, next.id);
    }

    #[test]
    fn test_state_errors() {
        let registry = registry();
        registry.submit(&Submission::new("v1", V1, ChangeType::Major), &ctx()).unwrap();
        let err = registry.activate("v1", ActivateOptions::default(), &ctx()).unwrap_err();
        assert!(matches!(err, RegistryError::State { status: VersionStatus::Draft, .. }));

        registry.evaluate("v1", &ctx()).unwrap();
        assert_eq!(registry.evaluate("v1", &ctx()).unwrap_err().kind(), ErrorKind::State);
        assert_eq!(
            registry.activate("v9", ActivateOptions::default(), &ctx()).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_delete_guards() {
        let registry = registry();
        promote(&registry, "v1", V1, ChangeType::Major);
        registry.submit(&Submission::new("v2", V2, ChangeType::Minor), &ctx()).unwrap();

        let active = registry.delete("v1", &ctx()).unwrap_err();
        assert_eq!(active.kind(), ErrorKind::Conflict);

        registry.delete("v2", &ctx()).unwrap();
        assert_eq!(registry.get("v2").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_deactivate_paths() {
        let registry = registry();
        promote(&registry, "v1", V1, ChangeType::Major);

        assert_eq!(registry.deactivate("v1", &ctx()).unwrap(), VersionStatus::Inactive);
        assert_eq!(registry.get_active().unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(registry.resolve("", &ctx()).unwrap_err().kind(), ErrorKind::NotFound);
        assert!(registry.resolve("v1", &ctx()).is_ok());

        assert_eq!(registry.deactivate("v1", &ctx()).unwrap(), VersionStatus::Deprecated);
        assert_eq!(registry.deactivate("v1", &ctx()).unwrap_err().kind(), ErrorKind::State);
    }

    #[test]
    fn test_empty_active_can_be_forbidden() {
        let mut config = RegistryConfig::default();
        config.registry.allow_empty_active = false;
        let registry = SchemaRegistry::builder(Arc::new(MemoryVersionStore::new()))
            .config(&config)
            .build()
            .unwrap();
        promote(&registry, "v1", V1, ChangeType::Major);
        assert_eq!(registry.deactivate("v1", &ctx()).unwrap_err().kind(), ErrorKind::State);
        assert!(registry.get_active().is_ok());
    }

    #[test]
    fn test_strict_contract_tests_block_activation() {
        let store = Arc::new(MemoryVersionStore::new());
        store.add_contract_test(ContractTest::new("needs name", "{ name }"));
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
        assert_eq!(activation.contract_tests.unwrap().failed, 1);
    }

    #[test]
    fn test_cancelled_activation_changes_nothing() {
        let registry = registry();
        registry.submit(&Submission::new("v1", V1, ChangeType::Major), &ctx()).unwrap();
        registry.evaluate("v1", &ctx()).unwrap();

        let cancelled = ctx();
        cancelled.cancel_handle().cancel();
        let err = registry.activate("v1", ActivateOptions::default(), &cancelled).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(registry.get("v1").unwrap().status, VersionStatus::Inactive);
        assert!(registry.resolve("", &ctx()).is_err());
    }

    #[test]
    fn test_audit_and_history() {
        let sink = Arc::new(RecordingSink::default());
        let registry = SchemaRegistry::builder(Arc::new(MemoryVersionStore::new()))
            .audit_sink(sink.clone())
            .build()
            .unwrap();
        promote(&registry, "v1", V1, ChangeType::Major);
        registry.deactivate("v1", &ctx()).unwrap();

        let events = sink.events.lock();
        let actions: Vec<AuditAction> = events.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![AuditAction::Submit, AuditAction::Evaluate, AuditAction::Activate, AuditAction::Deactivate]
        );
        assert!(events.iter().all(|e| e.actor == "tester"));
        assert_eq!(events[3].outcome, NO_ACTIVE_VERSION);

        let history = registry.history("v1").unwrap();
        let kinds: Vec<ChangeRecordKind> = history.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![ChangeRecordKind::Evaluation, ChangeRecordKind::Activation]);
    }

    #[test]
    fn test_reload_rebuilds_from_store() {
        let store = Arc::new(MemoryVersionStore::new());
        let registry = SchemaRegistry::new(store.clone()).unwrap();
        promote(&registry, "v1", V1, ChangeType::Major);

        let fresh = SchemaRegistry::new(store).unwrap();
        assert_eq!(fresh.cached_versions(), vec![Version::new(1, 0, 0)]);
        assert_eq!(fresh.resolve("", &ctx()).unwrap(), registry.resolve("v1", &ctx()).unwrap());
    }

    /// Memory store whose history writes always fail
    struct NoHistoryStore(MemoryVersionStore);

    impl VersionStore for NoHistoryStore {
        fn insert(&self, version: &SchemaVersion) -> StoreResult<()> {
            self.0.insert(version)
        }
        fn get_by_version(&self, version: &Version) -> StoreResult<Option<SchemaVersion>> {
            self.0.get_by_version(version)
        }
        fn get_by_checksum(&self, checksum: &Checksum) -> StoreResult<Option<SchemaVersion>> {
            self.0.get_by_checksum(checksum)
        }
        fn get_active(&self) -> StoreResult<Option<SchemaVersion>> {
            self.0.get_active()
        }
        fn list_by_status(
            &self,
            status: Option<VersionStatus>,
            limit: usize,
            offset: usize,
        ) -> StoreResult<(Vec<SchemaVersion>, usize)> {
            self.0.list_by_status(status, limit, offset)
        }
        fn apply(&self, updates: &[VersionUpdate]) -> StoreResult<()> {
            self.0.apply(updates)
        }
        fn delete(&self, version: &Version) -> StoreResult<()> {
            self.0.delete(version)
        }
        fn is_referenced(&self, id: Uuid) -> StoreResult<bool> {
            self.0.is_referenced(id)
        }
        fn record_change(&self, _record: &ChangeRecord) -> StoreResult<()> {
            Err(StoreError::Constraint("history unavailable".to_string()))
        }
        fn changes_for(&self, version: &Version) -> StoreResult<Vec<ChangeRecord>> {
            self.0.changes_for(version)
        }
        fn list_active_contract_tests(&self) -> StoreResult<Vec<ContractTest>> {
            self.0.list_active_contract_tests()
        }
    }

    #[test]
    fn test_history_failure_does_not_undo_transitions() {
        let registry = SchemaRegistry::new(Arc::new(NoHistoryStore(MemoryVersionStore::new()))).unwrap();
        registry.submit(&Submission::new("v1", V1, ChangeType::Major), &ctx()).unwrap();

        assert!(registry.evaluate("v1", &ctx()).is_ok());
        assert_eq!(registry.get("v1").unwrap().status, VersionStatus::Inactive);
        assert!(registry.resolve("v1", &ctx()).is_ok());

        let activation = registry.activate("v1", ActivateOptions::default(), &ctx()).unwrap();
        assert_eq!(activation.version.status, VersionStatus::Active);
        assert_eq!(registry.resolve("", &ctx()).unwrap(), registry.resolve("v1", &ctx()).unwrap());
        assert!(registry.history("v1").unwrap().is_empty());
    }

    #[test]
    fn test_resolve_unknown_hint_is_not_found() {
        let registry = registry();
        promote(&registry, "v1", V1, ChangeType::Major);
        assert_eq!(registry.resolve("latest", &ctx()).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(registry.resolve("v7", &ctx()).unwrap_err().kind(), ErrorKind::NotFound);
        assert!(registry.resolve(" v1 ", &ctx()).is_ok());
    }

    #[test]
    fn test_failed_reload_keeps_previous_cache() {
        let store = Arc::new(MemoryVersionStore::new());
        let registry = SchemaRegistry::new(store.clone()).unwrap();
        promote(&registry, "v1", V1, ChangeType::Major);
        let before = registry.resolve("", &ctx()).unwrap();

        let broken = SchemaVersion::draft(Version::new(2, 0, 0), "type Query {", "tester", ChangeType::Minor);
        store.insert(&broken).unwrap();
        store
            .apply(&[VersionUpdate::status(Version::new(2, 0, 0), VersionStatus::Inactive)])
            .unwrap();

        assert!(registry.reload(&ctx()).is_err());
        assert_eq!(registry.resolve("", &ctx()).unwrap(), before);
        assert_eq!(registry.cached_versions(), vec![Version::new(1, 0, 0)]);
    }

    #[test]
    fn test_check_compatibility_is_read_only() {
        let registry = registry();
        assert!(registry.check_compatibility(V3).unwrap().compatible);
        promote(&registry, "v1", V1, ChangeType::Major);
        let report = registry.check_compatibility(V3).unwrap();
        assert!(!report.compatible);
        assert_eq!(registry.list(None, 0, 0).unwrap().total, 1);
        assert!(registry.validate_sdl("type Nope { a: Int }").is_err());
    }
}
