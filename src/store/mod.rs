//! Version store adapter
//!
//! The registry's read/write contract with persistence. Implementations
//! must apply a batch of [`VersionUpdate`]s atomically: either every row
//! changes or none does. No committed state may contain two Active rows.

mod file;
mod memory;
mod state;

pub use file::FileVersionStore;
pub use memory::MemoryVersionStore;

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checksum::Checksum;
use crate::contract::ContractTest;
use crate::error::StoreResult;
use crate::version::{ChangeType, SchemaVersion, VersionStatus};

/// A single-row change applied inside a store transaction
#[derive(Debug, Clone, PartialEq)]
pub struct VersionUpdate {
    pub version: Version,
    pub status: Option<VersionStatus>,
    pub change_type: Option<ChangeType>,
    pub activated_at: Option<DateTime<Utc>>,
}

impl VersionUpdate {
    pub fn status(version: Version, status: VersionStatus) -> Self {
        Self {
            version,
            status: Some(status),
            change_type: None,
            activated_at: None,
        }
    }

    pub fn with_change_type(mut self, change_type: ChangeType) -> Self {
        self.change_type = Some(change_type);
        self
    }

    pub fn activated_at(mut self, at: DateTime<Utc>) -> Self {
        self.activated_at = Some(at);
        self
    }
}

/// What produced a change record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeRecordKind {
    Evaluation,
    Activation,
}

/// An entry in the schema change history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: Uuid,
    /// Version compared against or replaced; None for the first version
    pub from_version: Option<Version>,
    pub to_version: Version,
    pub kind: ChangeRecordKind,
    pub change_type: ChangeType,
    #[serde(default)]
    pub breaking_changes: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

impl ChangeRecord {
    pub fn new(
        kind: ChangeRecordKind,
        from_version: Option<Version>,
        to_version: Version,
        change_type: ChangeType,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            from_version,
            to_version,
            kind,
            change_type,
            breaking_changes: Vec::new(),
            warnings: Vec::new(),
            created_at: Utc::now(),
            created_by: created_by.into(),
        }
    }

    /// Whether this record concerns `version` on either side
    pub fn involves(&self, version: &Version) -> bool {
        &self.to_version == version || self.from_version.as_ref() == Some(version)
    }
}

/// Persistence contract consumed by the registry
pub trait VersionStore: Send + Sync {
    /// Insert a new row. Fails on a duplicate version or checksum.
    fn insert(&self, version: &SchemaVersion) -> StoreResult<()>;

    fn get_by_version(&self, version: &Version) -> StoreResult<Option<SchemaVersion>>;

    fn get_by_checksum(&self, checksum: &Checksum) -> StoreResult<Option<SchemaVersion>>;

    fn get_active(&self) -> StoreResult<Option<SchemaVersion>>;

    /// Newest first (created_at, then version, descending). A `limit` of 0
    /// means no limit. Returns the page and the total matching row count.
    fn list_by_status(
        &self,
        status: Option<VersionStatus>,
        limit: usize,
        offset: usize,
    ) -> StoreResult<(Vec<SchemaVersion>, usize)>;

    /// Apply all updates in one transaction
    fn apply(&self, updates: &[VersionUpdate]) -> StoreResult<()>;

    fn delete(&self, version: &Version) -> StoreResult<()>;

    /// Whether any row's `previous_version_id` points at `id`
    fn is_referenced(&self, id: Uuid) -> StoreResult<bool>;

    fn record_change(&self, record: &ChangeRecord) -> StoreResult<()>;

    /// History entries involving `version`, oldest first
    fn changes_for(&self, version: &Version) -> StoreResult<Vec<ChangeRecord>>;

    fn list_active_contract_tests(&self) -> StoreResult<Vec<ContractTest>>;
}
