//! In-process version store

use parking_lot::RwLock;
use semver::Version;
use uuid::Uuid;

use crate::checksum::Checksum;
use crate::contract::ContractTest;
use crate::error::StoreResult;
use crate::version::{SchemaVersion, VersionStatus};

use super::state::StoreState;
use super::{ChangeRecord, VersionStore, VersionUpdate};

/// Store holding every row in memory. Transactions are applied under a
/// single write lock, so readers never observe a half-applied batch.
#[derive(Debug, Default)]
pub struct MemoryVersionStore {
    state: RwLock<StoreState>,
    contract_tests: RwLock<Vec<ContractTest>>,
}

impl MemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed contract-test fixtures
    pub fn with_contract_tests(tests: Vec<ContractTest>) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            contract_tests: RwLock::new(tests),
        }
    }

    pub fn add_contract_test(&self, test: ContractTest) {
        self.contract_tests.write().push(test);
    }
}

impl VersionStore for MemoryVersionStore {
    fn insert(&self, version: &SchemaVersion) -> StoreResult<()> {
        self.state.write().insert(version)
    }

    fn get_by_version(&self, version: &Version) -> StoreResult<Option<SchemaVersion>> {
        Ok(self.state.read().get_by_version(version).cloned())
    }

    fn get_by_checksum(&self, checksum: &Checksum) -> StoreResult<Option<SchemaVersion>> {
        Ok(self.state.read().get_by_checksum(checksum).cloned())
    }

    fn get_active(&self) -> StoreResult<Option<SchemaVersion>> {
        Ok(self.state.read().get_active().cloned())
    }

    fn list_by_status(
        &self,
        status: Option<VersionStatus>,
        limit: usize,
        offset: usize,
    ) -> StoreResult<(Vec<SchemaVersion>, usize)> {
        Ok(self.state.read().list_by_status(status, limit, offset))
    }

    fn apply(&self, updates: &[VersionUpdate]) -> StoreResult<()> {
        self.state.write().apply(updates)
    }

    fn delete(&self, version: &Version) -> StoreResult<()> {
        self.state.write().delete(version)
    }

    fn is_referenced(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.state.read().is_referenced(id))
    }

    fn record_change(&self, record: &ChangeRecord) -> StoreResult<()> {
        self.state.write().record_change(record);
        Ok(())
    }

    fn changes_for(&self, version: &Version) -> StoreResult<Vec<ChangeRecord>> {
        Ok(self.state.read().changes_for(version))
    }

    fn list_active_contract_tests(&self) -> StoreResult<Vec<ContractTest>> {
        Ok(self
            .contract_tests
            .read()
            .iter()
            .filter(|t| t.is_active)
            .cloned()
            .collect())
    }
}
