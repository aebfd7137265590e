//! File-backed version store
//!
//! All rows live in one JSON document. Every mutation builds the next state
//! in memory, writes it to a sibling temp file and renames it over the
//! original, so a crash leaves either the old or the new document on disk.
//!
//! Contract-test fixtures are read from `*.json` files under an optional
//! contracts directory; each file holds one fixture or an array of them.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use semver::Version;
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::checksum::Checksum;
use crate::contract::ContractTest;
use crate::error::{StoreError, StoreResult};
use crate::version::{SchemaVersion, VersionStatus};

use super::state::StoreState;
use super::{ChangeRecord, VersionStore, VersionUpdate};

pub struct FileVersionStore {
    path: PathBuf,
    contracts_dir: Option<PathBuf>,
    state: RwLock<StoreState>,
}

impl FileVersionStore {
    /// Open the store at `path`, creating parent directories. A missing
    /// state file is an empty store.
    pub fn open(path: impl AsRef<Path>, contracts_dir: Option<PathBuf>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let state = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            StoreState::default()
        };
        debug!(path = %path.display(), versions = state.len(), "Opened version store");

        Ok(Self {
            path,
            contracts_dir,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `change` against a copy of the state and persist the result.
    /// The in-memory state is replaced only after the file is in place.
    fn mutate<T>(&self, change: impl FnOnce(&mut StoreState) -> StoreResult<T>) -> StoreResult<T> {
        let mut guard = self.state.write();
        let mut next = guard.clone();
        let out = change(&mut next)?;
        self.persist(&next)?;
        *guard = next;
        Ok(out)
    }

    fn persist(&self, state: &StoreState) -> StoreResult<()> {
        let content = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn load_fixtures(dir: &Path) -> StoreResult<Vec<ContractTest>> {
        let mut tests = Vec::new();
        for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(|e| StoreError::Io(e.into()))?;
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let content = fs::read_to_string(path)?;
            let parsed = serde_json::from_str::<serde_json::Value>(&content).and_then(|value| {
                if value.is_array() {
                    serde_json::from_value::<Vec<ContractTest>>(value)
                } else {
                    serde_json::from_value::<ContractTest>(value).map(|t| vec![t])
                }
            });
            match parsed {
                Ok(found) => tests.extend(found),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable contract fixture");
                }
            }
        }
        Ok(tests)
    }
}

impl VersionStore for FileVersionStore {
    fn insert(&self, version: &SchemaVersion) -> StoreResult<()> {
        self.mutate(|state| state.insert(version))
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
        self.mutate(|state| state.apply(updates))
    }

    fn delete(&self, version: &Version) -> StoreResult<()> {
        self.mutate(|state| state.delete(version))
    }

    fn is_referenced(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.state.read().is_referenced(id))
    }

    fn record_change(&self, record: &ChangeRecord) -> StoreResult<()> {
        self.mutate(|state| {
            state.record_change(record);
            Ok(())
        })
    }

    fn changes_for(&self, version: &Version) -> StoreResult<Vec<ChangeRecord>> {
        Ok(self.state.read().changes_for(version))
    }

    fn list_active_contract_tests(&self) -> StoreResult<Vec<ContractTest>> {
        let Some(dir) = self.contracts_dir.as_deref() else {
            return Ok(Vec::new());
        };
        if !dir.exists() {
            return Ok(Vec::new());
        }
        Ok(Self::load_fixtures(dir)?.into_iter().filter(|t| t.is_active).collect())
    }
}
