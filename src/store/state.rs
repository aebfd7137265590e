//! Row set shared by the in-memory and file-backed stores

use std::collections::BTreeMap;

use chrono::Utc;
use semver::Version;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checksum::Checksum;
use crate::error::{StoreError, StoreResult};
use crate::version::{SchemaVersion, VersionStatus};

use super::{ChangeRecord, VersionUpdate};

/// On-disk layout of the state file
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    versions: Vec<SchemaVersion>,
    #[serde(default)]
    changes: Vec<ChangeRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "StateFile", into = "StateFile")]
pub(crate) struct StoreState {
    versions: BTreeMap<Version, SchemaVersion>,
    changes: Vec<ChangeRecord>,
}

impl From<StateFile> for StoreState {
    fn from(file: StateFile) -> Self {
        Self {
            versions: file.versions.into_iter().map(|v| (v.version.clone(), v)).collect(),
            changes: file.changes,
        }
    }
}

impl From<StoreState> for StateFile {
    fn from(state: StoreState) -> Self {
        Self {
            versions: state.versions.into_values().collect(),
            changes: state.changes,
        }
    }
}

impl StoreState {
    pub(crate) fn insert(&mut self, version: &SchemaVersion) -> StoreResult<()> {
        if self.versions.contains_key(&version.version) {
            return Err(StoreError::DuplicateVersion(version.version_string()));
        }
        if self.get_by_checksum(&version.checksum).is_some() {
            return Err(StoreError::DuplicateChecksum(version.checksum.short().to_string()));
        }
        if version.is_active() && self.get_active().is_some() {
            return Err(StoreError::Constraint(format!(
                "cannot insert {} as a second Active version",
                version.version
            )));
        }
        self.versions.insert(version.version.clone(), version.clone());
        Ok(())
    }

    pub(crate) fn get_by_version(&self, version: &Version) -> Option<&SchemaVersion> {
        self.versions.get(version)
    }

    pub(crate) fn get_by_checksum(&self, checksum: &Checksum) -> Option<&SchemaVersion> {
        self.versions.values().find(|v| &v.checksum == checksum)
    }

    pub(crate) fn get_active(&self) -> Option<&SchemaVersion> {
        self.versions.values().find(|v| v.is_active())
    }

    pub(crate) fn list_by_status(
        &self,
        status: Option<VersionStatus>,
        limit: usize,
        offset: usize,
    ) -> (Vec<SchemaVersion>, usize) {
        let mut matching: Vec<&SchemaVersion> = self
            .versions
            .values()
            .filter(|v| status.map_or(true, |s| v.status == s))
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.version.cmp(&a.version))
        });

        let total = matching.len();
        let take = if limit == 0 { usize::MAX } else { limit };
        let page = matching.into_iter().skip(offset).take(take).cloned().collect();
        (page, total)
    }

    /// Apply updates to a scratch copy and commit only if every row exists
    /// and at most one row ends up Active.
    pub(crate) fn apply(&mut self, updates: &[VersionUpdate]) -> StoreResult<()> {
        let mut next = self.versions.clone();
        let now = Utc::now();
        for update in updates {
            let row = next
                .get_mut(&update.version)
                .ok_or_else(|| StoreError::MissingRow(update.version.to_string()))?;
            if let Some(status) = update.status {
                row.status = status;
            }
            if let Some(change_type) = update.change_type {
                row.change_type = change_type;
            }
            if let Some(at) = update.activated_at {
                row.activated_at = Some(at);
            }
            row.updated_at = now;
        }

        let active: Vec<String> = next
            .values()
            .filter(|v| v.is_active())
            .map(|v| v.version_string())
            .collect();
        if active.len() > 1 {
            return Err(StoreError::Constraint(format!(
                "transaction would leave {} Active versions ({})",
                active.len(),
                active.join(", ")
            )));
        }

        self.versions = next;
        Ok(())
    }

    pub(crate) fn delete(&mut self, version: &Version) -> StoreResult<()> {
        self.versions
            .remove(version)
            .map(|_| ())
            .ok_or_else(|| StoreError::MissingRow(version.to_string()))
    }

    pub(crate) fn is_referenced(&self, id: Uuid) -> bool {
        self.versions.values().any(|v| v.previous_version_id == Some(id))
    }

    pub(crate) fn record_change(&mut self, record: &ChangeRecord) {
        self.changes.push(record.clone());
    }

    pub(crate) fn changes_for(&self, version: &Version) -> Vec<ChangeRecord> {
        let mut records: Vec<ChangeRecord> = self.changes.iter().filter(|r| r.involves(version)).cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        records
    }

    pub(crate) fn len(&self) -> usize {
        self.versions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::ChangeType;

    fn row(version: &str, sdl: &str) -> SchemaVersion {
        SchemaVersion::draft(Version::parse(version).unwrap(), sdl, "tester", ChangeType::Minor)
    }

    #[test]
    fn test_unique_version_and_checksum() {
        let mut state = StoreState::default();
        state.insert(&row("1.0.0", "type Query { a: Int }")).unwrap();
        assert!(matches!(
            state.insert(&row("1.0.0", "type Query { b: Int }")),
            Err(StoreError::DuplicateVersion(_))
        ));
        assert!(matches!(
            state.insert(&row("2.0.0", "type Query { a: Int }")),
            Err(StoreError::DuplicateChecksum(_))
        ));
    }

    #[test]
    fn test_apply_rejects_two_active() {
        let mut state = StoreState::default();
        state.insert(&row("1.0.0", "type Query { a: Int }")).unwrap();
        state.insert(&row("2.0.0", "type Query { b: Int }")).unwrap();
        let v1 = Version::new(1, 0, 0);
        let v2 = Version::new(2, 0, 0);

        state.apply(&[VersionUpdate::status(v1.clone(), VersionStatus::Active)]).unwrap();
        let err = state
            .apply(&[VersionUpdate::status(v2.clone(), VersionStatus::Active)])
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
        assert_eq!(state.get_by_version(&v2).unwrap().status, VersionStatus::Draft);

        state
            .apply(&[
                VersionUpdate::status(v1.clone(), VersionStatus::Deprecated),
                VersionUpdate::status(v2.clone(), VersionStatus::Active),
            ])
            .unwrap();
        assert_eq!(state.get_active().unwrap().version, v2);
    }

    #[test]
    fn test_apply_missing_row_changes_nothing() {
        let mut state = StoreState::default();
        state.insert(&row("1.0.0", "type Query { a: Int }")).unwrap();
        let err = state
            .apply(&[
                VersionUpdate::status(Version::new(1, 0, 0), VersionStatus::Inactive),
                VersionUpdate::status(Version::new(9, 0, 0), VersionStatus::Active),
            ])
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingRow(_)));
        assert_eq!(state.get_by_version(&Version::new(1, 0, 0)).unwrap().status, VersionStatus::Draft);
    }

    #[test]
    fn test_list_newest_first_with_paging() {
        let mut state = StoreState::default();
        for (i, v) in ["1.0.0", "1.1.0", "1.2.0"].iter().enumerate() {
            let mut r = row(v, &format!("type Query {{ f{}: Int }}", i));
            r.created_at = Utc::now() + chrono::Duration::seconds(i as i64);
            state.insert(&r).unwrap();
        }
        let (page, total) = state.list_by_status(None, 2, 0);
        assert_eq!(total, 3);
        let versions: Vec<String> = page.iter().map(|v| v.version_string()).collect();
        assert_eq!(versions, vec!["1.2.0", "1.1.0"]);

        let (page, _) = state.list_by_status(None, 0, 2);
        assert_eq!(page[0].version_string(), "1.0.0");

        let (page, total) = state.list_by_status(Some(VersionStatus::Active), 10, 0);
        assert!(page.is_empty());
        assert_eq!(total, 0);
    }

    #[test]
    fn test_state_file_roundtrip() {
        let mut state = StoreState::default();
        state.insert(&row("1.0.0", "type Query { a: Int }")).unwrap();
        let json = serde_json::to_string(&state).unwrap();
        let loaded: StoreState = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.get_by_version(&Version::new(1, 0, 0)).is_some());
    }
}
