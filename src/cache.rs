//! In-memory multi-version schema cache
//!
//! Serves [`ParsedSchema`] by version on the request path. Reads take the
//! read side of one `RwLock` and never block each other; mutations hold the
//! write side only long enough to swap map entries, never across I/O or
//! parsing.
//!
//! Retention: the Active version, every Inactive version, and the
//! `retain_deprecated` most recently deprecated versions. Draft and
//! Rejected versions are never cached.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use semver::Version;
use tracing::debug;

use crate::error::Result;
use crate::schema::ParsedSchema;
use crate::sdl;
use crate::version::{SchemaVersion, VersionStatus};

#[derive(Debug, Default)]
pub(crate) struct CacheState {
    schemas: HashMap<Version, Arc<ParsedSchema>>,
    active: Option<Version>,
    /// Most recently deprecated first
    deprecated: VecDeque<Version>,
}

impl CacheState {
    /// Parse every retained row. Fails on the first SDL that no longer parses.
    pub(crate) fn build(rows: &[SchemaVersion], retain_deprecated: usize) -> Result<Self> {
        let mut state = CacheState::default();

        let mut deprecated: Vec<&SchemaVersion> = rows.iter().filter(|r| r.status == VersionStatus::Deprecated).collect();
        deprecated.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| b.version.cmp(&a.version)));

        for row in rows {
            match row.status {
                VersionStatus::Active => {
                    state.active = Some(row.version.clone());
                }
                VersionStatus::Inactive => {}
                _ => continue,
            }
            state.schemas.insert(row.version.clone(), Arc::new(sdl::parse(&row.sdl)?));
        }
        for row in deprecated.into_iter().take(retain_deprecated) {
            state.schemas.insert(row.version.clone(), Arc::new(sdl::parse(&row.sdl)?));
            state.deprecated.push_back(row.version.clone());
        }
        Ok(state)
    }
}

pub struct SchemaCache {
    state: RwLock<CacheState>,
    retain_deprecated: usize,
}

impl SchemaCache {
    pub fn new(retain_deprecated: usize) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            retain_deprecated,
        }
    }

    pub fn retain_deprecated(&self) -> usize {
        self.retain_deprecated
    }

    /// `None` resolves to the Active schema
    pub fn resolve(&self, version: Option<&Version>) -> Option<Arc<ParsedSchema>> {
        let state = self.state.read();
        let key = match version {
            Some(v) => v,
            None => state.active.as_ref()?,
        };
        state.schemas.get(key).cloned()
    }

    pub fn active_version(&self) -> Option<Version> {
        self.state.read().active.clone()
    }

    pub fn contains(&self, version: &Version) -> bool {
        self.state.read().schemas.contains_key(version)
    }

    /// Cached versions in ascending order
    pub fn versions(&self) -> Vec<Version> {
        let mut versions: Vec<Version> = self.state.read().schemas.keys().cloned().collect();
        versions.sort();
        versions
    }

    pub fn len(&self) -> usize {
        self.state.read().schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add an Inactive version
    pub fn insert(&self, version: Version, schema: Arc<ParsedSchema>) {
        self.state.write().schemas.insert(version, schema);
    }

    /// Make `version` current; the previous Active version becomes the most
    /// recently deprecated one.
    pub fn set_active(&self, version: Version, schema: Arc<ParsedSchema>) {
        let mut state = self.state.write();
        state.schemas.insert(version.clone(), schema);
        state.deprecated.retain(|v| v != &version);
        if let Some(previous) = state.active.replace(version) {
            Self::push_deprecated(&mut state, previous, self.retain_deprecated);
        }
    }

    /// Active version stepped down to Inactive: keep it cached, clear the pointer
    pub fn clear_active(&self, version: &Version) {
        let mut state = self.state.write();
        if state.active.as_ref() == Some(version) {
            state.active = None;
        }
    }

    /// Inactive version retired to Deprecated
    pub fn deprecate(&self, version: &Version) {
        let mut state = self.state.write();
        if state.active.as_ref() == Some(version) {
            state.active = None;
        }
        Self::push_deprecated(&mut state, version.clone(), self.retain_deprecated);
    }

    pub fn remove(&self, version: &Version) {
        let mut state = self.state.write();
        state.schemas.remove(version);
        state.deprecated.retain(|v| v != version);
        if state.active.as_ref() == Some(version) {
            state.active = None;
        }
    }

    /// Swap in a freshly built state
    pub(crate) fn replace(&self, next: CacheState) {
        let mut state = self.state.write();
        *state = next;
        debug!(cached = state.schemas.len(), active = ?state.active, "Schema cache replaced");
    }

    fn push_deprecated(state: &mut CacheState, version: Version, retain: usize) {
        state.deprecated.retain(|v| v != &version);
        state.deprecated.push_front(version);
        while state.deprecated.len() > retain {
            if let Some(evicted) = state.deprecated.pop_back() {
                state.schemas.remove(&evicted);
                debug!(version = %evicted, "Evicted deprecated schema from cache");
            }
        }
    }
}
