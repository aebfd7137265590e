//! Schema version records and lifecycle enums

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::checksum::Checksum;
use crate::error::RegistryError;

/// Lifecycle status of a stored schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    /// Submitted, not yet evaluated
    Draft,
    /// Evaluated and accepted, ready for activation
    Inactive,
    /// Serving untargeted requests
    Active,
    /// Superseded or retired
    Deprecated,
    /// Evaluation found changes beyond the declared severity
    Rejected,
}

impl VersionStatus {
    pub const ALL: [VersionStatus; 5] = [
        VersionStatus::Draft,
        VersionStatus::Inactive,
        VersionStatus::Active,
        VersionStatus::Deprecated,
        VersionStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStatus::Draft => "draft",
            VersionStatus::Inactive => "inactive",
            VersionStatus::Active => "active",
            VersionStatus::Deprecated => "deprecated",
            VersionStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionStatus {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| RegistryError::Validation(format!("unknown status '{}'", s)))
    }
}

/// Severity class of a schema change. Ordered: patch < minor < major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Patch,
    Minor,
    Major,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Patch => "patch",
            ChangeType::Minor => "minor",
            ChangeType::Major => "major",
        }
    }

    /// Whether a change of this severity is covered by a declared severity
    pub fn within(&self, declared: ChangeType) -> bool {
        *self <= declared
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "patch" => Ok(ChangeType::Patch),
            "minor" => Ok(ChangeType::Minor),
            "major" => Ok(ChangeType::Major),
            other => Err(RegistryError::Validation(format!("unknown change type '{}'", other))),
        }
    }
}

/// Parse a version string leniently.
///
/// A leading `v` is stripped and missing minor/patch components are padded
/// with zero, so `v1`, `1.0` and `1.0.0` all name the same version.
pub fn parse_version(input: &str) -> Result<Version, RegistryError> {
    let trimmed = input.trim();
    let bare = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    if bare.is_empty() {
        return Err(RegistryError::InvalidVersion(format!("'{}' is empty", input)));
    }

    // Split off pre-release/build metadata before padding the core
    let split = bare.find(['-', '+']).unwrap_or(bare.len());
    let (core, suffix) = bare.split_at(split);
    let padded = match core.split('.').count() {
        1 => format!("{}.0.0{}", core, suffix),
        2 => format!("{}.0{}", core, suffix),
        _ => bare.to_string(),
    };

    Version::parse(&padded).map_err(|e| RegistryError::InvalidVersion(format!("'{}': {}", input, e)))
}

/// Next version after `current` for a change of the given severity
pub fn bump(current: &Version, change: ChangeType) -> Version {
    match change {
        ChangeType::Major => Version::new(current.major.saturating_add(1), 0, 0),
        ChangeType::Minor => Version::new(current.major, current.minor.saturating_add(1), 0),
        ChangeType::Patch => Version::new(current.major, current.minor, current.patch.saturating_add(1)),
    }
}

/// A persisted schema version row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaVersion {
    pub id: Uuid,
    /// Semantic version, unique across the registry
    pub version: Version,
    /// Raw SDL text as submitted
    pub sdl: String,
    pub status: VersionStatus,
    /// Severity declared by the submitter; replaced by the inferred
    /// severity once the version is evaluated
    pub change_type: ChangeType,
    /// Severity the submitter declared at submission time
    pub declared_change_type: ChangeType,
    /// The version this one was derived from (Active at submission time)
    pub previous_version_id: Option<Uuid>,
    pub checksum: Checksum,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// First time this version became Active
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl SchemaVersion {
    /// Create a new Draft record
    pub fn draft(
        version: Version,
        sdl: impl Into<String>,
        created_by: impl Into<String>,
        declared: ChangeType,
    ) -> Self {
        let sdl = sdl.into();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            version,
            checksum: Checksum::of_sdl(&sdl),
            sdl,
            status: VersionStatus::Draft,
            change_type: declared,
            declared_change_type: declared,
            previous_version_id: None,
            created_at: now,
            created_by: created_by.into(),
            notes: None,
            activated_at: None,
            updated_at: now,
        }
    }

    /// Get the version string (e.g., "1.2.3")
    pub fn version_string(&self) -> String {
        self.version.to_string()
    }

    /// Get the tag string (e.g., "v1.2.3")
    pub fn tag_string(&self) -> String {
        format!("v{}", self.version)
    }

    pub fn is_active(&self) -> bool {
        self.status == VersionStatus::Active
    }

    /// Whether this version has ever served as the Active version
    pub fn was_ever_active(&self) -> bool {
        self.activated_at.is_some() || self.is_active()
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{} ({})", self.version, self.status)
    }
}
