//! Schema compatibility checking
//!
//! Structural diff of two [`ParsedSchema`] values. Types are visited in name
//! order and fields, arguments and values likewise, so the same pair of
//! schemas always yields the same diagnostics in the same order.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::schema::{FieldDefinition, InputValue, ParsedSchema, TypeDefinition, TypeKind, TypeRef};
use crate::version::ChangeType;

/// Result of comparing two schemas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityReport {
    /// False when any breaking change was found
    pub compatible: bool,
    pub breaking_changes: Vec<String>,
    pub warnings: Vec<String>,
    pub inferred_change_type: ChangeType,
    /// One entry per diagnostic, in report order
    #[serde(default)]
    pub changes: Vec<SchemaChange>,
}

impl CompatibilityReport {
    /// Report for a schema with nothing to compare against. The first
    /// version of a registry is accepted at whatever severity it declares.
    pub fn baseline(declared: ChangeType) -> Self {
        Self {
            compatible: true,
            breaking_changes: Vec::new(),
            warnings: Vec::new(),
            inferred_change_type: declared,
            changes: Vec::new(),
        }
    }

    /// No structural difference at all
    pub fn is_unchanged(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn summary(&self) -> String {
        if self.changes.is_empty() {
            "No changes detected".to_string()
        } else {
            format!(
                "{} change ({} breaking, {} warnings)",
                self.inferred_change_type,
                self.breaking_changes.len(),
                self.warnings.len()
            )
        }
    }
}

/// A detected change between schema versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaChange {
    pub kind: ChangeKind,
    /// Path to the changed element, e.g. `Person.address` or `Query.person(nic)`
    pub path: String,
    pub breaking: bool,
    pub description: String,
}

/// Kind of schema change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    RootTypeChanged,
    TypeRemoved,
    TypeAdded,
    TypeKindChanged,
    FieldRemoved,
    FieldAdded,
    FieldTypeChanged,
    FieldBecameRequired,
    FieldBecameOptional,
    FieldDeprecated,
    ArgumentRemoved,
    ArgumentAdded,
    ArgumentTypeChanged,
    ArgumentBecameRequired,
    ArgumentBecameOptional,
    EnumValueRemoved,
    EnumValueAdded,
    EnumValueDeprecated,
    UnionMemberRemoved,
    UnionMemberAdded,
    InterfaceRemoved,
    InterfaceAdded,
}

/// Compatibility checker for schema versions
#[derive(Debug, Clone, Copy, Default)]
pub struct CompatibilityChecker;

impl CompatibilityChecker {
    pub fn new() -> Self {
        Self
    }

    /// Compare `old` against `new`. Never fails on well-formed schemas; an
    /// identical pair yields an empty, compatible `patch` report.
    pub fn compare(&self, old: &ParsedSchema, new: &ParsedSchema) -> CompatibilityReport {
        let mut diff = Diff::default();

        diff.roots(old, new);

        let names: BTreeSet<&str> = old
            .types
            .keys()
            .chain(new.types.keys())
            .map(String::as_str)
            .collect();
        for name in names {
            match (old.get_type(name), new.get_type(name)) {
                (Some(_), None) => diff.breaking(ChangeKind::TypeRemoved, name, format!("Type '{}' removed", name)),
                (None, Some(_)) => diff.warning(ChangeKind::TypeAdded, name, format!("Type '{}' added", name)),
                (Some(a), Some(b)) => diff.types(a, b),
                (None, None) => {}
            }
        }

        diff.finish()
    }
}

#[derive(Default)]
struct Diff {
    breaking: Vec<String>,
    warnings: Vec<String>,
    changes: Vec<SchemaChange>,
}

impl Diff {
    fn breaking(&mut self, kind: ChangeKind, path: impl Into<String>, description: String) {
        self.breaking.push(description.clone());
        self.changes.push(SchemaChange {
            kind,
            path: path.into(),
            breaking: true,
            description,
        });
    }

    fn warning(&mut self, kind: ChangeKind, path: impl Into<String>, description: String) {
        self.warnings.push(description.clone());
        self.changes.push(SchemaChange {
            kind,
            path: path.into(),
            breaking: false,
            description,
        });
    }

    fn finish(self) -> CompatibilityReport {
        let inferred_change_type = if !self.breaking.is_empty() {
            ChangeType::Major
        } else if !self.changes.is_empty() {
            ChangeType::Minor
        } else {
            ChangeType::Patch
        };
        CompatibilityReport {
            compatible: self.breaking.is_empty(),
            breaking_changes: self.breaking,
            warnings: self.warnings,
            inferred_change_type,
            changes: self.changes,
        }
    }

    fn roots(&mut self, old: &ParsedSchema, new: &ParsedSchema) {
        if old.query_type != new.query_type {
            self.breaking(
                ChangeKind::RootTypeChanged,
                "schema.query",
                format!("Root query type changed from {} to {}", old.query_type, new.query_type),
            );
        }
        let optional_roots = [
            ("mutation", &old.mutation_type, &new.mutation_type),
            ("subscription", &old.subscription_type, &new.subscription_type),
        ];
        for (operation, before, after) in optional_roots {
            match (before, after) {
                (Some(a), Some(b)) if a != b => self.breaking(
                    ChangeKind::RootTypeChanged,
                    format!("schema.{}", operation),
                    format!("Root {} type changed from {} to {}", operation, a, b),
                ),
                (Some(a), None) => self.breaking(
                    ChangeKind::RootTypeChanged,
                    format!("schema.{}", operation),
                    format!("Root {} type '{}' removed", operation, a),
                ),
                _ => {}
            }
        }
    }

    fn types(&mut self, old: &TypeDefinition, new: &TypeDefinition) {
        if old.kind != new.kind {
            self.breaking(
                ChangeKind::TypeKindChanged,
                old.name.as_str(),
                format!("Type '{}' kind changed from {} to {}", old.name, old.kind, new.kind),
            );
            return;
        }

        match old.kind {
            TypeKind::Object | TypeKind::Interface | TypeKind::Input => {
                self.fields(old, new);
                self.interfaces(old, new);
            }
            TypeKind::Enum => self.enum_values(old, new),
            TypeKind::Union => self.union_members(old, new),
            TypeKind::Scalar => {}
        }
    }

    fn fields(&mut self, old: &TypeDefinition, new: &TypeDefinition) {
        let before: BTreeMap<&str, &FieldDefinition> = old.fields.iter().map(|f| (f.name.as_str(), f)).collect();
        let after: BTreeMap<&str, &FieldDefinition> = new.fields.iter().map(|f| (f.name.as_str(), f)).collect();
        let names: BTreeSet<&str> = before.keys().chain(after.keys()).copied().collect();

        for name in names {
            let path = format!("{}.{}", old.name, name);
            match (before.get(name), after.get(name)) {
                (Some(_), None) => {
                    self.breaking(ChangeKind::FieldRemoved, path.as_str(), format!("Field '{}' removed", path))
                }
                (None, Some(field)) => {
                    let required_input =
                        new.kind == TypeKind::Input && field.type_ref.is_non_null() && field.default_value.is_none();
                    if required_input {
                        self.breaking(
                            ChangeKind::FieldAdded,
                            path.as_str(),
                            format!("Field '{}' added as required input", path),
                        );
                    } else {
                        self.warning(ChangeKind::FieldAdded, path.as_str(), format!("Field '{}' added", path));
                    }
                }
                (Some(a), Some(b)) => self.field(&path, a, b),
                (None, None) => {}
            }
        }
    }

    fn field(&mut self, path: &str, old: &FieldDefinition, new: &FieldDefinition) {
        if old.type_ref.nullable_shape() != new.type_ref.nullable_shape() {
            self.breaking(
                ChangeKind::FieldTypeChanged,
                path,
                format!(
                    "Field '{}' type changed from {} to {}",
                    path,
                    old.type_signature(),
                    new.type_signature()
                ),
            );
        } else {
            let (tightened, relaxed) = nullability_changes(&old.type_ref, &new.type_ref);
            if tightened {
                self.breaking(ChangeKind::FieldBecameRequired, path, format!("Field '{}' became required", path));
            }
            if relaxed {
                self.warning(ChangeKind::FieldBecameOptional, path, format!("Field '{}' became optional", path));
            }
        }

        if new.is_deprecated() && !old.is_deprecated() {
            self.warning(ChangeKind::FieldDeprecated, path, format!("Field '{}' deprecated", path));
        }

        self.arguments(path, &old.arguments, &new.arguments);
    }

    fn arguments(&mut self, field_path: &str, old: &[InputValue], new: &[InputValue]) {
        let before: BTreeMap<&str, &InputValue> = old.iter().map(|a| (a.name.as_str(), a)).collect();
        let after: BTreeMap<&str, &InputValue> = new.iter().map(|a| (a.name.as_str(), a)).collect();
        let names: BTreeSet<&str> = before.keys().chain(after.keys()).copied().collect();

        for name in names {
            let path = format!("{}({})", field_path, name);
            match (before.get(name), after.get(name)) {
                (Some(_), None) => {
                    self.breaking(ChangeKind::ArgumentRemoved, path.as_str(), format!("Argument '{}' removed", path))
                }
                (None, Some(arg)) if arg.is_required() => self.breaking(
                    ChangeKind::ArgumentAdded,
                    path.as_str(),
                    format!("Required argument '{}' added", path),
                ),
                (None, Some(_)) => {
                    self.warning(ChangeKind::ArgumentAdded, path.as_str(), format!("Argument '{}' added", path))
                }
                (Some(a), Some(b)) => {
                    if a.type_ref.nullable_shape() != b.type_ref.nullable_shape() {
                        self.breaking(
                            ChangeKind::ArgumentTypeChanged,
                            path.as_str(),
                            format!(
                                "Argument '{}' type changed from {} to {}",
                                path, a.type_ref, b.type_ref
                            ),
                        );
                        continue;
                    }
                    let (tightened, relaxed) = nullability_changes(&a.type_ref, &b.type_ref);
                    // A non-null argument with a default can still be omitted
                    if tightened && b.is_required() {
                        self.breaking(
                            ChangeKind::ArgumentBecameRequired,
                            path.as_str(),
                            format!("Argument '{}' became required", path),
                        );
                    } else if relaxed || (a.is_required() && !b.is_required()) {
                        self.warning(
                            ChangeKind::ArgumentBecameOptional,
                            path.as_str(),
                            format!("Argument '{}' became optional", path),
                        );
                    }
                }
                (None, None) => {}
            }
        }
    }

    fn interfaces(&mut self, old: &TypeDefinition, new: &TypeDefinition) {
        let before: BTreeSet<&str> = old.interfaces.iter().map(String::as_str).collect();
        let after: BTreeSet<&str> = new.interfaces.iter().map(String::as_str).collect();
        for removed in before.difference(&after) {
            self.breaking(
                ChangeKind::InterfaceRemoved,
                old.name.as_str(),
                format!("Type '{}' no longer implements '{}'", old.name, removed),
            );
        }
        for added in after.difference(&before) {
            self.warning(
                ChangeKind::InterfaceAdded,
                old.name.as_str(),
                format!("Type '{}' now implements '{}'", old.name, added),
            );
        }
    }

    fn enum_values(&mut self, old: &TypeDefinition, new: &TypeDefinition) {
        let before: BTreeSet<&str> = old.values.iter().map(|v| v.name.as_str()).collect();
        let after: BTreeSet<&str> = new.values.iter().map(|v| v.name.as_str()).collect();

        for name in before.union(&after) {
            let path = format!("{}.{}", old.name, name);
            match (old.value(name), new.value(name)) {
                (Some(_), None) => self.breaking(
                    ChangeKind::EnumValueRemoved,
                    path.as_str(),
                    format!("Enum value '{}' removed", path),
                ),
                (None, Some(_)) => {
                    self.warning(ChangeKind::EnumValueAdded, path.as_str(), format!("Enum value '{}' added", path))
                }
                (Some(a), Some(b)) if b.is_deprecated() && !a.is_deprecated() => self.warning(
                    ChangeKind::EnumValueDeprecated,
                    path.as_str(),
                    format!("Enum value '{}' deprecated", path),
                ),
                _ => {}
            }
        }
    }

    fn union_members(&mut self, old: &TypeDefinition, new: &TypeDefinition) {
        let before: BTreeSet<&str> = old.members.iter().map(String::as_str).collect();
        let after: BTreeSet<&str> = new.members.iter().map(String::as_str).collect();
        for removed in before.difference(&after) {
            self.breaking(
                ChangeKind::UnionMemberRemoved,
                old.name.as_str(),
                format!("Union member '{}' removed from '{}'", removed, old.name),
            );
        }
        for added in after.difference(&before) {
            self.warning(
                ChangeKind::UnionMemberAdded,
                old.name.as_str(),
                format!("Union member '{}' added to '{}'", added, old.name),
            );
        }
    }
}

/// Compare non-null markers of two references that share a nullable shape.
/// Returns (some position gained `!`, some position lost `!`).
fn nullability_changes(old: &TypeRef, new: &TypeRef) -> (bool, bool) {
    match (old, new) {
        (TypeRef::NonNull(a), TypeRef::NonNull(b)) => nullability_changes(a, b),
        (TypeRef::NonNull(a), b) => {
            let (tightened, _) = nullability_changes(a, b);
            (tightened, true)
        }
        (a, TypeRef::NonNull(b)) => {
            let (_, relaxed) = nullability_changes(a, b);
            (true, relaxed)
        }
        (TypeRef::List(a), TypeRef::List(b)) => nullability_changes(a, b),
        _ => (false, false),
    }
}
