//! Structural type model derived from SDL
//!
//! A [`ParsedSchema`] is immutable once built and is shared by reference
//! (`Arc`) between the cache, the compatibility checker and the contract
//! tester. It is never persisted; it is always recomputed from SDL text.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Scalars every schema may reference without declaring them
pub const BUILTIN_SCALARS: [&str; 5] = ["Int", "Float", "String", "Boolean", "ID"];

/// Directive marking a field or enum value as deprecated
pub const DEPRECATED_DIRECTIVE: &str = "deprecated";

/// Kind of a named type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Object,
    Interface,
    Union,
    Enum,
    Scalar,
    Input,
}

impl TypeKind {
    /// Whether selections on this type need a sub-selection
    pub fn is_composite(&self) -> bool {
        matches!(self, TypeKind::Object | TypeKind::Interface | TypeKind::Union)
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeKind::Object => "Object",
            TypeKind::Interface => "Interface",
            TypeKind::Union => "Union",
            TypeKind::Enum => "Enum",
            TypeKind::Scalar => "Scalar",
            TypeKind::Input => "Input",
        };
        f.write_str(name)
    }
}

/// Reference to a type with list / non-null wrapping
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named(name.into())
    }

    pub fn list(inner: TypeRef) -> Self {
        TypeRef::List(Box::new(inner))
    }

    pub fn non_null(inner: TypeRef) -> Self {
        TypeRef::NonNull(Box::new(inner))
    }

    /// Innermost named type
    pub fn base_name(&self) -> &str {
        match self {
            TypeRef::Named(name) => name,
            TypeRef::List(inner) | TypeRef::NonNull(inner) => inner.base_name(),
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, TypeRef::NonNull(_))
    }

    /// The same reference with every non-null marker removed
    pub fn nullable_shape(&self) -> TypeRef {
        match self {
            TypeRef::Named(name) => TypeRef::Named(name.clone()),
            TypeRef::List(inner) => TypeRef::list(inner.nullable_shape()),
            TypeRef::NonNull(inner) => inner.nullable_shape(),
        }
    }

    /// Signature string, e.g. `String`, `[String]`, `[ID!]!`
    pub fn signature(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(name) => f.write_str(name),
            TypeRef::List(inner) => write!(f, "[{}]", inner),
            TypeRef::NonNull(inner) => write!(f, "{}!", inner),
        }
    }
}

/// A directive application, e.g. `@deprecated(reason: "use fullName")`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directive {
    pub name: String,
    /// Argument name to constant value, ordered by name
    #[serde(default)]
    pub arguments: serde_json::Map<String, Value>,
}

impl Directive {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: serde_json::Map::new(),
        }
    }

    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }
}

/// Field argument or input-object field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputValue {
    pub name: String,
    pub type_ref: TypeRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub directives: Vec<Directive>,
}

impl InputValue {
    /// Non-null without a default: callers must supply it
    pub fn is_required(&self) -> bool {
        self.type_ref.is_non_null() && self.default_value.is_none()
    }
}

/// A field of an object, interface or input type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub type_ref: TypeRef,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<InputValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub directives: Vec<Directive>,
    /// Only meaningful for input-object fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, type_ref: TypeRef) -> Self {
        Self {
            name: name.into(),
            type_ref,
            arguments: Vec::new(),
            directives: Vec::new(),
            default_value: None,
            description: None,
        }
    }

    pub fn type_signature(&self) -> String {
        self.type_ref.signature()
    }

    pub fn argument(&self, name: &str) -> Option<&InputValue> {
        self.arguments.iter().find(|a| a.name == name)
    }

    pub fn directive(&self, name: &str) -> Option<&Directive> {
        self.directives.iter().find(|d| d.name == name)
    }

    pub fn is_deprecated(&self) -> bool {
        self.directive(DEPRECATED_DIRECTIVE).is_some()
    }
}

/// A value of an enum type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumValue {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub directives: Vec<Directive>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl EnumValue {
    pub fn is_deprecated(&self) -> bool {
        self.directives.iter().any(|d| d.name == DEPRECATED_DIRECTIVE)
    }
}

/// A named type definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub name: String,
    pub kind: TypeKind,
    /// Fields in declaration order (object, interface and input kinds)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldDefinition>,
    /// Implemented interfaces (object and interface kinds)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<String>,
    /// Member types (union kind)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
    /// Values (enum kind)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<EnumValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub directives: Vec<Directive>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TypeDefinition {
    pub fn new(name: impl Into<String>, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            fields: Vec::new(),
            interfaces: Vec::new(),
            members: Vec::new(),
            values: Vec::new(),
            directives: Vec::new(),
            description: None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn value(&self, name: &str) -> Option<&EnumValue> {
        self.values.iter().find(|v| v.name == name)
    }
}

/// Declared directive, e.g. `directive @pii(level: Int) on FIELD_DEFINITION`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectiveDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<InputValue>,
    pub locations: Vec<String>,
    #[serde(default)]
    pub repeatable: bool,
}

/// Structural view of one schema's SDL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedSchema {
    /// Type name to definition, ordered by name
    pub types: BTreeMap<String, TypeDefinition>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub directive_definitions: BTreeMap<String, DirectiveDefinition>,
    /// Root query type name
    pub query_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_type: Option<String>,
}

impl ParsedSchema {
    pub fn get_type(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(name)
    }

    /// Declared types plus the built-in scalars
    pub fn has_type(&self, name: &str) -> bool {
        self.types.contains_key(name) || BUILTIN_SCALARS.contains(&name)
    }

    /// Kind of a type, treating built-in scalars as scalars
    pub fn kind_of(&self, name: &str) -> Option<TypeKind> {
        match self.types.get(name) {
            Some(def) => Some(def.kind),
            None if BUILTIN_SCALARS.contains(&name) => Some(TypeKind::Scalar),
            None => None,
        }
    }

    pub fn query_root(&self) -> Option<&TypeDefinition> {
        self.types.get(&self.query_type)
    }

    pub fn mutation_root(&self) -> Option<&TypeDefinition> {
        self.mutation_type.as_deref().and_then(|name| self.types.get(name))
    }

    pub fn subscription_root(&self) -> Option<&TypeDefinition> {
        self.subscription_type.as_deref().and_then(|name| self.types.get(name))
    }

    /// Look up `Type.field`
    pub fn field(&self, type_name: &str, field_name: &str) -> Option<&FieldDefinition> {
        self.types.get(type_name).and_then(|t| t.field(field_name))
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn field_count(&self) -> usize {
        self.types.values().map(|t| t.fields.len()).sum()
    }
}
