//! SDL parsing and validation
//!
//! [`parse`] is a pure function: identical SDL text always yields an
//! identical [`ParsedSchema`]. Syntax problems surface as
//! [`RegistryError::Parse`] with a line/column; well-formed text that does
//! not describe a usable schema surfaces as [`RegistryError::Validation`].

pub mod lexer;
pub(crate) mod parser;
pub mod query;

use std::collections::{BTreeMap, HashSet};

use crate::error::{RegistryError, Result};
use crate::schema::{ParsedSchema, TypeDefinition, TypeKind, BUILTIN_SCALARS};

use parser::{parse_document, Location, SchemaDocument};

/// Default root query type name
pub const QUERY_ROOT: &str = "Query";
/// Conventional root mutation type name
pub const MUTATION_ROOT: &str = "Mutation";
/// Conventional root subscription type name
pub const SUBSCRIPTION_ROOT: &str = "Subscription";

/// Parse and validate SDL text
pub fn parse(sdl: &str) -> Result<ParsedSchema> {
    let doc = parse_document(sdl)?;
    build_schema(doc)
}

fn invalid(message: impl Into<String>) -> RegistryError {
    RegistryError::Validation(message.into())
}

fn at(location: Location, message: String) -> RegistryError {
    invalid(format!("{} (line {}, column {})", message, location.line, location.column))
}

fn build_schema(doc: SchemaDocument) -> Result<ParsedSchema> {
    if doc.types.is_empty() {
        return Err(invalid("schema must contain at least one type definition"));
    }
    if doc.schema_definitions > 1 {
        return Err(invalid("schema definition may appear only once"));
    }

    let mut types: BTreeMap<String, TypeDefinition> = BTreeMap::new();
    for (def, location) in doc.types {
        if BUILTIN_SCALARS.contains(&def.name.as_str()) {
            return Err(at(location, format!("type '{}' redefines a built-in scalar", def.name)));
        }
        if def.name.starts_with("__") {
            return Err(at(location, format!("type name '{}' is reserved", def.name)));
        }
        if types.contains_key(&def.name) {
            return Err(at(location, format!("type '{}' is defined more than once", def.name)));
        }
        types.insert(def.name.clone(), def);
    }

    for (ext, location) in doc.extensions {
        let target = types
            .get_mut(&ext.name)
            .ok_or_else(|| at(location, format!("cannot extend unknown type '{}'", ext.name)))?;
        if target.kind != ext.kind {
            return Err(at(
                location,
                format!("cannot extend {} '{}' as {}", target.kind, ext.name, ext.kind),
            ));
        }
        target.fields.extend(ext.fields);
        target.interfaces.extend(ext.interfaces);
        target.members.extend(ext.members);
        target.values.extend(ext.values);
        target.directives.extend(ext.directives);
    }

    let mut roots: BTreeMap<String, String> = BTreeMap::new();
    for (operation, type_name) in doc.roots.into_iter().chain(doc.root_extensions) {
        if roots.insert(operation.clone(), type_name).is_some() {
            return Err(invalid(format!("root operation '{}' is declared more than once", operation)));
        }
    }

    let explicit_roots = !roots.is_empty();
    let query_type = roots.remove("query").unwrap_or_else(|| QUERY_ROOT.to_string());
    let mutation_type = roots
        .remove("mutation")
        .or_else(|| (!explicit_roots && types.contains_key(MUTATION_ROOT)).then(|| MUTATION_ROOT.to_string()));
    let subscription_type = roots
        .remove("subscription")
        .or_else(|| (!explicit_roots && types.contains_key(SUBSCRIPTION_ROOT)).then(|| SUBSCRIPTION_ROOT.to_string()));

    match types.get(&query_type) {
        Some(def) if def.kind == TypeKind::Object => {}
        _ => return Err(invalid(format!("schema must contain a {} type", query_type))),
    }
    for root in mutation_type.iter().chain(subscription_type.iter()) {
        match types.get(root) {
            Some(def) if def.kind == TypeKind::Object => {}
            _ => return Err(invalid(format!("root operation type '{}' must be a defined object type", root))),
        }
    }

    let directive_definitions = doc
        .directives
        .into_iter()
        .map(|d| (d.name.clone(), d))
        .collect();

    let schema = ParsedSchema {
        types,
        directive_definitions,
        query_type,
        mutation_type,
        subscription_type,
    };
    validate_types(&schema)?;
    Ok(schema)
}

/// Per-type semantic checks
fn validate_types(schema: &ParsedSchema) -> Result<()> {
    for def in schema.types.values() {
        let mut seen = HashSet::new();
        for field in &def.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(invalid(format!("field '{}.{}' is defined more than once", def.name, field.name)));
            }
            let target = field.type_ref.base_name();
            let target_kind = schema.kind_of(target).ok_or_else(|| {
                invalid(format!("field '{}.{}' references unknown type '{}'", def.name, field.name, target))
            })?;
            match def.kind {
                TypeKind::Input if target_kind.is_composite() => {
                    return Err(invalid(format!(
                        "input field '{}.{}' must reference an input, enum or scalar type",
                        def.name, field.name
                    )));
                }
                TypeKind::Object | TypeKind::Interface if target_kind == TypeKind::Input => {
                    return Err(invalid(format!(
                        "field '{}.{}' cannot return input type '{}'",
                        def.name, field.name, target
                    )));
                }
                _ => {}
            }

            let mut seen_args = HashSet::new();
            for arg in &field.arguments {
                if !seen_args.insert(arg.name.as_str()) {
                    return Err(invalid(format!(
                        "argument '{}' of '{}.{}' is defined more than once",
                        arg.name, def.name, field.name
                    )));
                }
                match schema.kind_of(arg.type_ref.base_name()) {
                    Some(kind) if !kind.is_composite() => {}
                    Some(_) => {
                        return Err(invalid(format!(
                            "argument '{}' of '{}.{}' must be an input, enum or scalar type",
                            arg.name, def.name, field.name
                        )))
                    }
                    None => {
                        return Err(invalid(format!(
                            "argument '{}' of '{}.{}' references unknown type '{}'",
                            arg.name,
                            def.name,
                            field.name,
                            arg.type_ref.base_name()
                        )))
                    }
                }
            }
        }

        match def.kind {
            TypeKind::Object | TypeKind::Interface => {
                if def.fields.is_empty() {
                    return Err(invalid(format!("{} '{}' must define at least one field", def.kind, def.name)));
                }
                for interface in &def.interfaces {
                    let iface = schema
                        .get_type(interface)
                        .filter(|t| t.kind == TypeKind::Interface)
                        .ok_or_else(|| {
                            invalid(format!("'{}' implements '{}', which is not an interface", def.name, interface))
                        })?;
                    for required in &iface.fields {
                        if def.field(&required.name).is_none() {
                            return Err(invalid(format!(
                                "'{}' implements '{}' but is missing field '{}'",
                                def.name, interface, required.name
                            )));
                        }
                    }
                }
            }
            TypeKind::Union => {
                if def.members.is_empty() {
                    return Err(invalid(format!("union '{}' must have at least one member", def.name)));
                }
                let mut seen_members = HashSet::new();
                for member in &def.members {
                    if !seen_members.insert(member.as_str()) {
                        return Err(invalid(format!("union '{}' lists '{}' more than once", def.name, member)));
                    }
                    if schema.kind_of(member) != Some(TypeKind::Object) {
                        return Err(invalid(format!(
                            "union '{}' member '{}' must be an object type",
                            def.name, member
                        )));
                    }
                }
            }
            TypeKind::Enum => {
                if def.values.is_empty() {
                    return Err(invalid(format!("enum '{}' must have at least one value", def.name)));
                }
                let mut seen_values = HashSet::new();
                for value in &def.values {
                    if !seen_values.insert(value.name.as_str()) {
                        return Err(invalid(format!("enum value '{}.{}' is defined more than once", def.name, value.name)));
                    }
                }
            }
            TypeKind::Input => {
                if def.fields.is_empty() {
                    return Err(invalid(format!("input '{}' must define at least one field", def.name)));
                }
            }
            TypeKind::Scalar => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_minimal_schema() {
        let schema = parse("type Query { name: String }").unwrap();
        assert_eq!(schema.type_count(), 1);
        assert_eq!(schema.query_type, "Query");
        assert_eq!(schema.field("Query", "name").unwrap().type_signature(), "String");
        assert!(schema.mutation_type.is_none());
    }

    #[test]
    fn test_parse_is_deterministic() {
        let sdl = r#"
            type Query { person(nic: String!): Person, vehicles: [Vehicle!]! }
            type Person { fullName: String @deprecated(reason: "use name") name: String }
            type Vehicle { regNo: ID! }
            type Mutation { ping: Boolean }
        "#;
        let a = parse(sdl).unwrap();
        let b = parse(sdl).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.mutation_type.as_deref(), Some("Mutation"));
    }

    #[test]
    fn test_empty_schema_is_invalid() {
        let err = parse("# nothing here").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("at least one type definition"));
    }

    #[test]
    fn test_missing_query_is_invalid() {
        let err = parse("type Person { name: String }").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("Query"));
    }

    #[test]
    fn test_query_must_be_object() {
        let err = parse("input Query { name: String }").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_malformed_is_parse_error() {
        let err = parse("type Query { name: }").unwrap_err();
        match err {
            RegistryError::Parse(e) => assert_eq!((e.line, e.column), (1, 20)),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_reference() {
        let err = parse("type Query { person: Person }").unwrap_err();
        assert!(err.to_string().contains("unknown type 'Person'"));
    }

    #[test]
    fn test_duplicate_definitions() {
        assert!(parse("type Query { a: Int } type Query { b: Int }").is_err());
        assert!(parse("type Query { a: Int a: String }").is_err());
    }

    #[test]
    fn test_extensions_are_merged() {
        let schema = parse("type Query { a: Int } extend type Query { b: String }").unwrap();
        let names: Vec<&str> = schema.get_type("Query").unwrap().field_names().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(parse("type Query { a: Int } extend type Missing { b: Int }").is_err());
        assert!(parse("type Query { a: Int } extend input Query { b: Int }").is_err());
    }

    #[test]
    fn test_explicit_schema_roots() {
        let schema = parse("schema { query: Root } type Root { a: Int } type Query { b: Int }").unwrap();
        assert_eq!(schema.query_type, "Root");
        assert!(parse("schema { query: Missing } type Query { a: Int }").is_err());
    }

    #[test]
    fn test_interface_contract_enforced() {
        assert!(parse("interface Node { id: ID! } type Query implements Node { id: ID! }").is_ok());
        let err = parse("interface Node { id: ID! } type Query implements Node { name: String }").unwrap_err();
        assert!(err.to_string().contains("missing field 'id'"));
    }

    #[test]
    fn test_input_and_output_positions() {
        assert!(parse("input F { a: Int } type Query { q(f: F): Int }").is_ok());
        assert!(parse("input F { a: Int } type Query { f: F }").is_err());
        assert!(parse("type P { a: Int } type Query { q(p: P): Int }").is_err());
        assert!(parse("type P { a: Int } input F { p: P } type Query { a: Int }").is_err());
    }

    #[test]
    fn test_union_members_must_be_objects() {
        assert!(parse("type A { a: Int } union U = A type Query { u: U }").is_ok());
        assert!(parse("enum E { X } union U = E type Query { u: U }").is_err());
    }
}
