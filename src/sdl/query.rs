//! Executable query documents
//!
//! Contract-test fixtures store GraphQL-style queries. This module parses
//! them and checks that they still fit a candidate schema's structure:
//! every selected field exists on its parent type, arguments exist,
//! composite fields carry a sub-selection and leaves do not.

use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Value};

use crate::error::ParseError;
use crate::schema::{ParsedSchema, TypeDefinition, TypeKind, TypeRef};

use super::lexer::Token;
use super::parser::Cursor;

/// Operation type of an executable definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    pub name: String,
    pub type_ref: TypeRef,
    pub default_value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Field(FieldSelection),
    FragmentSpread { name: String, line: usize, column: usize },
    InlineFragment {
        type_condition: Option<String>,
        selections: Vec<Selection>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSelection {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Map<String, Value>,
    pub selections: Vec<Selection>,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub variables: Vec<VariableDefinition>,
    pub selections: Vec<Selection>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub name: String,
    pub type_condition: String,
    pub selections: Vec<Selection>,
}

/// A parsed executable document
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDocument {
    pub operations: Vec<Operation>,
    pub fragments: BTreeMap<String, Fragment>,
}

impl QueryDocument {
    /// Parse query text. Shorthand `{ ... }` is an anonymous query.
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        let mut cursor = Cursor::new(source)?;
        let mut operations = Vec::new();
        let mut fragments = BTreeMap::new();

        while !cursor.at_eof() {
            if cursor.is_punct('{') {
                operations.push(Operation {
                    kind: OperationKind::Query,
                    name: None,
                    variables: Vec::new(),
                    selections: parse_selection_set(&mut cursor)?,
                });
                continue;
            }

            let keyword = match cursor.peek() {
                Token::Name(name) => name.clone(),
                _ => return Err(cursor.unexpected("an operation or fragment")),
            };
            match keyword.as_str() {
                "query" | "mutation" | "subscription" => {
                    cursor.bump();
                    operations.push(parse_operation(&mut cursor, &keyword)?);
                }
                "fragment" => {
                    cursor.bump();
                    let (line, column) = cursor.position();
                    let fragment = parse_fragment(&mut cursor)?;
                    if fragments.contains_key(&fragment.name) {
                        return Err(ParseError::new(
                            line,
                            column,
                            format!("fragment '{}' is defined more than once", fragment.name),
                        ));
                    }
                    fragments.insert(fragment.name.clone(), fragment);
                }
                _ => return Err(cursor.unexpected("an operation or fragment")),
            }
        }

        if operations.is_empty() {
            let (line, column) = cursor.position();
            return Err(ParseError::new(line, column, "document contains no operation"));
        }
        Ok(Self { operations, fragments })
    }

    /// Check every operation against a schema. Returns one diagnostic per
    /// problem; an empty list means the document still fits the schema.
    pub fn validate(&self, schema: &ParsedSchema) -> Vec<String> {
        let mut problems = Vec::new();
        for operation in &self.operations {
            let root = match operation.kind {
                OperationKind::Query => schema.query_root(),
                OperationKind::Mutation => schema.mutation_root(),
                OperationKind::Subscription => schema.subscription_root(),
            };
            let Some(root) = root else {
                problems.push(format!("schema has no root type for {:?} operations", operation.kind));
                continue;
            };
            let mut walker = Walker {
                schema,
                fragments: &self.fragments,
                problems: &mut problems,
                visiting: HashSet::new(),
            };
            walker.selections(root, &operation.selections);
        }
        problems
    }

    /// Variables an operation requires that `provided` does not supply
    pub fn missing_variables(&self, provided: &Value) -> Vec<String> {
        let provided = provided.as_object();
        self.operations
            .iter()
            .flat_map(|op| op.variables.iter())
            .filter(|v| v.type_ref.is_non_null() && v.default_value.is_none())
            .filter(|v| {
                provided
                    .and_then(|p| p.get(&v.name))
                    .map(|value| value.is_null())
                    .unwrap_or(true)
            })
            .map(|v| v.name.clone())
            .collect()
    }
}

fn parse_operation(cursor: &mut Cursor, keyword: &str) -> Result<Operation, ParseError> {
    let kind = match keyword {
        "mutation" => OperationKind::Mutation,
        "subscription" => OperationKind::Subscription,
        _ => OperationKind::Query,
    };
    let name = match cursor.peek() {
        Token::Name(_) => Some(cursor.expect_name()?),
        _ => None,
    };

    let mut variables = Vec::new();
    if cursor.eat_punct('(') {
        while !cursor.eat_punct(')') {
            cursor.expect_punct('$')?;
            let name = cursor.expect_name()?;
            cursor.expect_punct(':')?;
            let type_ref = cursor.parse_type_ref()?;
            let default_value = if cursor.eat_punct('=') {
                Some(cursor.parse_value(true)?)
            } else {
                None
            };
            cursor.parse_directives(true)?;
            variables.push(VariableDefinition {
                name,
                type_ref,
                default_value,
            });
        }
    }
    cursor.parse_directives(false)?;

    Ok(Operation {
        kind,
        name,
        variables,
        selections: parse_selection_set(cursor)?,
    })
}

fn parse_fragment(cursor: &mut Cursor) -> Result<Fragment, ParseError> {
    let name = cursor.expect_name()?;
    if name == "on" {
        return Err(cursor.error("fragment cannot be named 'on'"));
    }
    cursor.expect_keyword("on")?;
    let type_condition = cursor.expect_name()?;
    cursor.parse_directives(false)?;
    Ok(Fragment {
        name,
        type_condition,
        selections: parse_selection_set(cursor)?,
    })
}

fn parse_selection_set(cursor: &mut Cursor) -> Result<Vec<Selection>, ParseError> {
    cursor.expect_punct('{')?;
    let mut selections = Vec::new();
    while !cursor.eat_punct('}') {
        if cursor.at_eof() {
            return Err(cursor.unexpected("'}'"));
        }
        selections.push(parse_selection(cursor)?);
    }
    if selections.is_empty() {
        return Err(cursor.error("selection set cannot be empty"));
    }
    Ok(selections)
}

fn parse_selection(cursor: &mut Cursor) -> Result<Selection, ParseError> {
    if matches!(cursor.peek(), Token::Spread) {
        let (line, column) = cursor.position();
        cursor.bump();
        let named_spread = matches!(cursor.peek(), Token::Name(n) if n != "on");
        if named_spread {
            let name = cursor.expect_name()?;
            cursor.parse_directives(false)?;
            return Ok(Selection::FragmentSpread { name, line, column });
        }
        let type_condition = if cursor.eat_keyword("on") {
            Some(cursor.expect_name()?)
        } else {
            None
        };
        cursor.parse_directives(false)?;
        return Ok(Selection::InlineFragment {
            type_condition,
            selections: cursor.nested(parse_selection_set)?,
        });
    }

    let (line, column) = cursor.position();
    let first = cursor.expect_name()?;
    let (alias, name) = if cursor.eat_punct(':') {
        (Some(first), cursor.expect_name()?)
    } else {
        (None, first)
    };
    let arguments = cursor.parse_argument_values(false)?;
    cursor.parse_directives(false)?;
    let selections = if cursor.is_punct('{') {
        cursor.nested(parse_selection_set)?
    } else {
        Vec::new()
    };
    Ok(Selection::Field(FieldSelection {
        alias,
        name,
        arguments,
        selections,
        line,
        column,
    }))
}

struct Walker<'a> {
    schema: &'a ParsedSchema,
    fragments: &'a BTreeMap<String, Fragment>,
    problems: &'a mut Vec<String>,
    visiting: HashSet<String>,
}

impl<'a> Walker<'a> {
    fn selections(&mut self, parent: &TypeDefinition, selections: &[Selection]) {
        let fragments = self.fragments;
        for selection in selections {
            match selection {
                Selection::Field(field) => self.field(parent, field),
                Selection::FragmentSpread { name, line, column } => {
                    let Some(fragment) = fragments.get(name) else {
                        self.problems
                            .push(format!("{}:{}: unknown fragment '{}'", line, column, name));
                        continue;
                    };
                    if !self.visiting.insert(name.clone()) {
                        self.problems.push(format!("fragment '{}' spreads itself", name));
                        continue;
                    }
                    if let Some(target) = self.condition(parent, &fragment.type_condition) {
                        self.selections(target, &fragment.selections);
                    }
                    self.visiting.remove(name);
                }
                Selection::InlineFragment {
                    type_condition,
                    selections,
                } => {
                    let target = match type_condition {
                        Some(condition) => self.condition(parent, condition),
                        None => Some(parent),
                    };
                    if let Some(target) = target {
                        self.selections(target, selections);
                    }
                }
            }
        }
    }

    /// Resolve a fragment type condition
    fn condition(&mut self, parent: &TypeDefinition, condition: &str) -> Option<&'a TypeDefinition> {
        let schema = self.schema;
        match schema.get_type(condition) {
            Some(def) if def.kind.is_composite() => Some(def),
            Some(_) => {
                self.problems.push(format!(
                    "fragment on '{}' inside '{}' must target an object, interface or union",
                    condition, parent.name
                ));
                None
            }
            None => {
                self.problems
                    .push(format!("fragment type condition '{}' does not exist", condition));
                None
            }
        }
    }

    fn field(&mut self, parent: &TypeDefinition, selection: &FieldSelection) {
        let schema = self.schema;
        let position = format!("{}:{}", selection.line, selection.column);
        if selection.name == "__typename" {
            if !selection.selections.is_empty() {
                self.problems
                    .push(format!("{}: '__typename' cannot have a selection", position));
            }
            return;
        }

        if parent.kind == TypeKind::Union {
            self.problems.push(format!(
                "{}: cannot select '{}' directly on union '{}'",
                position, selection.name, parent.name
            ));
            return;
        }

        let Some(definition) = parent.field(&selection.name) else {
            self.problems.push(format!(
                "{}: field '{}.{}' does not exist",
                position, parent.name, selection.name
            ));
            return;
        };

        for argument in selection.arguments.keys() {
            if definition.argument(argument).is_none() {
                self.problems.push(format!(
                    "{}: argument '{}' does not exist on '{}.{}'",
                    position, argument, parent.name, selection.name
                ));
            }
        }
        for required in definition.arguments.iter().filter(|a| a.is_required()) {
            if !selection.arguments.contains_key(&required.name) {
                self.problems.push(format!(
                    "{}: required argument '{}' missing on '{}.{}'",
                    position, required.name, parent.name, selection.name
                ));
            }
        }

        let target_name = definition.type_ref.base_name();
        match schema.kind_of(target_name) {
            Some(kind) if kind.is_composite() => {
                if selection.selections.is_empty() {
                    self.problems.push(format!(
                        "{}: field '{}.{}' of type '{}' must have a selection",
                        position,
                        parent.name,
                        selection.name,
                        definition.type_signature()
                    ));
                } else if let Some(target) = schema.get_type(target_name) {
                    self.selections(target, &selection.selections);
                }
            }
            Some(_) => {
                if !selection.selections.is_empty() {
                    self.problems.push(format!(
                        "{}: leaf field '{}.{}' cannot have a selection",
                        position, parent.name, selection.name
                    ));
                }
            }
            None => self.problems.push(format!(
                "{}: field '{}.{}' returns unknown type '{}'",
                position, parent.name, selection.name, target_name
            )),
        }
    }
}
