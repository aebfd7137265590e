//! Recursive-descent parser over lexer tokens
//!
//! [`Cursor`] holds the token stream and the grammar pieces shared by SDL
//! and executable documents (types, values, directives). [`parse_document`]
//! reads type-system definitions into a [`SchemaDocument`]; semantic checks
//! happen afterwards in [`super::build_schema`].

use serde_json::{Map, Number, Value};

use crate::error::ParseError;
use crate::schema::{
    Directive, DirectiveDefinition, EnumValue, FieldDefinition, InputValue, TypeDefinition, TypeKind, TypeRef,
};

use super::lexer::{tokenize, Spanned, Token};

/// Deepest list type, value or selection set accepted
pub(crate) const MAX_NESTING: usize = 64;

/// Token cursor with one-token lookahead helpers
pub(crate) struct Cursor {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Cursor {
    pub(crate) fn new(source: &str) -> Result<Self, ParseError> {
        Ok(Self {
            tokens: tokenize(source)?,
            pos: 0,
            depth: 0,
        })
    }

    /// Run `parse` one nesting level deeper, failing past [`MAX_NESTING`]
    pub(crate) fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error("nesting too deep"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    pub(crate) fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    pub(crate) fn peek_at(&self, offset: usize) -> &Token {
        let index = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[index].token
    }

    pub(crate) fn position(&self) -> (usize, usize) {
        let spanned = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        (spanned.line, spanned.column)
    }

    pub(crate) fn at_eof(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    pub(crate) fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn error(&self, message: impl Into<String>) -> ParseError {
        let (line, column) = self.position();
        ParseError::new(line, column, message)
    }

    pub(crate) fn unexpected(&self, expected: &str) -> ParseError {
        self.error(format!("expected {}, found {}", expected, self.peek().describe()))
    }

    pub(crate) fn is_punct(&self, c: char) -> bool {
        matches!(self.peek(), Token::Punct(p) if *p == c)
    }

    pub(crate) fn eat_punct(&mut self, c: char) -> bool {
        if self.is_punct(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_punct(&mut self, c: char) -> Result<(), ParseError> {
        if self.eat_punct(c) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", c)))
        }
    }

    pub(crate) fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Token::Name(n) if n == keyword)
    }

    pub(crate) fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.bump();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", keyword)))
        }
    }

    pub(crate) fn expect_name(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Token::Name(name) => {
                let name = name.clone();
                self.bump();
                Ok(name)
            }
            _ => Err(self.unexpected("a name")),
        }
    }

    /// `Name`, `[Type]`, either optionally followed by `!`
    pub(crate) fn parse_type_ref(&mut self) -> Result<TypeRef, ParseError> {
        let base = if self.eat_punct('[') {
            let inner = self.nested(Self::parse_type_ref)?;
            self.expect_punct(']')?;
            TypeRef::list(inner)
        } else {
            TypeRef::Named(self.expect_name()?)
        };

        if self.eat_punct('!') {
            Ok(TypeRef::non_null(base))
        } else {
            Ok(base)
        }
    }

    /// A literal value. Variables are only legal outside SDL (`const_only == false`)
    /// and are kept as `"$name"` strings; enum values become plain strings.
    pub(crate) fn parse_value(&mut self, const_only: bool) -> Result<Value, ParseError> {
        match self.peek().clone() {
            Token::Punct('$') if !const_only => {
                self.bump();
                let name = self.expect_name()?;
                Ok(Value::String(format!("${}", name)))
            }
            Token::Punct('$') => Err(self.error("variables are not allowed in constant values")),
            Token::Int(n) => {
                self.bump();
                Ok(Value::Number(n.into()))
            }
            Token::Float(f) => {
                self.bump();
                Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| self.error("float literal is not finite"))
            }
            Token::Str(s) => {
                self.bump();
                Ok(Value::String(s))
            }
            Token::Name(name) => {
                self.bump();
                Ok(match name.as_str() {
                    "true" => Value::Bool(true),
                    "false" => Value::Bool(false),
                    "null" => Value::Null,
                    _ => Value::String(name),
                })
            }
            Token::Punct('[') => {
                self.bump();
                let mut items = Vec::new();
                while !self.eat_punct(']') {
                    if self.at_eof() {
                        return Err(self.unexpected("']'"));
                    }
                    items.push(self.nested(|c| c.parse_value(const_only))?);
                }
                Ok(Value::Array(items))
            }
            Token::Punct('{') => {
                self.bump();
                let mut object = Map::new();
                while !self.eat_punct('}') {
                    let key = self.expect_name()?;
                    self.expect_punct(':')?;
                    let value = self.nested(|c| c.parse_value(const_only))?;
                    object.insert(key, value);
                }
                Ok(Value::Object(object))
            }
            _ => Err(self.unexpected("a value")),
        }
    }

    /// `(name: value ...)`; returns an empty map when no parenthesis follows
    pub(crate) fn parse_argument_values(&mut self, const_only: bool) -> Result<Map<String, Value>, ParseError> {
        let mut arguments = Map::new();
        if !self.eat_punct('(') {
            return Ok(arguments);
        }
        while !self.eat_punct(')') {
            let name = self.expect_name()?;
            if arguments.contains_key(&name) {
                return Err(self.error(format!("duplicate argument '{}'", name)));
            }
            self.expect_punct(':')?;
            let value = self.parse_value(const_only)?;
            arguments.insert(name, value);
        }
        Ok(arguments)
    }

    pub(crate) fn parse_directives(&mut self, const_only: bool) -> Result<Vec<Directive>, ParseError> {
        let mut directives = Vec::new();
        while self.eat_punct('@') {
            let name = self.expect_name()?;
            let arguments = self.parse_argument_values(const_only)?;
            directives.push(Directive { name, arguments });
        }
        Ok(directives)
    }

    fn parse_description(&mut self) -> Option<String> {
        match self.peek() {
            Token::Str(s) => {
                let s = s.clone();
                self.bump();
                Some(s)
            }
            _ => None,
        }
    }

    fn parse_input_value(&mut self) -> Result<InputValue, ParseError> {
        let description = self.parse_description();
        let name = self.expect_name()?;
        self.expect_punct(':')?;
        let type_ref = self.parse_type_ref()?;
        let default_value = if self.eat_punct('=') {
            Some(self.parse_value(true)?)
        } else {
            None
        };
        let directives = self.parse_directives(true)?;
        Ok(InputValue {
            name,
            type_ref,
            default_value,
            description,
            directives,
        })
    }

    fn parse_argument_definitions(&mut self) -> Result<Vec<InputValue>, ParseError> {
        let mut arguments = Vec::new();
        if !self.eat_punct('(') {
            return Ok(arguments);
        }
        while !self.eat_punct(')') {
            if self.at_eof() {
                return Err(self.unexpected("')'"));
            }
            arguments.push(self.parse_input_value()?);
        }
        Ok(arguments)
    }

    fn parse_field_definition(&mut self) -> Result<FieldDefinition, ParseError> {
        let description = self.parse_description();
        let name = self.expect_name()?;
        let arguments = self.parse_argument_definitions()?;
        self.expect_punct(':')?;
        let type_ref = self.parse_type_ref()?;
        let directives = self.parse_directives(true)?;
        Ok(FieldDefinition {
            name,
            type_ref,
            arguments,
            directives,
            default_value: None,
            description,
        })
    }

    fn parse_fields_block(&mut self) -> Result<Vec<FieldDefinition>, ParseError> {
        let mut fields = Vec::new();
        if !self.eat_punct('{') {
            return Ok(fields);
        }
        while !self.eat_punct('}') {
            if self.at_eof() {
                return Err(self.unexpected("'}'"));
            }
            fields.push(self.parse_field_definition()?);
        }
        Ok(fields)
    }

    fn parse_input_fields_block(&mut self) -> Result<Vec<FieldDefinition>, ParseError> {
        let mut fields = Vec::new();
        if !self.eat_punct('{') {
            return Ok(fields);
        }
        while !self.eat_punct('}') {
            if self.at_eof() {
                return Err(self.unexpected("'}'"));
            }
            let value = self.parse_input_value()?;
            fields.push(FieldDefinition {
                name: value.name,
                type_ref: value.type_ref,
                arguments: Vec::new(),
                directives: value.directives,
                default_value: value.default_value,
                description: value.description,
            });
        }
        Ok(fields)
    }

    /// `implements A & B` (leading `&` allowed)
    fn parse_implements(&mut self) -> Result<Vec<String>, ParseError> {
        let mut interfaces = Vec::new();
        if !self.eat_keyword("implements") {
            return Ok(interfaces);
        }
        self.eat_punct('&');
        interfaces.push(self.expect_name()?);
        while self.eat_punct('&') {
            interfaces.push(self.expect_name()?);
        }
        Ok(interfaces)
    }

    /// `= A | B` (leading `|` allowed)
    fn parse_union_members(&mut self) -> Result<Vec<String>, ParseError> {
        let mut members = Vec::new();
        if !self.eat_punct('=') {
            return Ok(members);
        }
        self.eat_punct('|');
        members.push(self.expect_name()?);
        while self.eat_punct('|') {
            members.push(self.expect_name()?);
        }
        Ok(members)
    }

    fn parse_enum_values(&mut self) -> Result<Vec<EnumValue>, ParseError> {
        let mut values = Vec::new();
        if !self.eat_punct('{') {
            return Ok(values);
        }
        while !self.eat_punct('}') {
            if self.at_eof() {
                return Err(self.unexpected("'}'"));
            }
            let description = self.parse_description();
            let name = self.expect_name()?;
            if matches!(name.as_str(), "true" | "false" | "null") {
                return Err(self.error(format!("'{}' cannot be an enum value", name)));
            }
            let directives = self.parse_directives(true)?;
            values.push(EnumValue {
                name,
                directives,
                description,
            });
        }
        Ok(values)
    }

    /// Body of a named type definition after its keyword
    fn parse_type_body(&mut self, kind: TypeKind, description: Option<String>) -> Result<TypeDefinition, ParseError> {
        let name = self.expect_name()?;
        let mut def = TypeDefinition::new(name, kind);
        def.description = description;

        match kind {
            TypeKind::Object | TypeKind::Interface => {
                def.interfaces = self.parse_implements()?;
                def.directives = self.parse_directives(true)?;
                def.fields = self.parse_fields_block()?;
            }
            TypeKind::Union => {
                def.directives = self.parse_directives(true)?;
                def.members = self.parse_union_members()?;
            }
            TypeKind::Enum => {
                def.directives = self.parse_directives(true)?;
                def.values = self.parse_enum_values()?;
            }
            TypeKind::Scalar => {
                def.directives = self.parse_directives(true)?;
            }
            TypeKind::Input => {
                def.directives = self.parse_directives(true)?;
                def.fields = self.parse_input_fields_block()?;
            }
        }
        Ok(def)
    }

    fn parse_root_operations(&mut self) -> Result<Vec<(String, String)>, ParseError> {
        let mut roots = Vec::new();
        self.expect_punct('{')?;
        while !self.eat_punct('}') {
            let (line, column) = self.position();
            let operation = self.expect_name()?;
            if !matches!(operation.as_str(), "query" | "mutation" | "subscription") {
                return Err(ParseError::new(
                    line,
                    column,
                    format!("unknown root operation '{}'", operation),
                ));
            }
            self.expect_punct(':')?;
            let type_name = self.expect_name()?;
            roots.push((operation, type_name));
        }
        Ok(roots)
    }

    fn parse_directive_definition(&mut self) -> Result<DirectiveDefinition, ParseError> {
        self.expect_punct('@')?;
        let name = self.expect_name()?;
        let arguments = self.parse_argument_definitions()?;
        let repeatable = self.eat_keyword("repeatable");
        self.expect_keyword("on")?;
        self.eat_punct('|');
        let mut locations = vec![self.expect_name()?];
        while self.eat_punct('|') {
            locations.push(self.expect_name()?);
        }
        Ok(DirectiveDefinition {
            name,
            arguments,
            locations,
            repeatable,
        })
    }
}

fn type_keyword(keyword: &str) -> Option<TypeKind> {
    match keyword {
        "type" => Some(TypeKind::Object),
        "interface" => Some(TypeKind::Interface),
        "union" => Some(TypeKind::Union),
        "enum" => Some(TypeKind::Enum),
        "scalar" => Some(TypeKind::Scalar),
        "input" => Some(TypeKind::Input),
        _ => None,
    }
}

/// Where a definition appeared, for validation messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Location {
    pub line: usize,
    pub column: usize,
}

/// Raw type-system definitions before semantic validation
#[derive(Debug, Default)]
pub(crate) struct SchemaDocument {
    pub types: Vec<(TypeDefinition, Location)>,
    pub extensions: Vec<(TypeDefinition, Location)>,
    pub roots: Vec<(String, String)>,
    pub root_extensions: Vec<(String, String)>,
    pub schema_definitions: usize,
    pub directives: Vec<DirectiveDefinition>,
}

/// Parse SDL text into raw definitions
pub(crate) fn parse_document(source: &str) -> Result<SchemaDocument, ParseError> {
    let mut cursor = Cursor::new(source)?;
    let mut doc = SchemaDocument::default();

    while !cursor.at_eof() {
        let description = cursor.parse_description();
        let (line, column) = cursor.position();
        let location = Location { line, column };

        let keyword = match cursor.peek() {
            Token::Name(name) => name.clone(),
            Token::Punct('{') => {
                return Err(cursor.error("executable definitions are not allowed in a schema document"));
            }
            _ => return Err(cursor.unexpected("a definition")),
        };

        match keyword.as_str() {
            "schema" => {
                cursor.bump();
                cursor.parse_directives(true)?;
                doc.roots.extend(cursor.parse_root_operations()?);
                doc.schema_definitions += 1;
            }
            "directive" => {
                cursor.bump();
                doc.directives.push(cursor.parse_directive_definition()?);
            }
            "extend" => {
                cursor.bump();
                if cursor.eat_keyword("schema") {
                    cursor.parse_directives(true)?;
                    if cursor.is_punct('{') {
                        doc.root_extensions.extend(cursor.parse_root_operations()?);
                    }
                    continue;
                }
                let target = cursor.expect_name()?;
                let kind = type_keyword(&target).ok_or_else(|| {
                    ParseError::new(line, column, format!("cannot extend '{}'", target))
                })?;
                let (line, column) = cursor.position();
                let ext = cursor.parse_type_body(kind, None)?;
                doc.extensions.push((ext, Location { line, column }));
            }
            "query" | "mutation" | "subscription" | "fragment" => {
                return Err(cursor.error("executable definitions are not allowed in a schema document"));
            }
            other => match type_keyword(other) {
                Some(kind) => {
                    cursor.bump();
                    let def = cursor.parse_type_body(kind, description)?;
                    doc.types.push((def, location));
                }
                None => return Err(cursor.unexpected("a definition")),
            },
        }
    }

    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deep_nesting_is_a_parse_error() {
        let deep_type = format!("type Query {{ a: {} }}", "[".repeat(200_000));
        let err = parse_document(&deep_type).unwrap_err();
        assert!(err.message.contains("nesting too deep"));

        let deep_value = format!("type Query {{ a(x: Int = {}): Int }}", "[".repeat(200_000));
        assert!(parse_document(&deep_value).unwrap_err().message.contains("nesting too deep"));

        let nested_ok = format!("type Query {{ a: {}Int{} }}", "[".repeat(10), "]".repeat(10));
        assert!(parse_document(&nested_ok).is_ok());
    }

    #[test]
    fn test_parse_object_with_arguments() {
        let doc = parse_document(
            r#"type Query { person(nic: String!, limit: Int = 10): Person @auth(role: "admin") }"#,
        )
        .unwrap();
        let (query, _) = &doc.types[0];
        let person = query.field("person").unwrap();
        assert_eq!(person.type_signature(), "Person");
        assert_eq!(person.arguments.len(), 2);
        assert!(person.argument("nic").unwrap().is_required());
        assert_eq!(person.argument("limit").unwrap().default_value, Some(Value::from(10)));
        assert_eq!(person.directives[0].argument("role"), Some(&Value::from("admin")));
    }

    #[test]
    fn test_parse_all_kinds() {
        let doc = parse_document(
            r#"
            "Root"
            type Query implements Node & Named { id: ID! }
            interface Node { id: ID! }
            union Result = | Person | Vehicle
            enum Color { RED GREEN @deprecated(reason: "gone") }
            scalar Date @specifiedBy(url: "https://example.com")
            input Filter { term: String = "x", tags: [String!] }
            directive @auth(role: String) repeatable on FIELD_DEFINITION | OBJECT
            schema { query: Query }
            extend type Query { extra: Int }
            "#,
        )
        .unwrap();
        let kinds: Vec<TypeKind> = doc.types.iter().map(|(t, _)| t.kind).collect();
        assert_eq!(
            kinds,
            vec![TypeKind::Object, TypeKind::Interface, TypeKind::Union, TypeKind::Enum, TypeKind::Scalar, TypeKind::Input]
        );
        assert_eq!(doc.types[0].0.description.as_deref(), Some("Root"));
        assert_eq!(doc.types[0].0.interfaces, vec!["Node", "Named"]);
        assert_eq!(doc.types[2].0.members, vec!["Person", "Vehicle"]);
        assert!(doc.types[3].0.value("GREEN").unwrap().is_deprecated());
        assert_eq!(doc.types[5].0.fields[1].type_signature(), "[String!]");
        assert!(doc.directives[0].repeatable);
        assert_eq!(doc.roots, vec![("query".to_string(), "Query".to_string())]);
        assert_eq!(doc.extensions.len(), 1);
    }

    #[test]
    fn test_missing_colon_reports_position() {
        let err = parse_document("type Query {\n  name String\n}").unwrap_err();
        assert_eq!((err.line, err.column), (2, 8));
        assert!(err.message.contains("expected ':'"));
    }

    #[test]
    fn test_unclosed_block() {
        let err = parse_document("type Query { name: String").unwrap_err();
        assert!(err.message.contains("'}'"));
    }

    #[test]
    fn test_rejects_executable_definitions() {
        assert!(parse_document("{ name }").is_err());
        assert!(parse_document("query { name }").is_err());
    }

    #[test]
    fn test_variables_not_allowed_in_sdl() {
        let err = parse_document("type Query { a(x: Int = $y): Int }").unwrap_err();
        assert!(err.message.contains("variables"));
    }
}
