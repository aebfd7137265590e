//! Tokenizer shared by the SDL and query parsers
//!
//! Token recognizers are nom parsers over `&str`. The driver loop in
//! [`tokenize`] tracks line/column while consuming input so every token,
//! and every lexical error, carries its source position.
//!
//! Commas, whitespace, the byte-order mark and `#` comments are insignificant.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, one_of, satisfy},
    combinator::{map, opt, recognize},
    sequence::{pair, tuple},
    IResult,
};

use crate::error::ParseError;

/// Lexical tokens
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Name(String),
    /// One of `{ } ( ) [ ] : ! = @ | & $`
    Punct(char),
    /// `...`
    Spread,
    /// Quoted or block string, escapes already resolved
    Str(String),
    Int(i64),
    Float(f64),
    Eof,
}

impl Token {
    /// Short description for error messages
    pub fn describe(&self) -> String {
        match self {
            Token::Name(name) => format!("'{}'", name),
            Token::Punct(c) => format!("'{}'", c),
            Token::Spread => "'...'".to_string(),
            Token::Str(_) => "string".to_string(),
            Token::Int(n) => format!("integer {}", n),
            Token::Float(n) => format!("float {}", n),
            Token::Eof => "end of input".to_string(),
        }
    }
}

/// A token with the position of its first character (1-based)
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
    pub column: usize,
}

/// Split source text into positioned tokens, terminated by [`Token::Eof`]
pub fn tokenize(input: &str) -> Result<Vec<Spanned>, ParseError> {
    let mut remaining = input;
    let mut line = 1;
    let mut column = 1;
    let mut tokens = Vec::new();

    loop {
        let (rest, _) = ignored(remaining).map_err(|_| ParseError::new(line, column, "unreadable input"))?;
        advance(&remaining[..remaining.len() - rest.len()], &mut line, &mut column);
        remaining = rest;

        if remaining.is_empty() {
            tokens.push(Spanned { token: Token::Eof, line, column });
            return Ok(tokens);
        }

        match token(remaining) {
            Ok((rest, token)) if rest.len() < remaining.len() => {
                tokens.push(Spanned { token, line, column });
                advance(&remaining[..remaining.len() - rest.len()], &mut line, &mut column);
                remaining = rest;
            }
            _ if remaining.starts_with('"') => {
                return Err(ParseError::new(line, column, "unterminated or malformed string"));
            }
            _ => {
                let c = remaining.chars().next().unwrap_or('?');
                return Err(ParseError::new(line, column, format!("unexpected character '{}'", c)));
            }
        }
    }
}

fn advance(consumed: &str, line: &mut usize, column: &mut usize) {
    for c in consumed.chars() {
        if c == '\n' {
            *line += 1;
            *column = 1;
        } else {
            *column += 1;
        }
    }
}

/// Whitespace, commas, BOM and comments
fn ignored(input: &str) -> IResult<&str, ()> {
    let mut rest = input;
    loop {
        if let Ok((next, _)) = take_while1::<_, _, nom::error::Error<&str>>(|c: char| {
            c.is_whitespace() || c == ',' || c == '\u{feff}'
        })(rest)
        {
            rest = next;
            continue;
        }
        if let Ok((next, _)) = comment(rest) {
            rest = next;
            continue;
        }
        return Ok((rest, ()));
    }
}

fn comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(char('#'), take_while(|c: char| c != '\n' && c != '\r')))(input)
}

/// Parse a single token. Order matters: block strings before strings,
/// spread before punctuation, numbers before names.
fn token(input: &str) -> IResult<&str, Token> {
    alt((
        map(block_string, Token::Str),
        map(string_literal, Token::Str),
        map(tag("..."), |_| Token::Spread),
        number,
        map(name, |s: &str| Token::Name(s.to_string())),
        map(one_of("{}()[]:!=@|&$"), Token::Punct),
    ))(input)
}

fn name(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

fn number(input: &str) -> IResult<&str, Token> {
    let (rest, text) = recognize(tuple((
        opt(char('-')),
        digit1,
        opt(pair(char('.'), digit1)),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)?;

    // A name character straight after a number is not a valid token boundary
    if rest.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_' || c == '.') {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit)));
    }

    let is_float = text.contains(['.', 'e', 'E']);
    let token = if is_float {
        text.parse::<f64>().map(Token::Float).ok()
    } else {
        text.parse::<i64>().map(Token::Int).ok()
    };
    match token {
        Some(token) => Ok((rest, token)),
        None => Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))),
    }
}

fn string_literal(input: &str) -> IResult<&str, String> {
    let (mut rest, _) = char('"')(input)?;
    let mut value = String::new();
    loop {
        let mut chars = rest.chars();
        match chars.next() {
            None | Some('\n') | Some('\r') => {
                return Err(nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Char)));
            }
            Some('"') => return Ok((chars.as_str(), value)),
            Some('\\') => {
                let escaped = chars.next();
                let decoded = match escaped {
                    Some('"') => '"',
                    Some('\\') => '\\',
                    Some('/') => '/',
                    Some('b') => '\u{8}',
                    Some('f') => '\u{c}',
                    Some('n') => '\n',
                    Some('r') => '\r',
                    Some('t') => '\t',
                    Some('u') => {
                        let hex: String = chars.by_ref().take(4).collect();
                        match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                            Some(c) if hex.len() == 4 => c,
                            _ => {
                                return Err(nom::Err::Failure(nom::error::Error::new(
                                    input,
                                    nom::error::ErrorKind::Escaped,
                                )))
                            }
                        }
                    }
                    _ => {
                        return Err(nom::Err::Failure(nom::error::Error::new(
                            input,
                            nom::error::ErrorKind::Escaped,
                        )))
                    }
                };
                value.push(decoded);
                rest = chars.as_str();
            }
            Some(c) => {
                value.push(c);
                rest = chars.as_str();
            }
        }
    }
}

fn block_string(input: &str) -> IResult<&str, String> {
    let (body_start, _) = tag("\"\"\"")(input)?;
    let mut raw = String::new();
    let mut rest = body_start;
    loop {
        if let Some(after) = rest.strip_prefix("\\\"\"\"") {
            raw.push_str("\"\"\"");
            rest = after;
        } else if let Some(after) = rest.strip_prefix("\"\"\"") {
            return Ok((after, dedent_block(&raw)));
        } else {
            let mut chars = rest.chars();
            match chars.next() {
                Some(c) => {
                    raw.push(c);
                    rest = chars.as_str();
                }
                None => {
                    return Err(nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
                }
            }
        }
    }
}

/// Remove common indentation and blank leading/trailing lines
fn dedent_block(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().collect();
    let indent = lines
        .iter()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.chars().take_while(|c| c.is_whitespace()).count())
        .min()
        .unwrap_or(0);

    let mut out: Vec<String> = lines
        .iter()
        .enumerate()
        .map(|(i, l)| {
            if i == 0 {
                l.to_string()
            } else {
                l.chars().skip(indent).collect()
            }
        })
        .collect();

    while out.first().map(|l| l.trim().is_empty()).unwrap_or(false) {
        out.remove(0);
    }
    while out.last().map(|l| l.trim().is_empty()).unwrap_or(false) {
        out.pop();
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedent_counts_wide_whitespace_as_one() {
        let raw = "\n\u{3000}\u{3000}first\n\u{3000}\u{3000}  second\n";
        assert_eq!(dedent_block(raw), "first\n  second");
    }

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            kinds("type Query { name: String! }"),
            vec![
                Token::Name("type".into()),
                Token::Name("Query".into()),
                Token::Punct('{'),
                Token::Name("name".into()),
                Token::Punct(':'),
                Token::Name("String".into()),
                Token::Punct('!'),
                Token::Punct('}'),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_and_commas_ignored() {
        let tokens = kinds("# leading\na, b # trailing\n");
        assert_eq!(tokens, vec![Token::Name("a".into()), Token::Name("b".into()), Token::Eof]);
    }

    #[test]
    fn test_positions() {
        let tokens = tokenize("type Query {\n  age: Int\n}").unwrap();
        let age = &tokens[3];
        assert_eq!(age.token, Token::Name("age".into()));
        assert_eq!((age.line, age.column), (2, 3));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("42 -7 1.5 2e3"), vec![
            Token::Int(42),
            Token::Int(-7),
            Token::Float(1.5),
            Token::Float(2000.0),
            Token::Eof,
        ]);
    }

    #[test]
    fn test_strings() {
        assert_eq!(kinds(r#""a\"b\u0041""#), vec![Token::Str("a\"bA".into()), Token::Eof]);
        let block = kinds("\"\"\"\n    Person record\n      indented\n\"\"\"");
        assert_eq!(block[0], Token::Str("Person record\n  indented".into()));
    }

    #[test]
    fn test_spread_and_variables() {
        assert_eq!(
            kinds("...on $id"),
            vec![Token::Spread, Token::Name("on".into()), Token::Punct('$'), Token::Name("id".into()), Token::Eof]
        );
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("type Query {\n  a: Int%\n}").unwrap_err();
        assert_eq!((err.line, err.column), (2, 9));
        assert!(err.message.contains('%'));
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("\"\"\"never closed").unwrap_err();
        assert_eq!((err.line, err.column), (1, 1));
        assert!(err.message.contains("unterminated"));
    }
}
