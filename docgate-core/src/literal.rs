//! Parser for the shell-style filter mini-language.
//!
//! Raw filter strings arrive in the literal syntax a store shell accepts: bare or
//! quoted keys, single- or double-quoted strings, bare numbers and booleans, and
//! `/pattern/flags` regular expressions, e.g.
//!
//! ```text
//! {$or:[{name:'Alice'},{active:true},{email:{$in:[/@x\.com$/i]}}]}
//! ```
//!
//! Structured store drivers only take documents, so the gateway parses these
//! strings with [`parse_filter`] right before execution.

use bson::{Bson, Document};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    value::regex_bson,
};

/// Parses a raw filter string. The top level must be an object.
pub fn parse_filter(input: &str) -> DocumentStoreResult<Document> {
    let mut parser = Parser::new(input);
    parser.skip_whitespace();
    let document = parser.parse_object()?;
    parser.skip_whitespace();

    if let Some(c) = parser.peek() {
        return Err(parser.error(&format!("unexpected trailing character '{c}'")));
    }

    Ok(document)
}

/// Parses a single literal value (scalar, array, object or regular expression).
pub fn parse_value(input: &str) -> DocumentStoreResult<Bson> {
    let mut parser = Parser::new(input);
    parser.skip_whitespace();
    let value = parser.parse_value()?;
    parser.skip_whitespace();

    if let Some(c) = parser.peek() {
        return Err(parser.error(&format!("unexpected trailing character '{c}'")));
    }

    Ok(value)
}

/// Returns `true` if `key` can be written without quotes.
pub(crate) fn is_bare_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(is_bare_char)
}

fn is_bare_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.')
}

/// Deepest object/array nesting a raw filter may use.
const MAX_DEPTH: usize = 128;

struct Parser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().collect(),
            pos: 0,
            depth: 0,
        }
    }

    fn nested<T>(&mut self, parse: fn(&mut Self) -> DocumentStoreResult<T>) -> DocumentStoreResult<T> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(&format!("nesting deeper than {MAX_DEPTH} levels")));
        }

        self.depth += 1;
        let parsed = parse(self);
        self.depth -= 1;
        parsed
    }

    fn error(&self, message: &str) -> DocumentStoreError {
        DocumentStoreError::InvalidFilter(format!(
            "{message} at position {} in `{}`",
            self.pos, self.input
        ))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> DocumentStoreResult<()> {
        self.skip_whitespace();
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => {
                self.pos -= 1;
                Err(self.error(&format!("expected '{expected}', found '{c}'")))
            }
            None => Err(self.error(&format!("expected '{expected}', found end of input"))),
        }
    }

    fn parse_value(&mut self) -> DocumentStoreResult<Bson> {
        self.skip_whitespace();
        match self.peek() {
            Some('{') => Ok(Bson::Document(self.parse_object()?)),
            Some('[') => self.parse_array(),
            Some('\'') | Some('"') => Ok(Bson::String(self.parse_quoted()?)),
            Some('/') => self.parse_regex(),
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_number(),
            Some(c) if is_bare_char(c) => {
                let word = self.parse_bare();
                match word.as_str() {
                    "true" => Ok(Bson::Boolean(true)),
                    "false" => Ok(Bson::Boolean(false)),
                    "null" => Ok(Bson::Null),
                    _ => Err(self.error(&format!("unknown literal `{word}`"))),
                }
            }
            Some(c) => Err(self.error(&format!("unexpected character '{c}'"))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn parse_object(&mut self) -> DocumentStoreResult<Document> {
        self.nested(Self::parse_object_body)
    }

    fn parse_object_body(&mut self) -> DocumentStoreResult<Document> {
        self.expect('{')?;
        let mut document = Document::new();

        loop {
            self.skip_whitespace();
            if self.peek() == Some('}') {
                self.pos += 1;
                return Ok(document);
            }

            let key = match self.peek() {
                Some('\'') | Some('"') => self.parse_quoted()?,
                Some(c) if is_bare_char(c) => self.parse_bare(),
                Some(c) => return Err(self.error(&format!("unexpected character '{c}' in key"))),
                None => return Err(self.error("unterminated object")),
            };

            self.expect(':')?;
            let value = self.parse_value()?;
            document.insert(key, value);

            self.skip_whitespace();
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(document),
                Some(c) => {
                    self.pos -= 1;
                    return Err(self.error(&format!("expected ',' or '}}', found '{c}'")));
                }
                None => return Err(self.error("unterminated object")),
            }
        }
    }

    fn parse_array(&mut self) -> DocumentStoreResult<Bson> {
        self.nested(Self::parse_array_body)
    }

    fn parse_array_body(&mut self) -> DocumentStoreResult<Bson> {
        self.expect('[')?;
        let mut items = Vec::new();

        loop {
            self.skip_whitespace();
            if self.peek() == Some(']') {
                self.pos += 1;
                return Ok(Bson::Array(items));
            }

            items.push(self.parse_value()?);

            self.skip_whitespace();
            match self.bump() {
                Some(',') => continue,
                Some(']') => return Ok(Bson::Array(items)),
                Some(c) => {
                    self.pos -= 1;
                    return Err(self.error(&format!("expected ',' or ']', found '{c}'")));
                }
                None => return Err(self.error("unterminated array")),
            }
        }
    }

    fn parse_bare(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(is_bare_char) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn parse_quoted(&mut self) -> DocumentStoreResult<String> {
        let quote = self.bump().ok_or_else(|| self.error("expected a string"))?;
        let mut out = String::new();

        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(c) => out.push(c),
                    None => return Err(self.error("unterminated escape sequence")),
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn parse_number(&mut self) -> DocumentStoreResult<Bson> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
        {
            self.pos += 1;
        }

        let text = self.chars[start..self.pos].iter().collect::<String>();

        if let Ok(i) = text.parse::<i64>() {
            return Ok(i32::try_from(i)
                .map(Bson::Int32)
                .unwrap_or(Bson::Int64(i)));
        }

        text.parse::<f64>()
            .map(Bson::Double)
            .map_err(|_| self.error(&format!("invalid number `{text}`")))
    }

    fn parse_regex(&mut self) -> DocumentStoreResult<Bson> {
        self.expect('/')?;
        let mut pattern = String::new();

        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some('/') => pattern.push('/'),
                    Some(c) => {
                        pattern.push('\\');
                        pattern.push(c);
                    }
                    None => return Err(self.error("unterminated regular expression")),
                },
                Some('/') => break,
                Some(c) => pattern.push(c),
                None => return Err(self.error("unterminated regular expression")),
            }
        }

        let mut options = String::new();
        while self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            options.extend(self.bump());
        }

        regex_bson(&pattern, &options)
            .ok_or_else(|| self.error(&format!("invalid regular expression /{pattern}/{options}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn parses_shell_style_filters() {
        let parsed = parse_filter("{$or:[{name:'Alice',active:true},{age:42},{score:-1.5}]}").unwrap();

        assert_eq!(
            parsed,
            doc! {
                "$or": [
                    { "name": "Alice", "active": true },
                    { "age": 42 },
                    { "score": -1.5 },
                ]
            }
        );
    }

    #[test]
    fn accepts_quoted_keys_escapes_and_trailing_commas() {
        let parsed = parse_filter(r#"{ "full name": 'O\'Brien', "tags": ["a", "b",], nothing: null, }"#).unwrap();

        assert_eq!(
            parsed,
            doc! { "full name": "O'Brien", "tags": ["a", "b"], "nothing": Bson::Null }
        );
    }

    #[test]
    fn parses_regular_expressions() {
        let parsed = parse_filter(r"{email:{$in:[/@x\.com$/i, /^a\/b/]}}").unwrap();
        let values = parsed
            .get_document("email")
            .unwrap()
            .get_array("$in")
            .unwrap();

        assert_eq!(values[0], regex_bson(r"@x\.com$", "i").unwrap());
        assert_eq!(values[1], regex_bson("^a/b", "").unwrap());
    }

    #[test]
    fn large_integers_become_int64() {
        assert_eq!(parse_value("5000000000").unwrap(), Bson::Int64(5_000_000_000));
        assert_eq!(parse_value("12").unwrap(), Bson::Int32(12));
    }

    #[test]
    fn nesting_is_bounded() {
        let shallow = format!("{}1{}", "{a:".repeat(MAX_DEPTH), "}".repeat(MAX_DEPTH));
        assert!(parse_filter(&shallow).is_ok());

        let deep = format!("{}1{}", "{a:".repeat(MAX_DEPTH + 1), "}".repeat(MAX_DEPTH + 1));
        assert!(matches!(parse_filter(&deep), Err(DocumentStoreError::InvalidFilter(_))));

        let unterminated = "{a:".repeat(200_000);
        assert!(matches!(parse_filter(&unterminated), Err(DocumentStoreError::InvalidFilter(_))));

        let arrays = format!("{{a:{}}}", "[".repeat(200_000));
        assert!(matches!(parse_filter(&arrays), Err(DocumentStoreError::InvalidFilter(_))));
    }

    #[test]
    fn rejects_malformed_input() {
        for input in ["", "[1,2]", "{name:'x'", "{name 'x'}", "{a:1} extra", "{a:bogus}", "{a:'open}"] {
            assert!(
                matches!(parse_filter(input), Err(DocumentStoreError::InvalidFilter(_))),
                "expected `{input}` to be rejected"
            );
        }
    }
}
