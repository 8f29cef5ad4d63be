//! Lexical helpers for variable references inside strings.
//!
//! A reference is a sigil (`$` for scalars, `@` for lists) followed by a
//! bracketed name: `$(name)`, `${name}`, `@(name)`. Names may themselves
//! contain references (`$(list_$(suffix))`) and index brackets
//! (`$(array[key])`), so extraction counts every nested `(`, `{` and `[`.
//!
//! # Segments
//!
//! [`Segments`] splits a string into literal runs and `$` references in one
//! left-to-right pass. Both the interpolator and the iterator mapper walk
//! strings through it, so the two always agree on where a reference starts
//! and ends.

use thiserror::Error;

/// Placeholder element for an empty list.
pub const NULL_VALUE: &str = "cf_null";

/// Malformed reference syntax.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SyntaxError {
    #[error("empty variable name in brackets: '{0}'")]
    EmptyVariableName(String),
    #[error("bracket mismatch in variable reference: '{0}'")]
    BracketMismatch(String),
    #[error("invalid variable reference: '{0}'")]
    InvalidReference(String),
}

/// One complete reference found at the start of a string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VarSpan<'a> {
    /// `$` or `@`.
    pub sigil: char,
    /// `(` or `{`.
    pub open: char,
    /// Text between the outer brackets.
    pub inner: &'a str,
    /// The whole reference including sigil and brackets.
    pub text: &'a str,
}

impl VarSpan<'_> {
    pub fn close(&self) -> char {
        closing_bracket(self.open)
    }

    /// Rebuild the reference around a different name, keeping bracket style.
    pub fn with_inner(&self, inner: &str) -> String {
        let mut out = String::with_capacity(inner.len() + 3);
        out.push(self.sigil);
        out.push(self.open);
        out.push_str(inner);
        out.push(self.close());
        out
    }
}

fn closing_bracket(open: char) -> char {
    match open {
        '{' => '}',
        '[' => ']',
        _ => ')',
    }
}

/// Extract the reference that starts at `text[0]`.
///
/// Returns `Ok(None)` when `text` does not begin with a sigil followed by an
/// opening bracket (a stray `$` is just a character).
pub fn extract_var(text: &str) -> Result<Option<VarSpan<'_>>, SyntaxError> {
    let bytes = text.as_bytes();
    if bytes.len() < 2 || !matches!(bytes[0], b'$' | b'@') || !matches!(bytes[1], b'(' | b'{') {
        return Ok(None);
    }

    let open = char::from(bytes[1]);
    let mut depth = 1usize;
    for (i, &b) in bytes.iter().enumerate().skip(2) {
        match b {
            b'(' | b'{' | b'[' => depth += 1,
            b')' | b'}' | b']' => {
                depth -= 1;
                if depth == 0 {
                    if char::from(b) != closing_bracket(open) {
                        return Err(SyntaxError::BracketMismatch(text.to_owned()));
                    }
                    let inner = &text[2..i];
                    if inner.is_empty() {
                        return Err(SyntaxError::EmptyVariableName(text[..=i].to_owned()));
                    }
                    return Ok(Some(VarSpan {
                        sigil: char::from(bytes[0]),
                        open,
                        inner,
                        text: &text[..=i],
                    }));
                }
            }
            _ => {}
        }
    }

    Err(SyntaxError::BracketMismatch(text.to_owned()))
}

/// Inner name of the reference at the start of `text`.
pub fn extract_inner_var(text: &str) -> Result<Option<&str>, SyntaxError> {
    Ok(extract_var(text)?.map(|span| span.inner))
}

/// Full text of the reference at the start of `text`.
pub fn extract_outer_var(text: &str) -> Result<Option<&str>, SyntaxError> {
    Ok(extract_var(text)?.map(|span| span.text))
}

/// A piece of a string split by [`Segments`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    Reference(VarSpan<'a>),
    /// Unparseable tail starting at a `$`; nothing after it is scanned.
    Malformed(&'a str, SyntaxError),
}

/// Left-to-right splitter over literal runs and `$` references.
pub struct Segments<'a> {
    rest: &'a str,
}

impl<'a> Segments<'a> {
    pub fn new(text: &'a str) -> Self {
        Segments { rest: text }
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Segment<'a>> {
        if self.rest.is_empty() {
            return None;
        }

        let Some(pos) = self.rest.find('$') else {
            let literal = self.rest;
            self.rest = "";
            return Some(Segment::Literal(literal));
        };

        if pos > 0 {
            let literal = &self.rest[..pos];
            self.rest = &self.rest[pos..];
            return Some(Segment::Literal(literal));
        }

        match extract_var(self.rest) {
            Ok(Some(span)) => {
                self.rest = &self.rest[span.text.len()..];
                Some(Segment::Reference(span))
            }
            Ok(None) => {
                let dollar = &self.rest[..1];
                self.rest = &self.rest[1..];
                Some(Segment::Literal(dollar))
            }
            Err(err) => {
                let tail = self.rest;
                self.rest = "";
                Some(Segment::Malformed(tail, err))
            }
        }
    }
}

/// True if `text` contains `$(` or `${`.
pub fn is_expandable(text: &str) -> bool {
    text.as_bytes()
        .windows(2)
        .any(|w| w[0] == b'$' && matches!(w[1], b'(' | b'{'))
}

/// True if `text` holds at least one well-formed `$` or `@` reference.
///
/// A `/` inside the brackets means the text is a shell-style command
/// substitution such as `$(/bin/cat file)`, not a variable.
pub fn is_var_string(text: &str) -> bool {
    let mut rest = text;
    while let Some(pos) = rest.find(['$', '@']) {
        rest = &rest[pos..];
        match extract_var(rest) {
            Ok(Some(span)) => return !span.inner.contains('/'),
            Ok(None) => rest = &rest[1..],
            Err(_) => return false,
        }
    }
    false
}

/// True if the whole of `text` is exactly one reference with `sigil`.
pub fn is_naked_var(text: &str, sigil: char) -> bool {
    matches!(
        extract_var(text),
        Ok(Some(span)) if span.sigil == sigil && span.text.len() == text.len()
    )
}

/// Name inside a naked reference: `@(list)` gives `list`.
pub fn get_naked(text: &str) -> Option<&str> {
    match extract_var(text) {
        Ok(Some(span)) if span.text.len() == text.len() => Some(span.inner),
        _ => None,
    }
}

/// True if `text` references `name` in any sigil and bracket style.
pub fn string_contains_var(text: &str, name: &str) -> bool {
    ['$', '@'].iter().any(|sigil| {
        [('(', ')'), ('{', '}')]
            .iter()
            .any(|(open, close)| text.contains(&format!("{sigil}{open}{name}{close}")))
    })
}

/// Turn arbitrary text into a legal class/handle name.
pub fn canonify(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Validate a variable identifier: `name` optionally followed by `[index]` groups.
///
/// The name part allows ASCII alphanumerics, `_`, `.` and any non-ASCII
/// character. Each index group must be non-empty.
pub fn is_valid_identifier(text: &str) -> bool {
    let base_len = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.' || !c.is_ascii()))
        .unwrap_or(text.len());
    if base_len == 0 {
        return false;
    }

    let mut rest = &text[base_len..];
    while !rest.is_empty() {
        let Some(body) = rest.strip_prefix('[') else {
            return false;
        };
        let Some(end) = find_index_end(body) else {
            return false;
        };
        if end == 0 {
            return false;
        }
        rest = &body[end + 1..];
    }
    true
}

/// Position of the `]` closing an index whose `[` was already consumed.
pub(crate) fn find_index_end(body: &str) -> Option<usize> {
    let mut depth = 1usize;
    for (i, b) in body.bytes().enumerate() {
        match b {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
