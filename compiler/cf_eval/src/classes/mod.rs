//! Classes and class expressions.
//!
//! A class is a named boolean that is either defined or not. Guards on
//! promises and constraints are class expressions:
//!
//! ```text
//! expr    := or
//! or      := and ( ('|' | '||') and )*
//! and     := not ( ('&' | '.') not )*
//! not     := '!' not | primary
//! primary := '(' expr ')' | name
//! ```

use rustc_hash::FxHashSet;

use cf_ir::syntax::{canonify, is_expandable};

use crate::errors::{self, EvalResult};

/// The set of defined classes.
#[derive(Clone, Debug, Default)]
pub struct ClassTable {
    defined: FxHashSet<String>,
}

impl ClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding `any` plus the canonified OS and architecture names.
    pub fn with_hard_classes() -> Self {
        let mut table = ClassTable::new();
        table.define("any");
        table.define(std::env::consts::OS);
        table.define(std::env::consts::ARCH);
        table
    }

    /// Define a class. The name is canonified first.
    pub fn define(&mut self, name: &str) {
        self.defined.insert(canonify(name));
    }

    pub fn undefine(&mut self, name: &str) {
        self.defined.remove(&canonify(name));
    }

    #[inline]
    pub fn is_defined(&self, name: &str) -> bool {
        self.defined.contains(name)
    }

    pub fn len(&self) -> usize {
        self.defined.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defined.is_empty()
    }

    /// Defined classes in sorted order.
    pub fn sorted(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.defined.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Evaluate a class expression.
    ///
    /// An expression that still holds `$(..)` references is not defined.
    pub fn evaluate(&self, expr: &str) -> EvalResult<bool> {
        if is_expandable(expr) {
            return Ok(false);
        }
        let mut parser = Parser {
            text: expr,
            pos: 0,
            classes: self,
        };
        let value = parser.or()?;
        parser.skip_ws();
        if parser.pos != expr.len() {
            return Err(errors::invalid_class_expression(expr));
        }
        Ok(value)
    }
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
    classes: &'a ClassTable,
}

impl Parser<'_> {
    fn skip_ws(&mut self) {
        let rest = &self.text[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.text.as_bytes().get(self.pos).copied()
    }

    fn error(&self) -> crate::EvalError {
        errors::invalid_class_expression(self.text)
    }

    fn or(&mut self) -> EvalResult<bool> {
        let mut value = self.and()?;
        while self.peek() == Some(b'|') {
            self.pos += 1;
            if self.text.as_bytes().get(self.pos) == Some(&b'|') {
                self.pos += 1;
            }
            let rhs = self.and()?;
            value = value || rhs;
        }
        Ok(value)
    }

    fn and(&mut self) -> EvalResult<bool> {
        let mut value = self.not()?;
        while matches!(self.peek(), Some(b'&' | b'.')) {
            self.pos += 1;
            if self.text.as_bytes().get(self.pos) == Some(&b'&') {
                self.pos += 1;
            }
            let rhs = self.not()?;
            value = value && rhs;
        }
        Ok(value)
    }

    fn not(&mut self) -> EvalResult<bool> {
        if self.peek() == Some(b'!') {
            self.pos += 1;
            return Ok(!self.not()?);
        }
        self.primary()
    }

    fn primary(&mut self) -> EvalResult<bool> {
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let value = self.or()?;
                if self.peek() != Some(b')') {
                    return Err(self.error());
                }
                self.pos += 1;
                Ok(value)
            }
            Some(_) => {
                let rest = &self.text[self.pos..];
                let len = rest
                    .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == ':'))
                    .unwrap_or(rest.len());
                if len == 0 {
                    return Err(self.error());
                }
                self.pos += len;
                Ok(self.classes.is_defined(&rest[..len]))
            }
            None => Err(self.error()),
        }
    }
}
