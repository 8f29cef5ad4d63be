//! Parsed variable references: `ns:scope.lval[index]...`.
//!
//! # Mangling
//!
//! During iteration the per-step `this` scope holds values pulled in from
//! other bundles. A qualified reference `bundle.list` is rewritten to the flat
//! token `bundle#list` (and `ns:bundle.list` to `ns*bundle#list`) so it can be
//! bound in `this` without colliding with a local `list`. [`VarRef::mangle`]
//! and [`VarRef::demangle`] convert between the two forms.

use std::fmt;

use smallvec::SmallVec;

use crate::syntax::{find_index_end, SyntaxError};

/// Replaces `.` between scope and lval in a mangled token.
pub const MANGLED_SCOPE_SEP: char = '#';
/// Replaces `:` between namespace and scope in a mangled token.
pub const MANGLED_NS_SEP: char = '*';

/// A variable reference, possibly qualified and indexed.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VarRef {
    pub ns: Option<String>,
    pub scope: Option<String>,
    pub lval: String,
    pub indices: SmallVec<[String; 2]>,
}

impl VarRef {
    /// Unqualified, unindexed reference.
    pub fn new(lval: impl Into<String>) -> Self {
        VarRef {
            ns: None,
            scope: None,
            lval: lval.into(),
            indices: SmallVec::new(),
        }
    }

    /// Reference qualified with a scope and optional namespace.
    pub fn qualified(ns: Option<&str>, scope: &str, lval: impl Into<String>) -> Self {
        VarRef {
            ns: ns.map(str::to_owned),
            scope: Some(scope.to_owned()),
            lval: lval.into(),
            indices: SmallVec::new(),
        }
    }

    /// Parse `ns:scope.lval[i][j]`.
    ///
    /// Only a `.` or `:` before the first `[` separates qualifiers, so index
    /// keys may contain dots (`a[host.example.com]`).
    pub fn parse(text: &str) -> Result<VarRef, SyntaxError> {
        let invalid = || SyntaxError::InvalidReference(text.to_owned());

        let (base, index_text) = match text.find('[') {
            Some(pos) => (&text[..pos], &text[pos..]),
            None => (text, ""),
        };

        let (ns, rest) = match base.split_once(':') {
            Some((ns, rest)) if !ns.is_empty() => (Some(ns.to_owned()), rest),
            Some(_) => return Err(invalid()),
            None => (None, base),
        };
        let (scope, lval) = match rest.split_once('.') {
            Some((scope, lval)) if !scope.is_empty() => (Some(scope.to_owned()), lval),
            Some(_) => return Err(invalid()),
            None => (None, rest),
        };
        if lval.is_empty() || (ns.is_some() && scope.is_none()) {
            return Err(invalid());
        }

        let mut indices = SmallVec::new();
        let mut rest = index_text;
        while !rest.is_empty() {
            let body = rest.strip_prefix('[').ok_or_else(invalid)?;
            let end = find_index_end(body).ok_or_else(invalid)?;
            indices.push(body[..end].to_owned());
            rest = &body[end + 1..];
        }

        Ok(VarRef {
            ns,
            scope,
            lval: lval.to_owned(),
            indices,
        })
    }

    /// Parse either a plain reference or a mangled flat token.
    pub fn demangle(token: &str) -> Result<VarRef, SyntaxError> {
        let split = token.find('[').unwrap_or(token.len());
        let (base, index_text) = token.split_at(split);
        if !base.contains(MANGLED_SCOPE_SEP) {
            return VarRef::parse(token);
        }
        let base: String = base
            .chars()
            .map(|c| match c {
                MANGLED_SCOPE_SEP => '.',
                MANGLED_NS_SEP => ':',
                other => other,
            })
            .collect();
        VarRef::parse(&format!("{base}{index_text}"))
    }

    #[inline]
    pub fn is_qualified(&self) -> bool {
        self.scope.is_some()
    }

    /// Fill in a scope (and namespace) if this reference has none.
    #[must_use]
    pub fn qualify(mut self, ns: Option<&str>, scope: &str) -> VarRef {
        if self.scope.is_none() {
            self.scope = Some(scope.to_owned());
            if self.ns.is_none() {
                self.ns = ns.map(str::to_owned);
            }
        }
        self
    }

    /// Same reference without indices.
    pub fn indexless(&self) -> VarRef {
        VarRef {
            ns: self.ns.clone(),
            scope: self.scope.clone(),
            lval: self.lval.clone(),
            indices: SmallVec::new(),
        }
    }

    /// Flat token usable as a `this` lval; unqualified references are unchanged.
    pub fn mangle(&self) -> String {
        let mut out = String::new();
        if let Some(scope) = &self.scope {
            if let Some(ns) = &self.ns {
                out.push_str(ns);
                out.push(MANGLED_NS_SEP);
            }
            out.push_str(scope);
            out.push(MANGLED_SCOPE_SEP);
        }
        out.push_str(&self.lval);
        self.write_indices(&mut out);
        out
    }

    /// Index suffix as written in policy: `[a][b]`.
    pub fn index_suffix(&self) -> String {
        let mut out = String::new();
        self.write_indices(&mut out);
        out
    }

    fn write_indices(&self, out: &mut String) {
        for index in &self.indices {
            out.push('[');
            out.push_str(index);
            out.push(']');
        }
    }
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scope) = &self.scope {
            if let Some(ns) = &self.ns {
                write!(f, "{ns}:")?;
            }
            write!(f, "{scope}.")?;
        }
        write!(f, "{}{}", self.lval, self.index_suffix())
    }
}
