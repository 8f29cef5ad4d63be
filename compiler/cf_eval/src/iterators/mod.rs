//! Iterator mapping: find the list variables a promise iterates over.
//!
//! Before a promise is expanded, every `$(name)` in its promiser, promisee
//! and constraint values is classified against the current scope:
//!
//! - names bound to lists (or to arrays/objects inside containers) are
//!   *iterators* and go to [`IteratorMap::lists`];
//! - names bound to scalars go to [`IteratorMap::scalars`];
//! - undefined names are ignored and surface later as unresolved.
//!
//! Qualified iterator references are rewritten in place to their mangled
//! token (`$(b.list)` becomes `$(b#list)`), so one `this` scope can hold the
//! current element of lists from several bundles.
//!
//! Variables found inside a nested name (`$(x_$(inner))`) are prepended, so
//! they spin fastest. Top-level variables are appended in discovery order.
//! `@(..)` references are never iterated, and `this.` references are skipped.

use tracing::trace;

use cf_ir::syntax::{is_expandable, Segment, Segments};
use cf_ir::{json_primitive_string, Rval, VarRef};
use serde_json::Value;

use crate::context::EvalContext;
use crate::errors::EvalResult;
use crate::scope::THIS_SCOPE;

/// Upper bound on the names a nested reference may compute.
const MAX_NAME_CANDIDATES: usize = 256;

/// Iterator and scalar references found in a promise.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IteratorMap {
    lists: Vec<String>,
    scalars: Vec<String>,
}

impl IteratorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterator tokens, fastest-varying first.
    pub fn lists(&self) -> &[String] {
        &self.lists
    }

    pub fn scalars(&self) -> &[String] {
        &self.scalars
    }

    #[inline]
    pub fn has_iterators(&self) -> bool {
        !self.lists.is_empty()
    }

    fn add_list(&mut self, token: String, nested: bool) {
        if self.lists.contains(&token) {
            return;
        }
        if nested {
            self.lists.insert(0, token);
        } else {
            self.lists.push(token);
        }
    }

    fn add_scalar(&mut self, name: &str) {
        if !self.scalars.iter().any(|s| s == name) {
            self.scalars.push(name.to_owned());
        }
    }
}

/// True for values a promise iterates over.
pub(crate) fn is_iterable(rval: &Rval) -> bool {
    match rval {
        Rval::List(_) => true,
        Rval::Container(value) => matches!(value, Value::Array(_) | Value::Object(_)),
        Rval::Scalar(_) | Rval::FnCall(_) => false,
    }
}

impl EvalContext {
    /// Classify the references in `rval`, mangling qualified iterators in place.
    pub fn map_iterators(&self, rval: &mut Rval, map: &mut IteratorMap) -> EvalResult<()> {
        match rval {
            Rval::Scalar(text) => self.map_text(text, map),
            Rval::List(items) => {
                for item in items {
                    self.map_iterators(item, map)?;
                }
                Ok(())
            }
            Rval::FnCall(call) => {
                for arg in &mut call.args {
                    self.map_iterators(arg, map)?;
                }
                Ok(())
            }
            Rval::Container(_) => Ok(()),
        }
    }

    /// Classify the references in one string, rewriting it in place.
    pub fn map_text(&self, text: &mut String, map: &mut IteratorMap) -> EvalResult<()> {
        if !is_expandable(text) {
            return Ok(());
        }
        let mapped = self.map_text_at(text, map, 0, false)?;
        *text = mapped;
        Ok(())
    }

    fn map_text_at(
        &self,
        text: &str,
        map: &mut IteratorMap,
        depth: usize,
        nested: bool,
    ) -> EvalResult<String> {
        let mut out = String::with_capacity(text.len());
        for segment in Segments::new(text) {
            match segment {
                Segment::Literal(literal) => out.push_str(literal),
                Segment::Malformed(tail, _) => out.push_str(tail),
                Segment::Reference(span) if is_expandable(span.inner) => {
                    let inner = self
                        .options
                        .nesting
                        .guard(depth, |next| self.map_text_at(span.inner, map, next, true))??;
                    for candidate in self.candidate_names(&inner) {
                        self.classify(&candidate, map, nested);
                    }
                    out.push_str(&span.with_inner(&inner));
                }
                Segment::Reference(span) => {
                    let token = self.classify(span.inner, map, nested);
                    out.push_str(&span.with_inner(&token));
                }
            }
        }
        Ok(out)
    }

    /// Record `name` and return the token to write back in its place.
    fn classify(&self, name: &str, map: &mut IteratorMap, nested: bool) -> String {
        let Ok(var) = VarRef::demangle(name) else {
            return name.to_owned();
        };
        if var.scope.as_deref() == Some(THIS_SCOPE) {
            return name.to_owned();
        }
        let Some(found) = self.lookup(&var) else {
            return name.to_owned();
        };

        if is_iterable(&found.rval) {
            let token = if var.is_qualified() {
                var.mangle()
            } else {
                name.to_owned()
            };
            trace!(token = %token, nested, "iterator found");
            map.add_list(token.clone(), nested);
            token
        } else {
            map.add_scalar(name);
            name.to_owned()
        }
    }

    /// Every name a nested reference can compute, trying each element of
    /// the lists it mentions. Names that stay unexpanded are dropped.
    fn candidate_names(&self, text: &str) -> Vec<String> {
        let mut names = vec![String::new()];
        for segment in Segments::new(text) {
            let choices: Vec<String> = match segment {
                Segment::Literal(literal) => vec![literal.to_owned()],
                Segment::Malformed(..) => return Vec::new(),
                Segment::Reference(span) => {
                    let inner_names = if is_expandable(span.inner) {
                        self.candidate_names(span.inner)
                    } else {
                        vec![span.inner.to_owned()]
                    };
                    inner_names
                        .iter()
                        .flat_map(|name| {
                            self.lookup_name(name)
                                .map(|found| scalar_values(&found.rval))
                                .unwrap_or_default()
                        })
                        .collect()
                }
            };
            names = names
                .iter()
                .flat_map(|prefix| choices.iter().map(move |choice| format!("{prefix}{choice}")))
                .take(MAX_NAME_CANDIDATES)
                .collect();
        }
        names
    }
}

fn scalar_values(rval: &Rval) -> Vec<String> {
    match rval {
        Rval::Scalar(s) => vec![s.clone()],
        Rval::List(items) => items
            .iter()
            .filter_map(|item| item.as_scalar().map(str::to_owned))
            .collect(),
        Rval::Container(Value::Array(items)) => {
            items.iter().filter_map(json_primitive_string).collect()
        }
        Rval::Container(Value::Object(map)) => {
            map.values().filter_map(json_primitive_string).collect()
        }
        Rval::Container(primitive) => json_primitive_string(primitive).into_iter().collect(),
        Rval::FnCall(_) => Vec::new(),
    }
}
