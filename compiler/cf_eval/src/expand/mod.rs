//! Scalar interpolation and final evaluation of values.
//!
//! [`EvalContext::expand_scalar`] replaces `$(name)`/`${name}` references in
//! a string with their scalar values. It never fails on a missing variable:
//! the reference is copied through verbatim and recorded in
//! [`Expansion::unresolved`], so a later pass can retry. Only resource
//! limits (output length, nesting depth) abort an expansion.
//!
//! [`EvalContext::evaluate_final_rval`] goes one step further for values
//! that are about to be used: naked `@(list)` references become lists,
//! nested lists are flattened and function calls are evaluated.

use std::borrow::Cow;

use tracing::{error, trace};

use cf_ir::syntax::{get_naked, is_expandable, is_naked_var, Segment, Segments};
use cf_ir::{json_primitive_string, FnCall, Rval, SyntaxError, NULL_VALUE};
use serde_json::Value;

use crate::context::EvalContext;
use crate::errors::{self, EvalResult};

/// Why a reference was left in place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// No variable by that name is visible.
    Undefined,
    /// The name is bound to a list; lists only expand through iteration or `@(..)`.
    ListValue,
    /// The name is bound to a non-primitive container.
    ContainerValue,
    Malformed(SyntaxError),
}

/// A reference the interpolator could not replace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unresolved {
    pub name: String,
    pub reason: UnresolvedReason,
}

/// Output of one interpolation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Expansion {
    pub text: String,
    pub unresolved: Vec<Unresolved>,
}

impl Expansion {
    /// True when every reference was replaced.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

enum ScalarBinding {
    Value(String),
    Missing(UnresolvedReason),
}

impl EvalContext {
    /// Interpolate every `$` reference in `text`.
    pub fn expand_scalar(&self, text: &str) -> EvalResult<Expansion> {
        self.expand_scalar_at(text, 0)
    }

    fn expand_scalar_at(&self, text: &str, depth: usize) -> EvalResult<Expansion> {
        let limit = self.options.max_expansion_len;
        let mut out = Expansion {
            text: String::with_capacity(text.len()),
            unresolved: Vec::new(),
        };

        for segment in Segments::new(text) {
            match segment {
                Segment::Literal(literal) => out.text.push_str(literal),
                Segment::Malformed(tail, err) => {
                    error!(
                        location = ?self.current_location(),
                        error = %err,
                        "malformed variable reference left unexpanded"
                    );
                    out.text.push_str(tail);
                    out.unresolved.push(Unresolved {
                        name: tail.to_owned(),
                        reason: UnresolvedReason::Malformed(err),
                    });
                }
                Segment::Reference(span) => {
                    let name: Cow<'_, str> = if is_expandable(span.inner) {
                        let inner = self
                            .options
                            .nesting
                            .guard(depth, |next| self.expand_scalar_at(span.inner, next))??;
                        if !inner.is_complete() {
                            out.text.push_str(&span.with_inner(&inner.text));
                            out.unresolved.extend(inner.unresolved);
                            check_len(&out.text, limit)?;
                            continue;
                        }
                        Cow::Owned(inner.text)
                    } else {
                        Cow::Borrowed(span.inner)
                    };

                    match self.scalar_binding(&name) {
                        ScalarBinding::Value(value) => out.text.push_str(&value),
                        ScalarBinding::Missing(reason) => {
                            trace!(name = %name, ?reason, "reference left unexpanded");
                            out.text.push_str(&span.with_inner(&name));
                            out.unresolved.push(Unresolved {
                                name: name.into_owned(),
                                reason,
                            });
                        }
                    }
                }
            }
            check_len(&out.text, limit)?;
        }
        Ok(out)
    }

    fn scalar_binding(&self, name: &str) -> ScalarBinding {
        let Some(found) = self.lookup_name(name) else {
            return ScalarBinding::Missing(UnresolvedReason::Undefined);
        };
        match found.rval.as_ref() {
            Rval::Scalar(value) => ScalarBinding::Value(value.clone()),
            Rval::List(_) => ScalarBinding::Missing(UnresolvedReason::ListValue),
            Rval::Container(value) => json_primitive_string(value).map_or(
                ScalarBinding::Missing(UnresolvedReason::ContainerValue),
                ScalarBinding::Value,
            ),
            Rval::FnCall(_) => ScalarBinding::Missing(UnresolvedReason::Undefined),
        }
    }

    /// Expand references inside a value without evaluating anything.
    ///
    /// Lists keep their shape and function calls keep their names; only the
    /// scalars inside are interpolated.
    pub fn expand_private_rval(&self, rval: &Rval) -> EvalResult<Rval> {
        Ok(match rval {
            Rval::Scalar(text) => Rval::Scalar(self.expand_scalar(text)?.text),
            Rval::List(items) => Rval::List(
                items
                    .iter()
                    .map(|item| self.expand_private_rval(item))
                    .collect::<EvalResult<_>>()?,
            ),
            Rval::FnCall(call) => Rval::FnCall(self.expand_fncall_args(call)?),
            Rval::Container(value) => Rval::Container(value.clone()),
        })
    }

    pub(crate) fn expand_fncall_args(&self, call: &FnCall) -> EvalResult<FnCall> {
        let args = call
            .args
            .iter()
            .map(|arg| self.expand_private_rval(arg))
            .collect::<EvalResult<_>>()?;
        Ok(FnCall::new(call.name.clone(), args))
    }

    /// The list or container a naked `@(name)` refers to, if defined.
    pub(crate) fn naked_collection(&self, text: &str) -> EvalResult<Option<Rval>> {
        if !is_naked_var(text, '@') {
            return Ok(None);
        }
        let Some(inner) = get_naked(text) else {
            return Ok(None);
        };
        let name = if is_expandable(inner) {
            let expansion = self.expand_scalar(inner)?;
            if !expansion.is_complete() {
                return Ok(None);
            }
            Cow::Owned(expansion.text)
        } else {
            Cow::Borrowed(inner)
        };
        Ok(self
            .lookup_name(&name)
            .filter(|found| matches!(found.rval.as_ref(), Rval::List(_) | Rval::Container(_)))
            .map(|found| found.rval.into_owned()))
    }

    /// Fully evaluate a value for use.
    ///
    /// A naked `@(name)` becomes the list or container it names. Lists are
    /// flattened. Function calls are evaluated unless function evaluation is
    /// switched off, in which case they are returned with expanded
    /// arguments. With `forcelist`, a scalar result is wrapped in a list.
    pub fn evaluate_final_rval(&mut self, rval: &Rval, forcelist: bool) -> EvalResult<Rval> {
        let value = match rval {
            Rval::Scalar(text) => match self.naked_collection(text)? {
                Some(collection) => collection,
                None => Rval::Scalar(self.expand_scalar(text)?.text),
            },
            Rval::List(items) => Rval::List(self.expand_list(items)?),
            Rval::FnCall(call) => {
                if self.options.evaluate_functions {
                    self.evaluate_fncall(call)?
                } else {
                    Rval::FnCall(self.expand_fncall_args(call)?)
                }
            }
            Rval::Container(value) => Rval::Container(value.clone()),
        };
        Ok(match value {
            Rval::Scalar(_) if forcelist => Rval::List(vec![value]),
            other => other,
        })
    }

    /// Expand list items, splicing in naked `@(list)` items and call results.
    ///
    /// A naked reference to an undefined list stays as a literal item.
    pub fn expand_list(&mut self, items: &[Rval]) -> EvalResult<Vec<Rval>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Rval::Scalar(text) => match self.naked_collection(text)? {
                    Some(Rval::List(values)) => out.extend(values),
                    Some(Rval::Container(value)) => out.extend(container_items(&value)),
                    _ => out.push(Rval::Scalar(self.expand_scalar(text)?.text)),
                },
                Rval::List(nested) => {
                    let nested = self.expand_list(nested)?;
                    out.extend(nested);
                }
                Rval::FnCall(_) => match self.evaluate_final_rval(item, false)? {
                    Rval::List(values) => out.extend(values),
                    other => out.push(other),
                },
                Rval::Container(value) => out.push(Rval::Container(value.clone())),
            }
        }
        Ok(out)
    }
}

/// Primitive children of a container as scalars. Nested structures and
/// nulls are dropped.
pub(crate) fn container_items(value: &Value) -> Vec<Rval> {
    let primitives = |children: &mut dyn Iterator<Item = &Value>| -> Vec<Rval> {
        children
            .filter_map(json_primitive_string)
            .map(Rval::Scalar)
            .collect()
    };
    match value {
        Value::Array(items) => primitives(&mut items.iter()),
        Value::Object(map) => primitives(&mut map.values()),
        primitive => primitives(&mut std::iter::once(primitive)),
    }
}

/// True if `rval` is the empty-list placeholder.
pub(crate) fn is_null_value(rval: &Rval) -> bool {
    rval.as_scalar() == Some(NULL_VALUE)
}

fn check_len(text: &str, limit: usize) -> EvalResult<()> {
    if text.len() > limit {
        return Err(errors::expansion_too_long(limit));
    }
    Ok(())
}
