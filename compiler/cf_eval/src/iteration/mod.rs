//! Cartesian iteration over a promise's list variables.
//!
//! A [`PromiseIterator`] is an odometer with one wheel per iterator token.
//! The first wheel varies fastest, which together with the mapper's
//! prepend rule makes nested iterators spin innermost. A promise without
//! iterators runs exactly once; a promise iterating an empty list (or one
//! holding only `cf_null`) runs zero times.

use tracing::debug;

use cf_ir::{DataType, Rval, VarRef};

use crate::context::EvalContext;
use crate::errors::EvalResult;
use crate::expand::{container_items, is_null_value};
use crate::iterators::IteratorMap;
use crate::scope::{Scope, VarKey, Variable};

/// One list variable and its position.
#[derive(Clone, Debug)]
struct Wheel {
    token: String,
    key: VarKey,
    values: Vec<Rval>,
    dtype: DataType,
    index: usize,
}

impl Wheel {
    fn current(&self) -> Option<&Rval> {
        self.values.get(self.index)
    }
}

/// Odometer over the current values of every iterator.
#[derive(Clone, Debug)]
pub struct PromiseIterator {
    wheels: Vec<Wheel>,
    exhausted: bool,
}

impl PromiseIterator {
    /// Snapshot the iterators' values as seen from `ctx`.
    ///
    /// Tokens that are no longer defined are dropped; they surface as
    /// unresolved references during expansion instead.
    pub fn new(ctx: &EvalContext, map: &IteratorMap) -> EvalResult<Self> {
        let mut wheels = Vec::with_capacity(map.lists().len());
        let mut exhausted = false;

        for token in map.lists() {
            let var = VarRef::demangle(token)?;
            let Some(found) = ctx.lookup(&var) else {
                debug!(token = %token, "iterator undefined, skipped");
                continue;
            };
            let (values, dtype) = match found.rval.as_ref() {
                Rval::List(items) => (items.clone(), found.dtype.scalar_type()),
                Rval::Container(value) => (container_items(value), DataType::String),
                _ => continue,
            };
            let values: Vec<Rval> = values.into_iter().filter(|v| !is_null_value(v)).collect();
            if values.is_empty() {
                debug!(token = %token, "empty list, promise has no iterations");
                exhausted = true;
            }
            wheels.push(Wheel {
                token: token.clone(),
                key: VarKey::mangled(&var),
                values,
                dtype,
                index: 0,
            });
        }

        Ok(PromiseIterator { wheels, exhausted })
    }

    #[inline]
    pub fn has_more(&self) -> bool {
        !self.exhausted
    }

    /// Step to the next combination. Returns false once every combination
    /// has been visited.
    pub fn advance(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        for wheel in &mut self.wheels {
            wheel.index += 1;
            if wheel.index < wheel.values.len() {
                return true;
            }
            wheel.index = 0;
        }
        self.exhausted = true;
        false
    }

    /// Write the current element of every iterator into `scope`.
    pub fn bind_current(&self, scope: &mut Scope) {
        for wheel in &self.wheels {
            let Some(value) = wheel.current() else {
                continue;
            };
            let dtype = match value {
                Rval::Container(_) => DataType::Container,
                _ => wheel.dtype,
            };
            scope.insert(wheel.key.clone(), Variable::new(value.clone(), dtype));
        }
    }

    /// Total number of combinations.
    pub fn combinations(&self) -> usize {
        self.wheels.iter().map(|w| w.values.len()).product()
    }

    /// Iterator tokens, fastest first.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.wheels.iter().map(|w| w.token.as_str())
    }

    /// Current `(token, element)` pairs, for logging.
    pub fn current(&self) -> Vec<(&str, &Rval)> {
        self.wheels
            .iter()
            .filter_map(|w| w.current().map(|value| (w.token.as_str(), value)))
            .collect()
    }
}

#[cfg(test)]
mod tests;
