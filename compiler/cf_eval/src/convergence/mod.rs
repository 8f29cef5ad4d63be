//! Convergence guard: commit `vars`/`meta` definitions and `classes` promises.
//!
//! A variable promise is verified once per iteration of every bundle pass.
//! The guard decides whether the resolved value may be written:
//!
//! - a value that reaches its own name is a fatal self-reference;
//! - a value still holding references is deferred to a later pass, and on
//!   the last pass reported as non-converging;
//! - an existing binding is kept under the `constant` and `ifdefined`
//!   policies, with a warning when the new value differs.

use rustc_hash::FxHashSet;
use serde_json::Value;
use tracing::{debug, error, warn};

use cf_ir::syntax::{
    canonify, get_naked, is_expandable, is_valid_identifier, string_contains_var, Segment,
    Segments,
};
use cf_ir::{Comparison, DataType, Promise, Rval, VarRef, NULL_VALUE};

use crate::config::CycleDetection;
use crate::context::EvalContext;
use crate::errors::{self, EvalErrorKind, EvalResult};
use crate::expand::container_items;
use crate::fncall::list_to_json;
use crate::functions::format_real;
use crate::scope::Variable;

/// Stand-in for `inf` in integer values.
const INT_INFINITY: i64 = 999_999_999;

/// What happened to one variable definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VarOutcome {
    Added,
    /// The variable already held this value (or a function call defined it).
    KeptExisting,
    /// The variable already held a different value, which was kept.
    RedefinitionWarning,
    /// The value reaches the variable's own name. Nothing was written.
    FatalSelfReference,
    /// The value is not resolved yet; a later pass will retry.
    Deferred,
    /// The promise's guard is not satisfied.
    Skipped,
}

impl VarOutcome {
    #[inline]
    pub fn is_fatal(self) -> bool {
        self == VarOutcome::FatalSelfReference
    }
}

/// Redefinition policy of a variable promise (`policy => ...`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RedefinePolicy {
    #[default]
    Constant,
    /// Like `Constant`, and `@(..)` items naming undefined lists are dropped.
    IfDefined,
    /// `free`, `overridable`: later definitions win.
    Free,
}

impl RedefinePolicy {
    pub fn from_constraint(value: Option<&str>) -> Self {
        match value {
            None | Some("constant") => RedefinePolicy::Constant,
            Some("ifdefined") => RedefinePolicy::IfDefined,
            Some(_) => RedefinePolicy::Free,
        }
    }

    #[inline]
    fn keeps_existing(self) -> bool {
        self != RedefinePolicy::Free
    }
}

impl EvalContext {
    /// Verify a resolved `vars` or `meta` promise and commit its value.
    ///
    /// Value constraints (`string`, `slist`, `data`, ...) are evaluated here;
    /// the other constraints are expected to be resolved already.
    #[tracing::instrument(level = "debug", skip_all, fields(promiser = %promise.promiser))]
    pub fn verify_var_promise(&mut self, promise: &Promise) -> EvalResult<VarOutcome> {
        self.define_variable(promise).map_err(|err| match err.location {
            Some(_) => err,
            None => err.with_location(&promise.location),
        })
    }

    fn define_variable(&mut self, promise: &Promise) -> EvalResult<VarOutcome> {
        if !self.guard_holds(promise)? {
            debug!("guard not satisfied, variable skipped");
            return Ok(VarOutcome::Skipped);
        }

        let (dtype, raw) = self.value_constraint(promise)?;
        let policy = RedefinePolicy::from_constraint(promise.constraint_scalar("policy"));

        if is_expandable(&promise.promiser) {
            return self.not_converged(&promise.promiser);
        }
        if !is_valid_identifier(&promise.promiser) {
            return Err(errors::invalid_identifier(&promise.promiser));
        }
        let var = self.definition_target(promise)?;
        let existing = self.store.get(&var).cloned();

        let value = if let Rval::FnCall(call) = raw {
            if existing.is_some() {
                debug!(function = %call.name, "already defined by a function call, kept");
                return Ok(VarOutcome::KeptExisting);
            }
            if !self.options.evaluate_functions {
                return Ok(VarOutcome::Skipped);
            }
            match self.evaluate_final_rval(raw, dtype.is_list()) {
                Ok(value) => value,
                Err(err)
                    if matches!(err.kind, EvalErrorKind::UnresolvedArguments { .. })
                        && !self.final_pass =>
                {
                    debug!(function = %call.name, "arguments unresolved, deferred");
                    return Ok(VarOutcome::Deferred);
                }
                Err(err) => return Err(err),
            }
        } else {
            if self.is_self_referential(&promise.promiser, raw)? {
                error!(
                    location = %promise.location,
                    variable = %promise.promiser,
                    "variable refers to itself"
                );
                return Ok(VarOutcome::FatalSelfReference);
            }
            let raw = match policy {
                RedefinePolicy::IfDefined => self.drop_undefined_lists(raw),
                _ => raw.clone(),
            };
            self.evaluate_final_rval(&raw, dtype.is_list())?
        };

        let value = coerce(&promise.promiser, dtype, value)?;
        if value.has_var_refs() {
            return self.not_converged(&promise.promiser);
        }
        self.check_indexed_target(&var, &value)?;

        if let Some(existing) = &existing {
            if policy.keeps_existing() {
                return Ok(match existing.rval.compare(&value) {
                    Comparison::Equal | Comparison::Inconclusive => VarOutcome::KeptExisting,
                    Comparison::Different => {
                        warn!(
                            location = %promise.location,
                            variable = %var,
                            old = %existing.rval,
                            new = %value,
                            "redefinition of a constant variable ignored"
                        );
                        VarOutcome::RedefinitionWarning
                    }
                });
            }
        }

        let dtype = match value {
            Rval::Container(_) => DataType::Container,
            _ => dtype,
        };
        let tags = self.definition_tags(promise)?;
        debug!(variable = %var, dtype = %dtype, value = %value, "variable defined");
        self.store.put(&var, Variable::new(value, dtype).with_tags(tags))?;
        Ok(VarOutcome::Added)
    }

    /// Verify a resolved `classes` promise. Returns true if the class was defined.
    ///
    /// `expression` and `not` take one class expression, `and` and `or` take
    /// a list. A promise with none of them defines its class unconditionally.
    #[tracing::instrument(level = "debug", skip_all, fields(promiser = %promise.promiser))]
    pub fn verify_class_promise(&mut self, promise: &Promise) -> EvalResult<bool> {
        if !self.guard_holds(promise)? {
            return Ok(false);
        }
        if is_expandable(&promise.promiser) {
            debug!("class name not resolved yet");
            return Ok(false);
        }

        let operator = promise
            .constraints
            .iter()
            .find(|c| matches!(c.lval.as_str(), "expression" | "and" | "or" | "not"));
        let defined = match operator {
            None => true,
            Some(constraint) => {
                let mut results = Vec::new();
                for expr in self.class_operands(&constraint.rval)? {
                    results.push(self.classes.evaluate(&expr).map_err(|err| self.locate(err))?);
                }
                match constraint.lval.as_str() {
                    "and" => !results.is_empty() && results.iter().all(|r| *r),
                    "or" => results.iter().any(|r| *r),
                    "not" => !results.iter().all(|r| *r),
                    _ => results.iter().all(|r| *r),
                }
            }
        };

        if defined {
            let name = canonify(&promise.promiser);
            debug!(class = %name, "class defined");
            self.classes.define(&name);
        }
        Ok(defined)
    }

    /// Class guard plus `ifvarclass`/`if` and `unless`.
    ///
    /// A guard that cannot be evaluated is treated as not satisfied.
    fn guard_holds(&mut self, promise: &Promise) -> EvalResult<bool> {
        if !self.classes.evaluate(&promise.classes)? {
            return Ok(false);
        }
        for (lval, wanted) in [("ifvarclass", true), ("if", true), ("unless", false)] {
            let Some(constraint) = promise.constraint(lval) else {
                continue;
            };
            let expr = match self.evaluate_final_rval(&constraint.rval, false) {
                Ok(Rval::Scalar(expr)) => expr,
                _ => return Ok(false),
            };
            match self.classes.evaluate(&expr) {
                Ok(defined) if defined == wanted => {}
                Ok(_) => return Ok(false),
                Err(err) => {
                    error!(
                        location = %promise.location,
                        error = %err,
                        "class expression in {lval} cannot be evaluated"
                    );
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// The single value constraint whose class guard holds.
    fn value_constraint<'p>(&self, promise: &'p Promise) -> EvalResult<(DataType, &'p Rval)> {
        let mut found = promise.constraints.iter().filter_map(|c| {
            let dtype = DataType::from_lval(&c.lval)?;
            self.classes
                .evaluate(&c.classes)
                .unwrap_or(false)
                .then_some((dtype, &c.rval))
        });
        let Some(first) = found.next() else {
            warn!(location = %promise.location, variable = %promise.promiser, "variable has no value");
            return Err(errors::incomplete_definition(&promise.promiser));
        };
        let extra = found.count();
        if extra > 0 {
            return Err(errors::multiple_values(&promise.promiser, extra + 1));
        }
        Ok(first)
    }

    fn not_converged(&self, name: &str) -> EvalResult<VarOutcome> {
        if self.final_pass {
            error!(
                location = ?self.current_location(),
                variable = %name,
                "could not converge (possibly empty or infinite regression)"
            );
            Err(errors::no_convergence(name))
        } else {
            debug!(variable = %name, "unresolved, deferred to the next pass");
            Ok(VarOutcome::Deferred)
        }
    }

    /// Where a promise's variable lives. `meta` promises write to `<bundle>_meta`.
    fn definition_target(&self, promise: &Promise) -> EvalResult<VarRef> {
        let var = VarRef::parse(&promise.promiser)?;
        match self.current_bundle() {
            Some(frame) if promise.promise_type == "meta" => Ok(VarRef {
                ns: Some(frame.ns.clone()),
                scope: Some(format!("{}_meta", frame.name)),
                ..var
            }),
            _ => Ok(self.qualify(var)),
        }
    }

    fn check_indexed_target(&self, var: &VarRef, value: &Rval) -> EvalResult<()> {
        if var.indices.is_empty() {
            return Ok(());
        }
        let base_is_container = self
            .store
            .get(&var.indexless())
            .is_some_and(|base| matches!(base.rval, Rval::Container(_)));
        if base_is_container || matches!(value, Rval::Container(_)) {
            return Err(errors::indexed_container(&var.to_string()));
        }
        Ok(())
    }

    fn definition_tags(&mut self, promise: &Promise) -> EvalResult<Vec<String>> {
        let mut tags = vec!["source=promise".to_owned()];
        if let Some(meta) = promise.constraint("meta") {
            if let Rval::List(items) = self.evaluate_final_rval(&meta.rval, true)? {
                tags.extend(items.iter().filter_map(Rval::as_scalar).map(str::to_owned));
            }
        }
        Ok(tags)
    }

    /// Replace `@(name)` list items naming undefined variables with `cf_null`.
    fn drop_undefined_lists(&self, rval: &Rval) -> Rval {
        match rval {
            Rval::List(items) => Rval::List(
                items
                    .iter()
                    .map(|item| match item.as_scalar().and_then(get_naked) {
                        Some(name) if self.lookup_name(name).is_none() => Rval::scalar(NULL_VALUE),
                        _ => item.clone(),
                    })
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn class_operands(&mut self, rval: &Rval) -> EvalResult<Vec<String>> {
        match rval {
            Rval::Scalar(expr) => Ok(vec![expr.clone()]),
            Rval::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.extend(self.class_operands(item)?);
                }
                Ok(out)
            }
            Rval::FnCall(_) => match self.evaluate_final_rval(rval, false)? {
                Rval::FnCall(_) => Ok(Vec::new()),
                value => self.class_operands(&value),
            },
            Rval::Container(_) => Ok(Vec::new()),
        }
    }

    // Self-reference

    /// True if `rval` reaches a reference to `name`.
    fn is_self_referential(&self, name: &str, rval: &Rval) -> EvalResult<bool> {
        let mut texts = Vec::new();
        scalar_texts(rval, &mut texts);
        match self.options.cycle_detection {
            CycleDetection::VisitedSet => Ok(self.reaches(name, texts)),
            CycleDetection::Bounded { max_level } => {
                for text in texts {
                    let mut text = text.to_owned();
                    for _ in 0..=max_level {
                        if self.mentions(&text, name) {
                            return Ok(true);
                        }
                        let expanded = self.expand_scalar(&text)?.text;
                        if expanded == text {
                            break;
                        }
                        text = expanded;
                    }
                }
                Ok(false)
            }
        }
    }

    /// Follow every reference reachable from `texts`, visiting each name once.
    fn reaches(&self, name: &str, texts: Vec<&str>) -> bool {
        let mut pending: Vec<String> = texts.into_iter().map(str::to_owned).collect();
        let mut visited = FxHashSet::default();
        while let Some(text) = pending.pop() {
            if self.mentions(&text, name) {
                return true;
            }
            for reference in self.references(&text) {
                if !visited.insert(reference.clone()) {
                    continue;
                }
                if let Some(found) = self.lookup_name(&reference) {
                    let mut next = Vec::new();
                    scalar_texts(&found.rval, &mut next);
                    pending.extend(next.into_iter().map(str::to_owned));
                }
            }
        }
        false
    }

    fn mentions(&self, text: &str, name: &str) -> bool {
        if string_contains_var(text, name) {
            return true;
        }
        match self.current_bundle() {
            Some(frame) => string_contains_var(text, &format!("{}.{name}", frame.name)),
            None => false,
        }
    }

    /// Names referenced at the top level of `text`, with nested names expanded.
    fn references(&self, text: &str) -> Vec<String> {
        if let Some(name) = get_naked(text) {
            return vec![name.to_owned()];
        }
        Segments::new(text)
            .filter_map(|segment| match segment {
                Segment::Reference(span) if is_expandable(span.inner) => self
                    .expand_scalar(span.inner)
                    .ok()
                    .filter(|inner| inner.is_complete())
                    .map(|inner| inner.text),
                Segment::Reference(span) => Some(span.inner.to_owned()),
                Segment::Literal(_) | Segment::Malformed(..) => None,
            })
            .collect()
    }
}

fn scalar_texts<'a>(rval: &'a Rval, out: &mut Vec<&'a str>) {
    match rval {
        Rval::Scalar(text) => out.push(text),
        Rval::List(items) => items.iter().for_each(|item| scalar_texts(item, out)),
        Rval::FnCall(call) => call.args.iter().for_each(|arg| scalar_texts(arg, out)),
        Rval::Container(_) => {}
    }
}

/// Bring an evaluated value into the shape its declared type requires.
fn coerce(name: &str, dtype: DataType, value: Rval) -> EvalResult<Rval> {
    match (dtype, value) {
        (DataType::Container, Rval::Scalar(text)) if !is_expandable(&text) => {
            serde_json::from_str::<Value>(&text)
                .map(Rval::Container)
                .map_err(|_| errors::type_mismatch(name, "data", &text))
        }
        (DataType::Container, Rval::List(items)) => Ok(Rval::Container(list_to_json(&items))),
        (dtype, Rval::Container(value)) if dtype.is_list() => {
            coerce(name, dtype, Rval::List(container_items(&value)))
        }
        (dtype, Rval::List(items)) if dtype.is_list() => {
            let element = dtype.scalar_type();
            items
                .into_iter()
                .map(|item| coerce(name, element, item))
                .collect::<EvalResult<Vec<_>>>()
                .map(Rval::List)
        }
        (DataType::String | DataType::Int | DataType::Real, Rval::List(_)) => {
            Err(errors::type_mismatch(name, dtype.as_str(), "a list"))
        }
        (DataType::Int, Rval::Scalar(text)) if !is_expandable(&text) && text != NULL_VALUE => {
            parse_int(&text)
                .map(|n| Rval::Scalar(n.to_string()))
                .ok_or_else(|| errors::type_mismatch(name, "int", &text))
        }
        (DataType::Real, Rval::Scalar(text)) if !is_expandable(&text) && text != NULL_VALUE => {
            text.trim()
                .parse::<f64>()
                .map(|r| Rval::Scalar(format_real(r)))
                .map_err(|_| errors::type_mismatch(name, "real", &text))
        }
        (_, value) => Ok(value),
    }
}

/// Integer with an optional size suffix: `k`/`m`/`g` are decimal, `K`/`M`/`G` binary.
pub(crate) fn parse_int(text: &str) -> Option<i64> {
    let text = text.trim();
    if text == "inf" {
        return Some(INT_INFINITY);
    }
    let (digits, factor) = match text.char_indices().last()? {
        (pos, 'k') => (&text[..pos], 1_000),
        (pos, 'm') => (&text[..pos], 1_000_000),
        (pos, 'g') => (&text[..pos], 1_000_000_000),
        (pos, 'K') => (&text[..pos], 1 << 10),
        (pos, 'M') => (&text[..pos], 1 << 20),
        (pos, 'G') => (&text[..pos], 1 << 30),
        _ => (text, 1),
    };
    digits.parse::<i64>().ok()?.checked_mul(factor)
}

#[cfg(test)]
mod tests;
