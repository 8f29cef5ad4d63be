//! Promise expansion driver.
//!
//! `expand_promise` turns one policy promise into its resolved instances:
//!
//! ```text
//! deep copy -> map iterators -> odometer
//!     per combination: open `this` -> bind -> inject specials -> resolve
//!                      -> act -> verify (vars/meta/classes) -> close `this`
//! ```
//!
//! The policy tree is never touched. Each resolved copy points back at the
//! promise it came from through [`Promise::origin`].

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use cf_ir::syntax::{canonify, get_naked, is_naked_var, Segment, Segments};
use cf_ir::{DataType, Promise, Rval};

use crate::context::EvalContext;
use crate::convergence::VarOutcome;
use crate::errors::{self, EvalError, EvalErrorKind, EvalResult};
use crate::iteration::PromiseIterator;
use crate::iterators::IteratorMap;
use crate::scope::{VarKey, Variable};

/// What the caller's action did with one resolved promise.
///
/// Ordered by severity, so the worst result of several is their maximum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PromiseResult {
    #[default]
    Skipped,
    Noop,
    Change,
    Warn,
    Fail,
}

impl PromiseResult {
    pub fn as_str(self) -> &'static str {
        match self {
            PromiseResult::Skipped => "skipped",
            PromiseResult::Noop => "noop",
            PromiseResult::Change => "change",
            PromiseResult::Warn => "warn",
            PromiseResult::Fail => "fail",
        }
    }
}

impl std::fmt::Display for PromiseResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<VarOutcome> for PromiseResult {
    fn from(outcome: VarOutcome) -> Self {
        match outcome {
            VarOutcome::Added => PromiseResult::Change,
            VarOutcome::KeptExisting => PromiseResult::Noop,
            VarOutcome::RedefinitionWarning => PromiseResult::Warn,
            VarOutcome::FatalSelfReference => PromiseResult::Fail,
            VarOutcome::Deferred | VarOutcome::Skipped => PromiseResult::Skipped,
        }
    }
}

/// Summary of one [`EvalContext::expand_promise`] call.
#[derive(Debug, Default)]
pub struct ExpansionReport {
    /// Combinations the action ran for.
    pub iterations: usize,
    /// Worst result over every iteration.
    pub result: PromiseResult,
    /// One entry per iteration of a `vars`/`meta` promise.
    pub outcomes: Vec<VarOutcome>,
    /// Recoverable errors, in the order they happened.
    pub errors: Vec<EvalError>,
    /// Iterations handed to the action with references still unexpanded.
    pub partial: usize,
    /// Names left unexpanded, each listed once in the order first seen.
    pub unresolved: Vec<String>,
}

impl ExpansionReport {
    /// Iterations whose value has to be retried on a later pass.
    pub fn deferred(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| **o == VarOutcome::Deferred)
            .count()
    }

    /// True when every iteration was fully expanded.
    pub fn is_complete(&self) -> bool {
        self.partial == 0
    }

    fn record(&mut self, result: PromiseResult) {
        self.result = self.result.max(result);
    }

    fn fail(&mut self, err: EvalError) {
        self.record(PromiseResult::Fail);
        self.errors.push(err);
    }
}

impl EvalContext {
    /// Expand `promise` and call `act` once per combination of its list values.
    ///
    /// Only a self-referential variable definition ends expansion with an
    /// error. Other failures are collected in the report.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(
            promise_type = %promise.promise_type,
            promiser = %promise.promiser,
            location = %promise.location,
        )
    )]
    pub fn expand_promise<F>(
        &mut self,
        promise: &Promise,
        mut act: F,
    ) -> EvalResult<ExpansionReport>
    where
        F: FnMut(&mut EvalContext, &Promise) -> PromiseResult,
    {
        let mut report = ExpansionReport::default();
        match self.classes.evaluate(&promise.classes) {
            Ok(true) => {}
            Ok(false) => {
                debug!(guard = %promise.classes, "class guard not satisfied");
                return Ok(report);
            }
            Err(err) => {
                report.fail(err.with_location(&promise.location));
                return Ok(report);
            }
        }

        let mut copy = promise.clone();
        copy.origin = Some(Arc::new(promise.clone()));
        let mapped = self
            .map_promise(&mut copy)
            .and_then(|map| PromiseIterator::new(self, &map).map(|iterator| (map, iterator)));
        let (map, mut iterator) = match mapped {
            Ok(mapped) => mapped,
            Err(err) => {
                report.fail(err.with_location(&promise.location));
                return Ok(report);
            }
        };
        debug!(
            iterators = ?iterator.tokens().collect::<Vec<_>>(),
            combinations = iterator.combinations(),
            "promise mapped"
        );

        while iterator.has_more() {
            {
                let mut scoped = self.iteration_scope(&copy.location);
                if let Some(this) = scoped.store.this_mut() {
                    iterator.bind_current(this);
                }
                scoped.run_iteration(&copy, &mut act, &mut report)?;
            }
            iterator.advance();
        }

        if report.iterations == 0 && map.has_iterators() {
            debug!("an iterator is empty, promise skipped");
        }
        Ok(report)
    }

    fn run_iteration<F>(
        &mut self,
        copy: &Promise,
        act: &mut F,
        report: &mut ExpansionReport,
    ) -> EvalResult<()>
    where
        F: FnMut(&mut EvalContext, &Promise) -> PromiseResult,
    {
        let resolved = match self.resolve_promise(copy, report) {
            Ok(resolved) => resolved,
            Err(err) => {
                report.fail(err);
                return Ok(());
            }
        };

        report.iterations += 1;
        self.note_partial(&resolved, report);
        let result = act(&mut *self, &resolved);
        report.record(result);

        if resolved.defines_variable() {
            match self.verify_var_promise(&resolved) {
                Ok(VarOutcome::FatalSelfReference) => {
                    return Err(errors::self_reference(&resolved.promiser)
                        .with_location(&resolved.location));
                }
                Ok(outcome) => {
                    report.record(outcome.into());
                    report.outcomes.push(outcome);
                }
                Err(err) => report.fail(err),
            }
        } else if resolved.promise_type == "classes" {
            if let Err(err) = self.verify_class_promise(&resolved) {
                report.fail(err);
            }
        }
        Ok(())
    }

    /// Record references the resolved copy still holds.
    ///
    /// Value constraints of variable promises are not inspected; the
    /// convergence guard defers those itself.
    fn note_partial(&self, resolved: &Promise, report: &mut ExpansionReport) {
        let mut names = Vec::new();
        pending_references(&Rval::Scalar(resolved.promiser.clone()), &mut names);
        if let Some(promisee) = &resolved.promisee {
            pending_references(promisee, &mut names);
        }
        let keep_values = resolved.defines_variable();
        for constraint in &resolved.constraints {
            if keep_values && DataType::from_lval(&constraint.lval).is_some() {
                continue;
            }
            pending_references(&constraint.rval, &mut names);
        }
        if names.is_empty() {
            return;
        }

        report.partial += 1;
        for name in names {
            if self.final_pass {
                warn!(
                    location = %resolved.location,
                    variable = %name,
                    "promise only partially expanded"
                );
            } else {
                debug!(variable = %name, "reference pending, retried next pass");
            }
            if !report.unresolved.contains(&name) {
                report.unresolved.push(name);
            }
        }
    }

    /// Classify every reference in the copy, mangling qualified iterators.
    fn map_promise(&self, copy: &mut Promise) -> EvalResult<IteratorMap> {
        let mut map = IteratorMap::new();
        self.map_text(&mut copy.promiser, &mut map)?;
        if let Some(promisee) = &mut copy.promisee {
            self.map_iterators(promisee, &mut map)?;
        }
        for constraint in &mut copy.constraints {
            self.map_iterators(&mut constraint.rval, &mut map)?;
        }
        Ok(map)
    }

    /// Build the resolved instance for the combination bound in `this`.
    ///
    /// Value constraints of variable promises are left for the convergence
    /// guard, which evaluates them itself.
    fn resolve_promise(
        &mut self,
        copy: &Promise,
        report: &mut ExpansionReport,
    ) -> EvalResult<Promise> {
        let promiser = self.expand_scalar(&copy.promiser)?.into_text();
        self.inject_specials(copy, &promiser)?;

        let mut resolved = copy.clone();
        resolved.promiser = promiser;
        if let Some(promisee) = &copy.promisee {
            resolved.promisee = Some(self.resolve_value(promisee, report));
        }
        let keep_values = copy.defines_variable();
        for constraint in &mut resolved.constraints {
            if keep_values && DataType::from_lval(&constraint.lval).is_some() {
                continue;
            }
            constraint.rval = self.resolve_value(&constraint.rval, report);
        }
        Ok(resolved)
    }

    /// Evaluate a constraint value. On failure the value is kept with its
    /// references expanded and the call left in place.
    fn resolve_value(&mut self, rval: &Rval, report: &mut ExpansionReport) -> Rval {
        match self.evaluate_final_rval(rval, false) {
            Ok(value) => value,
            Err(err) => {
                let pending = matches!(err.kind, EvalErrorKind::UnresolvedArguments { .. });
                if !pending || self.final_pass {
                    warn!(error = %err, "constraint value left unevaluated");
                    report.fail(err);
                }
                self.expand_private_rval(rval).unwrap_or_else(|_| rval.clone())
            }
        }
    }

    /// Per-iteration specials in `this`.
    fn inject_specials(&mut self, copy: &Promise, promiser: &str) -> EvalResult<()> {
        let identity = self.options.identity;
        let location = &copy.location;
        let dirname = Path::new(&location.file)
            .parent()
            .map(|dir| dir.display().to_string())
            .unwrap_or_default();
        let (bundle, namespace) = match self.current_bundle() {
            Some(frame) => (frame.name.clone(), frame.ns.clone()),
            None => (String::new(), self.current_namespace().to_owned()),
        };
        let handle = match copy.constraint_scalar("handle") {
            Some(handle) => canonify(&self.expand_scalar(handle)?.into_text()),
            None => default_handle(copy),
        };

        let specials = [
            ("promiser", promiser.to_owned()),
            ("promise_filename", location.file.clone()),
            ("promise_dirname", dirname),
            ("promise_linenumber", location.line.to_string()),
            ("promiser_uid", identity.uid.to_string()),
            ("promiser_gid", identity.gid.to_string()),
            ("promiser_pid", identity.pid.to_string()),
            ("promiser_ppid", identity.ppid.to_string()),
            ("bundle", bundle),
            ("namespace", namespace),
            ("handle", handle),
        ];

        let this = self
            .store
            .this_mut()
            .ok_or_else(|| errors::invalid_reference("this outside an iteration"))?;
        for (name, value) in specials {
            let dtype = if name.starts_with("promiser_") || name == "promise_linenumber" {
                DataType::Int
            } else {
                DataType::String
            };
            this.insert(VarKey::new(name), Variable::new(Rval::Scalar(value), dtype));
        }
        Ok(())
    }
}

/// Handle of a promise without a `handle` constraint, derived from where
/// it was written.
fn default_handle(promise: &Promise) -> String {
    let location = &promise.location;
    canonify(&format!("promise_{}_{}", location.file, location.line))
}

/// Collect the references still present in a resolved value.
fn pending_references(rval: &Rval, names: &mut Vec<String>) {
    match rval {
        Rval::Scalar(text) => {
            if is_naked_var(text, '@') {
                if let Some(inner) = get_naked(text) {
                    names.push(inner.to_owned());
                }
                return;
            }
            for segment in Segments::new(text) {
                match segment {
                    Segment::Literal(_) => {}
                    Segment::Reference(span) => names.push(span.inner.to_owned()),
                    Segment::Malformed(tail, _) => names.push(tail.to_owned()),
                }
            }
        }
        Rval::List(items) => {
            for item in items {
                pending_references(item, names);
            }
        }
        Rval::FnCall(call) => {
            for arg in &call.args {
                pending_references(arg, names);
            }
        }
        Rval::Container(_) => {}
    }
}

#[cfg(test)]
mod tests;
