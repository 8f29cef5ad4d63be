//! Bundle and policy resolution.
//!
//! A bundle's `classes`, `vars` and `meta` promises are resolved in
//! repeated passes, so a definition may use a variable defined further
//! down. Values still unresolved are retried on the next pass; only the
//! last pass reports them. Resolution stops early once a pass changes
//! nothing.

use tracing::{debug, warn};

use cf_ir::{Bundle, Policy, Promise};

use crate::context::EvalContext;
use crate::convergence::VarOutcome;
use crate::driver::{ExpansionReport, PromiseResult};
use crate::errors::{EvalError, EvalResult};

/// Promise types resolved during the convergence passes, in pass order.
pub const RESOLVED_TYPES: [&str; 3] = ["classes", "vars", "meta"];

/// Summary of resolving (and optionally expanding) one bundle.
#[derive(Debug, Default)]
pub struct BundleReport {
    pub bundle: String,
    /// Passes run before the bundle converged or the budget ran out.
    pub passes: usize,
    /// Variables written, over all passes.
    pub defined: usize,
    /// Constant redefinitions that were ignored.
    pub warnings: usize,
    /// Promises of other types handed to the caller's action.
    pub expanded: usize,
    /// Expanded instances that still held unexpanded references.
    pub partial: usize,
    /// Worst action result over the expanded promises.
    pub result: PromiseResult,
    /// Errors from the last pass and from expansion.
    pub errors: Vec<EvalError>,
}

/// What one pass did.
#[derive(Default)]
struct PassSummary {
    added: usize,
    deferred: usize,
    warnings: usize,
    new_classes: usize,
    errors: Vec<EvalError>,
}

impl PassSummary {
    fn absorb(&mut self, report: ExpansionReport) {
        for outcome in &report.outcomes {
            match outcome {
                VarOutcome::Added => self.added += 1,
                VarOutcome::Deferred => self.deferred += 1,
                VarOutcome::RedefinitionWarning => self.warnings += 1,
                _ => {}
            }
        }
        self.errors.extend(report.errors);
    }

    fn changed(&self) -> bool {
        self.added > 0 || self.deferred > 0 || self.new_classes > 0
    }
}

impl EvalContext {
    /// Resolve a bundle's classes and variables.
    #[tracing::instrument(level = "debug", skip_all, fields(bundle = %bundle.name))]
    pub fn resolve_bundle(&mut self, bundle: &Bundle) -> EvalResult<BundleReport> {
        let passes = self.options.convergence_passes.max(1);
        let mut scoped = self.bundle_scope(&bundle.namespace, &bundle.name);
        let outer_final = scoped.final_pass;

        let mut report = BundleReport {
            bundle: bundle.name.clone(),
            ..BundleReport::default()
        };
        let mut outcome = Ok(());
        for pass in 1..=passes {
            scoped.final_pass = pass == passes;
            let mut summary = PassSummary::default();
            outcome = scoped.resolve_pass(bundle, &mut summary);

            report.passes = pass;
            report.defined += summary.added;
            report.warnings += summary.warnings;
            debug!(
                pass,
                added = summary.added,
                deferred = summary.deferred,
                new_classes = summary.new_classes,
                "pass finished"
            );
            if outcome.is_err() || pass == passes || (pass > 1 && !summary.changed()) {
                report.errors = summary.errors;
                break;
            }
        }
        scoped.final_pass = outer_final;
        outcome?;

        for err in &report.errors {
            warn!(bundle = %bundle.name, error = %err, "bundle resolution error");
        }
        Ok(report)
    }

    fn resolve_pass(&mut self, bundle: &Bundle, summary: &mut PassSummary) -> EvalResult<()> {
        for promise_type in RESOLVED_TYPES {
            for promise in bundle.promises_of(promise_type) {
                let classes_before = self.classes.len();
                let report = self.expand_promise(promise, |_, _| PromiseResult::Noop)?;
                summary.new_classes += self.classes.len().saturating_sub(classes_before);
                summary.absorb(report);
            }
        }
        Ok(())
    }

    /// Resolve every bundle: `common` bundles first, then the rest, each in
    /// file order.
    pub fn resolve_policy(&mut self, policy: &Policy) -> EvalResult<Vec<BundleReport>> {
        let (common, rest): (Vec<&Bundle>, Vec<&Bundle>) =
            policy.bundles.iter().partition(|b| b.is_common());
        common
            .into_iter()
            .chain(rest)
            .map(|bundle| self.resolve_bundle(bundle))
            .collect()
    }

    /// Resolve a bundle, then expand each of its other promises with `act`.
    #[tracing::instrument(level = "debug", skip_all, fields(bundle = %bundle.name))]
    pub fn expand_bundle<F>(&mut self, bundle: &Bundle, mut act: F) -> EvalResult<BundleReport>
    where
        F: FnMut(&mut EvalContext, &Promise) -> PromiseResult,
    {
        let mut report = self.resolve_bundle(bundle)?;
        let mut scoped = self.bundle_scope(&bundle.namespace, &bundle.name);
        for section in &bundle.promise_types {
            if RESOLVED_TYPES.contains(&section.name.as_str()) {
                continue;
            }
            for promise in &section.promises {
                let expansion = scoped.expand_promise(promise, &mut act)?;
                report.expanded += 1;
                report.partial += expansion.partial;
                report.result = report.result.max(expansion.result);
                report.errors.extend(expansion.errors);
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests;
