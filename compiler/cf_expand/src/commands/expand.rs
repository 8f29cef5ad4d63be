//! `cf-expand expand`: print every resolved promise instance.

use std::io::{self, Write};

use cf_eval::PromiseResult;
use cf_ir::{Bundle, Promise};

use super::{CliOptions, CommandError};

fn write_promise(out: &mut impl Write, promise: &Promise) -> io::Result<()> {
    write!(
        out,
        "  {} {}: \"{}\"",
        promise.location, promise.promise_type, promise.promiser
    )?;
    if let Some(promisee) = &promise.promisee {
        write!(out, " -> {promisee}")?;
    }
    writeln!(out)?;
    for constraint in &promise.constraints {
        writeln!(out, "      {} => {}", constraint.lval, constraint.rval)?;
    }
    Ok(())
}

/// Expand every bundle, `common` bundles first, printing each resolved
/// promise of the non-variable sections.
pub fn expand_policy(
    options: &CliOptions,
    out: &mut impl Write,
    diag: &mut impl Write,
) -> Result<(), CommandError> {
    let policy = options.load_policy()?;
    let mut ctx = options.context();

    let (common, rest): (Vec<&Bundle>, Vec<&Bundle>) =
        policy.bundles.iter().partition(|b| b.is_common());
    for bundle in common.into_iter().chain(rest) {
        writeln!(out, "bundle {} {}", bundle.bundle_type, bundle.name)?;
        let mut write_error = None;
        let report = ctx.expand_bundle(bundle, |_, promise| {
            match write_promise(out, promise) {
                Ok(()) => PromiseResult::Noop,
                Err(err) => {
                    write_error.get_or_insert(err);
                    PromiseResult::Fail
                }
            }
        })?;
        if let Some(err) = write_error {
            return Err(err.into());
        }
        for err in &report.errors {
            writeln!(diag, "warning: bundle {}: {err}", report.bundle)?;
        }
        if report.partial > 0 {
            writeln!(
                diag,
                "warning: bundle {}: {} promise instance(s) left partially expanded",
                report.bundle, report.partial
            )?;
        }
    }
    Ok(())
}
