//! `cf-expand vars`: resolve a policy and list its variables.

use std::io::Write;

use cf_eval::scope::is_special_scope;
use cf_ir::policy::DEFAULT_NAMESPACE;

use super::{CliOptions, CommandError};

/// Resolve every bundle and print each bundle variable as
/// `scope.lval  type  value`, sorted by scope then name.
pub fn print_vars(
    options: &CliOptions,
    out: &mut impl Write,
    diag: &mut impl Write,
) -> Result<(), CommandError> {
    let policy = options.load_policy()?;
    let mut ctx = options.context();
    for report in ctx.resolve_policy(&policy)? {
        for err in &report.errors {
            writeln!(diag, "warning: bundle {}: {err}", report.bundle)?;
        }
    }

    for scope in ctx.store().scopes() {
        if is_special_scope(scope.name()) {
            continue;
        }
        let prefix = if scope.namespace() == DEFAULT_NAMESPACE {
            scope.name().to_string()
        } else {
            format!("{}:{}", scope.namespace(), scope.name())
        };
        for (key, var) in scope.sorted() {
            writeln!(out, "{prefix}.{key}  {}  {}", var.dtype, var.rval)?;
        }
    }
    Ok(())
}
