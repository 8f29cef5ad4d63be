//! `cf-expand functions`: list the built-in function library.

use std::io::Write;

use cf_eval::FunctionRegistry;

use super::CommandError;

/// Print one line per function: category, return type, synopsis and
/// description.
pub fn list_functions(out: &mut impl Write) -> Result<(), CommandError> {
    let registry = FunctionRegistry::builtin();
    for signature in registry.sorted() {
        writeln!(
            out,
            "{:<6} {:<8} {:<40} {}",
            signature.category.as_str(),
            signature.return_type.as_str(),
            signature.synopsis(),
            signature.description,
        )?;
    }
    Ok(())
}
