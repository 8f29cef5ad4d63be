//! The built-in function library.
//!
//! Each submodule contributes a `FUNCTIONS` table of signatures;
//! [`builtins`] chains them for [`FunctionRegistry::builtin`].
//!
//! [`FunctionRegistry::builtin`]: crate::fncall::FunctionRegistry::builtin

mod data;
mod files;
mod fold;
mod lists;
mod logic;
mod maplist;
mod strings;
mod xform;

use serde_json::Value;

use cf_ir::{json_primitive_string, DataType, Rval, NULL_VALUE};

use crate::errors::{self, EvalResult};
use crate::fncall::{FnCallArg, FnCallCategory, FnCallOptions, FnCallType, FnImpl, Implementation};

pub use fold::FoldOp;
pub use xform::TextXform;

/// Every built-in signature.
pub fn builtins() -> impl Iterator<Item = &'static FnCallType> {
    [
        data::FUNCTIONS,
        files::FUNCTIONS,
        fold::FUNCTIONS,
        lists::FUNCTIONS,
        logic::FUNCTIONS,
        maplist::FUNCTIONS,
        strings::FUNCTIONS,
        xform::FUNCTIONS,
    ]
    .into_iter()
    .flatten()
}

/// Signature of a function with a native implementation.
pub(crate) const fn native(
    name: &'static str,
    f: FnImpl,
    return_type: DataType,
    args: &'static [FnCallArg],
    options: FnCallOptions,
    category: FnCallCategory,
    description: &'static str,
) -> FnCallType {
    FnCallType {
        name,
        return_type,
        args,
        implementation: Implementation::Native(f),
        options,
        category,
        description,
    }
}

/// Class expression result of a predicate function.
pub(crate) fn context_result(defined: bool) -> Rval {
    Rval::scalar(if defined { "any" } else { "!any" })
}

/// Scalar argument at `index`.
pub(crate) fn scalar_arg<'a>(function: &str, args: &'a [Rval], index: usize) -> EvalResult<&'a str> {
    match args.get(index) {
        Some(Rval::Scalar(s)) => Ok(s),
        other => Err(errors::argument_type(
            function,
            index + 1,
            "a string",
            &other.map(ToString::to_string).unwrap_or_default(),
        )),
    }
}

/// Integer argument at `index`; `inf` is the largest value.
pub(crate) fn int_arg(function: &str, args: &[Rval], index: usize) -> EvalResult<i64> {
    let text = scalar_arg(function, args, index)?;
    if text == "inf" {
        return Ok(i64::MAX);
    }
    text.trim()
        .parse()
        .map_err(|_| errors::argument_type(function, index + 1, "an integer", text))
}

/// Container argument at `index` (collection arguments are normalized to containers).
pub(crate) fn container_arg<'a>(
    function: &str,
    args: &'a [Rval],
    index: usize,
) -> EvalResult<&'a Value> {
    match args.get(index) {
        Some(Rval::Container(value)) => Ok(value),
        other => Err(errors::argument_type(
            function,
            index + 1,
            "a list or data container",
            &other.map(ToString::to_string).unwrap_or_default(),
        )),
    }
}

/// Primitive children of a container as strings, skipping `cf_null`.
///
/// Arrays give their elements, objects their values, a primitive itself.
/// Nested arrays and objects are skipped.
pub(crate) fn string_items(value: &Value) -> Vec<String> {
    let children: Box<dyn Iterator<Item = &Value>> = match value {
        Value::Array(items) => Box::new(items.iter()),
        Value::Object(map) => Box::new(map.values()),
        Value::Null => Box::new(std::iter::empty()),
        primitive => Box::new(std::iter::once(primitive)),
    };
    children
        .filter_map(json_primitive_string)
        .filter(|item| item != NULL_VALUE)
        .collect()
}

/// Format a real the way the agent prints doubles: six decimals.
pub(crate) fn format_real(value: f64) -> String {
    format!("{value:.6}")
}
