//! Data container functions: `mergedata`, `parsejson`, `storejson`.

use serde_json::{Map, Value};

use cf_ir::{DataType, FnCall, Rval};

use super::{container_arg, native, scalar_arg};
use crate::context::EvalContext;
use crate::errors::{self, EvalResult};
use crate::fncall::{ArgPattern, FnCallArg, FnCallCategory, FnCallOptions, FnCallType};

/// Merge containers left to right.
///
/// Arrays alone are concatenated. As soon as an object takes part, arrays
/// are converted to objects keyed by position and later keys win.
fn mergedata(_: &mut EvalContext, call: &FnCall, args: &[Rval]) -> EvalResult<Rval> {
    let parts = (0..args.len())
        .map(|i| container_arg(&call.name, args, i))
        .collect::<EvalResult<Vec<&Value>>>()?;

    if parts.iter().all(|part| part.is_array()) {
        let merged = parts
            .iter()
            .filter_map(|part| part.as_array())
            .flatten()
            .cloned()
            .collect();
        return Ok(Rval::Container(Value::Array(merged)));
    }

    let mut merged = Map::new();
    for part in parts {
        match part {
            Value::Object(map) => {
                merged.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Value::Array(items) => {
                merged.extend(
                    items
                        .iter()
                        .enumerate()
                        .map(|(i, v)| (i.to_string(), v.clone())),
                );
            }
            primitive => {
                return Err(errors::function_failed(
                    &call.name,
                    format!("cannot merge non-container value {primitive}"),
                ));
            }
        }
    }
    Ok(Rval::Container(Value::Object(merged)))
}

fn parsejson(_: &mut EvalContext, call: &FnCall, args: &[Rval]) -> EvalResult<Rval> {
    let text = scalar_arg(&call.name, args, 0)?;
    serde_json::from_str(text)
        .map(Rval::Container)
        .map_err(|err| errors::function_failed(&call.name, format!("invalid JSON: {err}")))
}

fn storejson(_: &mut EvalContext, call: &FnCall, args: &[Rval]) -> EvalResult<Rval> {
    let value = container_arg(&call.name, args, 0)?;
    serde_json::to_string_pretty(value)
        .map(Rval::Scalar)
        .map_err(|err| errors::function_failed(&call.name, err.to_string()))
}

pub(super) const FUNCTIONS: &[FnCallType] = &[
    native(
        "mergedata",
        mergedata,
        DataType::Container,
        &[FnCallArg::new(
            ArgPattern::Collection,
            DataType::Container,
            "data container or list",
        )],
        FnCallOptions::VARARG.union(FnCallOptions::COLLECTING),
        FnCallCategory::Data,
        "Merge two or more data containers or lists",
    ),
    native(
        "parsejson",
        parsejson,
        DataType::Container,
        &[FnCallArg::new(ArgPattern::AnyString, DataType::String, "JSON string")],
        FnCallOptions::empty(),
        FnCallCategory::Data,
        "Parse a JSON string into a data container",
    ),
    native(
        "storejson",
        storejson,
        DataType::String,
        &[FnCallArg::new(
            ArgPattern::Collection,
            DataType::Container,
            "data container",
        )],
        FnCallOptions::COLLECTING,
        FnCallCategory::Data,
        "Convert a data container to a JSON string",
    ),
];
