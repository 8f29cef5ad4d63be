//! List functions: `nth`, `reverse`, `sort`, `unique`, `getindices`, `getvalues`.

use rustc_hash::FxHashSet;
use serde_json::Value;

use cf_ir::{json_primitive_string, DataType, FnCall, Rval, VarRef};

use super::fold::{SortMode, SORT_MODES};
use super::{container_arg, native, scalar_arg, string_items};
use crate::context::EvalContext;
use crate::errors::{self, EvalResult};
use crate::fncall::{ArgPattern, FnCallArg, FnCallCategory, FnCallOptions, FnCallType};
use crate::scope::{VarKey, THIS_SCOPE};

fn nth(_: &mut EvalContext, call: &FnCall, args: &[Rval]) -> EvalResult<Rval> {
    let data = container_arg(&call.name, args, 0)?;
    let key = scalar_arg(&call.name, args, 1)?;

    let found = match data {
        Value::Array(items) => key.trim().parse::<usize>().ok().and_then(|i| items.get(i)),
        Value::Object(map) => map.get(key),
        _ => None,
    };
    let Some(found) = found else {
        return Err(errors::function_failed(
            &call.name,
            format!("no element at '{key}'"),
        ));
    };
    Ok(match json_primitive_string(found) {
        Some(text) => Rval::Scalar(text),
        None => Rval::Container(found.clone()),
    })
}

fn reverse(_: &mut EvalContext, call: &FnCall, args: &[Rval]) -> EvalResult<Rval> {
    let mut items = string_items(container_arg(&call.name, args, 0)?);
    items.reverse();
    Ok(Rval::scalar_list(items))
}

fn sort(_: &mut EvalContext, call: &FnCall, args: &[Rval]) -> EvalResult<Rval> {
    let mut items = string_items(container_arg(&call.name, args, 0)?);
    let mode_text = scalar_arg(&call.name, args, 1)?;
    let mode = SortMode::parse(mode_text)
        .ok_or_else(|| errors::argument_type(&call.name, 2, "a sort mode", mode_text))?;
    items.sort_by(|a, b| mode.compare(a, b));
    Ok(Rval::scalar_list(items))
}

fn unique(_: &mut EvalContext, call: &FnCall, args: &[Rval]) -> EvalResult<Rval> {
    let mut seen = FxHashSet::default();
    let items: Vec<String> = string_items(container_arg(&call.name, args, 0)?)
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect();
    Ok(Rval::scalar_list(items))
}

/// Keys and values of an array variable, from a container or from
/// indexed entries `name[k]` in the variable's scope.
///
/// A key with deeper entries but no value of its own (`a[k][x]` without
/// `a[k]`) has no value.
fn indexed_entries(
    ctx: &EvalContext,
    function: &str,
    name: &str,
) -> EvalResult<Vec<(String, Option<Rval>)>> {
    let var = VarRef::demangle(name)
        .map_err(|_| errors::argument_type(function, 1, "a variable identifier", name))?;

    if let Some(found) = ctx.lookup(&var) {
        if let Rval::Container(value) = found.rval.as_ref() {
            return Ok(container_entries(value));
        }
    }

    let var = ctx.qualify(var);
    let scope = match var.scope.as_deref() {
        None | Some(THIS_SCOPE) => ctx.store().this(),
        Some(scope) => {
            let ns = var.ns.clone().unwrap_or_else(|| ctx.current_namespace().to_owned());
            ctx.store().scope(&ns, scope)
        }
    };
    let Some(scope) = scope else {
        return Ok(Vec::new());
    };
    let prefix: Vec<String> = var.indices.iter().cloned().collect();
    Ok(scope
        .indices_of(&var.lval, &prefix)
        .into_iter()
        .map(|key| {
            let mut indices = prefix.clone();
            indices.push(key.clone());
            let entry = VarKey {
                lval: var.lval.clone(),
                indices,
            };
            let value = scope.get(&entry).map(|found| found.rval.clone());
            (key, value)
        })
        .collect())
}

fn container_entries(value: &Value) -> Vec<(String, Option<Rval>)> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Option<Rval>)> = map
                .iter()
                .map(|(k, v)| (k.clone(), Some(json_rval(v))))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            entries
        }
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), Some(json_rval(v))))
            .collect(),
        _ => Vec::new(),
    }
}

fn json_rval(value: &Value) -> Rval {
    json_primitive_string(value).map_or_else(|| Rval::Container(value.clone()), Rval::Scalar)
}

fn getindices(ctx: &mut EvalContext, call: &FnCall, args: &[Rval]) -> EvalResult<Rval> {
    let name = scalar_arg(&call.name, args, 0)?;
    let keys = indexed_entries(ctx, &call.name, name)?
        .into_iter()
        .map(|(key, _)| key);
    Ok(Rval::scalar_list(keys))
}

fn getvalues(ctx: &mut EvalContext, call: &FnCall, args: &[Rval]) -> EvalResult<Rval> {
    let name = scalar_arg(&call.name, args, 0)?;
    let mut values = Vec::new();
    for (_, value) in indexed_entries(ctx, &call.name, name)? {
        match value {
            Some(Rval::List(items)) => values.extend(items),
            Some(scalar @ Rval::Scalar(_)) => values.push(scalar),
            _ => {}
        }
    }
    Ok(Rval::List(values))
}

const LIST_ARG: FnCallArg = FnCallArg::new(
    ArgPattern::Collection,
    DataType::StringList,
    "list or data container",
);

const IDENTIFIER_ARG: FnCallArg = FnCallArg::new(
    ArgPattern::Identifier,
    DataType::String,
    "array identifier",
);

pub(super) const FUNCTIONS: &[FnCallType] = &[
    native(
        "nth",
        nth,
        DataType::String,
        &[
            LIST_ARG,
            FnCallArg::new(ArgPattern::AnyString, DataType::String, "offset or key"),
        ],
        FnCallOptions::COLLECTING,
        FnCallCategory::Data,
        "Get the element at arg2 in list or data container arg1",
    ),
    native(
        "reverse",
        reverse,
        DataType::StringList,
        &[LIST_ARG],
        FnCallOptions::COLLECTING,
        FnCallCategory::Data,
        "Reverse a list",
    ),
    native(
        "sort",
        sort,
        DataType::StringList,
        &[
            LIST_ARG,
            FnCallArg::new(ArgPattern::Options(SORT_MODES), DataType::Option, "sorting method"),
        ],
        FnCallOptions::COLLECTING,
        FnCallCategory::Data,
        "Sort a list with the given method",
    ),
    native(
        "unique",
        unique,
        DataType::StringList,
        &[LIST_ARG],
        FnCallOptions::COLLECTING,
        FnCallCategory::Data,
        "Return a list with duplicate entries removed",
    ),
    native(
        "getindices",
        getindices,
        DataType::StringList,
        &[IDENTIFIER_ARG],
        FnCallOptions::empty(),
        FnCallCategory::Data,
        "Get the indices of an array or data container",
    ),
    native(
        "getvalues",
        getvalues,
        DataType::StringList,
        &[IDENTIFIER_ARG],
        FnCallOptions::empty(),
        FnCallCategory::Data,
        "Get the values of an array or data container",
    ),
];
