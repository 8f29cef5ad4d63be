//! Class-logic functions: `ifelse`, `not`, `and`, `or`, plus `isvariable`.

use cf_ir::{DataType, FnCall, Rval};

use super::{context_result, native, scalar_arg};
use crate::context::EvalContext;
use crate::errors::{self, EvalResult};
use crate::fncall::{ArgPattern, FnCallArg, FnCallCategory, FnCallOptions, FnCallType};

/// `ifelse(c1, v1, c2, v2, ..., default)`: the value after the first
/// defined class expression, else the last argument.
fn ifelse(ctx: &mut EvalContext, call: &FnCall, args: &[Rval]) -> EvalResult<Rval> {
    if args.len() % 2 == 0 {
        return Err(errors::function_failed(
            &call.name,
            format!("needs an odd number of arguments, got {}", args.len()),
        ));
    }
    for pair in args.chunks_exact(2) {
        let condition = scalar_arg(&call.name, pair, 0)?;
        if ctx.classes().evaluate(condition)? {
            return Ok(pair[1].clone());
        }
    }
    Ok(args[args.len() - 1].clone())
}

fn not(ctx: &mut EvalContext, call: &FnCall, args: &[Rval]) -> EvalResult<Rval> {
    let expr = scalar_arg(&call.name, args, 0)?;
    Ok(context_result(!ctx.classes().evaluate(expr)?))
}

fn and(ctx: &mut EvalContext, call: &FnCall, args: &[Rval]) -> EvalResult<Rval> {
    for i in 0..args.len() {
        if !ctx.classes().evaluate(scalar_arg(&call.name, args, i)?)? {
            return Ok(context_result(false));
        }
    }
    Ok(context_result(true))
}

fn or(ctx: &mut EvalContext, call: &FnCall, args: &[Rval]) -> EvalResult<Rval> {
    for i in 0..args.len() {
        if ctx.classes().evaluate(scalar_arg(&call.name, args, i)?)? {
            return Ok(context_result(true));
        }
    }
    Ok(context_result(false))
}

fn isvariable(ctx: &mut EvalContext, call: &FnCall, args: &[Rval]) -> EvalResult<Rval> {
    let name = scalar_arg(&call.name, args, 0)?;
    Ok(context_result(ctx.lookup_name(name).is_some()))
}

const CLASS_EXPR: FnCallArg = FnCallArg::new(ArgPattern::Context, DataType::Context, "class expression");

pub(super) const FUNCTIONS: &[FnCallType] = &[
    native(
        "ifelse",
        ifelse,
        DataType::String,
        &[FnCallArg::new(ArgPattern::AnyString, DataType::String, "class expression or value")],
        FnCallOptions::VARARG,
        FnCallCategory::Data,
        "Do If-ElseIf-ElseIf-...-Else evaluation of arguments",
    ),
    native(
        "not",
        not,
        DataType::Context,
        &[CLASS_EXPR],
        FnCallOptions::empty(),
        FnCallCategory::Data,
        "Calculate whether a class expression is not defined",
    ),
    native(
        "and",
        and,
        DataType::Context,
        &[CLASS_EXPR],
        FnCallOptions::VARARG,
        FnCallCategory::Data,
        "Calculate whether all arguments evaluate to true",
    ),
    native(
        "or",
        or,
        DataType::Context,
        &[CLASS_EXPR],
        FnCallOptions::VARARG,
        FnCallCategory::Data,
        "Calculate whether any argument evaluates to true",
    ),
    native(
        "isvariable",
        isvariable,
        DataType::Context,
        &[FnCallArg::new(ArgPattern::Identifier, DataType::String, "variable identifier")],
        FnCallOptions::empty(),
        FnCallCategory::Utils,
        "True if the named variable is defined",
    ),
];
