//! `maplist`: apply a template to every element of a list.
//!
//! Arguments arrive unexpanded. Each element is bound to `$(this)` in a
//! copy of the enclosing iteration scope and the template is expanded
//! there; the enclosing scope itself is never written.

use cf_ir::syntax::{is_naked_var, string_contains_var};
use cf_ir::{DataType, FnCall, Rval, VarRef};

use super::native;
use crate::context::EvalContext;
use crate::errors::{self, EvalResult};
use crate::expand::{container_items, is_null_value};
use crate::fncall::{ArgPattern, FnCallArg, FnCallCategory, FnCallOptions, FnCallType};
use crate::scope::{Variable, THIS_SCOPE};

fn maplist(ctx: &mut EvalContext, call: &FnCall, args: &[Rval]) -> EvalResult<Rval> {
    let Some(Rval::Scalar(template)) = args.first() else {
        return Err(errors::argument_type(
            &call.name,
            1,
            "a string",
            &args.first().map(ToString::to_string).unwrap_or_default(),
        ));
    };
    let items = mapped_items(ctx, call, args.get(1))?;

    let location = ctx.current_location().cloned().unwrap_or_default();
    let enclosing = ctx.store().this().cloned();
    let this = VarRef::qualified(None, THIS_SCOPE, THIS_SCOPE);
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let Rval::Scalar(value) = item else {
            continue;
        };
        let expanded = ctx.with_iteration_scope(&location, |scoped| -> EvalResult<String> {
            if let (Some(enclosing), Some(top)) = (&enclosing, scoped.store_mut().this_mut()) {
                top.clone_from(enclosing);
            }
            scoped
                .store_mut()
                .put(&this, Variable::new(Rval::Scalar(value), DataType::String))?;
            Ok(scoped.expand_scalar(template)?.into_text())
        })?;
        if string_contains_var(&expanded, THIS_SCOPE) {
            return Err(errors::function_failed(
                &call.name,
                format!("'$(this)' left unexpanded in '{expanded}'"),
            ));
        }
        out.push(Rval::Scalar(expanded));
    }
    Ok(Rval::List(out))
}

/// Elements of the list argument: a literal list, `@(name)`, a bare
/// variable name, or a call returning a list.
fn mapped_items(ctx: &mut EvalContext, call: &FnCall, arg: Option<&Rval>) -> EvalResult<Vec<Rval>> {
    let collection = match arg {
        Some(Rval::List(items)) => return Ok(without_nulls(ctx.expand_list(items)?)),
        Some(Rval::Scalar(text)) if is_naked_var(text, '@') => ctx.naked_collection(text)?,
        Some(Rval::Scalar(text)) => {
            let name = ctx.expand_scalar(text)?;
            if !name.is_complete() {
                return Err(errors::unresolved_arguments(&call.name));
            }
            ctx.lookup_name(&name.text).map(|found| found.rval.into_owned())
        }
        Some(rval @ Rval::FnCall(_)) => Some(ctx.evaluate_final_rval(rval, true)?),
        Some(Rval::Container(value)) => Some(Rval::Container(value.clone())),
        None => None,
    };

    match collection {
        Some(Rval::List(items)) => Ok(without_nulls(items)),
        Some(Rval::Container(value)) => Ok(without_nulls(container_items(&value))),
        Some(scalar @ Rval::Scalar(_)) => Ok(without_nulls(vec![scalar])),
        Some(Rval::FnCall(_)) | None => Err(errors::unresolved_arguments(&call.name)),
    }
}

fn without_nulls(items: Vec<Rval>) -> Vec<Rval> {
    items.into_iter().filter(|item| !is_null_value(item)).collect()
}

pub(super) const FUNCTIONS: &[FnCallType] = &[native(
    "maplist",
    maplist,
    DataType::StringList,
    &[
        FnCallArg::new(ArgPattern::AnyString, DataType::String, "pattern based on $(this) as original text"),
        FnCallArg::new(ArgPattern::AnyString, DataType::StringList, "list identifier"),
    ],
    FnCallOptions::DELAYED_EVALUATION,
    FnCallCategory::Data,
    "Return a list with each element modified by a pattern based on $(this)",
)];
