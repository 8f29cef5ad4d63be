//! Function call evaluation.
//!
//! [`EvalContext::evaluate_fncall`] runs one call through a fixed sequence:
//!
//! 1. find the signature (unknown names fail);
//! 2. evaluate the arguments, unless the function delays evaluation;
//! 3. check the argument count against the signature;
//! 4. refuse arguments that still hold references, so the caller retries
//!    on a later pass instead of computing with half-expanded text;
//! 5. normalize collection arguments to containers;
//! 6. type-check each argument against its formal;
//! 7. consult the cache, run the implementation, store the result.
//!
//! A failure never becomes a value: callers keep the unevaluated call and
//! the variable it was meant for stays undefined.

mod cache;
mod registry;
mod signature;

use std::borrow::Cow;

use serde_json::Value;
use tracing::{debug, error, trace};

use cf_ir::syntax::{get_naked, is_naked_var};
use cf_ir::{FnCall, Rval, NULL_VALUE};

use crate::context::EvalContext;
use crate::errors::{self, EvalErrorKind, EvalResult};

pub use cache::FnCallCache;
pub use registry::FunctionRegistry;
pub use signature::{
    ArgPattern, FnCallArg, FnCallCategory, FnCallOptions, FnCallType, FnImpl, Implementation,
};

impl EvalContext {
    /// Evaluate a function call in the current scope.
    #[tracing::instrument(level = "debug", skip_all, fields(function = %call.name))]
    pub fn evaluate_fncall(&mut self, call: &FnCall) -> EvalResult<Rval> {
        let outer_depth = self.call_depth;
        self.call_depth = self.options.nesting.descend(outer_depth)?;
        let result = cf_stack::ensure_sufficient_stack(|| self.dispatch_fncall(call));
        self.call_depth = outer_depth;

        result.map_err(|err| {
            if outer_depth == 0 {
                if matches!(err.kind, EvalErrorKind::UnresolvedArguments { .. }) {
                    debug!(call = %call, "function call deferred");
                } else {
                    error!(
                        location = ?self.current_location(),
                        call = %call,
                        error = %err.message,
                        "function call failed"
                    );
                }
            }
            self.locate(err)
        })
    }

    fn dispatch_fncall(&mut self, call: &FnCall) -> EvalResult<Rval> {
        let Some(signature) = self.functions.get(&call.name).copied() else {
            return Err(errors::unknown_function(&call.name));
        };
        let delayed = signature.has(FnCallOptions::DELAYED_EVALUATION);

        let mut args: Vec<Rval> = if delayed {
            call.args.clone()
        } else {
            call.args
                .iter()
                .map(|arg| self.evaluate_final_rval(arg, false))
                .collect::<EvalResult<_>>()?
        };

        // Varargs take any count; the function rejects what it cannot use.
        let fixed = signature.args.len();
        if !signature.has(FnCallOptions::VARARG) && args.len() != fixed {
            return Err(errors::arity_mismatch(&call.name, fixed, args.len()));
        }

        if !delayed {
            if args.iter().any(Rval::has_var_refs) {
                return Err(errors::unresolved_arguments(&call.name));
            }
            if signature.has(FnCallOptions::COLLECTING) {
                args = self.collect_args(&signature, args)?;
            }
            for (i, arg) in args.iter().enumerate() {
                if let Some(formal) = signature.formal(i) {
                    if !formal.pattern.accepts(arg) {
                        return Err(errors::argument_type(
                            &call.name,
                            i + 1,
                            &formal.pattern.describe(),
                            &arg.to_string(),
                        ));
                    }
                }
            }
        }

        let cache_key = (signature.has(FnCallOptions::CACHED) && self.options.function_cache)
            .then(|| FnCall::new(call.name.clone(), args.clone()).to_string());
        if let Some(key) = &cache_key {
            if let Some(hit) = self.cache.get(key) {
                trace!(key = %key, "function cache hit");
                return Ok(hit);
            }
        }

        let result = match signature.implementation {
            Implementation::Native(f) => f(self, call, &args)?,
            Implementation::Fold(op) => op.apply(&call.name, &args)?,
            Implementation::Xform(op) => op.apply(&call.name, &args)?,
        };
        let result = match result {
            Rval::List(items) if items.is_empty() => Rval::scalar_list([NULL_VALUE]),
            other => other,
        };

        if let Some(key) = cache_key {
            self.cache.insert(key, result.clone());
        }
        debug!(result = %result, "function evaluated");
        Ok(result)
    }

    fn collect_args(&self, signature: &FnCallType, args: Vec<Rval>) -> EvalResult<Vec<Rval>> {
        args.into_iter()
            .enumerate()
            .map(|(i, arg)| match signature.formal(i) {
                Some(formal) if formal.pattern == ArgPattern::Collection => Ok(Rval::Container(
                    self.collect_argument(signature.name, &arg)?.into_owned(),
                )),
                _ => Ok(arg),
            })
            .collect()
    }

    /// Normalize a collection argument to JSON.
    ///
    /// Accepts a container, a list, inline JSON text, or the name of a list
    /// or container variable (optionally written `@(name)`). A container
    /// variable is borrowed from scope storage; everything else is built.
    pub fn collect_argument<'a>(&'a self, function: &str, arg: &'a Rval) -> EvalResult<Cow<'a, Value>> {
        match arg {
            Rval::Container(value) => Ok(Cow::Borrowed(value)),
            Rval::List(items) => Ok(Cow::Owned(list_to_json(items))),
            Rval::Scalar(text) => {
                let trimmed = text.trim_start();
                if trimmed.starts_with('[') || trimmed.starts_with('{') {
                    return serde_json::from_str(trimmed).map(Cow::Owned).map_err(|err| {
                        errors::function_failed(function, format!("invalid JSON argument: {err}"))
                    });
                }
                let name = if is_naked_var(text, '@') || is_naked_var(text, '$') {
                    get_naked(text).unwrap_or(text)
                } else {
                    text
                };
                let Some(found) = self.lookup_name(name) else {
                    return Err(errors::unresolved_arguments(function));
                };
                match found.rval {
                    Cow::Borrowed(Rval::Container(value)) => Ok(Cow::Borrowed(value)),
                    Cow::Owned(Rval::Container(value)) => Ok(Cow::Owned(value)),
                    Cow::Borrowed(Rval::List(items)) => Ok(Cow::Owned(list_to_json(items))),
                    Cow::Owned(Rval::List(items)) => Ok(Cow::Owned(list_to_json(&items))),
                    other => Err(errors::argument_type(
                        function,
                        1,
                        &ArgPattern::Collection.describe(),
                        &other.to_string(),
                    )),
                }
            }
            Rval::FnCall(call) => Err(errors::argument_type(
                function,
                1,
                &ArgPattern::Collection.describe(),
                &call.to_string(),
            )),
        }
    }
}

/// JSON array of list items; nested calls are rendered as text.
pub(crate) fn list_to_json(items: &[Rval]) -> Value {
    Value::Array(
        items
            .iter()
            .map(|item| match item {
                Rval::Scalar(s) => Value::String(s.clone()),
                Rval::List(nested) => list_to_json(nested),
                Rval::Container(value) => value.clone(),
                Rval::FnCall(call) => Value::String(call.to_string()),
            })
            .collect(),
    )
}
