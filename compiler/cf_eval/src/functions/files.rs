//! File functions: `readfile`, `fileexists`.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use cf_ir::{DataType, FnCall, Rval};

use super::{context_result, int_arg, native, scalar_arg};
use crate::context::EvalContext;
use crate::errors::{self, EvalResult};
use crate::fncall::{ArgPattern, FnCallArg, FnCallCategory, FnCallOptions, FnCallType};

/// Read at most `maxbytes` of a file as text; `0` reads it whole.
fn readfile(_: &mut EvalContext, call: &FnCall, args: &[Rval]) -> EvalResult<Rval> {
    let path = scalar_arg(&call.name, args, 0)?;
    let max = int_arg(&call.name, args, 1)?;
    if max < 0 {
        return Err(errors::function_failed(
            &call.name,
            format!("negative byte limit {max}"),
        ));
    }

    let failed = |err: std::io::Error| errors::function_failed(&call.name, format!("{path}: {err}"));
    let file = File::open(path).map_err(failed)?;
    let limit = if max == 0 { u64::MAX } else { max.unsigned_abs() };
    let mut bytes = Vec::new();
    file.take(limit).read_to_end(&mut bytes).map_err(failed)?;
    Ok(Rval::Scalar(String::from_utf8_lossy(&bytes).into_owned()))
}

fn fileexists(_: &mut EvalContext, call: &FnCall, args: &[Rval]) -> EvalResult<Rval> {
    let path = scalar_arg(&call.name, args, 0)?;
    Ok(context_result(Path::new(path).exists()))
}

pub(super) const FUNCTIONS: &[FnCallType] = &[
    native(
        "readfile",
        readfile,
        DataType::String,
        &[
            FnCallArg::new(ArgPattern::AnyString, DataType::String, "file name"),
            FnCallArg::new(ArgPattern::Int, DataType::Int, "maximum number of bytes to read"),
        ],
        FnCallOptions::CACHED,
        FnCallCategory::Io,
        "Read max number of bytes from named file and assign to variable",
    ),
    native(
        "fileexists",
        fileexists,
        DataType::Context,
        &[FnCallArg::new(ArgPattern::AnyString, DataType::String, "file object name")],
        FnCallOptions::empty(),
        FnCallCategory::Files,
        "True if the named file can be accessed",
    ),
];
