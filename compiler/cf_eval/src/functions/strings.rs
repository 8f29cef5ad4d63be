//! String functions: `concat`, `canonify`, `format`, `join`, `strcmp`.

use cf_ir::syntax::canonify;
use cf_ir::{DataType, FnCall, Rval};

use super::{container_arg, context_result, native, scalar_arg, string_items};
use crate::context::EvalContext;
use crate::errors::{self, EvalResult};
use crate::fncall::{ArgPattern, FnCallArg, FnCallCategory, FnCallOptions, FnCallType};

fn concat(_: &mut EvalContext, call: &FnCall, args: &[Rval]) -> EvalResult<Rval> {
    let mut out = String::new();
    for i in 0..args.len() {
        out.push_str(scalar_arg(&call.name, args, i)?);
    }
    Ok(Rval::Scalar(out))
}

fn canonify_fn(_: &mut EvalContext, call: &FnCall, args: &[Rval]) -> EvalResult<Rval> {
    Ok(Rval::Scalar(canonify(scalar_arg(&call.name, args, 0)?)))
}

fn join(_: &mut EvalContext, call: &FnCall, args: &[Rval]) -> EvalResult<Rval> {
    let glue = scalar_arg(&call.name, args, 0)?;
    let items = string_items(container_arg(&call.name, args, 1)?);
    Ok(Rval::Scalar(items.join(glue)))
}

fn strcmp(_: &mut EvalContext, call: &FnCall, args: &[Rval]) -> EvalResult<Rval> {
    let a = scalar_arg(&call.name, args, 0)?;
    let b = scalar_arg(&call.name, args, 1)?;
    Ok(context_result(a == b))
}

fn format_fn(_: &mut EvalContext, call: &FnCall, args: &[Rval]) -> EvalResult<Rval> {
    let template = scalar_arg(&call.name, args, 0)?;
    let values = (1..args.len())
        .map(|i| scalar_arg(&call.name, args, i))
        .collect::<EvalResult<Vec<&str>>>()?;
    sprintf(template, &values)
        .map(Rval::Scalar)
        .map_err(|reason| errors::function_failed(&call.name, reason))
}

/// One `%` conversion: flags, width, precision and conversion character.
#[derive(Default)]
struct Conversion {
    left: bool,
    zero: bool,
    plus: bool,
    width: usize,
    precision: Option<usize>,
}

impl Conversion {
    fn pad(&self, body: String, numeric: bool) -> String {
        let len = body.chars().count();
        if len >= self.width {
            return body;
        }
        let fill = self.width - len;
        if self.left {
            format!("{body}{}", " ".repeat(fill))
        } else if self.zero && numeric {
            match body.strip_prefix(['-', '+']) {
                Some(digits) => format!("{}{}{digits}", &body[..1], "0".repeat(fill)),
                None => format!("{}{body}", "0".repeat(fill)),
            }
        } else {
            format!("{}{body}", " ".repeat(fill))
        }
    }

    fn sign(&self, negative: bool) -> &'static str {
        if negative {
            "-"
        } else if self.plus {
            "+"
        } else {
            ""
        }
    }
}

/// printf-style formatting over string arguments.
pub(super) fn sprintf(template: &str, values: &[&str]) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut next = values.iter();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut conv = Conversion::default();
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => conv.left = true,
                '0' => conv.zero = true,
                '+' => conv.plus = true,
                ' ' | '#' => {}
                _ => break,
            }
            chars.next();
        }
        while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
            conv.width = conv.width * 10 + digit as usize;
            chars.next();
        }
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut precision = 0usize;
            while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
                precision = precision * 10 + digit as usize;
                chars.next();
            }
            conv.precision = Some(precision);
        }
        // Length modifiers carry no meaning for string arguments.
        while matches!(chars.peek(), Some('l' | 'h' | 'z' | 'j' | 'q')) {
            chars.next();
        }

        let Some(kind) = chars.next() else {
            return Err("format string ends inside a conversion".to_owned());
        };
        let Some(value) = next.next() else {
            return Err(format!("not enough arguments for '%{kind}'"));
        };

        let formatted = match kind {
            's' => {
                let body: String = match conv.precision {
                    Some(p) => value.chars().take(p).collect(),
                    None => (*value).to_owned(),
                };
                conv.pad(body, false)
            }
            'd' | 'i' => {
                let n = parse_int(value)?;
                conv.pad(format!("{}{}", conv.sign(n < 0), n.unsigned_abs()), true)
            }
            'x' | 'X' | 'o' => {
                let n = parse_int(value)?;
                let body = match kind {
                    'x' => format!("{n:x}"),
                    'X' => format!("{n:X}"),
                    _ => format!("{n:o}"),
                };
                conv.pad(body, true)
            }
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' => {
                let x: f64 = value
                    .trim()
                    .parse()
                    .map_err(|_| format!("'{value}' is not a number"))?;
                let precision = conv.precision.unwrap_or(6);
                let body = match kind {
                    'e' => format!("{:.precision$e}", x.abs()),
                    'E' => format!("{:.precision$E}", x.abs()),
                    'g' | 'G' => format!("{}", x.abs()),
                    _ => format!("{:.precision$}", x.abs()),
                };
                conv.pad(format!("{}{body}", conv.sign(x < 0.0)), true)
            }
            'c' => conv.pad(value.chars().take(1).collect(), false),
            other => return Err(format!("unsupported conversion '%{other}'")),
        };
        out.push_str(&formatted);
    }
    Ok(out)
}

fn parse_int(value: &str) -> Result<i64, String> {
    let trimmed = value.trim();
    trimmed
        .parse::<i64>()
        .or_else(|_| trimmed.parse::<f64>().map(|f| f.trunc() as i64))
        .map_err(|_| format!("'{value}' is not an integer"))
}

const STRING: FnCallArg = FnCallArg::new(ArgPattern::AnyString, DataType::String, "string");

pub(super) const FUNCTIONS: &[FnCallType] = &[
    native(
        "concat",
        concat,
        DataType::String,
        &[STRING],
        FnCallOptions::VARARG,
        FnCallCategory::Data,
        "Concatenate all arguments into a string",
    ),
    native(
        "canonify",
        canonify_fn,
        DataType::String,
        &[FnCallArg::new(ArgPattern::AnyString, DataType::String, "string to canonify")],
        FnCallOptions::empty(),
        FnCallCategory::Data,
        "Convert an arbitrary string into a legal class name",
    ),
    native(
        "format",
        format_fn,
        DataType::String,
        &[FnCallArg::new(ArgPattern::AnyString, DataType::String, "format string")],
        FnCallOptions::VARARG,
        FnCallCategory::Data,
        "Apply the values in arg2, arg3... to the format in arg1 with sprintf() rules",
    ),
    native(
        "join",
        join,
        DataType::String,
        &[
            FnCallArg::new(ArgPattern::AnyString, DataType::String, "join glue-string"),
            FnCallArg::new(ArgPattern::Collection, DataType::StringList, "list or data container"),
        ],
        FnCallOptions::COLLECTING,
        FnCallCategory::Data,
        "Join the items of arg2 into a string, using the conjunction in arg1",
    ),
    native(
        "strcmp",
        strcmp,
        DataType::Context,
        &[STRING, STRING],
        FnCallOptions::empty(),
        FnCallCategory::Data,
        "True if the two strings match exactly",
    ),
];
