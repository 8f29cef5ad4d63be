//! Text transforms: `downcase`, `upcase`, `head`, `tail`, `reversestring`, `strlen`.

use cf_ir::{DataType, Rval};

use super::{int_arg, scalar_arg};
use crate::errors::EvalResult;
use crate::fncall::{ArgPattern, FnCallArg, FnCallCategory, FnCallOptions, FnCallType, Implementation};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextXform {
    Downcase,
    Upcase,
    Head,
    Tail,
    Reverse,
    Length,
}

impl TextXform {
    pub fn apply(self, function: &str, args: &[Rval]) -> EvalResult<Rval> {
        let text = scalar_arg(function, args, 0)?;
        let result = match self {
            TextXform::Downcase => text.to_lowercase(),
            TextXform::Upcase => text.to_uppercase(),
            TextXform::Reverse => text.chars().rev().collect(),
            TextXform::Length => text.chars().count().to_string(),
            TextXform::Head => {
                let max = usize::try_from(int_arg(function, args, 1)?).unwrap_or(0);
                text.chars().take(max).collect()
            }
            TextXform::Tail => {
                let max = usize::try_from(int_arg(function, args, 1)?).unwrap_or(0);
                let len = text.chars().count();
                text.chars().skip(len.saturating_sub(max)).collect()
            }
        };
        Ok(Rval::Scalar(result))
    }
}

const STRING_ARG: &[FnCallArg] = &[FnCallArg::new(
    ArgPattern::AnyString,
    DataType::String,
    "input string",
)];

const SUBSTR_ARGS: &[FnCallArg] = &[
    FnCallArg::new(ArgPattern::AnyString, DataType::String, "input string"),
    FnCallArg::new(ArgPattern::Int, DataType::Int, "maximum number of characters"),
];

const fn xform(
    name: &'static str,
    op: TextXform,
    return_type: DataType,
    args: &'static [FnCallArg],
    description: &'static str,
) -> FnCallType {
    FnCallType {
        name,
        return_type,
        args,
        implementation: Implementation::Xform(op),
        options: FnCallOptions::empty(),
        category: FnCallCategory::Data,
        description,
    }
}

pub(super) const FUNCTIONS: &[FnCallType] = &[
    xform("downcase", TextXform::Downcase, DataType::String, STRING_ARG, "Convert a string to lowercase"),
    xform("upcase", TextXform::Upcase, DataType::String, STRING_ARG, "Convert a string to UPPERCASE"),
    xform("head", TextXform::Head, DataType::String, SUBSTR_ARGS, "Extract characters from the head of the string"),
    xform("tail", TextXform::Tail, DataType::String, SUBSTR_ARGS, "Extract characters from the tail of the string"),
    xform("reversestring", TextXform::Reverse, DataType::String, STRING_ARG, "Reverse a string"),
    xform("strlen", TextXform::Length, DataType::Int, STRING_ARG, "Return the length of a string"),
];
