//! Function signatures.
//!
//! Every built-in is described by one immutable [`FnCallType`]: its name,
//! formal arguments, return type, options and implementation. The
//! implementation is tagged at registration, so families of functions that
//! share a body (numeric folds, text transforms) dispatch on an enum instead
//! of each carrying its own function pointer.

use bitflags::bitflags;

use cf_ir::{DataType, FnCall, Rval};

use crate::context::EvalContext;
use crate::errors::EvalResult;
use crate::functions::{FoldOp, TextXform};

bitflags! {
    /// Evaluation options of a function.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct FnCallOptions: u8 {
        /// Accepts more arguments than it declares; the last formal repeats.
        const VARARG = 1 << 0;
        /// Results are memoized on `(name, resolved args)` for one run.
        const CACHED = 1 << 1;
        /// `Collection` formals take a variable name or inline JSON and are
        /// normalized to a container before the call.
        const COLLECTING = 1 << 2;
        /// Arguments are passed unexpanded; the implementation expands them.
        const DELAYED_EVALUATION = 1 << 3;
    }
}

/// Grouping used for documentation and the `functions` listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FnCallCategory {
    Data,
    Utils,
    Io,
    Files,
}

impl FnCallCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            FnCallCategory::Data => "data",
            FnCallCategory::Utils => "utils",
            FnCallCategory::Io => "io",
            FnCallCategory::Files => "files",
        }
    }
}

/// What a formal argument accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgPattern {
    /// Any scalar.
    AnyString,
    /// A variable name, possibly qualified or indexed.
    Identifier,
    Int,
    Real,
    /// One of a fixed set of keywords.
    Options(&'static [&'static str]),
    /// A class expression.
    Context,
    /// A list or data container (see [`FnCallOptions::COLLECTING`]).
    Collection,
}

impl ArgPattern {
    /// Human-readable form used in type errors.
    pub fn describe(self) -> String {
        match self {
            ArgPattern::AnyString => "a string".to_owned(),
            ArgPattern::Identifier => "a variable identifier".to_owned(),
            ArgPattern::Int => "an integer".to_owned(),
            ArgPattern::Real => "a real number".to_owned(),
            ArgPattern::Options(options) => format!("one of {}", options.join(",")),
            ArgPattern::Context => "a class expression".to_owned(),
            ArgPattern::Collection => "a list or data container".to_owned(),
        }
    }

    /// Check a resolved argument.
    pub fn accepts(self, value: &Rval) -> bool {
        match (self, value) {
            (ArgPattern::Collection, Rval::Container(_) | Rval::List(_)) => true,
            (ArgPattern::Collection, _) => false,
            (_, Rval::Scalar(s)) => self.accepts_scalar(s),
            _ => false,
        }
    }

    fn accepts_scalar(self, s: &str) -> bool {
        match self {
            ArgPattern::AnyString => true,
            ArgPattern::Identifier => {
                !s.is_empty() && !s.chars().any(char::is_whitespace)
            }
            ArgPattern::Int => s == "inf" || s.parse::<i64>().is_ok(),
            ArgPattern::Real => s.parse::<f64>().is_ok(),
            ArgPattern::Options(options) => options.contains(&s),
            ArgPattern::Context => !s.trim().is_empty(),
            ArgPattern::Collection => false,
        }
    }
}

/// One formal argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FnCallArg {
    pub pattern: ArgPattern,
    pub dtype: DataType,
    pub description: &'static str,
}

impl FnCallArg {
    pub const fn new(pattern: ArgPattern, dtype: DataType, description: &'static str) -> Self {
        FnCallArg {
            pattern,
            dtype,
            description,
        }
    }
}

/// Native implementation: receives the call as written and its resolved arguments.
pub type FnImpl = fn(&mut EvalContext, &FnCall, &[Rval]) -> EvalResult<Rval>;

/// How a function is executed.
#[derive(Clone, Copy)]
pub enum Implementation {
    Native(FnImpl),
    Fold(FoldOp),
    Xform(TextXform),
}

impl std::fmt::Debug for Implementation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Implementation::Native(_) => f.write_str("Native"),
            Implementation::Fold(op) => write!(f, "Fold({op:?})"),
            Implementation::Xform(op) => write!(f, "Xform({op:?})"),
        }
    }
}

/// Signature of a registered function.
#[derive(Clone, Copy, Debug)]
pub struct FnCallType {
    pub name: &'static str,
    pub return_type: DataType,
    pub args: &'static [FnCallArg],
    pub implementation: Implementation,
    pub options: FnCallOptions,
    pub category: FnCallCategory,
    pub description: &'static str,
}

impl FnCallType {
    #[inline]
    pub fn has(&self, option: FnCallOptions) -> bool {
        self.options.contains(option)
    }

    /// Formal for the argument at `index`; varargs repeat the last formal.
    pub fn formal(&self, index: usize) -> Option<&FnCallArg> {
        match self.args.get(index) {
            Some(arg) => Some(arg),
            None if self.has(FnCallOptions::VARARG) => self.args.last(),
            None => None,
        }
    }

    /// `name(arg, arg, ...)` for listings.
    pub fn synopsis(&self) -> String {
        let mut args: Vec<&str> = self.args.iter().map(|a| a.description).collect();
        if self.has(FnCallOptions::VARARG) {
            args.push("...");
        }
        format!("{}({})", self.name, args.join(", "))
    }
}
