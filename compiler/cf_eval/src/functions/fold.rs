//! List folds: `length`, `max`, `min`, `mean`, `variance`, `sum`, `product`.

use std::cmp::Ordering;

use cf_ir::{DataType, Rval};

use super::{container_arg, format_real, scalar_arg, string_items};
use crate::errors::{self, EvalResult};
use crate::fncall::{ArgPattern, FnCallArg, FnCallCategory, FnCallOptions, FnCallType, Implementation};

/// Which fold a function performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FoldOp {
    Length,
    Max,
    Min,
    Mean,
    Variance,
    Sum,
    Product,
}

/// Ordering used by `max`, `min` and `sort`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SortMode {
    Lex,
    Int,
    Real,
    Ip,
    Mac,
}

pub(crate) const SORT_MODES: &[&str] = &["lex", "int", "real", "IP", "ip", "MAC", "mac"];

impl SortMode {
    pub(crate) fn parse(mode: &str) -> Option<SortMode> {
        match mode {
            "lex" => Some(SortMode::Lex),
            "int" => Some(SortMode::Int),
            "real" => Some(SortMode::Real),
            "IP" | "ip" => Some(SortMode::Ip),
            "MAC" | "mac" => Some(SortMode::Mac),
            _ => None,
        }
    }

    /// Compare two items. Items that do not parse in a numeric or address
    /// mode sort before those that do, then lexically.
    pub(crate) fn compare(self, a: &str, b: &str) -> Ordering {
        fn keyed<K: PartialOrd>(a: Option<K>, b: Option<K>, x: &str, y: &str) -> Ordering {
            match (a, b) {
                (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => x.cmp(y),
            }
        }
        match self {
            SortMode::Lex => a.cmp(b),
            SortMode::Int => keyed(a.trim().parse::<i64>().ok(), b.trim().parse::<i64>().ok(), a, b),
            SortMode::Real => keyed(a.trim().parse::<f64>().ok(), b.trim().parse::<f64>().ok(), a, b),
            SortMode::Ip => keyed(
                a.parse::<std::net::IpAddr>().ok(),
                b.parse::<std::net::IpAddr>().ok(),
                a,
                b,
            ),
            SortMode::Mac => keyed(mac_key(a), mac_key(b), a, b),
        }
    }
}

fn mac_key(text: &str) -> Option<Vec<u8>> {
    let octets: Option<Vec<u8>> = text
        .split([':', '-'])
        .map(|part| u8::from_str_radix(part, 16).ok())
        .collect();
    octets.filter(|o| o.len() == 6)
}

fn numbers(items: &[String]) -> Vec<f64> {
    items
        .iter()
        .filter_map(|item| item.trim().parse::<f64>().ok())
        .collect()
}

impl FoldOp {
    pub fn apply(self, function: &str, args: &[Rval]) -> EvalResult<Rval> {
        let items = string_items(container_arg(function, args, 0)?);
        let empty = || errors::function_failed(function, "list is empty");

        match self {
            FoldOp::Length => Ok(Rval::Scalar(items.len().to_string())),
            FoldOp::Max | FoldOp::Min => {
                let mode_text = scalar_arg(function, args, 1)?;
                let mode = SortMode::parse(mode_text).ok_or_else(|| {
                    errors::argument_type(function, 2, "a sort mode", mode_text)
                })?;
                let pick = items.iter().reduce(|best, item| {
                    let ordering = mode.compare(item, best);
                    let better = if self == FoldOp::Max {
                        ordering == Ordering::Greater
                    } else {
                        ordering == Ordering::Less
                    };
                    if better {
                        item
                    } else {
                        best
                    }
                });
                pick.map(|item| Rval::Scalar(item.clone())).ok_or_else(empty)
            }
            FoldOp::Mean | FoldOp::Variance => {
                let values = numbers(&items);
                if values.is_empty() {
                    return Err(empty());
                }
                // Welford
                let (mut count, mut mean, mut m2) = (0.0_f64, 0.0_f64, 0.0_f64);
                for x in values {
                    count += 1.0;
                    let delta = x - mean;
                    mean += delta / count;
                    m2 += delta * (x - mean);
                }
                let result = if self == FoldOp::Mean {
                    mean
                } else if count > 1.0 {
                    m2 / (count - 1.0)
                } else {
                    0.0
                };
                Ok(Rval::Scalar(format_real(result)))
            }
            FoldOp::Sum | FoldOp::Product => {
                let mut acc = if self == FoldOp::Sum { 0.0 } else { 1.0 };
                for item in &items {
                    let x: f64 = item.trim().parse().map_err(|_| {
                        errors::function_failed(function, format!("'{item}' is not a number"))
                    })?;
                    if self == FoldOp::Sum {
                        acc += x;
                    } else {
                        acc *= x;
                    }
                }
                Ok(Rval::Scalar(format_real(acc)))
            }
        }
    }
}

const LIST_ARG: &[FnCallArg] = &[FnCallArg::new(
    ArgPattern::Collection,
    DataType::StringList,
    "list or data container",
)];

const SORTED_FOLD_ARGS: &[FnCallArg] = &[
    FnCallArg::new(
        ArgPattern::Collection,
        DataType::StringList,
        "list or data container",
    ),
    FnCallArg::new(
        ArgPattern::Options(SORT_MODES),
        DataType::Option,
        "sorting method",
    ),
];

const fn fold(
    name: &'static str,
    op: FoldOp,
    return_type: DataType,
    args: &'static [FnCallArg],
    description: &'static str,
) -> FnCallType {
    FnCallType {
        name,
        return_type,
        args,
        implementation: Implementation::Fold(op),
        options: FnCallOptions::COLLECTING,
        category: FnCallCategory::Data,
        description,
    }
}

pub(super) const FUNCTIONS: &[FnCallType] = &[
    fold("length", FoldOp::Length, DataType::Int, LIST_ARG, "Return the length of a list"),
    fold("max", FoldOp::Max, DataType::String, SORTED_FOLD_ARGS, "Return the maximum of a list"),
    fold("min", FoldOp::Min, DataType::String, SORTED_FOLD_ARGS, "Return the minimum of a list"),
    fold("mean", FoldOp::Mean, DataType::Real, LIST_ARG, "Return the mean of a list"),
    fold("variance", FoldOp::Variance, DataType::Real, LIST_ARG, "Return the variance of a list"),
    fold("sum", FoldOp::Sum, DataType::Real, LIST_ARG, "Return the sum of a list of reals"),
    fold("product", FoldOp::Product, DataType::Real, LIST_ARG, "Return the product of a list of reals"),
];
