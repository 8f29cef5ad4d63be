//! The right-hand-side value of a constraint or variable.
//!
//! An [`Rval`] owns its children outright: cloning is a deep copy and dropping
//! frees the whole tree. Lists keep insertion order.
//!
//! # JSON form
//!
//! Policy files carry rvals as tagged objects:
//!
//! ```text
//! {"type": "string", "value": "text"}
//! {"type": "list", "value": [<rval>, ...]}
//! {"type": "functionCall", "name": "join", "arguments": [<rval>, ...]}
//! {"type": "data", "value": <any json>}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::syntax::is_var_string;

/// Discriminated value: scalar, list, function call or structured data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "RvalRepr", into = "RvalRepr")]
pub enum Rval {
    Scalar(String),
    List(Vec<Rval>),
    FnCall(FnCall),
    Container(Value),
}

/// A function call as written in policy; arguments are unevaluated.
#[derive(Clone, Debug, PartialEq)]
pub struct FnCall {
    pub name: String,
    pub args: Vec<Rval>,
}

impl FnCall {
    pub fn new(name: impl Into<String>, args: Vec<Rval>) -> Self {
        FnCall {
            name: name.into(),
            args,
        }
    }
}

/// Outcome of comparing an existing binding with a newly computed value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    Different,
    /// One side still holds unexpanded references, so nothing can be said.
    Inconclusive,
}

impl Rval {
    pub fn scalar(value: impl Into<String>) -> Self {
        Rval::Scalar(value.into())
    }

    /// List of scalars from anything string-like.
    pub fn scalar_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Rval::List(items.into_iter().map(|s| Rval::Scalar(s.into())).collect())
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Rval::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Rval]> {
        match self {
            Rval::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_fncall(&self) -> Option<&FnCall> {
        match self {
            Rval::FnCall(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<&Value> {
        match self {
            Rval::Container(value) => Some(value),
            _ => None,
        }
    }

    /// Short name of the variant, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Rval::Scalar(_) => "scalar",
            Rval::List(_) => "list",
            Rval::FnCall(_) => "function call",
            Rval::Container(_) => "data container",
        }
    }

    /// True if any scalar in this tree still holds a `$`/`@` reference.
    pub fn has_var_refs(&self) -> bool {
        match self {
            Rval::Scalar(s) => is_var_string(s),
            Rval::List(items) => items.iter().any(Rval::has_var_refs),
            Rval::FnCall(call) => call.args.iter().any(Rval::has_var_refs),
            Rval::Container(_) => false,
        }
    }

    /// Compare values the way redefinition checks need.
    pub fn compare(&self, other: &Rval) -> Comparison {
        match (self, other) {
            (Rval::Scalar(a), Rval::Scalar(b)) => {
                if is_var_string(a) || is_var_string(b) {
                    Comparison::Inconclusive
                } else if a == b {
                    Comparison::Equal
                } else {
                    Comparison::Different
                }
            }
            (Rval::List(a), Rval::List(b)) => {
                if a.len() != b.len() {
                    return Comparison::Different;
                }
                let mut result = Comparison::Equal;
                for (x, y) in a.iter().zip(b) {
                    match x.compare(y) {
                        Comparison::Different => return Comparison::Different,
                        Comparison::Inconclusive => result = Comparison::Inconclusive,
                        Comparison::Equal => {}
                    }
                }
                result
            }
            (Rval::Container(a), Rval::Container(b)) => {
                if a == b {
                    Comparison::Equal
                } else {
                    Comparison::Different
                }
            }
            _ => Comparison::Inconclusive,
        }
    }
}

/// String form of a JSON leaf; arrays, objects and null have none.
pub fn json_primitive_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

impl From<&str> for Rval {
    fn from(value: &str) -> Self {
        Rval::Scalar(value.to_owned())
    }
}

impl From<String> for Rval {
    fn from(value: String) -> Self {
        Rval::Scalar(value)
    }
}

impl From<FnCall> for Rval {
    fn from(call: FnCall) -> Self {
        Rval::FnCall(call)
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("'")?;
    for c in s.chars() {
        if c == '\'' {
            f.write_str("\\'")?;
        } else {
            write!(f, "{c}")?;
        }
    }
    f.write_str("'")
}

fn write_nested(f: &mut fmt::Formatter<'_>, rval: &Rval) -> fmt::Result {
    match rval {
        Rval::Scalar(s) => write_quoted(f, s),
        other => write!(f, "{other}"),
    }
}

impl fmt::Display for Rval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rval::Scalar(s) => f.write_str(s),
            Rval::List(items) => {
                f.write_str("{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write_nested(f, item)?;
                }
                f.write_str("}")
            }
            Rval::FnCall(call) => write!(f, "{call}"),
            Rval::Container(value) => write!(f, "{value}"),
        }
    }
}

impl fmt::Display for FnCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write_nested(f, arg)?;
        }
        f.write_str(")")
    }
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum RvalRepr {
    String { value: String },
    List { value: Vec<Rval> },
    FunctionCall { name: String, arguments: Vec<Rval> },
    Data { value: Value },
}

impl From<RvalRepr> for Rval {
    fn from(repr: RvalRepr) -> Self {
        match repr {
            RvalRepr::String { value } => Rval::Scalar(value),
            RvalRepr::List { value } => Rval::List(value),
            RvalRepr::FunctionCall { name, arguments } => Rval::FnCall(FnCall::new(name, arguments)),
            RvalRepr::Data { value } => Rval::Container(value),
        }
    }
}

impl From<Rval> for RvalRepr {
    fn from(rval: Rval) -> Self {
        match rval {
            Rval::Scalar(value) => RvalRepr::String { value },
            Rval::List(value) => RvalRepr::List { value },
            Rval::FnCall(call) => RvalRepr::FunctionCall {
                name: call.name,
                arguments: call.args,
            },
            Rval::Container(value) => RvalRepr::Data { value },
        }
    }
}

#[cfg(test)]
mod tests;
