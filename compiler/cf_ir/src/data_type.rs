//! Declared types of variables and function results.

use std::fmt;

/// Declared type of a variable binding or function return value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DataType {
    String,
    Int,
    Real,
    StringList,
    IntList,
    RealList,
    /// Structured JSON data (`data` in policy).
    Container,
    /// One of a fixed set of option words.
    Option,
    /// A class expression.
    Context,
    Bundle,
    Body,
    #[default]
    None,
}

impl DataType {
    /// Map a `vars` constraint name to the type it declares.
    ///
    /// Returns `None` for any lval that does not carry a value
    /// (`policy`, `comment`, `ifvarclass`, ...).
    pub fn from_lval(lval: &str) -> Option<DataType> {
        match lval {
            "string" => Some(DataType::String),
            "int" => Some(DataType::Int),
            "real" => Some(DataType::Real),
            "slist" => Some(DataType::StringList),
            "ilist" => Some(DataType::IntList),
            "rlist" => Some(DataType::RealList),
            "data" => Some(DataType::Container),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Int => "int",
            DataType::Real => "real",
            DataType::StringList => "slist",
            DataType::IntList => "ilist",
            DataType::RealList => "rlist",
            DataType::Container => "data",
            DataType::Option => "option",
            DataType::Context => "context",
            DataType::Bundle => "bundle",
            DataType::Body => "body",
            DataType::None => "none",
        }
    }

    #[inline]
    pub fn is_list(self) -> bool {
        matches!(
            self,
            DataType::StringList | DataType::IntList | DataType::RealList
        )
    }

    /// Element type of a list type; scalars map to themselves.
    pub fn scalar_type(self) -> DataType {
        match self {
            DataType::StringList => DataType::String,
            DataType::IntList => DataType::Int,
            DataType::RealList => DataType::Real,
            other => other,
        }
    }

    /// List type holding elements of this scalar type.
    pub fn list_type(self) -> DataType {
        match self {
            DataType::Int => DataType::IntList,
            DataType::Real => DataType::RealList,
            DataType::String | DataType::Option | DataType::Context => DataType::StringList,
            other => other,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
