//! Error types for promise expansion.
//!
//! `EvalErrorKind` gives every failure a typed category so callers can match
//! on it instead of parsing messages. Factory functions (e.g.
//! [`arity_mismatch`]) are the public way to build errors; they fill in both
//! `kind` and `message`.
//!
//! # Severity
//!
//! Almost everything here is recoverable: the failing reference is left
//! unexpanded, the failing call stays unevaluated, or the failing variable is
//! not committed, and evaluation carries on with the next promise. Only
//! [`EvalErrorKind::SelfReference`] is fatal. It stops expansion of the
//! current promise and surfaces from `expand_promise`.

use std::fmt;

use cf_ir::{SourceLocation, SyntaxError};
use cf_stack::NestingExceeded;

/// Result of an evaluation step.
pub type EvalResult<T> = Result<T, EvalError>;

/// Typed error category.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EvalErrorKind {
    // Syntax
    BracketMismatch {
        text: String,
    },
    EmptyVariableName {
        text: String,
    },
    InvalidReference {
        text: String,
    },

    // Limits
    ExpansionTooLong {
        limit: usize,
    },
    NestingTooDeep {
        limit: usize,
    },
    VariableNameTooLong {
        limit: usize,
    },

    // Function calls
    UnknownFunction {
        name: String,
    },
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
    ArgumentType {
        name: String,
        position: usize,
        expected: String,
        got: String,
    },
    UnresolvedArguments {
        name: String,
    },
    FunctionFailed {
        name: String,
        reason: String,
    },

    // Variable definitions
    SelfReference {
        variable: String,
    },
    NoConvergence {
        variable: String,
    },
    InvalidIdentifier {
        name: String,
    },
    MultipleValues {
        variable: String,
        count: usize,
    },
    IncompleteDefinition {
        variable: String,
    },
    IndexedContainer {
        variable: String,
    },
    TypeMismatch {
        variable: String,
        expected: String,
        value: String,
    },

    // Classes
    InvalidClassExpression {
        expr: String,
    },

    /// Catch-all for errors without a structured kind.
    Custom {
        message: String,
    },
}

/// Shorten a value for log output.
fn clip(text: &str) -> String {
    const MAX: usize = 80;
    if text.chars().count() <= MAX {
        return text.to_owned();
    }
    let head: String = text.chars().take(MAX).collect();
    format!("{head}...")
}

impl fmt::Display for EvalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Syntax
            Self::BracketMismatch { text } => {
                write!(f, "bracket mismatch in variable reference '{}'", clip(text))
            }
            Self::EmptyVariableName { text } => {
                write!(f, "empty variable name in brackets '{}'", clip(text))
            }
            Self::InvalidReference { text } => {
                write!(f, "invalid variable reference '{}'", clip(text))
            }

            // Limits
            Self::ExpansionTooLong { limit } => {
                write!(f, "expansion exceeds maximum length of {limit} bytes")
            }
            Self::NestingTooDeep { limit } => {
                write!(f, "expression too deeply nested (limit: {limit})")
            }
            Self::VariableNameTooLong { limit } => {
                write!(f, "variable name exceeds maximum length of {limit} characters")
            }

            // Function calls
            Self::UnknownFunction { name } => write!(f, "no such function '{name}'"),
            Self::ArityMismatch {
                name,
                expected,
                got,
            } => write!(
                f,
                "arguments to function '{name}' do not tally: expected {expected}, got {got}"
            ),
            Self::ArgumentType {
                name,
                position,
                expected,
                got,
            } => write!(
                f,
                "argument {position} of function '{name}' should be {expected}, got '{}'",
                clip(got)
            ),
            Self::UnresolvedArguments { name } => {
                write!(f, "function '{name}' has unresolved arguments")
            }
            Self::FunctionFailed { name, reason } => {
                write!(f, "function '{name}' failed: {reason}")
            }

            // Variable definitions
            Self::SelfReference { variable } => write!(
                f,
                "variable '{variable}' contains itself indirectly - an unkeepable promise"
            ),
            Self::NoConvergence { variable } => write!(
                f,
                "unable to converge '{variable}' value (possibly empty or infinite regression)"
            ),
            Self::InvalidIdentifier { name } => {
                write!(f, "variable identifier '{}' contains illegal characters", clip(name))
            }
            Self::MultipleValues { variable, count } => write!(
                f,
                "variable '{variable}' breaks its own promise with multiple values ({count})"
            ),
            Self::IncompleteDefinition { variable } => {
                write!(f, "variable body for '{variable}' seems incomplete")
            }
            Self::IndexedContainer { variable } => write!(
                f,
                "cannot assign a container to the indexed variable name '{variable}'"
            ),
            Self::TypeMismatch {
                variable,
                expected,
                value,
            } => write!(
                f,
                "variable '{variable}' is declared {expected} but its value '{}' is not",
                clip(value)
            ),

            // Classes
            Self::InvalidClassExpression { expr } => {
                write!(f, "syntax error in class expression '{}'", clip(expr))
            }

            Self::Custom { message } => write!(f, "{message}"),
        }
    }
}

/// Secondary context attached to an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvalNote {
    pub message: String,
}

/// Evaluation error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvalError {
    pub kind: EvalErrorKind,
    /// Equals `kind.to_string()` for factory-built errors.
    pub message: String,
    /// Source location of the promise being expanded.
    pub location: Option<SourceLocation>,
    pub notes: Vec<EvalNote>,
}

impl EvalError {
    /// Create an error with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: EvalErrorKind::Custom {
                message: message.clone(),
            },
            message,
            location: None,
            notes: Vec::new(),
        }
    }

    fn from_kind(kind: EvalErrorKind) -> Self {
        let message = kind.to_string();
        Self {
            kind,
            message,
            location: None,
            notes: Vec::new(),
        }
    }

    /// Attach the promise location, unless one is already set.
    #[must_use]
    pub fn with_location(mut self, location: &SourceLocation) -> Self {
        if self.location.is_none() {
            self.location = Some(location.clone());
        }
        self
    }

    #[must_use]
    pub fn with_note(mut self, message: impl Into<String>) -> Self {
        self.notes.push(EvalNote {
            message: message.into(),
        });
        self
    }

    /// Fatal errors stop the current promise; everything else is logged and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, EvalErrorKind::SelfReference { .. })
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(location) = &self.location {
            write!(f, "{location}: ")?;
        }
        write!(f, "{}", self.message)?;
        for note in &self.notes {
            write!(f, " ({})", note.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for EvalError {}

impl From<SyntaxError> for EvalError {
    fn from(err: SyntaxError) -> Self {
        match err {
            SyntaxError::BracketMismatch(text) => bracket_mismatch(&text),
            SyntaxError::EmptyVariableName(text) => empty_variable_name(&text),
            SyntaxError::InvalidReference(text) => invalid_reference(&text),
        }
    }
}

impl From<NestingExceeded> for EvalError {
    fn from(err: NestingExceeded) -> Self {
        nesting_too_deep(err.limit)
    }
}

// Syntax

#[cold]
pub fn bracket_mismatch(text: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::BracketMismatch {
        text: text.to_owned(),
    })
}

#[cold]
pub fn empty_variable_name(text: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::EmptyVariableName {
        text: text.to_owned(),
    })
}

#[cold]
pub fn invalid_reference(text: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::InvalidReference {
        text: text.to_owned(),
    })
}

// Limits

#[cold]
pub fn expansion_too_long(limit: usize) -> EvalError {
    EvalError::from_kind(EvalErrorKind::ExpansionTooLong { limit })
}

#[cold]
pub fn nesting_too_deep(limit: usize) -> EvalError {
    EvalError::from_kind(EvalErrorKind::NestingTooDeep { limit })
}

#[cold]
pub fn variable_name_too_long(limit: usize) -> EvalError {
    EvalError::from_kind(EvalErrorKind::VariableNameTooLong { limit })
}

// Function calls

#[cold]
pub fn unknown_function(name: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::UnknownFunction {
        name: name.to_owned(),
    })
}

#[cold]
pub fn arity_mismatch(name: &str, expected: usize, got: usize) -> EvalError {
    EvalError::from_kind(EvalErrorKind::ArityMismatch {
        name: name.to_owned(),
        expected,
        got,
    })
}

#[cold]
pub fn argument_type(name: &str, position: usize, expected: &str, got: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::ArgumentType {
        name: name.to_owned(),
        position,
        expected: expected.to_owned(),
        got: got.to_owned(),
    })
}

#[cold]
pub fn unresolved_arguments(name: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::UnresolvedArguments {
        name: name.to_owned(),
    })
}

#[cold]
pub fn function_failed(name: &str, reason: impl Into<String>) -> EvalError {
    EvalError::from_kind(EvalErrorKind::FunctionFailed {
        name: name.to_owned(),
        reason: reason.into(),
    })
}

// Variable definitions

#[cold]
pub fn self_reference(variable: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::SelfReference {
        variable: variable.to_owned(),
    })
}

#[cold]
pub fn no_convergence(variable: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::NoConvergence {
        variable: variable.to_owned(),
    })
}

#[cold]
pub fn invalid_identifier(name: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::InvalidIdentifier {
        name: name.to_owned(),
    })
}

#[cold]
pub fn multiple_values(variable: &str, count: usize) -> EvalError {
    EvalError::from_kind(EvalErrorKind::MultipleValues {
        variable: variable.to_owned(),
        count,
    })
}

#[cold]
pub fn incomplete_definition(variable: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::IncompleteDefinition {
        variable: variable.to_owned(),
    })
}

#[cold]
pub fn indexed_container(variable: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::IndexedContainer {
        variable: variable.to_owned(),
    })
}

#[cold]
pub fn type_mismatch(variable: &str, expected: &str, value: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::TypeMismatch {
        variable: variable.to_owned(),
        expected: expected.to_owned(),
        value: value.to_owned(),
    })
}

// Classes

#[cold]
pub fn invalid_class_expression(expr: &str) -> EvalError {
    EvalError::from_kind(EvalErrorKind::InvalidClassExpression {
        expr: expr.to_owned(),
    })
}
