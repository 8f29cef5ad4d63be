//! CF IR - value model and policy tree for the promise interpreter.
//!
//! # Architecture
//!
//! - [`Rval`]: the tagged value every constraint, variable and function
//!   result carries.
//! - [`VarRef`]: a parsed `ns:scope.lval[index]` reference, with the
//!   reversible mangling used to flatten cross-bundle references.
//! - [`syntax`]: bracket-aware scanning of `$(..)`/`@(..)` references.
//! - [`policy`]: bundles, promises and constraints, loadable from JSON.

mod data_type;
pub mod policy;
mod rval;
pub mod syntax;
mod var_ref;

pub use data_type::DataType;
pub use policy::{Bundle, Constraint, Policy, PolicyError, Promise, PromiseType, SourceLocation};
pub use rval::{json_primitive_string, Comparison, FnCall, Rval};
pub use syntax::{SyntaxError, NULL_VALUE};
pub use var_ref::{VarRef, MANGLED_NS_SEP, MANGLED_SCOPE_SEP};
