//! CF Eval - promise expansion and variable resolution.
//!
//! Takes promises whose values still hold `$(var)`/`@(list)` references and
//! function calls, and produces one fully resolved copy per combination of
//! list values.
//!
//! # Architecture
//!
//! - [`scope`]: `ScopeStore` with bundle scopes, special scopes and the
//!   per-iteration `this` stack.
//! - [`expand`]: scalar interpolation and final value evaluation.
//! - [`iterators`]: the mapper that finds the lists a promise iterates over.
//! - [`iteration`]: the odometer over those lists.
//! - [`fncall`] and [`functions`]: signatures, dispatch, caching and the
//!   built-in library.
//! - [`convergence`]: commit rules for `vars`, `meta` and `classes`.
//! - [`driver`]: `expand_promise`, tying the above together.
//! - [`bundle`]: multi-pass bundle and policy resolution.
//!
//! Everything hangs off [`EvalContext`]; there is no global state.
//!
//! # Re-exports
//!
//! The common entry points are re-exported here. Error constructors keep
//! their canonical path under [`errors`].

pub mod bundle;
pub mod classes;
pub mod config;
pub mod context;
pub mod convergence;
pub mod driver;
pub mod errors;
pub mod expand;
pub mod fncall;
pub mod functions;
pub mod iteration;
pub mod iterators;
pub mod scope;
mod shared;

pub use bundle::BundleReport;
pub use classes::ClassTable;
pub use config::{AgentIdentity, CycleDetection, EvalOptions, EvalOptionsBuilder};
pub use context::{BundleScope, EvalContext, EvalContextBuilder, ScopedContext};
pub use convergence::{RedefinePolicy, VarOutcome};
pub use driver::{ExpansionReport, PromiseResult};
pub use errors::{EvalError, EvalErrorKind, EvalNote, EvalResult};
pub use expand::{Expansion, Unresolved, UnresolvedReason};
pub use fncall::{
    ArgPattern, FnCallArg, FnCallCategory, FnCallOptions, FnCallType, FunctionRegistry,
};
pub use iteration::PromiseIterator;
pub use iterators::IteratorMap;
pub use scope::{Scope, ScopeStore, Variable};
pub use shared::SharedRegistry;
