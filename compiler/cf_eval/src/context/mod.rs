//! The evaluation context.
//!
//! [`EvalContext`] bundles everything one evaluation run needs: the scope
//! store, defined classes, the function table and its cache, the options,
//! and the stack of bundles being evaluated. There is no global state; two
//! contexts never see each other's variables.

mod builder;
mod scope_guard;

use std::borrow::Cow;

use serde_json::Value;

use cf_ir::policy::DEFAULT_NAMESPACE;
use cf_ir::{DataType, Rval, SourceLocation, VarRef};

use crate::classes::ClassTable;
use crate::config::EvalOptions;
use crate::errors::{self, EvalResult};
use crate::fncall::{FnCallCache, FunctionRegistry};
use crate::scope::{ScopeStore, VarKey, Variable, THIS_SCOPE};
use crate::shared::SharedRegistry;

pub use builder::EvalContextBuilder;
pub use scope_guard::{BundleScope, ScopedContext};

/// A bundle being evaluated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundleFrame {
    pub ns: String,
    pub name: String,
}

/// A resolved reference.
///
/// Plain variables are borrowed from scope storage. Selecting into a
/// container (`$(data[key])`) allocates the selected subtree.
#[derive(Clone, Debug, PartialEq)]
pub struct Lookup<'a> {
    pub rval: Cow<'a, Rval>,
    pub dtype: DataType,
}

/// State for one evaluation run.
pub struct EvalContext {
    pub(crate) store: ScopeStore,
    pub(crate) classes: ClassTable,
    pub(crate) functions: SharedRegistry<FunctionRegistry>,
    pub(crate) cache: FnCallCache,
    pub(crate) options: EvalOptions,
    frames: Vec<BundleFrame>,
    /// Location of each promise whose iteration scope is open.
    locations: Vec<SourceLocation>,
    /// Unresolved values are only reported on the last pass.
    pub(crate) final_pass: bool,
    /// Depth of nested function calls being evaluated.
    pub(crate) call_depth: usize,
}

impl EvalContext {
    /// Context with default options and the built-in function library.
    pub fn new() -> Self {
        EvalContextBuilder::new().build()
    }

    pub fn builder() -> EvalContextBuilder {
        EvalContextBuilder::new()
    }

    pub fn options(&self) -> &EvalOptions {
        &self.options
    }

    pub fn store(&self) -> &ScopeStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ScopeStore {
        &mut self.store
    }

    pub fn classes(&self) -> &ClassTable {
        &self.classes
    }

    pub fn classes_mut(&mut self) -> &mut ClassTable {
        &mut self.classes
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn cache(&self) -> &FnCallCache {
        &self.cache
    }

    /// Innermost bundle being evaluated.
    pub fn current_bundle(&self) -> Option<&BundleFrame> {
        self.frames.last()
    }

    pub fn current_namespace(&self) -> &str {
        self.frames
            .last()
            .map_or(DEFAULT_NAMESPACE, |frame| frame.ns.as_str())
    }

    /// Location of the promise currently being expanded.
    pub fn current_location(&self) -> Option<&SourceLocation> {
        self.locations.last()
    }

    /// True while evaluating the last convergence pass (or outside passes).
    pub fn is_final_pass(&self) -> bool {
        self.final_pass
    }

    /// Define a variable from a textual reference.
    ///
    /// Unqualified names go to the current bundle, or to `this` when no
    /// bundle is being evaluated.
    pub fn set(&mut self, reference: &str, rval: Rval, dtype: DataType) -> EvalResult<()> {
        let var = self.qualify(VarRef::parse(reference)?);
        self.store.put(&var, Variable::new(rval, dtype))?;
        Ok(())
    }

    /// Fill in the current bundle's scope and namespace where missing.
    pub fn qualify(&self, var: VarRef) -> VarRef {
        match self.frames.last() {
            Some(frame) => var.qualify(Some(&frame.ns), &frame.name),
            None => var,
        }
    }

    /// Resolve a reference as seen from the current position.
    ///
    /// - A qualified reference is tried first under its mangled token in the
    ///   top `this` scope, then in the scope it names.
    /// - An unqualified reference is tried in `this`, then in the current
    ///   bundle.
    /// - An indexed reference that matches nothing directly selects into a
    ///   container stored under the bare name.
    #[tracing::instrument(level = "trace", skip_all, fields(var = %var))]
    pub fn lookup(&self, var: &VarRef) -> Option<Lookup<'_>> {
        if let Some(found) = self.lookup_exact(var) {
            return Some(Lookup {
                rval: Cow::Borrowed(&found.rval),
                dtype: found.dtype,
            });
        }
        if var.indices.is_empty() {
            return None;
        }

        let base = self.lookup_exact(&var.indexless())?;
        let Rval::Container(root) = &base.rval else {
            return None;
        };
        let mut node = root;
        for index in &var.indices {
            node = match node {
                Value::Object(map) => map.get(index)?,
                Value::Array(items) => items.get(index.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(Lookup {
            rval: Cow::Owned(Rval::Container(node.clone())),
            dtype: DataType::Container,
        })
    }

    /// Look up a textual reference; unparseable names are undefined.
    pub fn lookup_name(&self, name: &str) -> Option<Lookup<'_>> {
        let var = VarRef::demangle(name).ok()?;
        self.lookup(&var)
    }

    fn lookup_exact(&self, var: &VarRef) -> Option<&Variable> {
        let this = self.store.this();
        match var.scope.as_deref() {
            Some(THIS_SCOPE) => this?.get(&VarKey::of(var)),
            Some(scope) => {
                if let Some(found) = this.and_then(|t| t.get(&VarKey::mangled(var))) {
                    return Some(found);
                }
                let ns = var.ns.as_deref().unwrap_or_else(|| self.current_namespace());
                self.store.scope(ns, scope)?.get(&VarKey::of(var))
            }
            None => {
                if let Some(found) = this.and_then(|t| t.get(&VarKey::of(var))) {
                    return Some(found);
                }
                let frame = self.frames.last()?;
                self.store.scope(&frame.ns, &frame.name)?.get(&VarKey::of(var))
            }
        }
    }

    /// Attach the current promise location to an error.
    pub(crate) fn locate(&self, err: errors::EvalError) -> errors::EvalError {
        match self.current_location() {
            Some(location) => err.with_location(location),
            None => err,
        }
    }
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EvalContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvalContext")
            .field("frames", &self.frames)
            .field("this_depth", &self.store.this_depth())
            .field("final_pass", &self.final_pass)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
