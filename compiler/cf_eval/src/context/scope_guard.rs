//! RAII guards for iteration scopes and bundle frames.
//!
//! [`ScopedContext`] owns one `this` scope: it is pushed when the guard is
//! created and popped when the guard drops, including during unwinding.
//! [`BundleScope`] does the same for the current-bundle frame.
//!
//! ```text
//! {
//!     let mut scoped = ctx.iteration_scope(&promise.location);
//!     iterator.bind_current(scoped.store_mut().this_mut()?);
//!     scoped.expand_scalar(&promise.promiser)?;
//! } // `this` popped here, even on panic
//! ```

use std::ops::{Deref, DerefMut};

use cf_ir::SourceLocation;

use super::{BundleFrame, EvalContext};

/// Guard over one open `this` scope.
pub struct ScopedContext<'ctx> {
    ctx: &'ctx mut EvalContext,
}

impl Drop for ScopedContext<'_> {
    fn drop(&mut self) {
        self.ctx.store.pop_this();
        self.ctx.locations.pop();
    }
}

impl Deref for ScopedContext<'_> {
    type Target = EvalContext;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for ScopedContext<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

/// Guard over one bundle frame.
pub struct BundleScope<'ctx> {
    ctx: &'ctx mut EvalContext,
}

impl Drop for BundleScope<'_> {
    fn drop(&mut self) {
        self.ctx.frames.pop();
    }
}

impl Deref for BundleScope<'_> {
    type Target = EvalContext;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for BundleScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl EvalContext {
    /// Open a `this` scope for a promise at `location`.
    pub fn iteration_scope(&mut self, location: &SourceLocation) -> ScopedContext<'_> {
        self.store.push_this();
        self.locations.push(location.clone());
        ScopedContext { ctx: self }
    }

    /// Run `f` inside a fresh `this` scope.
    pub fn with_iteration_scope<T, F>(&mut self, location: &SourceLocation, f: F) -> T
    where
        F: FnOnce(&mut ScopedContext<'_>) -> T,
    {
        let mut scoped = self.iteration_scope(location);
        f(&mut scoped)
    }

    /// Make `ns:name` the current bundle until the guard drops.
    pub fn bundle_scope(&mut self, ns: &str, name: &str) -> BundleScope<'_> {
        self.frames.push(BundleFrame {
            ns: ns.to_owned(),
            name: name.to_owned(),
        });
        BundleScope { ctx: self }
    }

    /// Run `f` with `ns:name` as the current bundle.
    pub fn with_bundle_scope<T, F>(&mut self, ns: &str, name: &str, f: F) -> T
    where
        F: FnOnce(&mut BundleScope<'_>) -> T,
    {
        let mut scoped = self.bundle_scope(ns, name);
        f(&mut scoped)
    }
}
