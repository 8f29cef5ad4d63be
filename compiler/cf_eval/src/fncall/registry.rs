//! Function table.

use rustc_hash::FxHashMap;

use super::signature::FnCallType;
use crate::functions;

/// Name-to-signature table.
///
/// Built once, then shared read-only through
/// [`SharedRegistry`](crate::SharedRegistry).
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    functions: FxHashMap<&'static str, FnCallType>,
}

impl FunctionRegistry {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding the built-in library.
    pub fn builtin() -> Self {
        let mut registry = FunctionRegistry::new();
        for signature in functions::builtins() {
            registry.register(*signature);
        }
        registry
    }

    /// Add or replace a function.
    pub fn register(&mut self, signature: FnCallType) {
        self.functions.insert(signature.name, signature);
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&FnCallType> {
        self.functions.get(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Signatures sorted by category, then name.
    pub fn sorted(&self) -> Vec<&FnCallType> {
        let mut all: Vec<&FnCallType> = self.functions.values().collect();
        all.sort_by(|a, b| (a.category, a.name).cmp(&(b.category, b.name)));
        all
    }
}
