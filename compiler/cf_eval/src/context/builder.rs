//! `EvalContextBuilder` for creating contexts with various configurations.

use cf_ir::policy::DEFAULT_NAMESPACE;
use cf_ir::{DataType, Rval};

use super::EvalContext;
use crate::classes::ClassTable;
use crate::config::EvalOptions;
use crate::fncall::{FnCallCache, FunctionRegistry};
use crate::scope::{ScopeStore, VarKey, Variable};
use crate::shared::SharedRegistry;

/// Builder for [`EvalContext`].
///
/// Defaults: [`EvalOptions::default`], the built-in function library, hard
/// classes, and a populated `sys` scope.
pub struct EvalContextBuilder {
    options: EvalOptions,
    functions: Option<SharedRegistry<FunctionRegistry>>,
    classes: Vec<String>,
    system_vars: bool,
}

impl EvalContextBuilder {
    pub fn new() -> Self {
        Self {
            options: EvalOptions::default(),
            functions: None,
            classes: Vec::new(),
            system_vars: true,
        }
    }

    #[must_use]
    pub fn options(mut self, options: EvalOptions) -> Self {
        self.options = options;
        self
    }

    /// Use a custom function table instead of the built-in library.
    #[must_use]
    pub fn functions(mut self, functions: SharedRegistry<FunctionRegistry>) -> Self {
        self.functions = Some(functions);
        self
    }

    /// Define an extra class before evaluation starts.
    #[must_use]
    pub fn define_class(mut self, name: impl Into<String>) -> Self {
        self.classes.push(name.into());
        self
    }

    /// Skip discovery of host facts for the `sys` scope.
    #[must_use]
    pub fn system_vars(mut self, enabled: bool) -> Self {
        self.system_vars = enabled;
        self
    }

    pub fn build(self) -> EvalContext {
        let mut store = ScopeStore::new(self.options.max_var_name_len);
        if self.system_vars {
            populate_sys(&mut store);
        }

        let mut classes = ClassTable::with_hard_classes();
        for class in &self.classes {
            classes.define(class);
        }

        EvalContext {
            store,
            classes,
            functions: self
                .functions
                .unwrap_or_else(|| SharedRegistry::new(FunctionRegistry::builtin())),
            cache: FnCallCache::new(self.options.cache_capacity),
            options: self.options,
            frames: Vec::new(),
            locations: Vec::new(),
            final_pass: true,
            call_depth: 0,
        }
    }
}

impl Default for EvalContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn populate_sys(store: &mut ScopeStore) {
    let fqhost = hostname();
    let uqhost = fqhost.split('.').next().unwrap_or(&fqhost).to_owned();
    let facts = [
        ("os", std::env::consts::OS.to_owned()),
        ("arch", std::env::consts::ARCH.to_owned()),
        ("fqhost", fqhost),
        ("uqhost", uqhost),
        ("cf_version", env!("CARGO_PKG_VERSION").to_owned()),
    ];
    let sys = store.scope_mut(DEFAULT_NAMESPACE, "sys");
    for (lval, value) in facts {
        sys.insert(
            VarKey::new(lval),
            Variable::new(Rval::Scalar(value), DataType::String),
        );
    }
}

fn hostname() -> String {
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "localhost".to_owned())
}
