//! Variable storage.
//!
//! A [`ScopeStore`] owns every variable table the interpreter can see:
//!
//! - one [`Scope`] per bundle, keyed by `(namespace, bundle)`;
//! - the special scopes `const`, `sys`, `mon` and `match`, always in the
//!   `default` namespace;
//! - a stack of `this` scopes. The driver pushes one per iteration step and
//!   pops it when the step ends, so nested expansions (`maplist` inside a
//!   promise) each see their own `this`.

use rustc_hash::FxHashMap;

use cf_ir::policy::DEFAULT_NAMESPACE;
use cf_ir::syntax::string_contains_var;
use cf_ir::{DataType, Rval, VarRef};

use crate::errors::{self, EvalResult};

/// Scope name of the per-iteration table.
pub const THIS_SCOPE: &str = "this";

/// Scopes that live in the `default` namespace whatever bundle refers to them.
pub const SPECIAL_SCOPES: [&str; 5] = ["const", "sys", "mon", "match", THIS_SCOPE];

/// Returns `true` for `const`, `sys`, `mon`, `match` and `this`.
pub fn is_special_scope(scope: &str) -> bool {
    SPECIAL_SCOPES.contains(&scope)
}

/// Key of one variable inside a scope: the name plus its index path.
///
/// `arr[a][b]` is stored as `lval = "arr"`, `indices = ["a", "b"]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarKey {
    pub lval: String,
    pub indices: Vec<String>,
}

impl VarKey {
    pub fn new(lval: impl Into<String>) -> Self {
        VarKey {
            lval: lval.into(),
            indices: Vec::new(),
        }
    }

    /// Key of a reference in the scope it names.
    pub fn of(var: &VarRef) -> Self {
        VarKey {
            lval: var.lval.clone(),
            indices: var.indices.to_vec(),
        }
    }

    /// Key of a reference bound in `this` under its mangled token.
    ///
    /// `bundle.list[k]` becomes `lval = "bundle#list"`, `indices = ["k"]`.
    pub fn mangled(var: &VarRef) -> Self {
        VarKey {
            lval: var.indexless().mangle(),
            indices: var.indices.to_vec(),
        }
    }

    /// Length of the name as written in policy.
    pub fn name_len(&self) -> usize {
        self.lval.len() + self.indices.iter().map(|i| i.len() + 2).sum::<usize>()
    }
}

impl std::fmt::Display for VarKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.lval)?;
        for index in &self.indices {
            write!(f, "[{index}]")?;
        }
        Ok(())
    }
}

/// A stored variable.
#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    pub rval: Rval,
    pub dtype: DataType,
    pub tags: Vec<String>,
}

impl Variable {
    pub fn new(rval: Rval, dtype: DataType) -> Self {
        Variable {
            rval,
            dtype,
            tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// One named variable table.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    ns: String,
    name: String,
    vars: FxHashMap<VarKey, Variable>,
}

impl Scope {
    pub fn new(ns: impl Into<String>, name: impl Into<String>) -> Self {
        Scope {
            ns: ns.into(),
            name: name.into(),
            vars: FxHashMap::default(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.ns
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn get(&self, key: &VarKey) -> Option<&Variable> {
        self.vars.get(key)
    }

    /// Store without any checks, returning the previous value.
    pub fn insert(&mut self, key: VarKey, var: Variable) -> Option<Variable> {
        self.vars.insert(key, var)
    }

    pub fn remove(&mut self, key: &VarKey) -> Option<Variable> {
        self.vars.remove(key)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// All variables ordered by key.
    pub fn sorted(&self) -> Vec<(&VarKey, &Variable)> {
        let mut vars: Vec<_> = self.vars.iter().collect();
        vars.sort_by(|a, b| a.0.cmp(b.0));
        vars
    }

    /// Next-level index keys under `lval[prefix..]`, sorted and deduplicated.
    ///
    /// With `arr[a][x]`, `arr[b]` stored, `indices_of("arr", &[])` is
    /// `["a", "b"]` and `indices_of("arr", &["a"])` is `["x"]`.
    pub fn indices_of(&self, lval: &str, prefix: &[String]) -> Vec<String> {
        let mut keys: Vec<String> = self
            .vars
            .keys()
            .filter(|k| {
                k.lval == lval && k.indices.len() > prefix.len() && k.indices.starts_with(prefix)
            })
            .map(|k| k.indices[prefix.len()].clone())
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

/// Every scope the interpreter can see.
#[derive(Debug)]
pub struct ScopeStore {
    scopes: FxHashMap<(String, String), Scope>,
    this: Vec<Scope>,
    max_var_name_len: usize,
}

impl ScopeStore {
    /// Empty store with the `const` scope populated.
    pub fn new(max_var_name_len: usize) -> Self {
        let mut store = ScopeStore {
            scopes: FxHashMap::default(),
            this: Vec::new(),
            max_var_name_len,
        };
        for special in ["const", "sys", "mon", "match"] {
            store.scope_mut(DEFAULT_NAMESPACE, special);
        }
        let constants = [
            ("dollar", "$"),
            ("n", "\n"),
            ("r", "\r"),
            ("t", "\t"),
            ("endl", "\n"),
        ];
        let scope = store.scope_mut(DEFAULT_NAMESPACE, "const");
        for (lval, value) in constants {
            scope.insert(VarKey::new(lval), Variable::new(Rval::scalar(value), DataType::String));
        }
        store
    }

    /// Namespace a scope name lives in when referenced from `ns`.
    pub fn namespace_for<'a>(scope: &str, ns: &'a str) -> &'a str {
        if is_special_scope(scope) {
            DEFAULT_NAMESPACE
        } else {
            ns
        }
    }

    pub fn scope(&self, ns: &str, name: &str) -> Option<&Scope> {
        if name == THIS_SCOPE {
            return self.this.last();
        }
        let ns = Self::namespace_for(name, ns);
        self.scopes.get(&(ns.to_owned(), name.to_owned()))
    }

    /// Scope by name, created empty if missing.
    pub fn scope_mut(&mut self, ns: &str, name: &str) -> &mut Scope {
        let ns = Self::namespace_for(name, ns);
        self.scopes
            .entry((ns.to_owned(), name.to_owned()))
            .or_insert_with(|| Scope::new(ns, name))
    }

    /// Bundle and special scopes ordered by `(namespace, name)`.
    pub fn scopes(&self) -> Vec<&Scope> {
        let mut scopes: Vec<&Scope> = self.scopes.values().collect();
        scopes.sort_by(|a, b| (&a.ns, &a.name).cmp(&(&b.ns, &b.name)));
        scopes
    }

    pub fn clear_scope(&mut self, ns: &str, name: &str) {
        let ns = Self::namespace_for(name, ns);
        self.scopes.remove(&(ns.to_owned(), name.to_owned()));
    }

    /// Exact lookup of a fully qualified reference.
    ///
    /// Unqualified references and the `this` scope resolve against the top
    /// of the `this` stack. No container indexing happens here.
    pub fn get(&self, var: &VarRef) -> Option<&Variable> {
        let key = VarKey::of(var);
        match var.scope.as_deref() {
            None | Some(THIS_SCOPE) => self.this.last()?.get(&key),
            Some(scope) => {
                let ns = var.ns.as_deref().unwrap_or(DEFAULT_NAMESPACE);
                self.scope(ns, scope)?.get(&key)
            }
        }
    }

    /// Store a variable after validating its name and value.
    ///
    /// Rejects names longer than the configured limit and values that
    /// mention the variable itself (`x => "$(x)"`).
    pub fn put(&mut self, var: &VarRef, value: Variable) -> EvalResult<Option<Variable>> {
        let key = VarKey::of(var);
        if key.name_len() > self.max_var_name_len {
            return Err(errors::variable_name_too_long(self.max_var_name_len));
        }
        let name = key.to_string();
        if rval_mentions(&value.rval, &name) {
            return Err(errors::self_reference(&name));
        }

        let scope = match var.scope.as_deref() {
            None | Some(THIS_SCOPE) => self.this_mut().ok_or_else(|| {
                errors::invalid_reference(&format!("{THIS_SCOPE}.{name} outside an iteration"))
            })?,
            Some(scope) => {
                let ns = var.ns.as_deref().unwrap_or(DEFAULT_NAMESPACE);
                self.scope_mut(ns, scope)
            }
        };
        Ok(scope.insert(key, value))
    }

    pub fn remove(&mut self, var: &VarRef) -> Option<Variable> {
        let key = VarKey::of(var);
        match var.scope.as_deref() {
            None | Some(THIS_SCOPE) => self.this.last_mut()?.remove(&key),
            Some(scope) => {
                let ns = Self::namespace_for(scope, var.ns.as_deref().unwrap_or(DEFAULT_NAMESPACE));
                self.scopes
                    .get_mut(&(ns.to_owned(), scope.to_owned()))?
                    .remove(&key)
            }
        }
    }

    /// Open a fresh `this` scope. Pair with [`ScopeStore::pop_this`].
    pub fn push_this(&mut self) {
        self.this.push(Scope::new(DEFAULT_NAMESPACE, THIS_SCOPE));
    }

    pub fn pop_this(&mut self) -> Option<Scope> {
        self.this.pop()
    }

    pub fn this(&self) -> Option<&Scope> {
        self.this.last()
    }

    pub fn this_mut(&mut self) -> Option<&mut Scope> {
        self.this.last_mut()
    }

    /// Number of `this` scopes currently open.
    pub fn this_depth(&self) -> usize {
        self.this.len()
    }
}

fn rval_mentions(rval: &Rval, name: &str) -> bool {
    match rval {
        Rval::Scalar(s) => string_contains_var(s, name),
        Rval::List(items) => items.iter().any(|item| rval_mentions(item, name)),
        Rval::FnCall(call) => call.args.iter().any(|arg| rval_mentions(arg, name)),
        Rval::Container(_) => false,
    }
}
