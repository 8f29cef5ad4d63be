//! Policy tree: bundles of typed promises with their constraints.
//!
//! The tree is produced by an external parser and handed over as JSON. After
//! deserialization [`Policy::from_json_str`] back-fills the fields the JSON
//! leaves implicit (each promise's type and source file).

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rval::Rval;

/// Namespace used when a bundle declares none.
pub const DEFAULT_NAMESPACE: &str = "default";

fn any_class() -> String {
    "any".to_owned()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_owned()
}

/// Where a promise was written.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub line: usize,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: usize) -> Self {
        SourceLocation {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// `lval => rval`, optionally guarded by a class expression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub lval: String,
    pub rval: Rval,
    #[serde(default = "any_class")]
    pub classes: String,
}

impl Constraint {
    pub fn new(lval: impl Into<String>, rval: impl Into<Rval>) -> Self {
        Constraint {
            lval: lval.into(),
            rval: rval.into(),
            classes: any_class(),
        }
    }
}

/// A single promise, or a resolved copy of one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Promise {
    #[serde(skip)]
    pub promise_type: String,
    pub promiser: String,
    #[serde(default)]
    pub promisee: Option<Rval>,
    #[serde(default = "any_class")]
    pub classes: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default, rename = "attributes")]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub location: SourceLocation,
    /// The policy promise a resolved copy was expanded from.
    #[serde(skip)]
    pub origin: Option<Arc<Promise>>,
}

impl Promise {
    pub fn new(promise_type: impl Into<String>, promiser: impl Into<String>) -> Self {
        Promise {
            promise_type: promise_type.into(),
            promiser: promiser.into(),
            promisee: None,
            classes: any_class(),
            comment: None,
            constraints: Vec::new(),
            location: SourceLocation::default(),
            origin: None,
        }
    }

    #[must_use]
    pub fn with_constraint(mut self, lval: impl Into<String>, rval: impl Into<Rval>) -> Self {
        self.constraints.push(Constraint::new(lval, rval));
        self
    }

    #[must_use]
    pub fn with_promisee(mut self, promisee: impl Into<Rval>) -> Self {
        self.promisee = Some(promisee.into());
        self
    }

    #[must_use]
    pub fn with_classes(mut self, classes: impl Into<String>) -> Self {
        self.classes = classes.into();
        self
    }

    #[must_use]
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    /// First constraint with this lval.
    pub fn constraint(&self, lval: &str) -> Option<&Constraint> {
        self.constraints.iter().find(|c| c.lval == lval)
    }

    /// Scalar value of a constraint, if present and scalar.
    pub fn constraint_scalar(&self, lval: &str) -> Option<&str> {
        self.constraint(lval).and_then(|c| c.rval.as_scalar())
    }

    /// `vars` and `meta` promises define variables.
    pub fn defines_variable(&self) -> bool {
        matches!(self.promise_type.as_str(), "vars" | "meta")
    }
}

/// All promises of one type inside a bundle, in source order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromiseType {
    pub name: String,
    #[serde(default)]
    pub promises: Vec<Promise>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub name: String,
    pub bundle_type: String,
    #[serde(default)]
    pub source_path: String,
    #[serde(default)]
    pub promise_types: Vec<PromiseType>,
}

impl Bundle {
    pub fn new(bundle_type: impl Into<String>, name: impl Into<String>) -> Self {
        Bundle {
            namespace: default_namespace(),
            name: name.into(),
            bundle_type: bundle_type.into(),
            source_path: String::new(),
            promise_types: Vec::new(),
        }
    }

    /// Append a promise under its own type section, creating the section on demand.
    #[must_use]
    pub fn with_promise(mut self, promise: Promise) -> Self {
        match self
            .promise_types
            .iter_mut()
            .find(|section| section.name == promise.promise_type)
        {
            Some(section) => section.promises.push(promise),
            None => self.promise_types.push(PromiseType {
                name: promise.promise_type.clone(),
                promises: vec![promise],
            }),
        }
        self
    }

    pub fn is_common(&self) -> bool {
        self.bundle_type == "common"
    }

    /// Promises of one type in source order.
    pub fn promises_of<'a>(&'a self, promise_type: &'a str) -> impl Iterator<Item = &'a Promise> + 'a {
        self.promise_types
            .iter()
            .filter(move |section| section.name == promise_type)
            .flat_map(|section| section.promises.iter())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub bundles: Vec<Bundle>,
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("cannot read policy file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed policy JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl Policy {
    pub fn from_json_str(text: &str) -> Result<Policy, PolicyError> {
        let mut policy: Policy = serde_json::from_str(text)?;
        policy.backfill();
        Ok(policy)
    }

    pub fn load(path: &Path) -> Result<Policy, PolicyError> {
        let text = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut policy = Policy::from_json_str(&text)?;
        for bundle in &mut policy.bundles {
            if bundle.source_path.is_empty() {
                bundle.source_path = path.display().to_string();
            }
        }
        policy.backfill();
        Ok(policy)
    }

    pub fn bundle(&self, name: &str) -> Option<&Bundle> {
        self.bundles.iter().find(|b| b.name == name)
    }

    fn backfill(&mut self) {
        for bundle in &mut self.bundles {
            for section in &mut bundle.promise_types {
                for promise in &mut section.promises {
                    promise.promise_type.clone_from(&section.name);
                    if promise.location.file.is_empty() {
                        promise.location.file.clone_from(&bundle.source_path);
                    }
                }
            }
        }
    }
}
