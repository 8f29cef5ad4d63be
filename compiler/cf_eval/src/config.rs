//! Evaluation options and the builder that assembles them.
//!
//! Every limit the interpreter enforces lives here, so callers (the CLI,
//! tests, an embedding agent) tune behavior in one place:
//!
//! ```text
//! let options = EvalOptions::builder()
//!     .max_nesting_depth(16)
//!     .convergence_passes(5)
//!     .cycle_detection(CycleDetection::Bounded { max_level: 3 })
//!     .build();
//! ```

use cf_stack::NestingLimit;

/// How the self-reference check decides a definition cannot converge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CycleDetection {
    /// Follow every reference reachable from the value, visiting each name
    /// once. Finds cycles of any length and always terminates.
    #[default]
    VisitedSet,
    /// Re-expand the value textually up to `max_level` times and look for
    /// the variable's own name. Cycles longer than that are not reported.
    Bounded { max_level: usize },
}

/// Process identity injected into each iteration's `this` scope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AgentIdentity {
    pub uid: u32,
    pub gid: u32,
    pub pid: u32,
    pub ppid: u32,
}

impl AgentIdentity {
    /// Identity of the running process.
    ///
    /// The pid comes from the standard library. uid, gid and ppid are read
    /// from `/proc/self/status` where it exists and default to 0 elsewhere.
    pub fn current() -> Self {
        let mut identity = AgentIdentity {
            pid: std::process::id(),
            ..AgentIdentity::default()
        };
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            identity.apply_proc_status(&status);
        }
        identity
    }

    fn apply_proc_status(&mut self, status: &str) {
        let first_field = |rest: &str| rest.split_whitespace().next().and_then(|v| v.parse().ok());
        for line in status.lines() {
            if let Some(rest) = line.strip_prefix("Uid:") {
                self.uid = first_field(rest).unwrap_or(self.uid);
            } else if let Some(rest) = line.strip_prefix("Gid:") {
                self.gid = first_field(rest).unwrap_or(self.gid);
            } else if let Some(rest) = line.strip_prefix("PPid:") {
                self.ppid = first_field(rest).unwrap_or(self.ppid);
            }
        }
    }
}

/// Limits and switches for one evaluation run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvalOptions {
    /// Longest string the interpolator may produce, in bytes.
    pub max_expansion_len: usize,
    /// Ceiling for nested references, mapper levels and nested calls.
    pub nesting: NestingLimit,
    /// Longest accepted variable name.
    pub max_var_name_len: usize,
    /// Bundle passes before a still-unresolved value is reported.
    pub convergence_passes: usize,
    pub cycle_detection: CycleDetection,
    /// When off, function calls are left unevaluated.
    pub evaluate_functions: bool,
    /// Memoize `CACHED` functions.
    pub function_cache: bool,
    pub cache_capacity: usize,
    pub identity: AgentIdentity,
}

impl Default for EvalOptions {
    fn default() -> Self {
        EvalOptions {
            max_expansion_len: 8192,
            nesting: NestingLimit::DEFAULT,
            max_var_name_len: 1024,
            convergence_passes: 3,
            cycle_detection: CycleDetection::default(),
            evaluate_functions: true,
            function_cache: true,
            cache_capacity: 1024,
            identity: AgentIdentity::current(),
        }
    }
}

impl EvalOptions {
    pub fn builder() -> EvalOptionsBuilder {
        EvalOptionsBuilder::new()
    }
}

/// Builder for [`EvalOptions`].
#[derive(Clone, Debug, Default)]
pub struct EvalOptionsBuilder {
    options: EvalOptions,
}

impl EvalOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn max_expansion_len(mut self, bytes: usize) -> Self {
        self.options.max_expansion_len = bytes;
        self
    }

    #[must_use]
    pub fn max_nesting_depth(mut self, depth: usize) -> Self {
        self.options.nesting = NestingLimit::new(depth);
        self
    }

    #[must_use]
    pub fn max_var_name_len(mut self, len: usize) -> Self {
        self.options.max_var_name_len = len;
        self
    }

    /// At least one pass always runs.
    #[must_use]
    pub fn convergence_passes(mut self, passes: usize) -> Self {
        self.options.convergence_passes = passes.max(1);
        self
    }

    #[must_use]
    pub fn cycle_detection(mut self, strategy: CycleDetection) -> Self {
        self.options.cycle_detection = strategy;
        self
    }

    #[must_use]
    pub fn evaluate_functions(mut self, enabled: bool) -> Self {
        self.options.evaluate_functions = enabled;
        self
    }

    #[must_use]
    pub fn function_cache(mut self, enabled: bool) -> Self {
        self.options.function_cache = enabled;
        self
    }

    #[must_use]
    pub fn cache_capacity(mut self, entries: usize) -> Self {
        self.options.cache_capacity = entries;
        self
    }

    #[must_use]
    pub fn identity(mut self, identity: AgentIdentity) -> Self {
        self.options.identity = identity;
        self
    }

    pub fn build(self) -> EvalOptions {
        self.options
    }
}
