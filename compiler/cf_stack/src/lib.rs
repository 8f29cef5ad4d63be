//! Stack safety for recursive variable expansion.
//!
//! Interpolating `$(a_$(b_$(c)))`, mapping iterators through nested names and
//! evaluating nested function calls are all plain recursion. Two guards apply:
//!
//! - [`ensure_sufficient_stack`] grows the native stack on demand so deep but
//!   legal nesting never overflows.
//! - [`NestingLimit`] puts an explicit ceiling on the depth so pathological
//!   input fails fast with a typed error instead of growing forever.
//!
//! # Usage
//!
//! ```text
//! fn expand(&self, text: &str, depth: usize) -> Result<String, EvalError> {
//!     let depth = self.limit.descend(depth)?;
//!     ensure_sufficient_stack(|| {
//!         // ... may call self.expand(inner, depth) ...
//!     })
//! }
//! ```
//!
//! On WASM targets stack growth is a passthrough.

use std::fmt;

/// Minimum stack space to keep available (100KB red zone).
const RED_ZONE: usize = 100 * 1024;

/// Stack space allocated per growth step (1MB).
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Run `f`, growing the stack first if less than the red zone remains.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

/// WASM manages its own stack.
#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

/// Upper bound on recursion depth for one expansion.
///
/// Depth counting starts at zero for the outermost call. Each nested call
/// passes the value returned by [`NestingLimit::descend`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NestingLimit {
    max: usize,
}

impl NestingLimit {
    /// Default ceiling; far deeper than any hand-written policy nests.
    pub const DEFAULT: NestingLimit = NestingLimit { max: 64 };

    pub const fn new(max: usize) -> Self {
        NestingLimit { max }
    }

    #[inline]
    pub fn max(self) -> usize {
        self.max
    }

    /// Step one level deeper, or fail if `depth` is already at the ceiling.
    #[inline]
    pub fn descend(self, depth: usize) -> Result<usize, NestingExceeded> {
        if depth >= self.max {
            return Err(NestingExceeded { limit: self.max });
        }
        Ok(depth + 1)
    }

    /// Descend one level and run `f` with enough stack for it.
    pub fn guard<R>(
        self,
        depth: usize,
        f: impl FnOnce(usize) -> R,
    ) -> Result<R, NestingExceeded> {
        let next = self.descend(depth)?;
        Ok(ensure_sufficient_stack(|| f(next)))
    }
}

impl Default for NestingLimit {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Recursion went past the configured [`NestingLimit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NestingExceeded {
    pub limit: usize,
}

impl fmt::Display for NestingExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expression too deeply nested (limit: {})", self.limit)
    }
}

impl std::error::Error for NestingExceeded {}
