//! CF Expand - command-line front end for the promise interpreter.
//!
//! Loads a JSON policy, resolves its bundles and prints either the
//! resulting variables or every expanded promise instance.

pub mod commands;

use std::sync::Once;

pub use commands::{
    expand_policy, list_functions, parse_options, print_vars, CliOptions, CommandError,
};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Safe to call more than once. Nothing is installed unless `RUST_LOG` is
/// set; `tree` swaps the flat formatter for an indented span tree.
pub fn init_tracing(tree: bool) {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_err() {
            return;
        }
        let filter = EnvFilter::from_default_env();
        if tree {
            tracing_subscriber::registry()
                .with(tracing_tree::HierarchicalLayer::new(2).with_targets(true))
                .with(filter)
                .init();
        } else {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
