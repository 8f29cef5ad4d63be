//! CF Expand CLI
//!
//! Resolves a JSON policy and prints its variables or expanded promises.

use std::io;

use cf_expand::commands::Command;
use cf_expand::{
    expand_policy, init_tracing, list_functions, parse_options, print_vars, CommandError,
};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        print_usage();
        std::process::exit(1);
    }

    let options = match parse_options(&args) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("error: {err}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };
    init_tracing(options.tree);

    let mut out = io::stdout().lock();
    let mut diag = io::stderr();
    let outcome = match options.command {
        Command::Vars => print_vars(&options, &mut out, &mut diag),
        Command::Expand => expand_policy(&options, &mut out, &mut diag),
        Command::Functions => list_functions(&mut out),
        Command::Help => {
            print_usage();
            Ok(())
        }
        Command::Version => {
            println!("cf-expand {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    if let Err(err) = outcome {
        eprintln!("error: {err}");
        if matches!(err, CommandError::Usage(_)) {
            eprintln!();
            print_usage();
        }
        std::process::exit(1);
    }
}

fn print_usage() {
    println!("CF Expand (promise expansion and variable resolution)");
    println!();
    println!("Usage: cf-expand <command> [options] <policy.json>");
    println!();
    println!("Commands:");
    println!("  vars <policy.json>     Resolve and print every variable");
    println!("  expand <policy.json>   Print every resolved promise instance");
    println!("  functions              List built-in function signatures");
    println!("  help                   Show this help message");
    println!("  version                Show version information");
    println!();
    println!("Options:");
    println!("  --passes=<n>           Convergence passes per bundle (default: 3)");
    println!("  --max-depth=<n>        Nesting limit for references and calls (default: 64)");
    println!("  --no-functions         Leave function calls unevaluated");
    println!("  --bounded-cycles       Bounded self-reference check instead of a full walk");
    println!("  --tree                 Hierarchical log output (with RUST_LOG)");
    println!("  -D <class>             Define a class before evaluation");
    println!();
    println!("Examples:");
    println!("  cf-expand vars promises.json");
    println!("  cf-expand expand promises.json -D production");
    println!("  RUST_LOG=cf_eval=debug cf-expand expand promises.json --tree");
}
