//! Command implementations and option parsing.
//!
//! Commands write their listing to `out` and non-fatal diagnostics to
//! `diag`, so tests can capture both.

mod expand;
mod functions;
mod vars;

use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

use cf_eval::{CycleDetection, EvalContext, EvalError, EvalOptions};
use cf_ir::{Policy, PolicyError};

pub use expand::expand_policy;
pub use functions::list_functions;
pub use vars::print_vars;

/// Cycle depth used by `--bounded-cycles`.
const BOUNDED_CYCLE_LEVEL: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Vars,
    Expand,
    Functions,
    Help,
    Version,
}

impl Command {
    fn parse(name: &str) -> Option<Command> {
        match name {
            "vars" => Some(Command::Vars),
            "expand" => Some(Command::Expand),
            "functions" => Some(Command::Functions),
            "help" | "--help" | "-h" => Some(Command::Help),
            "version" | "--version" | "-V" => Some(Command::Version),
            _ => None,
        }
    }

    fn needs_policy(self) -> bool {
        matches!(self, Command::Vars | Command::Expand)
    }
}

/// Parsed command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CliOptions {
    pub command: Command,
    pub policy: Option<PathBuf>,
    pub passes: Option<usize>,
    pub max_depth: Option<usize>,
    pub no_functions: bool,
    pub bounded_cycles: bool,
    pub tree: bool,
    /// Classes defined with `-D`.
    pub classes: Vec<String>,
}

impl CliOptions {
    fn new(command: Command) -> Self {
        CliOptions {
            command,
            policy: None,
            passes: None,
            max_depth: None,
            no_functions: false,
            bounded_cycles: false,
            tree: false,
            classes: Vec::new(),
        }
    }

    /// Evaluation options with the command-line overrides applied.
    pub fn eval_options(&self) -> EvalOptions {
        let mut builder = EvalOptions::builder().evaluate_functions(!self.no_functions);
        if let Some(passes) = self.passes {
            builder = builder.convergence_passes(passes);
        }
        if let Some(depth) = self.max_depth {
            builder = builder.max_nesting_depth(depth);
        }
        if self.bounded_cycles {
            builder = builder.cycle_detection(CycleDetection::Bounded {
                max_level: BOUNDED_CYCLE_LEVEL,
            });
        }
        builder.build()
    }

    /// Fresh context for one run.
    pub fn context(&self) -> EvalContext {
        self.classes
            .iter()
            .fold(
                EvalContext::builder().options(self.eval_options()),
                |builder, class| builder.define_class(class.as_str()),
            )
            .build()
    }

    /// Load the policy named on the command line.
    pub fn load_policy(&self) -> Result<Policy, CommandError> {
        let path = self
            .policy
            .as_deref()
            .ok_or_else(|| CommandError::Usage("missing policy file".to_string()))?;
        let policy = Policy::load(path)?;
        debug!(path = %path.display(), bundles = policy.bundles.len(), "policy loaded");
        Ok(policy)
    }
}

/// Failure of a command. Every variant exits with status 1.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error("evaluation aborted: {0}")]
    Eval(#[from] EvalError),
    #[error("cannot write output: {0}")]
    Io(#[from] std::io::Error),
}

fn parse_count(flag: &str, value: &str) -> Result<usize, CommandError> {
    value
        .parse()
        .map_err(|_| CommandError::Usage(format!("{flag} expects a number, got '{value}'")))
}

/// Parse the arguments after the program name.
pub fn parse_options(args: &[String]) -> Result<CliOptions, CommandError> {
    let Some((name, rest)) = args.split_first() else {
        return Err(CommandError::Usage("missing command".to_string()));
    };
    let command = Command::parse(name)
        .ok_or_else(|| CommandError::Usage(format!("unknown command: {name}")))?;
    let mut options = CliOptions::new(command);

    let mut iter = rest.iter();
    while let Some(arg) = iter.next() {
        if let Some(value) = arg.strip_prefix("--passes=") {
            options.passes = Some(parse_count("--passes", value)?);
        } else if let Some(value) = arg.strip_prefix("--max-depth=") {
            options.max_depth = Some(parse_count("--max-depth", value)?);
        } else if arg == "--no-functions" {
            options.no_functions = true;
        } else if arg == "--bounded-cycles" {
            options.bounded_cycles = true;
        } else if arg == "--tree" {
            options.tree = true;
        } else if arg == "-D" {
            let class = iter
                .next()
                .ok_or_else(|| CommandError::Usage("-D expects a class name".to_string()))?;
            options.classes.push(class.clone());
        } else if let Some(class) = arg.strip_prefix("-D") {
            options.classes.push(class.to_string());
        } else if arg.starts_with('-') {
            return Err(CommandError::Usage(format!("unknown option: {arg}")));
        } else if options.policy.is_none() {
            options.policy = Some(PathBuf::from(arg));
        } else {
            return Err(CommandError::Usage(format!("unexpected argument: {arg}")));
        }
    }

    if command.needs_policy() && options.policy.is_none() {
        return Err(CommandError::Usage("missing policy file".to_string()));
    }
    Ok(options)
}
