#![expect(clippy::unwrap_used, reason = "tests use unwrap for brevity")]

use pretty_assertions::assert_eq;

use cf_ir::{Rval, VarRef};

use super::*;
use crate::errors::EvalErrorKind;

fn ctx() -> EvalContext {
    EvalContext::builder().system_vars(false).build()
}

fn var(promiser: &str, value: &str) -> Promise {
    Promise::new("vars", promiser).with_constraint("string", value)
}

fn value_of(ctx: &EvalContext, scope: &str, lval: &str) -> Option<String> {
    ctx.store()
        .get(&VarRef::qualified(Some("default"), scope, lval))
        .and_then(|v| v.rval.as_scalar().map(str::to_owned))
}

#[test]
fn test_forward_reference_converges_on_a_later_pass() {
    let bundle = Bundle::new("agent", "main")
        .with_promise(var("greeting", "hello $(name)"))
        .with_promise(var("name", "world"));
    let mut ctx = ctx();
    let report = ctx.resolve_bundle(&bundle).unwrap();
    assert_eq!(value_of(&ctx, "main", "greeting").as_deref(), Some("hello world"));
    assert_eq!(report.defined, 2);
    assert!(report.errors.is_empty());
    assert!(ctx.is_final_pass());
}

#[test]
fn test_settled_bundle_stops_early() {
    let bundle = Bundle::new("agent", "main").with_promise(var("name", "world"));
    let options = crate::config::EvalOptions::builder()
        .convergence_passes(5)
        .build();
    let mut ctx = EvalContext::builder().options(options).system_vars(false).build();
    let report = ctx.resolve_bundle(&bundle).unwrap();
    assert_eq!(report.passes, 2);
}

#[test]
fn test_unresolvable_value_is_reported_once() {
    let bundle = Bundle::new("agent", "main").with_promise(var("x", "$(missing)"));
    let mut ctx = ctx();
    let report = ctx.resolve_bundle(&bundle).unwrap();
    assert_eq!(report.passes, 3);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(
        report.errors[0].kind,
        EvalErrorKind::NoConvergence {
            variable: "x".to_string()
        }
    );
    assert_eq!(value_of(&ctx, "main", "x"), None);
}

#[test]
fn test_classes_feed_variable_guards() {
    let bundle = Bundle::new("agent", "main")
        .with_promise(var("mode", "production").with_classes("prod"))
        .with_promise(Promise::new("classes", "prod").with_constraint("expression", "any"));
    let mut ctx = ctx();
    ctx.resolve_bundle(&bundle).unwrap();
    assert!(ctx.classes().is_defined("prod"));
    assert_eq!(value_of(&ctx, "main", "mode").as_deref(), Some("production"));
}

#[test]
fn test_meta_promises_are_resolved() {
    let mut meta = var("tags", "demo");
    meta.promise_type = "meta".to_string();
    let bundle = Bundle::new("agent", "main").with_promise(meta);
    let mut ctx = ctx();
    ctx.resolve_bundle(&bundle).unwrap();
    assert_eq!(value_of(&ctx, "main_meta", "tags").as_deref(), Some("demo"));
}

#[test]
fn test_common_bundles_resolve_first() {
    let main = Bundle::new("agent", "main").with_promise(var("motd", "welcome to $(g.site)"));
    let global = Bundle::new("common", "g").with_promise(var("site", "lab"));
    let policy = Policy {
        bundles: vec![main, global],
    };
    let mut ctx = ctx();
    let reports = ctx.resolve_policy(&policy).unwrap();
    assert_eq!(
        reports.iter().map(|r| r.bundle.as_str()).collect::<Vec<_>>(),
        ["g", "main"]
    );
    assert_eq!(value_of(&ctx, "main", "motd").as_deref(), Some("welcome to lab"));
}

#[test]
fn test_self_reference_aborts_the_bundle() {
    let bundle = Bundle::new("agent", "main").with_promise(var("x", "$(x)"));
    let mut ctx = ctx();
    let err = ctx.resolve_bundle(&bundle).unwrap_err();
    assert!(err.is_fatal());
    assert!(ctx.is_final_pass());
    assert_eq!(ctx.current_bundle(), None);
}

#[test]
fn test_expand_bundle_acts_on_other_promises() {
    let bundle = Bundle::new("agent", "main")
        .with_promise(Promise::new("reports", "$(greeting) from $(hosts)"))
        .with_promise(var("greeting", "hi"))
        .with_promise(
            Promise::new("vars", "hosts").with_constraint("slist", Rval::scalar_list(["a", "b"])),
        );
    let mut ctx = ctx();
    let mut seen = Vec::new();
    let report = ctx
        .expand_bundle(&bundle, |_, promise| {
            seen.push(format!("{}: {}", promise.promise_type, promise.promiser));
            PromiseResult::Change
        })
        .unwrap();
    assert_eq!(seen, ["reports: hi from a", "reports: hi from b"]);
    assert_eq!(report.expanded, 1);
    assert_eq!(report.result, PromiseResult::Change);
}
