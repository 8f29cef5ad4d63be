#![expect(clippy::unwrap_used, reason = "tests use unwrap for brevity")]

use std::panic::{catch_unwind, AssertUnwindSafe};

use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;

fn ctx() -> EvalContext {
    EvalContext::builder().system_vars(false).build()
}

fn here() -> SourceLocation {
    SourceLocation::new("test.cf", 1)
}

fn scalar_of(lookup: Option<Lookup<'_>>) -> Option<String> {
    lookup.and_then(|l| l.rval.as_scalar().map(str::to_owned))
}

#[test]
fn test_unqualified_resolves_in_current_bundle() {
    let mut ctx = ctx();
    ctx.set("main.x", Rval::scalar("1"), DataType::String).unwrap();
    assert_eq!(scalar_of(ctx.lookup_name("x")), None);

    let scoped = ctx.bundle_scope("default", "main");
    assert_eq!(scalar_of(scoped.lookup_name("x")), Some("1".to_string()));
    assert_eq!(scalar_of(scoped.lookup_name("main.x")), Some("1".to_string()));
    assert_eq!(
        scalar_of(scoped.lookup_name("default:main.x")),
        Some("1".to_string())
    );
}

#[test]
fn test_this_shadows_bundle() {
    let mut ctx = ctx();
    ctx.set("main.x", Rval::scalar("bundle"), DataType::String)
        .unwrap();
    let mut bundle = ctx.bundle_scope("default", "main");
    let mut scoped = bundle.iteration_scope(&here());
    scoped
        .set("this.x", Rval::scalar("iteration"), DataType::String)
        .unwrap();
    assert_eq!(
        scalar_of(scoped.lookup_name("x")),
        Some("iteration".to_string())
    );
    assert_eq!(
        scalar_of(scoped.lookup_name("main.x")),
        Some("bundle".to_string())
    );
}

#[test]
fn test_qualified_reference_prefers_mangled_token() {
    let mut ctx = ctx();
    ctx.set(
        "other.hosts",
        Rval::scalar_list(["a", "b"]),
        DataType::StringList,
    )
    .unwrap();
    let mut scoped = ctx.iteration_scope(&here());
    scoped
        .store_mut()
        .this_mut()
        .unwrap()
        .insert(VarKey::new("other#hosts"), Variable::new(Rval::scalar("a"), DataType::String));

    assert_eq!(
        scalar_of(scoped.lookup_name("other.hosts")),
        Some("a".to_string())
    );
    assert_eq!(
        scalar_of(scoped.lookup_name("other#hosts")),
        Some("a".to_string())
    );
}

#[test]
fn test_container_selection() {
    let mut ctx = ctx();
    ctx.set(
        "main.d",
        Rval::Container(json!({"servers": ["alpha", "beta"], "port": 80})),
        DataType::Container,
    )
    .unwrap();
    let scoped = ctx.bundle_scope("default", "main");

    let found = scoped.lookup_name("d[servers][1]").unwrap();
    assert!(matches!(found.rval, Cow::Owned(_)));
    assert_eq!(found.rval.as_container(), Some(&json!("beta")));
    assert_eq!(
        scoped.lookup_name("d[port]").unwrap().rval.as_container(),
        Some(&json!(80))
    );
    assert!(scoped.lookup_name("d[missing]").is_none());
    assert!(scoped.lookup_name("d[servers][7]").is_none());
}

#[test]
fn test_plain_lookup_borrows() {
    let mut ctx = ctx();
    ctx.set("main.x", Rval::scalar("1"), DataType::String).unwrap();
    let found = ctx.lookup_name("main.x").unwrap();
    assert!(matches!(found.rval, Cow::Borrowed(_)));
}

#[test]
fn test_iteration_scope_pops_on_drop() {
    let mut ctx = ctx();
    {
        let scoped = ctx.iteration_scope(&here());
        assert_eq!(scoped.store().this_depth(), 1);
        assert_eq!(scoped.current_location(), Some(&here()));
    }
    assert_eq!(ctx.store().this_depth(), 0);
    assert_eq!(ctx.current_location(), None);
}

#[test]
fn test_iteration_scope_pops_on_panic() {
    let mut ctx = ctx();
    let result = catch_unwind(AssertUnwindSafe(|| {
        ctx.with_iteration_scope(&here(), |_scoped| {
            panic!("boom");
        })
    }));
    assert!(result.is_err());
    assert_eq!(ctx.store().this_depth(), 0);
}

#[test]
fn test_bundle_scope_nesting() {
    let mut ctx = ctx();
    ctx.with_bundle_scope("default", "outer", |outer| {
        assert_eq!(outer.current_bundle().unwrap().name, "outer");
        outer.with_bundle_scope("ns", "inner", |inner| {
            assert_eq!(inner.current_bundle().unwrap().name, "inner");
            assert_eq!(inner.current_namespace(), "ns");
        });
        assert_eq!(outer.current_bundle().unwrap().name, "outer");
    });
    assert!(ctx.current_bundle().is_none());
}

#[test]
fn test_sys_scope_populated() {
    let ctx = EvalContext::new();
    assert_eq!(
        scalar_of(ctx.lookup_name("sys.os")),
        Some(std::env::consts::OS.to_string())
    );
    assert!(ctx.lookup_name("sys.fqhost").is_some());
}
