#![expect(clippy::unwrap_used, reason = "tests use unwrap for brevity")]

use std::panic::{catch_unwind, AssertUnwindSafe};

use pretty_assertions::assert_eq;

use cf_ir::{FnCall, SourceLocation};

use super::*;

fn s(text: &str) -> Rval {
    Rval::scalar(text)
}

fn here() -> SourceLocation {
    SourceLocation::new("/srv/policy/site.cf", 12)
}

fn with_main(f: impl FnOnce(&mut EvalContext)) {
    let mut ctx = EvalContext::builder().system_vars(false).build();
    {
        let mut other = ctx.bundle_scope("default", "other");
        other
            .set("remote", Rval::scalar_list(["r1", "r2"]), DataType::StringList)
            .unwrap();
    }
    let mut ctx = ctx.bundle_scope("default", "main");
    ctx.set("hosts", Rval::scalar_list(["a", "b"]), DataType::StringList)
        .unwrap();
    ctx.set("ports", Rval::scalar_list(["80", "443"]), DataType::StringList)
        .unwrap();
    ctx.set("empty", Rval::List(Vec::new()), DataType::StringList)
        .unwrap();
    ctx.set("name", s("world"), DataType::String).unwrap();
    f(&mut ctx);
}

/// Expand and collect every resolved promiser.
fn promisers(ctx: &mut EvalContext, promise: &Promise) -> (Vec<String>, ExpansionReport) {
    let mut seen = Vec::new();
    let report = ctx
        .expand_promise(promise, |_, resolved| {
            seen.push(resolved.promiser.clone());
            PromiseResult::Noop
        })
        .unwrap();
    (seen, report)
}

#[test]
fn test_hosts_and_ports() {
    with_main(|ctx| {
        let promise = Promise::new("reports", "$(hosts):$(ports)").at(here());
        let (seen, report) = promisers(ctx, &promise);
        assert_eq!(seen, ["a:80", "b:80", "a:443", "b:443"]);
        assert_eq!(report.iterations, 4);
        assert_eq!(report.result, PromiseResult::Noop);
        assert_eq!(ctx.store().this_depth(), 0);
    });
}

#[test]
fn test_expansion_is_repeatable() {
    with_main(|ctx| {
        let promise = Promise::new("reports", "$(hosts):$(ports)")
            .with_constraint("comment", "to $(name)")
            .at(here());
        let mut runs = Vec::new();
        for _ in 0..2 {
            let mut resolved = Vec::new();
            ctx.expand_promise(&promise, |_, p| {
                resolved.push(p.clone());
                PromiseResult::Noop
            })
            .unwrap();
            runs.push(resolved);
        }
        assert_eq!(runs[0].len(), 4);
        assert_eq!(runs[0], runs[1]);
    });
}

#[test]
fn test_empty_list_gives_no_iterations() {
    with_main(|ctx| {
        let promise = Promise::new("reports", "$(hosts) $(empty)");
        let (seen, report) = promisers(ctx, &promise);
        assert!(seen.is_empty());
        assert_eq!(report.iterations, 0);
        assert_eq!(report.result, PromiseResult::Skipped);
    });
}

#[test]
fn test_promise_without_lists_runs_once() {
    with_main(|ctx| {
        let promise = Promise::new("reports", "hello $(name)");
        let (seen, _) = promisers(ctx, &promise);
        assert_eq!(seen, ["hello world"]);
    });
}

#[test]
fn test_nested_iterator_spins_fastest() {
    with_main(|ctx| {
        ctx.set("suffix", Rval::scalar_list(["x", "y"]), DataType::StringList)
            .unwrap();
        ctx.set("v_x", s("one"), DataType::String).unwrap();
        ctx.set("v_y", Rval::scalar_list(["two", "three"]), DataType::StringList)
            .unwrap();
        let promise = Promise::new("reports", "$(v_$(suffix))");
        let (seen, _) = promisers(ctx, &promise);
        assert_eq!(seen, ["one", "two", "one", "three"]);
    });
}

#[test]
fn test_qualified_iterator() {
    with_main(|ctx| {
        let promise = Promise::new("reports", "remote $(other.remote)");
        let (seen, _) = promisers(ctx, &promise);
        assert_eq!(seen, ["remote r1", "remote r2"]);
    });
}

#[test]
fn test_policy_promise_is_not_mutated() {
    with_main(|ctx| {
        let promise = Promise::new("reports", "$(other.remote)")
            .with_promisee(s("$(hosts)"))
            .with_constraint("comment", "$(name)");
        let before = promise.clone();
        let mut origins = Vec::new();
        ctx.expand_promise(&promise, |_, resolved| {
            origins.push(resolved.origin.clone().unwrap());
            PromiseResult::Noop
        })
        .unwrap();
        assert_eq!(promise, before);
        assert_eq!(origins.len(), 4);
        assert!(origins.iter().all(|origin| **origin == before));
    });
}

#[test]
fn test_specials_are_injected() {
    with_main(|ctx| {
        let promise = Promise::new("reports", "$(hosts)")
            .with_constraint("handle", "report_$(name)")
            .at(here());
        let mut specials = Vec::new();
        ctx.expand_promise(&promise, |ctx, _| {
            let read = |name: &str| {
                ctx.lookup_name(&format!("this.{name}"))
                    .and_then(|found| found.rval.as_scalar().map(str::to_owned))
                    .unwrap()
            };
            specials.push([
                read("promiser"),
                read("promise_filename"),
                read("promise_dirname"),
                read("promise_linenumber"),
                read("bundle"),
                read("namespace"),
                read("handle"),
            ]);
            assert!(ctx.lookup_name("this.promiser_pid").is_some());
            PromiseResult::Noop
        })
        .unwrap();
        assert_eq!(
            specials[1],
            ["b", "/srv/policy/site.cf", "/srv/policy", "12", "main", "default", "report_world"]
        );
    });
}

#[test]
fn test_container_iteration_skips_nested_values() {
    with_main(|ctx| {
        let doc = serde_json::json!(["a", ["b", "c"], {"k": "v"}]);
        ctx.set("doc", Rval::Container(doc), DataType::Container)
            .unwrap();
        let promise = Promise::new("reports", "item $(doc)");
        let (seen, report) = promisers(ctx, &promise);
        assert_eq!(seen, ["item a"]);
        assert!(report.is_complete());
    });
}

#[test]
fn test_handle_is_canonified_or_defaulted() {
    with_main(|ctx| {
        let read_handle = |ctx: &mut EvalContext, promise: &Promise| {
            let mut handles = Vec::new();
            ctx.expand_promise(promise, |ctx, _| {
                let found = ctx.lookup_name("this.handle").unwrap();
                handles.push(found.rval.as_scalar().unwrap().to_owned());
                PromiseResult::Noop
            })
            .unwrap();
            handles
        };

        let named = Promise::new("reports", "x")
            .with_constraint("handle", "web-$(name).conf")
            .at(here());
        assert_eq!(read_handle(ctx, &named), ["web_world_conf"]);

        let anonymous = Promise::new("reports", "x").at(here());
        assert_eq!(read_handle(ctx, &anonymous), ["promise__srv_policy_site_cf_12"]);
    });
}

#[test]
fn test_partial_expansion_is_reported() {
    with_main(|ctx| {
        let promise = Promise::new("files", "/etc/$(undefined)")
            .with_constraint("comment", "for $(nobody)")
            .at(here());
        let (seen, report) = promisers(ctx, &promise);
        assert_eq!(seen, ["/etc/$(undefined)"]);
        assert_eq!(report.iterations, 1);
        assert_eq!(report.partial, 1);
        assert!(!report.is_complete());
        assert_eq!(report.unresolved, ["undefined", "nobody"]);
        assert!(report.errors.is_empty());
    });
}

#[test]
fn test_complete_expansion_has_no_pending_names() {
    with_main(|ctx| {
        let promise = Promise::new("files", "/etc/$(hosts)")
            .with_constraint("comment", "for $(name)")
            .with_constraint("members", Rval::List(vec![s("@(hosts)")]));
        let (_, report) = promisers(ctx, &promise);
        assert_eq!(report.iterations, 2);
        assert!(report.is_complete());
        assert!(report.unresolved.is_empty());
    });
}

#[test]
fn test_pending_references_walks_nested_values() {
    let value = Rval::List(vec![
        s("@(later)"),
        Rval::FnCall(FnCall::new("upcase", vec![s("x $(a.b) $(c")])),
        s("done"),
    ]);
    let mut names = Vec::new();
    pending_references(&value, &mut names);
    assert_eq!(names, ["later", "a.b", "$(c"]);
}

#[test]
fn test_this_is_torn_down_on_panic() {
    with_main(|ctx| {
        let promise = Promise::new("reports", "$(hosts)");
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            ctx.expand_promise(&promise, |_, _| panic!("action failed"))
        }));
        assert!(outcome.is_err());
        assert_eq!(ctx.store().this_depth(), 0);
        assert_eq!(ctx.current_location(), None);
    });
}

#[test]
fn test_constraint_values_are_resolved() {
    with_main(|ctx| {
        let promise = Promise::new("reports", "x")
            .with_constraint("owner", FnCall::new("upcase", vec![s("$(name)")]))
            .with_constraint("members", Rval::List(vec![s("@(hosts)"), s("c")]));
        let mut resolved = Vec::new();
        ctx.expand_promise(&promise, |_, p| {
            resolved.push(p.clone());
            PromiseResult::Change
        })
        .unwrap();
        assert_eq!(resolved[0].constraint("owner").unwrap().rval, s("WORLD"));
        assert_eq!(
            resolved[0].constraint("members").unwrap().rval,
            Rval::scalar_list(["a", "b", "c"])
        );
    });
}

#[test]
fn test_failed_constraint_call_is_reported() {
    with_main(|ctx| {
        let promise = Promise::new("reports", "x")
            .with_constraint("owner", FnCall::new("nosuchfn", vec![s("$(name)")]))
            .at(here());
        let mut resolved = Vec::new();
        let report = ctx
            .expand_promise(&promise, |_, p| {
                resolved.push(p.clone());
                PromiseResult::Noop
            })
            .unwrap();
        assert_eq!(report.result, PromiseResult::Fail);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].location, Some(here()));
        assert_eq!(
            resolved[0].constraint("owner").unwrap().rval,
            Rval::FnCall(FnCall::new("nosuchfn", vec![s("world")]))
        );
    });
}

#[test]
fn test_vars_promise_defines_per_iteration() {
    with_main(|ctx| {
        let promise =
            Promise::new("vars", "port_$(ports)").with_constraint("string", "$(hosts)-$(ports)");
        let report = ctx.expand_promise(&promise, |_, _| PromiseResult::Noop).unwrap();
        assert_eq!(report.iterations, 4);
        assert_eq!(
            report.outcomes,
            [
                VarOutcome::Added,
                VarOutcome::Added,
                VarOutcome::RedefinitionWarning,
                VarOutcome::RedefinitionWarning,
            ]
        );
        assert_eq!(report.result, PromiseResult::Warn);
        let value = ctx.lookup_name("port_443").unwrap();
        assert_eq!(value.rval.as_ref(), &s("a-443"));
    });
}

#[test]
fn test_self_reference_is_fatal() {
    with_main(|ctx| {
        let promise = Promise::new("vars", "loop")
            .with_constraint("string", "again $(loop)")
            .at(here());
        let err = ctx
            .expand_promise(&promise, |_, _| PromiseResult::Noop)
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(
            err.kind,
            EvalErrorKind::SelfReference {
                variable: "loop".to_string()
            }
        );
        assert_eq!(err.location, Some(here()));
        assert_eq!(ctx.store().this_depth(), 0);
    });
}

#[test]
fn test_class_guard_and_class_promises() {
    with_main(|ctx| {
        let hidden = Promise::new("reports", "x").with_classes("nosuchclass");
        let (seen, _) = promisers(ctx, &hidden);
        assert!(seen.is_empty());

        let class =
            Promise::new("classes", "has_$(hosts)").with_constraint("expression", "any");
        ctx.expand_promise(&class, |_, _| PromiseResult::Noop).unwrap();
        assert!(ctx.classes().is_defined("has_a"));
        assert!(ctx.classes().is_defined("has_b"));

        let shown = Promise::new("reports", "x").with_classes("has_a.!has_c");
        let (seen, _) = promisers(ctx, &shown);
        assert_eq!(seen, ["x"]);
    });
}

#[test]
fn test_promise_result_order() {
    let mut results = vec![
        PromiseResult::Fail,
        PromiseResult::Noop,
        PromiseResult::Warn,
        PromiseResult::Skipped,
        PromiseResult::Change,
    ];
    results.sort();
    assert_eq!(
        results.iter().map(ToString::to_string).collect::<Vec<_>>(),
        ["skipped", "noop", "change", "warn", "fail"]
    );
}
