#![expect(clippy::unwrap_used, reason = "tests use unwrap for brevity")]

use pretty_assertions::assert_eq;
use serde_json::json;

use cf_ir::{FnCall, SourceLocation};

use super::*;
use crate::config::EvalOptions;

fn s(text: &str) -> Rval {
    Rval::scalar(text)
}

fn var(promiser: &str, lval: &str, rval: impl Into<Rval>) -> Promise {
    Promise::new("vars", promiser)
        .with_constraint(lval, rval)
        .at(SourceLocation::new("test.cf", 7))
}

fn with_main(options: EvalOptions, f: impl FnOnce(&mut EvalContext)) {
    let mut ctx = EvalContext::builder()
        .options(options)
        .system_vars(false)
        .build();
    let mut ctx = ctx.bundle_scope("default", "main");
    ctx.set("name", s("world"), DataType::String).unwrap();
    ctx.set("list", Rval::scalar_list(["a", "b"]), DataType::StringList)
        .unwrap();
    f(&mut ctx);
}

fn main(f: impl FnOnce(&mut EvalContext)) {
    with_main(EvalOptions::default(), f);
}

fn value_of(ctx: &EvalContext, name: &str) -> Rval {
    ctx.lookup_name(name).unwrap().rval.into_owned()
}

#[test]
fn test_added_value_is_expanded() {
    main(|ctx| {
        let outcome = ctx
            .verify_var_promise(&var("greeting", "string", "hello $(name)"))
            .unwrap();
        assert_eq!(outcome, VarOutcome::Added);
        assert_eq!(value_of(ctx, "greeting"), s("hello world"));
        assert_eq!(ctx.lookup_name("greeting").unwrap().dtype, DataType::String);
    });
}

#[test]
fn test_constant_redefinition_keeps_first_value() {
    main(|ctx| {
        ctx.verify_var_promise(&var("x", "string", "one")).unwrap();
        assert_eq!(
            ctx.verify_var_promise(&var("x", "string", "one")).unwrap(),
            VarOutcome::KeptExisting
        );
        assert_eq!(
            ctx.verify_var_promise(&var("x", "string", "two")).unwrap(),
            VarOutcome::RedefinitionWarning
        );
        assert_eq!(value_of(ctx, "x"), s("one"));
    });
}

#[test]
fn test_free_policy_overwrites() {
    main(|ctx| {
        ctx.verify_var_promise(&var("x", "string", "one")).unwrap();
        let promise = var("x", "string", "two").with_constraint("policy", "free");
        assert_eq!(ctx.verify_var_promise(&promise).unwrap(), VarOutcome::Added);
        assert_eq!(value_of(ctx, "x"), s("two"));
    });
}

#[test]
fn test_direct_self_reference_is_fatal() {
    main(|ctx| {
        for value in ["$(x) more", "${main.x}"] {
            let outcome = ctx.verify_var_promise(&var("x", "string", value)).unwrap();
            assert_eq!(outcome, VarOutcome::FatalSelfReference, "{value}");
            assert!(outcome.is_fatal());
        }
        assert!(ctx.lookup_name("x").is_none());
    });
}

#[test]
fn test_indirect_self_reference_is_found_by_both_strategies() {
    let strategies = [
        CycleDetection::VisitedSet,
        CycleDetection::Bounded { max_level: 3 },
    ];
    for strategy in strategies {
        let options = EvalOptions::builder().cycle_detection(strategy).build();
        with_main(options, |ctx| {
            ctx.set("y", s("$(z)"), DataType::String).unwrap();
            ctx.set("z", s("prefix $(x)"), DataType::String).unwrap();
            assert_eq!(
                ctx.verify_var_promise(&var("x", "string", "$(y)")).unwrap(),
                VarOutcome::FatalSelfReference,
                "{strategy:?}"
            );
        });
    }
}

#[test]
fn test_bounded_detection_misses_long_chains() {
    let options = EvalOptions::builder()
        .cycle_detection(CycleDetection::Bounded { max_level: 1 })
        .build();
    with_main(options, |ctx| {
        ctx.final_pass = false;
        ctx.set("a", s("$(b)"), DataType::String).unwrap();
        ctx.set("b", s("$(c)"), DataType::String).unwrap();
        ctx.set("c", s("$(x)"), DataType::String).unwrap();
        assert_eq!(
            ctx.verify_var_promise(&var("x", "string", "$(a)")).unwrap(),
            VarOutcome::Deferred
        );
    });
}

#[test]
fn test_unresolved_value_defers_then_fails() {
    main(|ctx| {
        ctx.final_pass = false;
        let promise = var("x", "string", "$(later)");
        assert_eq!(ctx.verify_var_promise(&promise).unwrap(), VarOutcome::Deferred);
        assert!(ctx.lookup_name("x").is_none());

        ctx.final_pass = true;
        let err = ctx.verify_var_promise(&promise).unwrap_err();
        assert_eq!(
            err.kind,
            EvalErrorKind::NoConvergence {
                variable: "x".to_string()
            }
        );
        assert_eq!(err.location, Some(SourceLocation::new("test.cf", 7)));
    });
}

#[test]
fn test_unresolved_promiser_defers() {
    main(|ctx| {
        ctx.final_pass = false;
        let promise = var("v_$(missing)", "string", "x");
        assert_eq!(ctx.verify_var_promise(&promise).unwrap(), VarOutcome::Deferred);
    });
}

#[test]
fn test_value_constraint_count() {
    main(|ctx| {
        let two = var("x", "string", "a").with_constraint("int", "1");
        assert_eq!(
            ctx.verify_var_promise(&two).unwrap_err().kind,
            EvalErrorKind::MultipleValues {
                variable: "x".to_string(),
                count: 2
            }
        );

        let none = Promise::new("vars", "x").with_constraint("comment", "nothing");
        assert!(matches!(
            ctx.verify_var_promise(&none).unwrap_err().kind,
            EvalErrorKind::IncompleteDefinition { .. }
        ));
    });
}

#[test]
fn test_guarded_value_constraints_are_ignored() {
    main(|ctx| {
        let mut promise = var("x", "string", "a").with_constraint("string", "b");
        promise.constraints[1].classes = "nosuchclass".to_string();
        assert_eq!(ctx.verify_var_promise(&promise).unwrap(), VarOutcome::Added);
        assert_eq!(value_of(ctx, "x"), s("a"));
    });
}

#[test]
fn test_invalid_identifier() {
    main(|ctx| {
        let err = ctx
            .verify_var_promise(&var("bad name", "string", "x"))
            .unwrap_err();
        assert_eq!(
            err.kind,
            EvalErrorKind::InvalidIdentifier {
                name: "bad name".to_string()
            }
        );
    });
}

#[test]
fn test_int_and_real_are_normalized() {
    main(|ctx| {
        for (name, lval, raw, expected) in [
            ("a", "int", "10k", "10000"),
            ("b", "int", "2K", "2048"),
            ("c", "int", "inf", "999999999"),
            ("d", "real", "1.5", "1.500000"),
        ] {
            ctx.verify_var_promise(&var(name, lval, raw)).unwrap();
            assert_eq!(value_of(ctx, name), s(expected), "{raw}");
        }

        let err = ctx.verify_var_promise(&var("e", "int", "ten")).unwrap_err();
        assert!(matches!(err.kind, EvalErrorKind::TypeMismatch { .. }));

        let list = var("f", "ilist", Rval::scalar_list(["1", "2m"]));
        ctx.verify_var_promise(&list).unwrap();
        assert_eq!(value_of(ctx, "f"), Rval::scalar_list(["1", "2000000"]));
    });
}

#[test]
fn test_lists_are_flattened() {
    main(|ctx| {
        let promise = var(
            "all",
            "slist",
            Rval::List(vec![s("first"), s("@(list)"), s("$(name)")]),
        );
        ctx.verify_var_promise(&promise).unwrap();
        assert_eq!(value_of(ctx, "all"), Rval::scalar_list(["first", "a", "b", "world"]));
        assert_eq!(ctx.lookup_name("all").unwrap().dtype, DataType::StringList);
    });
}

#[test]
fn test_ifdefined_drops_undefined_lists() {
    main(|ctx| {
        let value = Rval::List(vec![s("@(list)"), s("@(missing)")]);
        let promise = var("merged", "slist", value.clone()).with_constraint("policy", "ifdefined");
        assert_eq!(ctx.verify_var_promise(&promise).unwrap(), VarOutcome::Added);
        assert_eq!(value_of(ctx, "merged"), Rval::scalar_list(["a", "b", "cf_null"]));

        ctx.final_pass = false;
        let strict = var("strict", "slist", value);
        assert_eq!(ctx.verify_var_promise(&strict).unwrap(), VarOutcome::Deferred);
    });
}

#[test]
fn test_data_from_json_text() {
    main(|ctx| {
        ctx.verify_var_promise(&var("conf", "data", r#"{"port": 22}"#))
            .unwrap();
        assert_eq!(value_of(ctx, "conf"), Rval::Container(json!({"port": 22})));

        let err = ctx
            .verify_var_promise(&var("broken", "data", "{nope"))
            .unwrap_err();
        assert!(matches!(err.kind, EvalErrorKind::TypeMismatch { .. }));
    });
}

#[test]
fn test_indexed_names_refuse_containers() {
    main(|ctx| {
        let promise = var("arr[k]", "data", Rval::Container(json!({"a": 1})));
        assert!(matches!(
            ctx.verify_var_promise(&promise).unwrap_err().kind,
            EvalErrorKind::IndexedContainer { .. }
        ));

        ctx.set("conf", Rval::Container(json!({})), DataType::Container)
            .unwrap();
        let promise = var("conf[k]", "string", "v");
        assert!(matches!(
            ctx.verify_var_promise(&promise).unwrap_err().kind,
            EvalErrorKind::IndexedContainer { .. }
        ));

        ctx.verify_var_promise(&var("arr[k]", "string", "v")).unwrap();
        assert_eq!(value_of(ctx, "arr[k]"), s("v"));
    });
}

#[test]
fn test_function_value() {
    main(|ctx| {
        let call = FnCall::new("upcase", vec![s("$(name)")]);
        let promise = var("loud", "string", call);
        assert_eq!(ctx.verify_var_promise(&promise).unwrap(), VarOutcome::Added);
        assert_eq!(value_of(ctx, "loud"), s("WORLD"));
        assert_eq!(
            ctx.verify_var_promise(&promise).unwrap(),
            VarOutcome::KeptExisting
        );
    });
}

#[test]
fn test_failed_call_never_assigns() {
    main(|ctx| {
        let promise = var("x", "string", FnCall::new("nosuchfn", vec![]));
        assert!(ctx.verify_var_promise(&promise).is_err());
        assert!(ctx.lookup_name("x").is_none());

        ctx.final_pass = false;
        let pending = var("y", "slist", FnCall::new("reverse", vec![s("@(later)")]));
        assert_eq!(ctx.verify_var_promise(&pending).unwrap(), VarOutcome::Deferred);
        assert!(ctx.lookup_name("y").is_none());
    });
}

#[test]
fn test_functions_off_skips_call_values() {
    let options = EvalOptions::builder().evaluate_functions(false).build();
    with_main(options, |ctx| {
        let promise = var("x", "string", FnCall::new("upcase", vec![s("a")]));
        assert_eq!(ctx.verify_var_promise(&promise).unwrap(), VarOutcome::Skipped);
    });
}

#[test]
fn test_guards() {
    main(|ctx| {
        let hidden = var("a", "string", "1").with_classes("nosuchclass");
        assert_eq!(ctx.verify_var_promise(&hidden).unwrap(), VarOutcome::Skipped);

        let shown = var("b", "string", "1").with_constraint("ifvarclass", "any");
        assert_eq!(ctx.verify_var_promise(&shown).unwrap(), VarOutcome::Added);

        let computed = var("c", "string", "1")
            .with_constraint("ifvarclass", FnCall::new("not", vec![s("any")]));
        assert_eq!(ctx.verify_var_promise(&computed).unwrap(), VarOutcome::Skipped);

        let unless = var("d", "string", "1").with_constraint("unless", "any");
        assert_eq!(ctx.verify_var_promise(&unless).unwrap(), VarOutcome::Skipped);
    });
}

/// Log sink shared with a test subscriber.
#[derive(Clone, Default)]
struct LogBuffer(std::sync::Arc<parking_lot::Mutex<Vec<u8>>>);

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_malformed_guard_is_logged_and_skips() {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, || {
        main(|ctx| {
            let unless = var("a", "string", "1").with_constraint("unless", "(any");
            assert_eq!(ctx.verify_var_promise(&unless).unwrap(), VarOutcome::Skipped);
            let guarded = var("b", "string", "1").with_constraint("if", "linux&");
            assert_eq!(ctx.verify_var_promise(&guarded).unwrap(), VarOutcome::Skipped);
        });
    });

    let output = String::from_utf8(logs.0.lock().clone()).unwrap();
    let reported: Vec<&str> = output
        .lines()
        .filter(|line| line.contains("ERROR") && line.contains("test.cf:7"))
        .collect();
    assert_eq!(reported.len(), 2, "{output}");
    assert!(reported[0].contains("class expression in unless cannot be evaluated"));
    assert!(reported[1].contains("class expression in if cannot be evaluated"));
}

#[test]
fn test_tags_include_meta_list() {
    main(|ctx| {
        let promise = var("x", "string", "v").with_constraint("meta", Rval::scalar_list(["inventory"]));
        ctx.verify_var_promise(&promise).unwrap();
        let stored = ctx
            .store()
            .get(&VarRef::qualified(Some("default"), "main", "x"))
            .unwrap();
        assert_eq!(stored.tags, ["source=promise", "inventory"]);
    });
}

#[test]
fn test_meta_promises_write_to_meta_scope() {
    main(|ctx| {
        let mut promise = var("description", "string", "demo bundle");
        promise.promise_type = "meta".to_string();
        ctx.verify_var_promise(&promise).unwrap();
        assert!(ctx.lookup_name("description").is_none());
        assert_eq!(value_of(ctx, "main_meta.description"), s("demo bundle"));
    });
}

fn class(promiser: &str) -> Promise {
    Promise::new("classes", promiser)
}

#[test]
fn test_class_promises() {
    main(|ctx| {
        assert!(ctx.verify_class_promise(&class("always")).unwrap());
        assert!(ctx
            .verify_class_promise(&class("web-server").with_constraint("expression", "always|never"))
            .unwrap());
        assert!(!ctx
            .verify_class_promise(&class("denied").with_constraint("not", "any"))
            .unwrap());
        assert!(ctx
            .verify_class_promise(
                &class("either").with_constraint("or", Rval::scalar_list(["never", "always"]))
            )
            .unwrap());
        assert!(!ctx
            .verify_class_promise(
                &class("both").with_constraint("and", Rval::scalar_list(["never", "always"]))
            )
            .unwrap());
        assert!(ctx
            .verify_class_promise(
                &class("computed").with_constraint("expression", FnCall::new("strcmp", vec![s("a"), s("a")]))
            )
            .unwrap());

        for name in ["always", "computed", "either", "web_server"] {
            assert!(ctx.classes().is_defined(name), "{name}");
        }
        for name in ["denied", "both", "web-server"] {
            assert!(!ctx.classes().is_defined(name), "{name}");
        }
    });
}

#[test]
fn test_class_expression_errors_propagate() {
    main(|ctx| {
        let promise = class("broken").with_constraint("expression", "a&&|");
        assert!(matches!(
            ctx.verify_class_promise(&promise).unwrap_err().kind,
            EvalErrorKind::InvalidClassExpression { .. }
        ));
    });
}

#[test]
fn test_parse_int_suffixes() {
    assert_eq!(parse_int("42"), Some(42));
    assert_eq!(parse_int(" -3 "), Some(-3));
    assert_eq!(parse_int("1g"), Some(1_000_000_000));
    assert_eq!(parse_int("1M"), Some(1_048_576));
    assert_eq!(parse_int("k"), None);
    assert_eq!(parse_int(""), None);
}
