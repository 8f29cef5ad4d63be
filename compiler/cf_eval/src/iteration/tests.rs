#![expect(clippy::unwrap_used, reason = "tests use unwrap for brevity")]

use std::collections::HashSet;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;

use cf_ir::{DataType, Rval};

use super::*;
use crate::scope::THIS_SCOPE;

fn context_with(lists: &[(&str, Rval)]) -> EvalContext {
    let mut ctx = EvalContext::builder().system_vars(false).build();
    {
        let mut main = ctx.bundle_scope("default", "main");
        for (name, value) in lists {
            main.set(name, value.clone(), DataType::StringList).unwrap();
        }
    }
    ctx
}

fn mapped(ctx: &mut EvalContext, text: &str) -> IteratorMap {
    let ctx = ctx.bundle_scope("default", "main");
    let mut text = text.to_owned();
    let mut map = IteratorMap::new();
    ctx.map_text(&mut text, &mut map).unwrap();
    map
}

/// Every combination as `token=value` strings, in visiting order.
fn visit(ctx: &mut EvalContext, map: &IteratorMap) -> Vec<Vec<String>> {
    let ctx = ctx.bundle_scope("default", "main");
    let mut iter = PromiseIterator::new(&ctx, map).unwrap();
    let mut seen = Vec::new();
    while iter.has_more() {
        let mut scope = Scope::new("default", THIS_SCOPE);
        iter.bind_current(&mut scope);
        seen.push(
            scope
                .sorted()
                .into_iter()
                .map(|(k, v)| format!("{k}={}", v.rval))
                .collect(),
        );
        iter.advance();
    }
    seen
}

#[test]
fn test_first_wheel_varies_fastest() {
    let mut ctx = context_with(&[
        ("hosts", Rval::scalar_list(["a", "b"])),
        ("ports", Rval::scalar_list(["80", "443"])),
    ]);
    let map = mapped(&mut ctx, "$(hosts):$(ports)");
    let order: Vec<String> = visit(&mut ctx, &map)
        .into_iter()
        .map(|combo| combo.join(" "))
        .collect();
    assert_eq!(
        order,
        [
            "hosts=a ports=80",
            "hosts=b ports=80",
            "hosts=a ports=443",
            "hosts=b ports=443",
        ]
    );
}

#[test]
fn test_no_iterators_runs_once() {
    let mut ctx = context_with(&[]);
    let map = IteratorMap::new();
    let iter = {
        let ctx = ctx.bundle_scope("default", "main");
        PromiseIterator::new(&ctx, &map).unwrap()
    };
    assert_eq!(iter.combinations(), 1);
    assert_eq!(visit(&mut ctx, &map).len(), 1);
}

#[test]
fn test_empty_list_gives_zero_iterations() {
    let mut ctx = context_with(&[
        ("hosts", Rval::scalar_list(["a", "b"])),
        ("empty", Rval::List(Vec::new())),
        ("nulls", Rval::scalar_list(["cf_null"])),
    ]);
    for text in ["$(hosts) $(empty)", "$(nulls) $(hosts)"] {
        let map = mapped(&mut ctx, text);
        assert_eq!(visit(&mut ctx, &map), Vec::<Vec<String>>::new(), "{text}");
    }
}

#[test]
fn test_null_items_are_skipped() {
    let mut ctx = context_with(&[("mixed", Rval::scalar_list(["a", "cf_null", "b"]))]);
    let map = mapped(&mut ctx, "$(mixed)");
    assert_eq!(visit(&mut ctx, &map), [["mixed=a"], ["mixed=b"]]);
}

#[test]
fn test_qualified_iterator_binds_mangled_key() {
    let mut ctx = context_with(&[("remote", Rval::scalar_list(["r1"]))]);
    let map = mapped(&mut ctx, "$(main.remote)");
    assert_eq!(map.lists(), ["main#remote"]);
    assert_eq!(visit(&mut ctx, &map), [["main#remote=r1"]]);
}

#[test]
fn test_container_values_are_iterated() {
    let mut ctx = EvalContext::builder().system_vars(false).build();
    {
        let mut main = ctx.bundle_scope("default", "main");
        main.set("conf", Rval::Container(json!({"users": ["u1", "u2"]})), DataType::Container)
            .unwrap();
    }
    let map = mapped(&mut ctx, "$(conf[users])");
    assert_eq!(
        visit(&mut ctx, &map),
        [["conf[users]=u1"], ["conf[users]=u2"]]
    );
}

#[test]
fn test_nested_container_children_are_not_iterated() {
    let mut ctx = EvalContext::builder().system_vars(false).build();
    {
        let mut main = ctx.bundle_scope("default", "main");
        let doc = json!(["a", ["b", "c"], {"k": "v"}]);
        main.set("doc", Rval::Container(doc), DataType::Container)
            .unwrap();
    }
    let map = mapped(&mut ctx, "$(doc)");
    assert_eq!(visit(&mut ctx, &map), [["doc=a"]]);
}

#[test]
fn test_undefined_iterator_is_dropped() {
    let mut ctx = context_with(&[("hosts", Rval::scalar_list(["a"]))]);
    let map = mapped(&mut ctx, "$(hosts)");
    ctx.store_mut()
        .remove(&cf_ir::VarRef::qualified(Some("default"), "main", "hosts"));
    let ctx = ctx.bundle_scope("default", "main");
    let iter = PromiseIterator::new(&ctx, &map).unwrap();
    assert_eq!(iter.tokens().count(), 0);
    assert_eq!(iter.combinations(), 1);
}

proptest! {
    #[test]
    fn prop_odometer_visits_every_combination_once(
        lens in proptest::collection::vec(1usize..4, 1..4),
    ) {
        let lists: Vec<(String, Rval)> = lens
            .iter()
            .enumerate()
            .map(|(i, len)| {
                let items: Vec<String> = (0..*len).map(|j| format!("v{j}")).collect();
                (format!("l{i}"), Rval::scalar_list(items))
            })
            .collect();
        let named: Vec<(&str, Rval)> = lists.iter().map(|(n, v)| (n.as_str(), v.clone())).collect();
        let mut ctx = context_with(&named);
        let text: String = lists.iter().map(|(n, _)| format!("$({n})")).collect();
        let map = mapped(&mut ctx, &text);

        let combos = visit(&mut ctx, &map);
        let expected: usize = lens.iter().product();
        prop_assert_eq!(combos.len(), expected);
        let distinct: HashSet<Vec<String>> = combos.into_iter().collect();
        prop_assert_eq!(distinct.len(), expected);
    }
}
