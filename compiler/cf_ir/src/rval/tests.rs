#![expect(clippy::unwrap_used, reason = "tests unwrap on known-good input")]

use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn test_clone_is_deep() {
    let original = Rval::List(vec![Rval::scalar("a"), Rval::scalar_list(["b", "c"])]);
    let mut copy = original.clone();
    if let Rval::List(items) = &mut copy {
        items.push(Rval::scalar("d"));
    }
    assert_eq!(original.as_list().map(<[Rval]>::len), Some(2));
    assert_ne!(original, copy);
}

#[test]
fn test_display_forms() {
    assert_eq!(Rval::scalar("plain").to_string(), "plain");
    assert_eq!(Rval::scalar_list(["a", "it's"]).to_string(), r"{'a','it\'s'}");
    let call = FnCall::new("join", vec![Rval::scalar(","), Rval::scalar("list")]);
    assert_eq!(Rval::from(call).to_string(), "join(',','list')");
    assert_eq!(Rval::Container(json!({"k": [1, 2]})).to_string(), r#"{"k":[1,2]}"#);
}

#[test]
fn test_has_var_refs() {
    assert!(Rval::scalar("$(x)").has_var_refs());
    assert!(Rval::scalar_list(["a", "@(b)"]).has_var_refs());
    assert!(!Rval::scalar_list(["a", "b"]).has_var_refs());
    assert!(!Rval::Container(json!("$(x)")).has_var_refs());
}

#[test]
fn test_compare_scalars() {
    assert_eq!(Rval::scalar("a").compare(&Rval::scalar("a")), Comparison::Equal);
    assert_eq!(Rval::scalar("a").compare(&Rval::scalar("b")), Comparison::Different);
    assert_eq!(
        Rval::scalar("$(x)").compare(&Rval::scalar("b")),
        Comparison::Inconclusive
    );
}

#[test]
fn test_compare_lists() {
    let ab = Rval::scalar_list(["a", "b"]);
    assert_eq!(ab.compare(&Rval::scalar_list(["a", "b"])), Comparison::Equal);
    assert_eq!(ab.compare(&Rval::scalar_list(["a"])), Comparison::Different);
    assert_eq!(
        ab.compare(&Rval::scalar_list(["a", "$(y)"])),
        Comparison::Inconclusive
    );
}

#[test]
fn test_json_primitive_string() {
    assert_eq!(json_primitive_string(&json!("s")), Some("s".to_string()));
    assert_eq!(json_primitive_string(&json!(3)), Some("3".to_string()));
    assert_eq!(json_primitive_string(&json!(true)), Some("true".to_string()));
    assert_eq!(json_primitive_string(&json!(null)), None);
    assert_eq!(json_primitive_string(&json!([1])), None);
}

#[test]
fn test_json_policy_form() {
    let text = r#"{
        "type": "functionCall",
        "name": "join",
        "arguments": [
            {"type": "string", "value": ","},
            {"type": "list", "value": [{"type": "string", "value": "a"}]},
            {"type": "data", "value": {"k": 1}}
        ]
    }"#;
    let rval: Rval = serde_json::from_str(text).unwrap();
    assert_eq!(
        rval,
        Rval::FnCall(FnCall::new(
            "join",
            vec![
                Rval::scalar(","),
                Rval::scalar_list(["a"]),
                Rval::Container(json!({"k": 1})),
            ]
        ))
    );

    let written = serde_json::to_value(&rval).unwrap();
    assert_eq!(written["arguments"][0], json!({"type": "string", "value": ","}));
}
