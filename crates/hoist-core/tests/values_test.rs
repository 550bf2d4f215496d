use hoist_core::Values;
use serde_json::json;
use tempfile::TempDir;

#[test]
fn merge_is_deep_for_mappings_and_replaces_scalars() {
    let mut base = Values::from_json(json!({
        "image": {"repository": "app", "tag": "1"},
        "replicas": 1,
        "args": ["a", "b"],
    }));
    let overlay = Values::from_json(json!({
        "image": {"tag": "2"},
        "args": ["c"],
    }));

    base.merge(&overlay);

    assert_eq!(
        base.as_json(),
        &json!({
            "image": {"repository": "app", "tag": "2"},
            "replicas": 1,
            "args": ["c"],
        })
    );
}

#[test]
fn set_creates_intermediate_mappings() {
    let mut values = Values::new();
    values.set("redis.auth.existingSecret", "hoist-runtime").unwrap();
    values.set("redis.master.persistence.enabled", false).unwrap();

    assert_eq!(
        values.get("redis.auth.existingSecret"),
        Some(&json!("hoist-runtime"))
    );
    assert_eq!(
        values.get("redis.master.persistence.enabled"),
        Some(&json!(false))
    );
}

#[test]
fn set_overwrites_scalar_parents() {
    let mut values = Values::from_json(json!({"hoist": "legacy"}));
    values.set("hoist.instanceName", "web").unwrap();
    assert_eq!(values.as_json(), &json!({"hoist": {"instanceName": "web"}}));
}

#[test]
fn set_rejects_empty_segments() {
    let mut values = Values::new();
    assert!(values.set("a..b", 1).is_err());
    assert!(values.set("", 1).is_err());
}

#[test]
fn remove_and_without() {
    let values = Values::from_json(json!({
        "redis": {"password": "s3cret", "architecture": "standalone"},
        "hoist": {"apiKeySecret": "k"},
    }));

    let stripped = values.without(&["redis.password", "hoist.apiKeySecret", "missing.path"]);

    assert_eq!(
        stripped.as_json(),
        &json!({"redis": {"architecture": "standalone"}})
    );
    // original untouched
    assert_eq!(values.get("redis.password"), Some(&json!("s3cret")));
}

#[test]
fn remove_prunes_emptied_parents() {
    let mut values = Values::from_json(json!({"a": {"b": {"c": 1}}, "keep": {}}));

    assert_eq!(values.remove("a.b.c"), Some(json!(1)));
    assert_eq!(values.as_json(), &json!({"keep": {}}));
    assert_eq!(values.remove("keep.missing"), None);
    assert_eq!(values.as_json(), &json!({"keep": {}}));
}

#[test]
fn set_expressions_are_typed() {
    let values =
        Values::from_set_expressions(&["replicas=3", "debug=true", "image.tag=v1.2", "a=b=c"])
            .unwrap();

    assert_eq!(values.get("replicas"), Some(&json!(3)));
    assert_eq!(values.get("debug"), Some(&json!(true)));
    assert_eq!(values.get("image.tag"), Some(&json!("v1.2")));
    assert_eq!(values.get("a"), Some(&json!("b=c")));
}

#[test]
fn set_expression_without_equals_is_an_error() {
    let err = Values::from_set_expressions(&["replicas"]).unwrap_err();
    assert!(err.to_string().contains("expected key=value"));
}

#[test]
fn yaml_file_is_loaded() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("values.yaml");
    std::fs::write(&path, "resources:\n  limits:\n    cpu: 500m\nreplicas: 2\n").unwrap();

    let values = Values::from_yaml_file(&path).unwrap();
    assert_eq!(values.get("resources.limits.cpu"), Some(&json!("500m")));
    assert_eq!(values.get("replicas"), Some(&json!(2)));
}

#[test]
fn empty_yaml_file_is_an_empty_tree() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("empty.yaml");
    std::fs::write(&path, "").unwrap();

    assert!(Values::from_yaml_file(&path).unwrap().is_empty());
}

#[test]
fn non_mapping_yaml_file_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("list.yaml");
    std::fs::write(&path, "- a\n- b\n").unwrap();

    assert!(Values::from_yaml_file(&path).is_err());
}
