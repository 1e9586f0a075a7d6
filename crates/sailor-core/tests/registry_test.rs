#![allow(clippy::unwrap_used)]
// Registry caching, schemas and the application facade.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::{Method, MockTransport, quiesce};
use sailor_core::{
    Collection, CoreError, FieldSpec, FieldValue, Filter, ItemSchema, Registry, Sailor,
    computed_field,
};

// ── Caching ─────────────────────────────────────────────────────────

#[tokio::test]
async fn same_filter_returns_same_collection() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/task", json!([]));
    let registry = Registry::new(mock.clone()).unwrap();

    let a = registry
        .get("task", None, None, &Filter::new().with("status", "open"))
        .unwrap();
    let b = registry
        .get("task", None, None, &Filter::new().with("status", json!(["open"])))
        .unwrap();
    assert!(a.ptr_eq(&b));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn refined_filter_is_cached_through_find() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/task", json!([]));
    let registry = Registry::new(mock.clone()).unwrap();
    let all = registry.get("task", None, None, &Filter::new()).unwrap();

    let mine = all.find(&Filter::new().with("owner", 1)).unwrap();
    let again = all.find(&Filter::new().with("owner", 1)).unwrap();
    let direct = registry
        .get("task", None, None, &Filter::new().with("owner", 1))
        .unwrap();
    assert!(mine.ptr_eq(&again));
    assert!(mine.ptr_eq(&direct));

    // Narrowing a child merges with its own filter.
    let open = mine.find(&Filter::new().with("status", "open")).unwrap();
    assert_eq!(open.filter().signature(), r#"{"owner":1,"status":"open"}"#);
    let same = all
        .find(&Filter::new().with("status", "open").with("owner", 1))
        .unwrap();
    assert!(open.ptr_eq(&same));
}

#[tokio::test]
async fn new_item_schema_triggers_refresh() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/task", json!([{ "id": 1 }]));
    let registry = Registry::new(mock.clone()).unwrap();
    let tasks = registry.get("task", None, None, &Filter::new()).unwrap();
    tasks.ready().await;
    assert_eq!(mock.count(Method::Get, "/task"), 1);

    // Same (absent) schema: cache hit, no refresh.
    registry.get("task", None, None, &Filter::new()).unwrap();
    quiesce().await;
    assert_eq!(mock.count(Method::Get, "/task"), 1);

    let schema = Arc::new(ItemSchema::new().field("flag", FieldSpec::plain(true)));
    let again = registry
        .get("task", Some(Arc::clone(&schema)), None, &Filter::new())
        .unwrap();
    quiesce().await;
    assert!(again.ptr_eq(&tasks));
    assert_eq!(mock.count(Method::Get, "/task"), 2);
    assert_eq!(tasks.first().unwrap().get_json("flag"), Some(json!(true)));

    // Re-supplying the identical schema does not refresh again.
    registry
        .get("task", Some(schema), None, &Filter::new())
        .unwrap();
    quiesce().await;
    assert_eq!(mock.count(Method::Get, "/task"), 2);
}

#[tokio::test]
async fn invalid_schema_is_rejected_at_registration() {
    let mock = MockTransport::new();
    let registry = Registry::new(mock.clone()).unwrap();
    let schema = ItemSchema::new().field("owner", FieldSpec::connection(" "));

    let err = registry
        .get("task", Some(Arc::new(schema)), None, &Filter::new())
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidSchema { .. }), "got {err:?}");
    assert!(registry.is_empty());
    assert!(mock.requests().is_empty());
}

#[test]
fn construction_outside_a_runtime_fails() {
    let err = Registry::new(MockTransport::new()).unwrap_err();
    assert!(matches!(err, CoreError::NoRuntime), "got {err:?}");
    assert!(matches!(Sailor::new(MockTransport::new()), Err(CoreError::NoRuntime)));
}

#[tokio::test]
async fn lookup_of_unregistered_name_fails() {
    let registry = Registry::new(MockTransport::new()).unwrap();
    let err = registry.lookup("ghost").unwrap_err();
    assert_eq!(err.to_string(), "The specified model does not exist: ghost");
}

// ── Facade ──────────────────────────────────────────────────────────

#[tokio::test]
async fn bind_model_uses_pluralized_default_property() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/task", json!([]));
    let sailor = Sailor::new(mock.clone()).unwrap();
    let tasks = sailor.register_model("task", None, None).unwrap();

    let mut scope: HashMap<String, Collection> = HashMap::new();
    let bound = sailor.bind_model("task", &mut scope, None, None).unwrap();
    assert!(bound.ptr_eq(&tasks));
    assert!(scope["tasks"].ptr_eq(&tasks));

    let open = sailor
        .bind_model(
            "task",
            &mut scope,
            Some("openTasks"),
            Some(&Filter::new().with("status", "open")),
        )
        .unwrap();
    assert!(!open.ptr_eq(&tasks));
    assert!(scope["openTasks"].ptr_eq(&open));

    // A filter that adds nothing binds the collection itself.
    let unchanged = sailor
        .bind_model("task", &mut scope, Some("same"), Some(&Filter::new()))
        .unwrap();
    assert!(unchanged.ptr_eq(&tasks));
}

#[tokio::test]
async fn bind_model_of_unknown_name_is_lookup_error() {
    let sailor = Sailor::new(MockTransport::new()).unwrap();
    let mut scope: HashMap<String, Collection> = HashMap::new();
    let err = sailor.bind_model("ghost", &mut scope, None, None).unwrap_err();
    assert!(matches!(err, CoreError::UnknownModel { ref name } if name == "ghost"));
    assert!(scope.is_empty());
}

#[tokio::test]
async fn create_goes_through_registered_model() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/task", json!([]));
    mock.reply(Method::Put, "/task/create/", json!({ "id": 21, "title": "hi" }));
    let sailor = Sailor::new(mock.clone()).unwrap();
    let tasks = sailor.register_model("task", None, None).unwrap();
    tasks.ready().await;

    let entity = sailor.create("task", json!({ "title": "hi" })).await.unwrap();
    assert_eq!(entity.get_json("id"), Some(json!(21)));
    assert_eq!(sailor.model("task").unwrap().len(), 1);
}

#[tokio::test]
async fn computed_field_helper_carries_props() {
    let mut props = serde_json::Map::new();
    props.insert("label".into(), json!("Title length"));
    let spec = computed_field(
        |ctx| async move {
            let len = ctx
                .entity
                .get("title")
                .and_then(|t| t.as_str().map(str::len))
                .unwrap_or(0);
            Ok(Some(FieldValue::from(i64::try_from(len).unwrap_or(i64::MAX))))
        },
        Some(props),
    );
    let FieldSpec::Computed(field) = &spec else {
        panic!("expected computed field");
    };
    assert_eq!(field.props()["label"], "Title length");

    let mock = MockTransport::new();
    mock.reply(Method::Get, "/task", json!([{ "id": 1, "title": "four" }]));
    let sailor = Sailor::new(mock.clone()).unwrap();
    let tasks = sailor
        .register_model("task", Some(ItemSchema::new().field("length", spec)), None)
        .unwrap();
    tasks.ready().await;
    quiesce().await;
    assert_eq!(tasks.first().unwrap().get_json("length"), Some(json!(4)));
}

#[tokio::test]
async fn shutdown_stops_routing() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/task", json!([]));
    let sailor = Sailor::new(mock.clone()).unwrap();
    sailor.register_model("task", None, None).unwrap();
    assert_eq!(sailor.registry().router().resources(), ["task"]);

    sailor.shutdown();
    assert!(sailor.registry().router().is_shutdown());
}
