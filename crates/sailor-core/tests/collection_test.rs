#![allow(clippy::unwrap_used)]
// Collection loading, searching, events and server-pushed changes.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pretty_assertions::assert_eq;
use serde_json::json;

use common::{Method, MockTransport, empty, quiesce};
use sailor_core::{
    CollectionEvent, CoreError, EntityId, EventKind, Filter, Registry, ResourceMessage, Verb,
};

fn counter() -> (Arc<AtomicUsize>, impl Fn(&CollectionEvent) + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    (count, move |_: &CollectionEvent| {
        c.fetch_add(1, Ordering::SeqCst);
    })
}

// ── Loading ─────────────────────────────────────────────────────────

#[tokio::test]
async fn loaded_reports_failed_load_until_a_refresh_succeeds() {
    let mock = MockTransport::new();
    let registry = Registry::new(mock.clone()).unwrap();
    let tasks = registry.get("task", None, None, &Filter::new()).unwrap();

    let err = tasks.loaded().await.unwrap_err();
    assert!(matches!(err, CoreError::Rejected { .. }), "got {err:?}");
    assert!(!tasks.is_ready());
    assert_eq!(mock.count(Method::Get, "/task"), 1);

    mock.reply(Method::Get, "/task", json!([{ "id": 1 }]));
    tasks.refresh().await.unwrap();
    assert!(tasks.is_ready());
    assert_eq!(tasks.loaded().await.unwrap().len(), 1);
    assert_eq!(mock.count(Method::Get, "/task"), 2);
}

#[tokio::test]
async fn task_scenario_load_then_update_event() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/task", json!([{ "id": 1, "title": "A" }]));
    let registry = Registry::new(mock.clone()).unwrap();

    let tasks = registry.get("task", None, None, &Filter::new()).unwrap();
    let loaded = tasks.ready().await;
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].get_json("title"), Some(json!("A")));

    let (updated, handler) = counter();
    tasks.on(EventKind::Updated, handler);

    let delivery = registry.router().dispatch(
        ResourceMessage::new("task", Verb::Updated)
            .with_id(1)
            .with_data(json!({ "title": "B" })),
    );
    assert_eq!(delivery.applied(), 1);
    assert_eq!(tasks.first().unwrap().get_json("title"), Some(json!("B")));
    assert_eq!(updated.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn refresh_replaces_sequence_and_remembers_ready() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/task", json!([{ "id": 1 }, { "id": 2 }, { "id": 3 }]));
    let registry = Registry::new(mock.clone()).unwrap();
    let tasks = registry.get("task", None, None, &Filter::new()).unwrap();

    let snapshot = tasks.refresh().await.unwrap();
    assert_eq!(snapshot.len(), 3);

    let seen = Arc::new(AtomicUsize::new(0));
    let s = Arc::clone(&seen);
    tasks.on(EventKind::Ready, move |event| {
        if let CollectionEvent::Ready(items) = event {
            s.store(items.len(), Ordering::SeqCst);
        }
    });
    // Replayed synchronously from memory.
    assert_eq!(seen.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn single_object_response_becomes_one_record() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/profile", json!({ "id": 9, "name": "me" }));
    let registry = Registry::new(mock.clone()).unwrap();
    let profile = registry.get("profile", None, None, &Filter::new()).unwrap();

    let snapshot = profile.refresh().await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(profile.first().unwrap().id(), Some(EntityId::Int(9)));
}

#[tokio::test]
async fn filtered_collection_sends_where_query() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/task", json!([]));
    let registry = Registry::new(mock.clone()).unwrap();

    let open = registry
        .get("task", None, None, &Filter::new().with("status", "open"))
        .unwrap();
    open.ready().await;

    let requests = mock.requests();
    assert_eq!(requests[0].path, "/task");
    assert_eq!(requests[0].payload, json!({ "status": "open" }));
}

#[tokio::test]
async fn collection_schema_properties_are_exposed() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/task", json!([]));
    let registry = Registry::new(mock.clone()).unwrap();
    let schema = sailor_core::CollectionSchema::new().property("pageSize", 25);

    let tasks = registry
        .get("task", None, Some(Arc::new(schema)), &Filter::new())
        .unwrap();
    assert_eq!(tasks.property("pageSize"), Some(json!(25)));
    assert_eq!(tasks.property("missing"), None);
}

// ── Searching ───────────────────────────────────────────────────────

#[tokio::test]
async fn search_is_local_and_returns_matching_subset() {
    let mock = MockTransport::new();
    mock.reply(
        Method::Get,
        "/task",
        json!([
            { "id": 1, "status": "open" },
            { "id": 2, "status": "closed" },
            { "id": 3, "status": "open" }
        ]),
    );
    let registry = Registry::new(mock.clone()).unwrap();
    let tasks = registry.get("task", None, None, &Filter::new()).unwrap();
    tasks.ready().await;
    let before = mock.requests().len();

    let open = tasks.search(&Filter::new().with("status", "open"));
    let ids: Vec<_> = open.iter().map(|e| e.id().unwrap()).collect();
    assert_eq!(ids, [EntityId::Int(1), EntityId::Int(3)]);
    assert!(open.iter().all(|e| e.get_json("status") == Some(json!("open"))));

    let either = tasks.search(&Filter::new().any("id", [2, 3]));
    assert_eq!(either.len(), 2);

    // No extra filter: the whole sequence.
    assert_eq!(tasks.search(&Filter::new()).len(), 3);
    assert_eq!(mock.requests().len(), before);
}

#[tokio::test]
async fn async_search_waits_for_first_load() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/task", json!([{ "id": 1 }, { "id": 2 }]));
    let registry = Registry::new(mock.clone()).unwrap();
    let tasks = registry.get("task", None, None, &Filter::new()).unwrap();

    assert!(!tasks.is_ready());
    let found = tasks.async_search(&Filter::new().with("id", 2)).await;
    assert_eq!(found.len(), 1);
    assert!(tasks.is_ready());
}

#[tokio::test]
async fn find_one_returns_first_of_narrowed_collection() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/task", json!([]));
    mock.reply_to_query(
        Method::Get,
        "/task",
        &json!({ "owner": 4 }),
        json!([{ "id": 11, "owner": 4 }, { "id": 12, "owner": 4 }]),
    );
    mock.reply_to_query(Method::Get, "/task", &json!({ "owner": 5 }), json!([]));
    let registry = Registry::new(mock.clone()).unwrap();
    let tasks = registry.get("task", None, None, &Filter::new()).unwrap();

    let first = tasks.find_one(&Filter::new().with("owner", 4)).await.unwrap();
    assert_eq!(first.unwrap().id(), Some(EntityId::Int(11)));
    let none = tasks.find_one(&Filter::new().with("owner", 5)).await.unwrap();
    assert!(none.is_none());
}

// ── Server-pushed changes ───────────────────────────────────────────

#[tokio::test]
async fn created_in_unfiltered_collection_appends_and_emits() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/task", json!([]));
    let registry = Registry::new(mock.clone()).unwrap();
    let tasks = registry.get("task", None, None, &Filter::new()).unwrap();
    tasks.ready().await;

    let (created, on_created) = counter();
    let (changed, on_changed) = counter();
    tasks.on(EventKind::Created, on_created);
    tasks.on(EventKind::Changed, on_changed);

    let delivery = registry.router().dispatch(
        ResourceMessage::new("task", Verb::Created).with_data(json!({ "id": 5, "title": "new" })),
    );
    assert_eq!(delivery.applied(), 1);
    assert_eq!(tasks.len(), 1);
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(changed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn created_in_filtered_collection_checks_match_remotely() {
    let mock = MockTransport::new();
    let open_filter = json!({ "status": "open" });
    // First reply serves the initial load, the rest the match checks.
    mock.reply_to_query(Method::Get, "/task", &open_filter, json!([]));
    mock.reply_to_query(
        Method::Get,
        "/task",
        &open_filter,
        json!([{ "id": 7, "status": "open" }]),
    );
    let registry = Registry::new(mock.clone()).unwrap();
    let open = registry
        .get("task", None, None, &Filter::new().with("status", "open"))
        .unwrap();
    open.ready().await;

    let (created, on_created) = counter();
    open.on(EventKind::Created, on_created);

    let delivery = registry.router().dispatch(
        ResourceMessage::new("task", Verb::Created)
            .with_data(json!({ "id": 7, "status": "open" })),
    );
    assert_eq!(delivery.checking(), 1);
    delivery.settle().await;
    assert_eq!(open.len(), 1);
    assert_eq!(created.load(Ordering::SeqCst), 1);

    let delivery = registry.router().dispatch(
        ResourceMessage::new("task", Verb::Created)
            .with_data(json!({ "id": 8, "status": "closed" })),
    );
    delivery.settle().await;
    assert_eq!(open.len(), 1);
    assert_eq!(created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn destroyed_removes_record_and_emits_removed() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/task", json!([{ "id": 1 }, { "id": 2 }]));
    let registry = Registry::new(mock.clone()).unwrap();
    let tasks = registry.get("task", None, None, &Filter::new()).unwrap();
    tasks.ready().await;

    let removed_id = Arc::new(std::sync::Mutex::new(None));
    let r = Arc::clone(&removed_id);
    tasks.on(EventKind::Removed, move |event| {
        *r.lock().unwrap() = event.entity().and_then(sailor_core::Entity::id);
    });

    let delivery =
        registry.router().dispatch(ResourceMessage::new("task", Verb::Destroyed).with_id(2));
    assert_eq!(delivery.applied(), 1);
    assert_eq!(tasks.len(), 1);
    assert_eq!(*removed_id.lock().unwrap(), Some(EntityId::Int(2)));
}

#[tokio::test]
async fn unknown_ids_and_verbs_are_ignored() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/task", json!([{ "id": 1, "title": "A" }]));
    let registry = Registry::new(mock.clone()).unwrap();
    let tasks = registry.get("task", None, None, &Filter::new()).unwrap();
    tasks.ready().await;

    let (changed, on_changed) = counter();
    tasks.on(EventKind::Changed, on_changed);

    let router = registry.router();
    assert!(router
        .dispatch(ResourceMessage::new("task", Verb::Updated).with_id(99).with_data(empty()))
        .is_empty());
    assert!(router
        .dispatch(ResourceMessage::new("task", Verb::Destroyed).with_id(99))
        .is_empty());
    assert!(router
        .dispatch(ResourceMessage::new("task", Verb::Unknown("addedTo".into())).with_id(1))
        .is_empty());

    assert_eq!(tasks.len(), 1);
    assert_eq!(changed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn every_collection_of_a_resource_receives_messages() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/task", json!([{ "id": 1, "owner": 4, "title": "A" }]));
    let registry = Registry::new(mock.clone()).unwrap();
    let all = registry.get("task", None, None, &Filter::new()).unwrap();
    let mine = all.find(&Filter::new().with("owner", 4)).unwrap();
    all.ready().await;
    mine.ready().await;

    let delivery = registry.router().dispatch(
        ResourceMessage::new("task", Verb::Updated)
            .with_id(1)
            .with_data(json!({ "title": "B" })),
    );
    assert_eq!(delivery.applied(), 2);
    assert_eq!(mine.first().unwrap().get_json("title"), Some(json!("B")));
}

#[tokio::test]
async fn transport_events_are_routed_automatically() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/task", json!([]));
    let registry = Registry::new(mock.clone()).unwrap();
    let tasks = registry.get("task", None, None, &Filter::new()).unwrap();
    tasks.ready().await;

    let mut events = tasks.subscribe_events();
    mock.publish(ResourceMessage::new("task", Verb::Created).with_data(json!({ "id": 3 })));

    let event = events.recv().await.unwrap();
    assert_eq!(event.kind(), EventKind::Created);
    assert_eq!(tasks.len(), 1);
}

#[tokio::test]
async fn stream_observes_changes() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/task", json!([]));
    let registry = Registry::new(mock.clone()).unwrap();
    let tasks = registry.get("task", None, None, &Filter::new()).unwrap();
    tasks.ready().await;

    let mut stream = tasks.stream();
    assert!(stream.current().is_empty());

    registry
        .router()
        .dispatch(ResourceMessage::new("task", Verb::Created).with_data(json!({ "id": 1 })));
    let snapshot = stream.changed().await.unwrap();
    assert_eq!(snapshot.len(), 1);
}

// ── Persistence ─────────────────────────────────────────────────────

#[tokio::test]
async fn insert_appends_and_creates_remotely() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/task", json!([]));
    mock.reply(Method::Put, "/task/create/", json!({ "id": 9, "title": "X" }));
    let registry = Registry::new(mock.clone()).unwrap();
    let tasks = registry.get("task", None, None, &Filter::new()).unwrap();
    tasks.ready().await;

    let entity = tasks.insert(json!({ "title": "X" })).await.unwrap();
    assert_eq!(entity.id(), Some(EntityId::Int(9)));
    assert_eq!(tasks.len(), 1);
    assert!(tasks.first().unwrap().ptr_eq(&entity));

    let create = mock
        .requests()
        .into_iter()
        .find(|r| r.method == Method::Put)
        .unwrap();
    assert_eq!(create.payload, json!({ "title": "X" }));
}

#[tokio::test]
async fn save_persists_every_record() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/task", json!([{ "id": 1 }, { "id": 2 }]));
    mock.reply(Method::Post, "/task/update/1", json!({ "id": 1 }));
    mock.reply(Method::Post, "/task/update/2", json!({ "id": 2 }));
    let registry = Registry::new(mock.clone()).unwrap();
    let tasks = registry.get("task", None, None, &Filter::new()).unwrap();
    tasks.ready().await;

    for handle in tasks.save() {
        handle.await.unwrap();
    }
    assert_eq!(mock.count(Method::Post, "/task/update/1"), 1);
    assert_eq!(mock.count(Method::Post, "/task/update/2"), 1);
}

#[tokio::test]
async fn refresh_items_reads_each_record() {
    let mock = MockTransport::new();
    mock.reply(Method::Get, "/task", json!([{ "id": 1, "title": "old" }]));
    mock.reply(Method::Get, "/task/1", json!({ "id": 1, "title": "fresh" }));
    let registry = Registry::new(mock.clone()).unwrap();
    let tasks = registry.get("task", None, None, &Filter::new()).unwrap();
    tasks.ready().await;

    tasks.refresh_items().await.unwrap();
    assert_eq!(tasks.first().unwrap().get_json("title"), Some(json!("fresh")));
    quiesce().await;
    assert_eq!(mock.count(Method::Get, "/task/1"), 1);
}
