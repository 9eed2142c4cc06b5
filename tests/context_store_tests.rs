use serde_json::json;

use flowcore::{AgentContext, ContextStore, InMemoryContextStore};

#[tokio::test]
async fn get_or_create_hands_out_shared_state() {
    let store = InMemoryContextStore::new();

    let first = store.get_or_create("acme", "conv-1").await.unwrap();
    first.put("k", json!("v"));

    let second = store.get_or_create("acme", "conv-1").await.unwrap();
    assert_eq!(second.get("k"), Some(json!("v")));
    assert_eq!(second.tenant_id(), "acme");
    assert_eq!(second.conversation_id(), "conv-1");
}

#[tokio::test]
async fn conversations_are_isolated() {
    let store = InMemoryContextStore::new();

    let a = store.get_or_create("acme", "conv-1").await.unwrap();
    a.put("k", json!(1));

    let b = store.get_or_create("acme", "conv-2").await.unwrap();
    assert!(b.get("k").is_none());
}

#[tokio::test]
async fn delete_forgets_a_conversation() {
    let store = InMemoryContextStore::new();

    let ctx = store.get_or_create("acme", "conv-1").await.unwrap();
    ctx.put("k", json!(1));
    ctx.add_message("User: hi");

    store.delete("acme", "conv-1").await.unwrap();

    let fresh = store.get_or_create("acme", "conv-1").await.unwrap();
    assert_eq!(fresh.size(), 0);
    assert!(fresh.conversation_log().is_empty());
}

#[tokio::test]
async fn clear_tenant_is_scoped() {
    let store = InMemoryContextStore::new();

    store
        .get_or_create("acme", "conv-1")
        .await
        .unwrap()
        .put("k", json!(1));
    store
        .get_or_create("acme", "conv-2")
        .await
        .unwrap()
        .put("k", json!(2));
    store
        .get_or_create("globex", "conv-1")
        .await
        .unwrap()
        .put("k", json!(3));

    store.clear_tenant("acme").await.unwrap();

    assert!(store
        .get_or_create("acme", "conv-1")
        .await
        .unwrap()
        .get("k")
        .is_none());
    assert_eq!(
        store
            .get_or_create("globex", "conv-1")
            .await
            .unwrap()
            .get("k"),
        Some(json!(3))
    );
}

#[tokio::test]
async fn save_round_trips_data_and_log() {
    let store = InMemoryContextStore::new();

    let replacement = AgentContext::new("acme", "conv-1");
    replacement.put("k", json!("new"));
    replacement.add_message("User: hi");
    replacement.add_message("Agent: hello");
    store.save("acme", "conv-1", &replacement).await.unwrap();

    let reread = store.get_or_create("acme", "conv-1").await.unwrap();
    assert_eq!(reread.get("k"), Some(json!("new")));
    assert_eq!(
        reread.conversation_log(),
        vec!["User: hi".to_string(), "Agent: hello".to_string()]
    );
}

#[tokio::test]
async fn save_async_keeps_the_context_retrievable() {
    let store = InMemoryContextStore::new();

    let ctx = store.get_or_create("acme", "conv-1").await.unwrap();
    ctx.put("k", json!("v"));
    ctx.add_message("User: hi");
    store.save_async("acme", "conv-1", &ctx);

    let reread = store.get_or_create("acme", "conv-1").await.unwrap();
    assert_eq!(reread.get("k"), Some(json!("v")));
    assert_eq!(reread.conversation_log(), vec!["User: hi".to_string()]);
}
