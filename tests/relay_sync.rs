//! End-to-end tests: store changes flow through to request routing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use webhook_relay::dispatch::TryLaterBuilder;
use webhook_relay::store::{ChangeKind, MemoryStore};

mod common;

use common::{blob, echo_builder, get, relay_config, start_relay, wait_until};

#[tokio::test]
async fn test_rename_moves_tenant_to_new_hostname() {
    let store = Arc::new(MemoryStore::new());
    store.put("t1", blob("acme", "s3cr3t"));
    let relay = start_relay(relay_config(), store.clone(), echo_builder()).await;

    let (status, body) = get(relay.addr, "acme.example.com", "/webhook/s3cr3t").await;
    assert_eq!(status, 200);
    assert_eq!(body, "webhook acme.example.com");

    store.update("t1", blob("acme2", "s3cr3t"));
    let table = relay.table.clone();
    assert!(wait_until(|| table.resolve("acme2.example.com").is_some()).await);

    let (status, body) = get(relay.addr, "acme.example.com", "/webhook/s3cr3t").await;
    assert_eq!(status, 404);
    assert_eq!(body, "Host not valid\n");

    let (status, body) = get(relay.addr, "acme2.example.com", "/webhook/s3cr3t").await;
    assert_eq!(status, 200);
    assert_eq!(body, "webhook acme2.example.com");

    assert_eq!(relay.table.hostnames(), vec!["acme2.example.com"]);
    relay.stop().await;
}

#[tokio::test]
async fn test_secret_outcomes() {
    let store = Arc::new(MemoryStore::new());
    store.put("t1", blob("acme", "s3cr3t"));
    let relay = start_relay(relay_config(), store, echo_builder()).await;

    let (status, body) = get(relay.addr, "acme.example.com", "/poll/s3cr3t").await;
    assert_eq!((status, body.as_str()), (200, "poll acme.example.com"));

    let (status, body) = get(relay.addr, "acme.example.com", "/poll/nope").await;
    assert_eq!(status, 404);
    assert!(body.is_empty());

    let (status, body) = get(relay.addr, "acme.example.com", "/reply").await;
    assert_eq!(status, 400);
    assert_eq!(body, "Secret required e.g. https://acme.example.com/reply/secret\n");

    relay.stop().await;
}

#[tokio::test]
async fn test_added_and_removed_tenants() {
    let store = Arc::new(MemoryStore::new());
    let relay = start_relay(relay_config(), store.clone(), echo_builder()).await;

    let (status, _) = get(relay.addr, "late.example.com", "/webhook/k").await;
    assert_eq!(status, 404);

    store.insert("t2", blob("late", "k"));
    let table = relay.table.clone();
    assert!(wait_until(|| table.resolve("late.example.com").is_some()).await);
    let (status, _) = get(relay.addr, "late.example.com", "/webhook/k").await;
    assert_eq!(status, 200);

    store.delete("t2");
    let cache = relay.cache.clone();
    assert!(wait_until(|| cache.is_empty()).await);
    let (status, body) = get(relay.addr, "late.example.com", "/webhook/k").await;
    assert_eq!(status, 404);
    assert_eq!(body, "Host not valid\n");

    relay.stop().await;
}

#[tokio::test]
async fn test_notification_for_missing_row_is_ignored() {
    let store = Arc::new(MemoryStore::new());
    store.put("t1", blob("acme", "s3cr3t"));
    let relay = start_relay(relay_config(), store.clone(), echo_builder()).await;

    let additions = Arc::new(AtomicUsize::new(0));
    let deletions = Arc::new(AtomicUsize::new(0));
    let a = additions.clone();
    relay.cache.on_addition(move |_| {
        a.fetch_add(1, Ordering::SeqCst);
    });
    let d = deletions.clone();
    relay.cache.on_delete(move |_| {
        d.fetch_add(1, Ordering::SeqCst);
    });

    // Each channel is ordered, so once the marker behind the unknown id has
    // been applied, the unknown id has been handled too.
    store.notify(ChangeKind::Added, "ghost");
    store.insert("marker", blob("marker", "m"));
    let table = relay.table.clone();
    assert!(wait_until(|| table.resolve("marker.example.com").is_some()).await);

    store.notify(ChangeKind::Removed, "ghost");
    store.delete("marker");
    assert!(wait_until(|| table.resolve("marker.example.com").is_none()).await);

    assert_eq!(additions.load(Ordering::SeqCst), 1);
    // Observers after the table may still be running for the marker.
    assert!(wait_until(|| deletions.load(Ordering::SeqCst) == 1).await);
    assert_eq!(relay.cache.len(), 1);
    assert!(relay.cache.get("ghost").is_none());
    assert_eq!(relay.table.hostnames(), vec!["acme.example.com"]);

    let (status, body) = get(relay.addr, "acme.example.com", "/webhook/s3cr3t").await;
    assert_eq!(status, 200);
    assert_eq!(body, "webhook acme.example.com");

    relay.stop().await;
}

#[tokio::test]
async fn test_try_later_without_tenant_handler() {
    let store = Arc::new(MemoryStore::new());
    store.put("t1", blob("acme", "s3cr3t"));
    let relay = start_relay(relay_config(), store, Arc::new(TryLaterBuilder)).await;

    let (status, body) = get(relay.addr, "acme.example.com", "/webhook/s3cr3t").await;
    assert_eq!(status, 503);
    assert_eq!(body, "Try again later\n");

    relay.stop().await;
}

#[tokio::test]
async fn test_health_endpoint() {
    let store = Arc::new(MemoryStore::new());
    store.put("t1", blob("acme", "s3cr3t"));
    let relay = start_relay(relay_config(), store, echo_builder()).await;

    let response = common::client()
        .get(format!("http://{}/healthz", relay.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("x-request-id"));

    let report: serde_json::Value = response.json().await.unwrap();
    assert_eq!(report["tenants"], 1);
    assert_eq!(report["hostnames"], 1);

    relay.stop().await;
}
