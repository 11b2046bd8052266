use std::sync::Arc;
use std::time::Duration;

use doc_store::{DocumentStoreExt, InMemoryDocumentStore};
use domain::{InMemoryCatalog, Order, OrderStatus};
use engine::{EngineConfig, EventDispatcher};
use serde_json::{Value, json};
use worker::config::WorkerConfig;

fn intake(id: &str, pedido_id: &str) -> Value {
    json!({
        "id": id,
        "eventType": "criacao_pedido",
        "timestamp": "2026-03-01T12:00:00Z",
        "actorId": "op-7",
        "payload": {
            "type": "criacao_pedido",
            "pedidoId": pedido_id,
            "produtos": [{ "produtoId": "K1", "quantidade": 1 }]
        }
    })
}

async fn seeded_store() -> InMemoryDocumentStore {
    let store = InMemoryDocumentStore::new();
    store
        .put_document(
            "produtos",
            "K1",
            json!({ "tipo": "kit", "modelos": [{ "modeloId": "M1", "quantidade": 2 }] }),
        )
        .await
        .unwrap();
    store
        .put_document("produtos", "M1", json!({ "tipo": "modelo" }))
        .await
        .unwrap();
    store
}

fn dispatcher(store: InMemoryDocumentStore) -> EventDispatcher<InMemoryDocumentStore> {
    EventDispatcher::new(store, Arc::new(InMemoryCatalog::new()), EngineConfig::default())
}

#[tokio::test]
async fn test_poll_once_uses_stored_catalog() {
    let store = seeded_store().await;
    store
        .put_document("eventos_producao", "E1", intake("E1", "PED-1"))
        .await
        .unwrap();
    let dispatcher = dispatcher(store);

    let report = worker::poll_once(&dispatcher, 10).await.unwrap();
    assert_eq!(report.listed, 1);
    assert_eq!(report.applied, 1);

    let order: Order = dispatcher
        .store()
        .get_as("pedidos", "PED-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Aguardando);
    assert_eq!(dispatcher.store().collection_len("grupos_montagem").await, 2);
}

#[tokio::test]
async fn test_poll_once_honours_batch_size() {
    let store = seeded_store().await;
    for n in 0..3 {
        let id = format!("E{n}");
        store
            .put_document("eventos_producao", &id, intake(&id, &format!("PED-{n}")))
            .await
            .unwrap();
    }
    let dispatcher = dispatcher(store);

    assert_eq!(worker::poll_once(&dispatcher, 2).await.unwrap().applied, 2);
    assert_eq!(worker::poll_once(&dispatcher, 2).await.unwrap().applied, 1);
    assert_eq!(worker::poll_once(&dispatcher, 2).await.unwrap().listed, 0);
}

#[tokio::test]
async fn test_failed_events_do_not_stop_the_poll() {
    let store = seeded_store().await;
    store
        .put_document(
            "eventos_producao",
            "E1",
            json!({
                "id": "E1",
                "eventType": "teletransporte",
                "timestamp": "2026-03-01T12:00:00Z",
                "payload": { "type": "teletransporte" }
            }),
        )
        .await
        .unwrap();
    store
        .put_document("eventos_producao", "E2", intake("E2", "PED-2"))
        .await
        .unwrap();
    let dispatcher = dispatcher(store);

    let report = worker::poll_once(&dispatcher, 10).await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.applied, 1);
    assert_eq!(worker::poll_once(&dispatcher, 10).await.unwrap().listed, 0);
}

#[tokio::test]
async fn test_serve_stops_on_shutdown() {
    let store = seeded_store().await;
    store
        .put_document("eventos_producao", "E1", intake("E1", "PED-1"))
        .await
        .unwrap();
    let config = WorkerConfig::default().with_poll_interval(Duration::from_millis(5));

    let polls = worker::serve(
        store.clone(),
        &config,
        tokio::time::sleep(Duration::from_millis(100)),
    )
    .await
    .unwrap();

    assert!(polls >= 1);
    assert!(store.exists("pedidos", "PED-1").await.unwrap());
}
