//! Dispatcher guarantees: receipts, failure handling, retries and polling.

use std::sync::Arc;
use std::time::Duration;

use doc_store::{DocumentStore, DocumentStoreExt, InMemoryDocumentStore, StoreError};
use domain::{
    AssemblyGroup, DomainError, GroupStatus, InMemoryCatalog, ProductDefinition, ProductType,
};
use engine::event::{AssemblyConcluded, IntakeItem, OrderIntake, ProductionStarted};
use engine::{
    DispatchStatus, EngineConfig, EngineError, EventDispatcher, EventPayload, ProcessedReceipt,
    ProductionEvent, ReceiptStatus,
};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use serde_json::json;

const PIECE_GROUP: &str = "PED-1-0-0.0.0";

fn catalog() -> InMemoryCatalog {
    InMemoryCatalog::new()
        .with(ProductDefinition::new("K1", ProductType::Kit).with_component("M1", 2))
        .with(ProductDefinition::new("M1", ProductType::Modelo).with_component("P1", 3))
        .with(ProductDefinition::new("P1", ProductType::Peca))
        // K2 -> M2 -> K2
        .with(ProductDefinition::new("K2", ProductType::Kit).with_component("M2", 1))
        .with(ProductDefinition::new("M2", ProductType::Modelo).with_component("K2", 1))
}

fn dispatcher_with(config: EngineConfig) -> EventDispatcher<InMemoryDocumentStore> {
    EventDispatcher::new(InMemoryDocumentStore::new(), Arc::new(catalog()), config)
}

fn dispatcher() -> EventDispatcher<InMemoryDocumentStore> {
    dispatcher_with(EngineConfig::default())
}

fn intake(id: &str, pedido_id: &str, produto_id: &str) -> ProductionEvent {
    ProductionEvent::new(
        id,
        &EventPayload::CriacaoPedido(OrderIntake {
            pedido_id: pedido_id.into(),
            numero: None,
            produtos: vec![IntakeItem {
                produto_id: produto_id.into(),
                quantidade: Decimal::ONE,
            }],
        }),
    )
    .unwrap()
}

fn start(id: &str, grupo_id: &str) -> ProductionEvent {
    ProductionEvent::new(
        id,
        &EventPayload::InicioProducao(ProductionStarted {
            grupo_id: grupo_id.into(),
            observacao: None,
        }),
    )
    .unwrap()
}

async fn receipt(store: &InMemoryDocumentStore, event_id: &str) -> Option<ProcessedReceipt> {
    store.get_as("eventos_processados", event_id).await.unwrap()
}

async fn piece_status(store: &InMemoryDocumentStore) -> GroupStatus {
    let group: AssemblyGroup = store
        .get_as("grupos_montagem", PIECE_GROUP)
        .await
        .unwrap()
        .unwrap();
    group.status
}

mod receipts {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn applied_event_gets_one_receipt() {
        let dispatcher = dispatcher();
        let outcome = dispatcher.submit(intake("E1", "PED-1", "K1")).await.unwrap();
        assert_eq!(outcome.attempts, 1);

        let receipt = receipt(dispatcher.store(), "E1").await.unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Applied);
        assert_eq!(receipt.event_type, "criacao_pedido");
        assert!(receipt.error_kind.is_none());
    }

    #[tokio::test]
    async fn resubmitting_a_recorded_id_is_a_duplicate() {
        let dispatcher = dispatcher();
        dispatcher.submit(intake("E1", "PED-1", "K1")).await.unwrap();
        let commits = dispatcher.store().commit_count().await;

        let again = dispatcher.submit(intake("E1", "PED-1", "K1")).await.unwrap();
        assert_eq!(again.status, DispatchStatus::Duplicate);
        assert_eq!(dispatcher.store().commit_count().await, commits);
    }

    #[tokio::test]
    async fn event_without_id_gets_one_assigned() {
        let dispatcher = dispatcher();
        let outcome = dispatcher.submit(intake("", "PED-1", "K1")).await.unwrap();

        assert!(!outcome.event_id.trim().is_empty());
        assert!(receipt(dispatcher.store(), &outcome.event_id).await.is_some());
    }

    #[tokio::test]
    async fn noop_gets_a_noop_receipt() {
        let dispatcher = dispatcher();
        dispatcher.submit(intake("E1", "PED-1", "K1")).await.unwrap();
        dispatcher.submit(start("E2", PIECE_GROUP)).await.unwrap();

        let outcome = dispatcher.submit(start("E3", PIECE_GROUP)).await.unwrap();
        assert_eq!(outcome.status, DispatchStatus::Noop);
        assert_eq!(
            receipt(dispatcher.store(), "E3").await.unwrap().status,
            ReceiptStatus::Noop
        );
    }
}

mod failures {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn cyclic_bom_aborts_intake() {
        let dispatcher = dispatcher();
        let err = dispatcher.submit(intake("E1", "PED-9", "K2")).await.unwrap_err();
        assert!(matches!(err, EngineError::Domain(DomainError::Integrity(_))));

        let store = dispatcher.store();
        assert_eq!(store.collection_len("pedidos").await, 0);
        assert_eq!(store.collection_len("grupos_montagem").await, 0);
        assert_eq!(store.collection_len("lancamentos_produtos").await, 0);

        let receipt = receipt(store, "E1").await.unwrap();
        assert_eq!(receipt.status, ReceiptStatus::Failed);
        assert_eq!(receipt.error_kind.as_deref(), Some("integrity"));
    }

    #[tokio::test]
    async fn payload_tag_must_match_declared_type() {
        let dispatcher = dispatcher();
        dispatcher.submit(intake("E1", "PED-1", "K1")).await.unwrap();

        let event = ProductionEvent::raw(
            "E2",
            "conclusao_montagem_kit",
            json!({ "type": "inicio_producao", "grupoId": PIECE_GROUP }),
        );
        let err = dispatcher.submit(event).await.unwrap_err();
        assert!(matches!(err, EngineError::SchemaMismatch { .. }));

        let store = dispatcher.store();
        assert_eq!(piece_status(store).await, GroupStatus::Aguardando);
        assert_eq!(
            receipt(store, "E2").await.unwrap().error_kind.as_deref(),
            Some("schema_mismatch")
        );
    }

    #[tokio::test]
    async fn unknown_event_type_is_recorded_as_failed() {
        let dispatcher = dispatcher();
        let event = ProductionEvent::raw("E1", "teletransporte", json!({ "type": "teletransporte" }));

        let err = dispatcher.submit(event).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownEventType(ref t) if t == "teletransporte"));
        assert!(err.is_fatal());

        let store = dispatcher.store();
        assert_eq!(receipt(store, "E1").await.unwrap().status, ReceiptStatus::Failed);
        // the event document and its receipt
        assert_eq!(store.document_count().await, 2);
    }

    #[tokio::test]
    async fn missing_group_is_a_reference_error() {
        let dispatcher = dispatcher();
        let event = ProductionEvent::new(
            "E1",
            &EventPayload::ConclusaoMontagemKit(AssemblyConcluded {
                grupo_id: "G404".into(),
                tempo_montagem_minutos: None,
                locais: Vec::new(),
            }),
        )
        .unwrap();

        let err = dispatcher.submit(event).await.unwrap_err();
        assert_eq!(err.kind(), "reference_not_found");
        assert_eq!(dispatcher.store().collection_len("lancamentos_produtos").await, 0);
        assert_eq!(
            receipt(dispatcher.store(), "E1").await.unwrap().status,
            ReceiptStatus::Failed
        );
    }

    fn blank_group_start() -> ProductionEvent {
        ProductionEvent::raw(
            "E1",
            "inicio_producao",
            json!({ "type": "inicio_producao", "grupoId": "  " }),
        )
    }

    #[tokio::test]
    async fn validation_errors_are_deferred() {
        let dispatcher =
            dispatcher_with(EngineConfig::default().with_retry_backoff(Duration::ZERO));

        let err = dispatcher.submit(blank_group_start()).await.unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(!err.is_fatal());

        let deferred = receipt(dispatcher.store(), "E1").await.unwrap();
        assert_eq!(deferred.status, ReceiptStatus::Deferred);
        assert_eq!(deferred.failures, 1);
        assert_eq!(deferred.error_kind.as_deref(), Some("validation"));

        let pending = dispatcher.pending_events(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "E1");
    }

    #[tokio::test]
    async fn deferred_events_wait_for_their_backoff() {
        let dispatcher =
            dispatcher_with(EngineConfig::default().with_retry_backoff(Duration::from_secs(60)));
        let _ = dispatcher.submit(blank_group_start()).await;

        assert!(dispatcher.pending_events(10).await.unwrap().is_empty());
        let report = dispatcher.dispatch_pending(10).await.unwrap();
        assert_eq!(report.listed, 0);
        assert_eq!(receipt(dispatcher.store(), "E1").await.unwrap().failures, 1);
    }

    #[tokio::test]
    async fn repeated_failures_settle_as_failed() {
        let dispatcher = dispatcher_with(
            EngineConfig::default()
                .with_retry_backoff(Duration::ZERO)
                .with_max_deferrals(3),
        );
        let _ = dispatcher.submit(blank_group_start()).await;

        for _ in 0..2 {
            let report = dispatcher.dispatch_pending(10).await.unwrap();
            assert_eq!(report.listed, 1);
            assert_eq!(report.failed, 1);
        }

        let settled = receipt(dispatcher.store(), "E1").await.unwrap();
        assert_eq!(settled.status, ReceiptStatus::Failed);
        assert_eq!(settled.failures, 3);
        assert!(dispatcher.pending_events(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn wrong_group_type_is_rejected() {
        let dispatcher = dispatcher();
        dispatcher.submit(intake("E1", "PED-1", "K1")).await.unwrap();

        let err = dispatcher.submit(start("E2", "PED-1-0-0")).await.unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn illegal_transition_changes_nothing() {
        let dispatcher = dispatcher();
        dispatcher.submit(intake("E1", "PED-1", "K1")).await.unwrap();

        let event = ProductionEvent::new(
            "E2",
            &EventPayload::ConclusaoMontagemPeca(AssemblyConcluded {
                grupo_id: PIECE_GROUP.into(),
                tempo_montagem_minutos: None,
                locais: Vec::new(),
            }),
        )
        .unwrap();

        let err = dispatcher.submit(event).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Domain(DomainError::InvalidTransition { .. })
        ));
        let store = dispatcher.store();
        assert_eq!(piece_status(store).await, GroupStatus::Aguardando);
        assert_eq!(store.collection_len("lancamentos_produtos").await, 0);
    }
}

mod concurrency {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn lost_races_are_retried() {
        let dispatcher = dispatcher();
        dispatcher.submit(intake("E1", "PED-1", "K1")).await.unwrap();

        dispatcher.store().inject_conflicts(2).await;
        let outcome = dispatcher.dispatch(&start("E2", PIECE_GROUP)).await.unwrap();

        assert_eq!(outcome.status, DispatchStatus::Applied);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(receipt(dispatcher.store(), "E2").await.unwrap().attempts, 3);
        assert_eq!(piece_status(dispatcher.store()).await, GroupStatus::EmProducao);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let dispatcher = dispatcher_with(EngineConfig::default().with_max_tx_attempts(3));
        dispatcher.submit(intake("E1", "PED-1", "K1")).await.unwrap();

        dispatcher.store().inject_conflicts(3).await;
        let event = start("E2", PIECE_GROUP);
        let err = dispatcher.dispatch(&event).await.unwrap_err();

        assert!(matches!(err, EngineError::ConcurrencyConflict { attempts: 3 }));
        assert_eq!(
            receipt(dispatcher.store(), "E2").await.unwrap().status,
            ReceiptStatus::Deferred
        );
        assert_eq!(piece_status(dispatcher.store()).await, GroupStatus::Aguardando);

        let outcome = dispatcher.dispatch(&event).await.unwrap();
        assert_eq!(outcome.status, DispatchStatus::Applied);
        let settled = receipt(dispatcher.store(), "E2").await.unwrap();
        assert_eq!(settled.status, ReceiptStatus::Applied);
        assert_eq!(settled.failures, 1);
    }

    #[tokio::test]
    async fn duplicate_create_fails_without_retrying() {
        let dispatcher = dispatcher_with(EngineConfig::default().with_max_tx_attempts(5));
        let store = dispatcher.store();
        store
            .put_document("grupos_montagem", "PED-1-0-0", json!({ "legado": true }))
            .await
            .unwrap();

        let err = dispatcher.submit(intake("E1", "PED-1", "K1")).await.unwrap_err();

        assert!(matches!(
            err,
            EngineError::Store(StoreError::AlreadyExists { .. })
        ));
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), "store");
        assert!(!store.exists("pedidos", "PED-1").await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_event_twice_applies_once() {
        let dispatcher = dispatcher();
        dispatcher.submit(intake("E1", "PED-1", "K1")).await.unwrap();

        let event = start("E2", PIECE_GROUP);
        let (a, b) = tokio::join!(dispatcher.dispatch(&event), dispatcher.dispatch(&event));

        let mut statuses = vec![a.unwrap().status, b.unwrap().status];
        statuses.sort_by_key(|s| s.as_str());
        assert_eq!(statuses, vec![DispatchStatus::Applied, DispatchStatus::Duplicate]);

        let group: AssemblyGroup = dispatcher
            .store()
            .get_as("grupos_montagem", PIECE_GROUP)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(group.status_history.len(), 1);
    }
}

mod polling {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn dispatches_recorded_events_without_receipts() {
        let dispatcher = dispatcher();
        let store = dispatcher.store();
        for (id, pedido) in [("E1", "PED-1"), ("E2", "PED-2"), ("E3", "PED-3")] {
            let event = intake(id, pedido, "K1");
            store
                .put_document("eventos_producao", id, serde_json::to_value(&event).unwrap())
                .await
                .unwrap();
        }

        let report = dispatcher.dispatch_pending(10).await.unwrap();
        assert_eq!(report.listed, 3);
        assert_eq!(report.applied, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(store.collection_len("pedidos").await, 3);

        let second = dispatcher.dispatch_pending(10).await.unwrap();
        assert_eq!(second.listed, 0);
    }

    #[tokio::test]
    async fn pending_respects_limit() {
        let dispatcher = dispatcher_with(EngineConfig::default().with_max_concurrent_dispatches(1));
        let store = dispatcher.store();
        for n in 0..5 {
            let id = format!("E{n}");
            let event = intake(&id, &format!("PED-{n}"), "K1");
            store
                .put_document("eventos_producao", &id, serde_json::to_value(&event).unwrap())
                .await
                .unwrap();
        }

        let report = dispatcher.dispatch_pending(2).await.unwrap();
        assert_eq!(report.listed, 2);
        assert_eq!(dispatcher.pending_events(10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn cursor_skips_settled_events() {
        let dispatcher = dispatcher_with(
            EngineConfig::default()
                .with_cursor_settle(Duration::ZERO)
                .with_retry_backoff(Duration::from_secs(60)),
        );
        let store = dispatcher.store();
        dispatcher.submit(intake("E1", "PED-1", "K1")).await.unwrap();
        dispatcher.submit(intake("E2", "PED-2", "K1")).await.unwrap();

        assert!(dispatcher.pending_events(10).await.unwrap().is_empty());
        let cursor = store.get("cursores", "eventos_pendentes").await.unwrap().unwrap();
        let settled_at = cursor.body["sequence"].as_i64().unwrap();

        // a deferred event holds the cursor back, later ones are still found
        let _ = dispatcher.submit(start("E3", "  ")).await;
        let later = intake("E4", "PED-4", "K1");
        store
            .put_document("eventos_producao", "E4", serde_json::to_value(&later).unwrap())
            .await
            .unwrap();

        let pending = dispatcher.pending_events(10).await.unwrap();
        assert_eq!(pending.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), vec!["E4"]);
        dispatcher.dispatch_pending(10).await.unwrap();

        let cursor = store.get("cursores", "eventos_pendentes").await.unwrap().unwrap();
        assert_eq!(cursor.body["sequence"].as_i64().unwrap(), settled_at);
        assert!(dispatcher.pending_events(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_events_are_not_listed_again() {
        let dispatcher = dispatcher();
        let _ = dispatcher.submit(intake("E1", "PED-9", "K2")).await;
        assert!(dispatcher.pending_events(10).await.unwrap().is_empty());
    }
}

mod catalog_reload {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn reload_reads_the_products_collection() {
        let dispatcher = EventDispatcher::new(
            InMemoryDocumentStore::new(),
            Arc::new(InMemoryCatalog::new()),
            EngineConfig::default(),
        );
        let store = dispatcher.store();
        store
            .put_document("produtos", "K7", json!({ "tipo": "kit", "modelos": [{ "id": "M7", "quantidade": 2 }] }))
            .await
            .unwrap();
        store
            .put_document("produtos", "M7", json!({ "tipo": "modelo" }))
            .await
            .unwrap();

        assert_eq!(dispatcher.reload_catalog().await.unwrap(), 2);

        dispatcher.submit(intake("E1", "PED-7", "K7")).await.unwrap();
        let model: AssemblyGroup = store
            .get_as("grupos_montagem", "PED-7-0-0.0")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(model.target_product_id, "M7");
        assert_eq!(model.quantidade, Decimal::from(2));
    }
}
