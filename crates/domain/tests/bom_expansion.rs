//! Integration tests for BOM expansion against a catalog loaded from the store.

use doc_store::{DocumentStoreExt, InMemoryDocumentStore};
use domain::{BomResolver, DomainError, InMemoryCatalog, ProductType};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use serde_json::json;

async fn seeded_store() -> InMemoryDocumentStore {
    let store = InMemoryDocumentStore::new();
    let products = [
        ("K1", json!({"tipo": "kit", "modelos": [{"modeloId": "A", "quantidade": 2}]})),
        (
            "A",
            json!({"tipo": "modelo", "tempoMontagemEstimado": 4, "pecas": [{"pecaId": "P", "quantidade": 3}]}),
        ),
        (
            "P",
            json!({
                "tipo": "peca",
                "custoUnitario": "2.50",
                "tempoImpressaoEstimado": 30,
                "insumosNecessarios": [{"insumoId": "PLA", "quantidade": "12.5"}],
                "partes": ["PT1", {"parte": {"id": "PT2"}, "qtd": 2}]
            }),
        ),
        ("PT1", json!({"tipo": "parte"})),
        ("PT2", json!({"tipo": "parte"})),
    ];
    for (id, body) in products {
        store.put_document("produtos", id, body).await.unwrap();
    }
    store
}

#[tokio::test]
async fn five_kits_need_thirty_pieces() {
    let store = seeded_store().await;
    let catalog = InMemoryCatalog::load(&store).await.unwrap();

    let expansion = BomResolver::new(&catalog)
        .expand("K1", Decimal::from(5))
        .unwrap();

    let totals: Vec<_> = expansion
        .totals()
        .into_iter()
        .map(|(id, tipo, q)| (id, tipo, q.normalize().to_string()))
        .collect();
    assert_eq!(
        totals,
        vec![
            ("A".to_string(), ProductType::Modelo, "10".to_string()),
            ("P".to_string(), ProductType::Peca, "30".to_string()),
            ("PT1".to_string(), ProductType::Parte, "30".to_string()),
            ("PT2".to_string(), ProductType::Parte, "60".to_string()),
        ]
    );

    let piece = expansion
        .components
        .iter()
        .find(|c| c.component_id == "P")
        .unwrap();
    assert_eq!(piece.insumos_necessarios[0].quantidade, Decimal::from(375));
    assert!(expansion.warnings.is_empty());
}

#[tokio::test]
async fn cycle_in_stored_catalog_is_an_integrity_error() {
    let store = seeded_store().await;
    store
        .put_document(
            "produtos",
            "P",
            json!({"tipo": "peca", "partes": [{"id": "K1"}]}),
        )
        .await
        .unwrap();
    let catalog = InMemoryCatalog::load(&store).await.unwrap();

    let result = BomResolver::new(&catalog).expand("K1", Decimal::ONE);
    assert!(matches!(result, Err(DomainError::Integrity(_))));

    let lenient = BomResolver::new(&catalog).resolve("K1", Decimal::ONE).unwrap();
    assert_eq!(lenient.integrity_issues.len(), 1);
    assert_eq!(lenient.integrity_issues[0].path, vec!["K1", "A", "P", "K1"]);
}

#[tokio::test]
async fn dangling_reference_is_a_warning() {
    let store = seeded_store().await;
    store
        .put_document(
            "produtos",
            "K2",
            json!({"tipo": "kit", "componentes": [{"id": "A"}, {"id": "GONE"}, 42]}),
        )
        .await
        .unwrap();
    let catalog = InMemoryCatalog::load(&store).await.unwrap();

    let expansion = BomResolver::new(&catalog).expand("K2", Decimal::ONE).unwrap();
    assert_eq!(expansion.total_for("A"), Decimal::ONE);
    assert_eq!(expansion.total_for("P"), Decimal::from(3));
    assert_eq!(expansion.warnings.len(), 2);
    assert!(expansion.warnings.iter().all(|w| w.parent_id == "K2"));
}
