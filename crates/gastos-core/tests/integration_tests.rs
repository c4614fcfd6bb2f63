//! Integration tests for gastos-core
//!
//! These tests run the bridge client and the receipt store against the mock
//! spreadsheet bridge over real HTTP.

use std::sync::Arc;

use gastos_core::{
    bridge::{BridgeRequest, HttpTransport, RemoteBridge, Transport},
    extraction::MockExtractor,
    models::{ExtractedFields, Item, Receipt, ReceiptRecord, ReceiptStatus},
    snapshot::{FileSlot, LocalSnapshot},
    store::ReceiptStore,
    test_utils::MockBridgeServer,
    Error,
};

fn item(name: &str, unit_price: f64, quantity: f64) -> Item {
    Item {
        name: name.into(),
        quantity,
        unit: "UN".into(),
        unit_price,
        total_price: unit_price * quantity,
        category: "Mercearia".into(),
    }
}

fn completed_receipt(url: &str, items: Vec<Item>) -> Receipt {
    let total = items.iter().map(|i| i.total_price).sum();
    let mut receipt = Receipt::new_processing(Some(url.into()));
    receipt.complete(ExtractedFields {
        store_name: Some("Supermercado Boa Vista".into()),
        store_cnpj: Some("12.345.678/0001-90".into()),
        store_address: Some("Av. Boa Viagem, 1000, Recife".into()),
        date: Some("15/01/2024 18:30:00".into()),
        total_amount: Some(total),
        items,
        ..Default::default()
    });
    receipt
}

fn store_for(server: &MockBridgeServer, mock: &MockExtractor) -> ReceiptStore {
    ReceiptStore::new(
        Arc::new(RemoteBridge::http(Some(server.url()))),
        Arc::new(mock.clone()),
        LocalSnapshot::in_memory(),
    )
}

// =============================================================================
// Bridge over HTTP
// =============================================================================

#[tokio::test]
async fn test_save_and_list_keeps_items_in_order() {
    let server = MockBridgeServer::start().await;
    let bridge = RemoteBridge::http(Some(server.url()));

    let receipt = completed_receipt(
        "http://nfce.example/q?p=1",
        vec![item("Arroz 5kg", 25.9, 1.0), item("Feijão 1kg", 8.5, 2.0)],
    );
    let ack = bridge.try_save(&receipt.to_record()).await.unwrap();
    assert!(ack.success);
    assert_eq!(ack.id, receipt.id);

    let listed = bridge.try_list().await.unwrap();
    assert_eq!(listed.len(), 1);
    let items = listed[0].items.clone().unwrap();
    let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["Arroz 5kg", "Feijão 1kg"]);
    assert_eq!(items[1].quantity, 2.0);
    assert_eq!(server.sheet().item_rows(&receipt.id).len(), 2);

    // The listed record converts back to the same receipt
    assert_eq!(Receipt::from_record(listed[0].clone()), receipt);
}

#[tokio::test]
async fn test_migrate_legacy_receipt() {
    let server = MockBridgeServer::start().await;
    let legacy: ReceiptRecord = serde_json::from_value(serde_json::json!({
        "id": "legacy-1",
        "url": "http://nfce.example/q?p=old",
        "status": "completed",
        "storeName": "Mercadinho",
        "totalAmount": "12,50",
        "items": [{"name": "X"}]
    }))
    .unwrap();
    server.sheet().insert_legacy_row(&legacy).unwrap();
    assert!(server.sheet().item_rows("legacy-1").is_empty());

    let bridge = RemoteBridge::http(Some(server.url()));
    let report = bridge.migrate().await.unwrap();
    assert!(report.success);
    assert_eq!(report.migrated_count, 1);

    let rows = server.sheet().item_rows("legacy-1");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "X");
    assert_eq!(rows[0].quantity, 1.0);
}

#[tokio::test]
async fn test_delete_cascades_and_tolerates_unknown_ids() {
    let server = MockBridgeServer::start().await;
    let bridge = RemoteBridge::http(Some(server.url()));

    let receipt = completed_receipt("http://nfce.example/q?p=2", vec![item("Café", 15.0, 1.0)]);
    bridge.save_receipt(&receipt.to_record()).await.unwrap();

    assert!(bridge.delete_receipt(&receipt.id).await.unwrap().success);
    assert!(bridge.delete_receipt(&receipt.id).await.unwrap().success);
    assert!(bridge.list_receipts().await.is_empty());
    assert!(server.sheet().item_rows(&receipt.id).is_empty());
}

#[tokio::test]
async fn test_server_validation_error_body() {
    let server = MockBridgeServer::start().await;
    let transport = HttpTransport::new();

    let reply = transport
        .call(
            &server.url(),
            &BridgeRequest::Save {
                data: ReceiptRecord::default(),
            },
        )
        .await
        .unwrap();
    assert_eq!(reply["error"], "Missing receipt id");
}

#[tokio::test]
async fn test_html_reply_is_remote_error_without_connection_flag() {
    let server = MockBridgeServer::start().await;
    let bridge = RemoteBridge::http(Some(server.broken_url()));

    let err = bridge.try_list().await.unwrap_err();
    assert!(matches!(err, Error::Remote { .. }));
    assert!(bridge.list_receipts().await.is_empty());
    assert!(!bridge.take_connection_error());
}

#[tokio::test]
async fn test_unreachable_bridge_sets_connection_error() {
    let mut server = MockBridgeServer::start().await;
    let url = server.url();
    server.stop();
    drop(server);

    let bridge = RemoteBridge::http(Some(url));
    // Wait for the listener to close
    for _ in 0..50 {
        if bridge.save_receipt(&Receipt::new_processing(None).to_record()).await.is_none() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(bridge.take_connection_error());
    assert!(!bridge.take_connection_error());
}

#[tokio::test]
async fn test_unconfigured_bridge_makes_no_requests() {
    let server = MockBridgeServer::start().await;
    let bridge = RemoteBridge::http(None);

    assert!(bridge.list_receipts().await.is_empty());
    assert!(bridge.migrate().await.is_none());
    assert!(matches!(bridge.try_list().await, Err(Error::Configuration(_))));
    assert_eq!(server.request_count(), 0);

    bridge.set_endpoint(Some(server.url()));
    assert!(bridge.list_receipts().await.is_empty());
    assert_eq!(server.request_count(), 1);
}

// =============================================================================
// Receipt store end to end
// =============================================================================

#[tokio::test]
async fn test_store_round_trip_through_bridge() {
    let server = MockBridgeServer::start().await;
    let mock = MockExtractor::new();
    let store = store_for(&server, &mock);

    let id = store.add_receipt("http://nfce.example/q?p=3").await.unwrap();
    store.wait_idle().await;

    let receipt = store.get(&id).unwrap();
    assert_eq!(receipt.status(), ReceiptStatus::Completed);
    assert!(receipt.is_synced);
    assert_eq!(server.sheet().item_rows(&id).len(), 2);

    // A second session sees the same data, already synced
    let other = store_for(&server, &mock);
    other.initial_load().await;
    let loaded = other.get(&id).unwrap();
    assert_eq!(loaded.details(), receipt.details());
    assert!(loaded.is_synced);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_store_processes_a_batch_without_losing_saves() {
    let server = MockBridgeServer::start().await;
    let mock = MockExtractor::new().with_failure("http://nfce.example/q?p=bad", "page timed out");
    let store = store_for(&server, &mock);

    for n in 0..5 {
        store.add_receipt(&format!("http://nfce.example/q?p={}", n)).await;
    }
    store.add_receipt("http://nfce.example/q?p=bad").await;
    store.wait_idle().await;

    let rows = server.sheet().receipt_rows();
    assert_eq!(rows.len(), 6);
    let completed = rows
        .iter()
        .filter(|r| r.status == ReceiptStatus::Completed)
        .count();
    assert_eq!(completed, 5);
    let failed = rows.iter().find(|r| r.status == ReceiptStatus::Error).unwrap();
    assert_eq!(failed.error, "page timed out");
}

#[tokio::test]
async fn test_interrupted_remote_receipt_loads_as_error() {
    let server = MockBridgeServer::start().await;
    let stuck = Receipt::new_processing(Some("http://nfce.example/q?p=stuck".into()));
    server.sheet().save(&stuck.to_record()).unwrap();

    let mock = MockExtractor::new();
    let store = store_for(&server, &mock);
    store.initial_load().await;
    store.wait_idle().await;

    let loaded = store.get(&stuck.id).unwrap();
    assert_eq!(
        loaded.error_message(),
        Some("processing did not complete in a previous session")
    );
    assert_eq!(mock.url_calls(), 0);
}

#[tokio::test]
async fn test_local_snapshot_file_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockExtractor::new();

    let open = || {
        let slot = FileSlot::new(dir.path()).unwrap();
        ReceiptStore::new(
            Arc::new(RemoteBridge::http(None)),
            Arc::new(mock.clone()),
            LocalSnapshot::new(Arc::new(slot)),
        )
    };

    let store = open();
    store.initial_load().await;
    let id = store.add_receipt("http://nfce.example/q?p=4").await.unwrap();
    store.wait_idle().await;
    assert!(dir.path().join("receipts.json").exists());

    let reopened = open();
    reopened.initial_load().await;
    let receipt = reopened.get(&id).unwrap();
    assert_eq!(receipt.status(), ReceiptStatus::Completed);
    assert!(!receipt.is_synced);
}
