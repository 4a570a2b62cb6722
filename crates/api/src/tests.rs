use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use actix_web::{http::StatusCode, test, web, App, HttpServer};
use async_trait::async_trait;
use tx_watch_client::TxWatchClient;
use tx_watch_domain::model::{Address, Transaction};
use tx_watch_domain::services::telemetry::{init_telemetry, TelemetryConfig, TelemetryGuard};
use tx_watch_monitor::{ChainReader, MonitorError, TxWatcher, WatchService};
use tx_watch_storage::MemoryStorage;

use crate::application::configure_public;
use crate::handlers::{
    block::CurrentBlockResponse, metrics_handler, subscription::SubscribeRequest, ErrorBody,
};
use crate::state::AppState;

/// Serves one fixed block at the chain head.
struct StubChainReader {
    height: u64,
    blocks: Mutex<HashMap<u64, Vec<Transaction>>>,
}

impl StubChainReader {
    fn new(height: u64, txs: Vec<Transaction>) -> Self {
        Self {
            height,
            blocks: Mutex::new(HashMap::from([(height, txs)])),
        }
    }
}

#[async_trait]
impl ChainReader for StubChainReader {
    async fn chain_height(&self) -> Result<u64, MonitorError> {
        Ok(self.height)
    }

    async fn block_transactions(&self, block: u64) -> Result<Vec<Transaction>, MonitorError> {
        self.blocks
            .lock()
            .unwrap()
            .get(&block)
            .cloned()
            .ok_or_else(|| MonitorError::Rpc(format!("block {block} not found")))
    }
}

fn address(fill: char) -> String {
    format!("0x{}", fill.to_string().repeat(40))
}

fn transfer(index: &str, from: char, to: char) -> Transaction {
    Transaction {
        block_number: "0x64".into(),
        hash: format!("0x{from}{to}{index}"),
        from: Address::parse(&address(from)).unwrap(),
        to: Some(Address::parse(&address(to)).unwrap()),
        transaction_index: index.into(),
        value: "0xde0b6b3a7640000".into(),
        ..Default::default()
    }
}

fn telemetry() -> TelemetryGuard {
    let config = TelemetryConfig::from_env("API_TEST");
    init_telemetry(&config).expect("telemetry inits")
}

fn build_service(chain: StubChainReader) -> Arc<dyn WatchService> {
    let storage = MemoryStorage::new();
    Arc::new(TxWatcher::new(
        chain,
        storage.progress(),
        storage.subscriptions(),
        2,
    ))
}

fn build_state(service: Arc<dyn WatchService>) -> AppState {
    AppState::new(service, telemetry())
}

fn empty_state() -> AppState {
    build_state(build_service(StubChainReader::new(100, Vec::new())))
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state))
                .configure(configure_public)
                .route("/metrics", web::get().to(metrics_handler)),
        )
        .await
    };
}

fn subscribe_request(address: &str) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/subscribe")
        .set_json(&SubscribeRequest {
            address: address.to_string(),
        })
}

fn transactions_request(address: &str) -> test::TestRequest {
    test::TestRequest::get().uri(&format!("/getTransactions/{address}"))
}

#[actix_web::test]
async fn current_block_starts_at_zero() {
    let app = app!(empty_state());
    let req = test::TestRequest::get().uri("/getCurrentBlock").to_request();
    let body: CurrentBlockResponse = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body.current_block_height, 0);
}

#[actix_web::test]
async fn current_block_uses_camel_case_field() {
    let app = app!(empty_state());
    let req = test::TestRequest::get().uri("/getCurrentBlock").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, serde_json::json!({ "currentBlockHeight": 0 }));
}

#[actix_web::test]
async fn subscribe_accepts_valid_address() {
    let app = app!(empty_state());
    let resp = test::call_service(&app, subscribe_request(&address('a')).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = test::read_body(resp).await;
    assert!(body.is_empty());
}

#[actix_web::test]
async fn subscribe_rejects_invalid_address() {
    let app = app!(empty_state());
    let resp = test::call_service(&app, subscribe_request("0x1234").to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = test::read_body_json(resp).await;
    assert_eq!(
        body,
        ErrorBody {
            error: "invalid address".into(),
            msg: "invalid address".into(),
        }
    );
}

#[actix_web::test]
async fn duplicate_subscribe_conflicts() {
    let app = app!(empty_state());
    let first = test::call_service(&app, subscribe_request(&address('b')).to_request()).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = test::call_service(&app, subscribe_request(&address('b')).to_request()).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body: ErrorBody = test::read_body_json(second).await;
    assert_eq!(body.error, "address already subscribed");
    assert_eq!(body.msg, "address already subscribed");
}

#[actix_web::test]
async fn malformed_subscribe_body_is_bad_request() {
    let app = app!(empty_state());
    let req = test::TestRequest::post()
        .uri("/subscribe")
        .insert_header(("content-type", "application/json"))
        .set_payload("{\"addr\":")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = test::read_body_json(resp).await;
    assert_eq!(body.msg, "malformed request");
}

#[actix_web::test]
async fn transactions_for_unknown_address_is_not_found() {
    let app = app!(empty_state());
    let resp = test::call_service(&app, transactions_request(&address('c')).to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: ErrorBody = test::read_body_json(resp).await;
    assert_eq!(
        body,
        ErrorBody {
            error: "address not subscribed".into(),
            msg: "not found subscriber".into(),
        }
    );
}

#[actix_web::test]
async fn transactions_with_invalid_address_is_bad_request() {
    let app = app!(empty_state());
    let resp = test::call_service(&app, transactions_request("nope").to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn empty_mailbox_is_not_found() {
    let app = app!(empty_state());
    test::call_service(&app, subscribe_request(&address('d')).to_request()).await;

    let resp = test::call_service(&app, transactions_request(&address('d')).to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: ErrorBody = test::read_body_json(resp).await;
    assert_eq!(
        body,
        ErrorBody {
            error: "no transactions".into(),
            msg: "not found transactions".into(),
        }
    );
}

#[actix_web::test]
async fn matched_transactions_are_drained_once() {
    let sample = transfer("0x0", 'e', 'f');
    let service = build_service(StubChainReader::new(100, vec![sample.clone()]));
    let app = app!(build_state(Arc::clone(&service)));
    test::call_service(&app, subscribe_request(&address('f')).to_request()).await;

    let report = service.run_one_cycle().await.expect("cycle runs");
    assert_eq!(report.stats.matched, 1);

    let req = test::TestRequest::get().uri("/getCurrentBlock").to_request();
    let block: CurrentBlockResponse = test::call_and_read_body_json(&app, req).await;
    assert_eq!(block.current_block_height, 100);

    let txs: Vec<Transaction> =
        test::call_and_read_body_json(&app, transactions_request(&address('f')).to_request()).await;
    assert_eq!(txs, vec![sample]);

    let again = test::call_service(&app, transactions_request(&address('f')).to_request()).await;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn transactions_keep_node_field_names() {
    let service = build_service(StubChainReader::new(100, vec![transfer("0x7", 'a', 'b')]));
    let app = app!(build_state(Arc::clone(&service)));
    test::call_service(&app, subscribe_request(&address('a')).to_request()).await;
    service.run_one_cycle().await.expect("cycle runs");

    let body: serde_json::Value =
        test::call_and_read_body_json(&app, transactions_request(&address('a')).to_request()).await;
    let tx = &body[0];
    assert_eq!(tx["transactionIndex"], "0x7");
    assert_eq!(tx["blockNumber"], "0x64");
    assert_eq!(tx["from"], address('a'));
    assert_eq!(tx["to"], address('b'));
}

#[actix_web::test]
async fn metrics_endpoint_renders_text() {
    let app = app!(empty_state());
    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/plain"));
}

#[actix_web::test]
async fn client_drives_a_running_server() {
    let sample = transfer("0x2", '1', '2');
    let service = build_service(StubChainReader::new(4_242, vec![sample.clone()]));
    let state = build_state(Arc::clone(&service));

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(configure_public)
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .expect("bind ephemeral port");
    let addr = server.addrs()[0];
    let server = server.run();
    let handle = server.handle();
    actix_web::rt::spawn(server);

    let client = TxWatchClient::new(format!("http://{addr}"));
    assert_eq!(client.current_block().await.unwrap(), 0);

    client.subscribe(&address('2')).await.unwrap();
    let conflict = client.subscribe(&address('2')).await.unwrap_err();
    assert_eq!(conflict.status().map(|s| s.as_u16()), Some(409));

    let invalid = client.subscribe("0xshort").await.unwrap_err();
    assert_eq!(invalid.status().map(|s| s.as_u16()), Some(400));

    service.run_one_cycle().await.expect("cycle runs");
    assert_eq!(client.current_block().await.unwrap(), 4_242);
    assert_eq!(client.transactions(&address('2')).await.unwrap(), vec![sample]);

    let drained = client.transactions(&address('2')).await.unwrap_err();
    assert_eq!(drained.status().map(|s| s.as_u16()), Some(404));

    handle.stop(true).await;
}
