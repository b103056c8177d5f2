//! End-to-end flows through the HTTP surface.

use std::sync::Arc;
use std::time::Duration;

use actix_web::{http::StatusCode, test, web, App};
use async_trait::async_trait;
use serde_json::{json, Value};
use splitledger::payment::{PaymentRail, SimulatedRail};
use splitledger::routes::{configure, AppState};
use splitledger::session::SessionRegistry;
use splitledger::store::MemoryStore;
use splitledger::Settlement;
use tokio::sync::Notify;

const SECRET: &str = "http-test-secret";

fn state(store: Arc<MemoryStore>) -> web::Data<AppState> {
    state_with_rail(store, Arc::new(SimulatedRail::new(Duration::ZERO)))
}

fn state_with_rail(store: Arc<MemoryStore>, rail: Arc<dyn PaymentRail>) -> web::Data<AppState> {
    web::Data::new(AppState {
        store,
        rail,
        sessions: SessionRegistry::default(),
        session_secret: SECRET.to_string(),
        transaction_fee: 0.001,
    })
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(App::new().app_data($state.clone()).configure(configure)).await
    };
}

macro_rules! call {
    ($app:expr, $req:expr) => {{
        let resp = test::call_service(&$app, $req.to_request()).await;
        let status = resp.status();
        let body: Value = test::read_body_json(resp).await;
        (status, body)
    }};
}

/// Every transfer is rejected.
struct DownRail;

#[async_trait]
impl PaymentRail for DownRail {
    async fn transfer(&self, _settlement: &Settlement) -> Result<(), String> {
        Err("rail unreachable".to_string())
    }
}

/// Holds each transfer until released.
#[derive(Default)]
struct GatedRail {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl PaymentRail for GatedRail {
    async fn transfer(&self, _settlement: &Settlement) -> Result<(), String> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }
}

fn wallet(credential: &str) -> (&'static str, String) {
    ("Authorization", format!("Wallet {credential}"))
}

#[actix_web::test]
async fn test_connect_then_settle_a_balance() {
    let store = Arc::new(MemoryStore::new());
    let state = state(store);
    let app = app!(state);

    let mut credentials = Vec::new();
    for address in ["ALICE", "BOB", "CAROL"] {
        let (status, body) = call!(
            app,
            test::TestRequest::post()
                .uri("/session")
                .set_json(json!({ "address": address }))
        );
        assert_eq!(status, StatusCode::OK);
        credentials.push(body["credential"].as_str().unwrap().to_string());
    }
    let (alice, bob) = (&credentials[0], &credentials[1]);

    let (status, group) = call!(
        app,
        test::TestRequest::post()
            .uri("/groups")
            .insert_header(wallet(alice))
            .set_json(json!({ "name": "Ski Weekend", "participants": ["BOB", "CAROL"] }))
    );
    assert_eq!(status, StatusCode::CREATED);
    let group_id = group["id"].as_str().unwrap().to_string();
    assert_eq!(group["participants"].as_array().unwrap().len(), 3);

    let (status, _) = call!(
        app,
        test::TestRequest::post()
            .uri(&format!("/groups/{group_id}/expenses"))
            .insert_header(wallet(alice))
            .set_json(json!({
                "description": "Cabin",
                "amount": 30.0,
                "paid_by": "ALICE",
                "split_method": "equal",
                "participants": ["ALICE", "BOB", "CAROL"],
            }))
    );
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call!(
        app,
        test::TestRequest::get()
            .uri("/balances")
            .insert_header(wallet(bob))
    );
    assert_eq!(status, StatusCode::OK);
    let balances = body["balances"].as_array().unwrap().clone();
    assert_eq!(balances.len(), 1);
    assert_eq!(balances[0]["debtor"], "BOB");
    assert_eq!(balances[0]["creditor"], "ALICE");
    assert_eq!(body["summary"]["you_owe"], 10.0);

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/settlement")
            .insert_header(wallet(bob))
            .set_json(&balances[0])
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "awaiting_confirmation");
    assert!((body["total"].as_f64().unwrap() - 10.001).abs() < 1e-9);

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/settlement")
            .insert_header(wallet(bob))
            .set_json(&balances[0])
    );
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "settlement_conflict");

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/settlement/confirm")
            .insert_header(wallet(bob))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "completed");

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/settlement/finish")
            .insert_header(wallet(bob))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["settled"]["creditor"], "ALICE");
    assert!(body["balances"].as_array().unwrap().is_empty());

    let (_, body) = call!(
        app,
        test::TestRequest::get()
            .uri("/settlement")
            .insert_header(wallet(bob))
    );
    assert_eq!(body["phase"], "idle");
}

#[actix_web::test]
async fn test_cancel_leaves_balances_in_place() {
    let store = Arc::new(MemoryStore::new());
    let state = state(store);
    let app = app!(state);

    let mut credentials = Vec::new();
    for address in ["ALICE", "BOB"] {
        let (_, body) = call!(
            app,
            test::TestRequest::post()
                .uri("/session")
                .set_json(json!({ "address": address }))
        );
        credentials.push(body["credential"].as_str().unwrap().to_string());
    }
    let (alice, bob) = (&credentials[0], &credentials[1]);

    let (_, group) = call!(
        app,
        test::TestRequest::post()
            .uri("/groups")
            .insert_header(wallet(alice))
            .set_json(json!({ "name": "Rent", "participants": ["BOB"] }))
    );
    let group_id = group["id"].as_str().unwrap().to_string();
    call!(
        app,
        test::TestRequest::post()
            .uri(&format!("/groups/{group_id}/expenses"))
            .insert_header(wallet(bob))
            .set_json(json!({
                "description": "Utilities",
                "amount": 80.0,
                "paid_by": "BOB",
                "split_method": "custom",
                "participants": ["ALICE", "BOB"],
                "custom_amounts": { "ALICE": 50.0, "BOB": 30.0 },
            }))
    );

    let (_, body) = call!(
        app,
        test::TestRequest::get()
            .uri("/balances")
            .insert_header(wallet(alice))
    );
    let balances = body["balances"].clone();
    assert_eq!(balances[0]["amount"], 50.0);

    let (status, _) = call!(
        app,
        test::TestRequest::post()
            .uri("/settlement")
            .insert_header(wallet(alice))
            .set_json(&balances[0])
    );
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call!(
        app,
        test::TestRequest::delete()
            .uri("/settlement")
            .insert_header(wallet(alice))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "idle");

    let (_, body) = call!(
        app,
        test::TestRequest::get()
            .uri(&format!("/groups/{group_id}/balance"))
            .insert_header(wallet(bob))
    );
    assert_eq!(body, balances);
}

#[actix_web::test]
async fn test_requests_need_a_connected_wallet() {
    let store = Arc::new(MemoryStore::new());
    let state = state(store.clone());
    let app = app!(state);

    let (status, body) = call!(app, test::TestRequest::get().uri("/balances"));
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (_, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/session")
            .set_json(json!({ "address": "DAVE" }))
    );
    let dave = body["credential"].as_str().unwrap().to_string();

    let (status, body) = call!(
        app,
        test::TestRequest::get()
            .uri("/session")
            .insert_header(wallet(&dave))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], true);
    assert_eq!(body["address"], "DAVE");
    assert!(body["connected_at"].is_string());

    let resp = test::call_service(
        &app,
        test::TestRequest::delete()
            .uri("/session")
            .insert_header(wallet(&dave))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let (status, body) = call!(
        app,
        test::TestRequest::get()
            .uri("/balances")
            .insert_header(wallet(&dave))
    );
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "not_connected");

    call!(
        app,
        test::TestRequest::post()
            .uri("/session")
            .set_json(json!({ "address": "DAVE" }))
    );
    store.set_unavailable(true);
    let (status, body) = call!(
        app,
        test::TestRequest::get()
            .uri("/groups")
            .insert_header(wallet(&dave))
    );
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "store_unavailable");
}

#[actix_web::test]
async fn test_validation_errors_are_bad_requests() {
    let store = Arc::new(MemoryStore::new());
    let state = state(store);
    let app = app!(state);

    let (_, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/session")
            .set_json(json!({ "address": "ERIN" }))
    );
    let erin = body["credential"].as_str().unwrap().to_string();

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/groups")
            .insert_header(wallet(&erin))
            .set_json(json!({ "name": "", "participants": ["FRANK"] }))
    );
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["message"], "group name is required");
}

/// Connects ALICE and BOB, records a 20 dinner paid by ALICE for both and
/// returns BOB's credential with the balance BOB owes.
macro_rules! bob_owes_alice {
    ($app:expr) => {{
        let mut credentials = Vec::new();
        for address in ["ALICE", "BOB"] {
            let (_, body) = call!(
                $app,
                test::TestRequest::post()
                    .uri("/session")
                    .set_json(json!({ "address": address }))
            );
            credentials.push(body["credential"].as_str().unwrap().to_string());
        }
        let (_, group) = call!(
            $app,
            test::TestRequest::post()
                .uri("/groups")
                .insert_header(wallet(&credentials[0]))
                .set_json(json!({ "name": "Dinner Club", "participants": ["BOB"] }))
        );
        let group_id = group["id"].as_str().unwrap().to_string();
        let (status, _) = call!(
            $app,
            test::TestRequest::post()
                .uri(&format!("/groups/{group_id}/expenses"))
                .insert_header(wallet(&credentials[0]))
                .set_json(json!({
                    "description": "Dinner",
                    "amount": 20.0,
                    "paid_by": "ALICE",
                    "split_method": "equal",
                    "participants": ["ALICE", "BOB"],
                }))
        );
        assert_eq!(status, StatusCode::CREATED);

        let bob = credentials[1].clone();
        let (_, body) = call!(
            $app,
            test::TestRequest::get()
                .uri("/balances")
                .insert_header(wallet(&bob))
        );
        (bob, body["balances"][0].clone())
    }};
}

#[actix_web::test]
async fn test_failed_payment_can_be_retried_or_cancelled() {
    let store = Arc::new(MemoryStore::new());
    let state = state_with_rail(store, Arc::new(DownRail));
    let app = app!(state);
    let (bob, balance) = bob_owes_alice!(app);
    assert_eq!(balance["amount"], 10.0);

    let (status, _) = call!(
        app,
        test::TestRequest::post()
            .uri("/settlement")
            .insert_header(wallet(&bob))
            .set_json(&balance)
    );
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/settlement/confirm")
            .insert_header(wallet(&bob))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "failed");
    assert_eq!(body["settlement"]["reason"], "rail unreachable");

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/settlement")
            .insert_header(wallet(&bob))
            .set_json(&balance)
    );
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "settlement_conflict");

    let (status, body) = call!(
        app,
        test::TestRequest::post()
            .uri("/settlement/retry")
            .insert_header(wallet(&bob))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "failed");

    let (status, body) = call!(
        app,
        test::TestRequest::delete()
            .uri("/settlement")
            .insert_header(wallet(&bob))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "idle");

    let (_, body) = call!(
        app,
        test::TestRequest::get()
            .uri("/balances")
            .insert_header(wallet(&bob))
    );
    assert_eq!(body["balances"], json!([balance]));
}

#[actix_web::test]
async fn test_cancel_is_refused_while_processing() {
    let store = Arc::new(MemoryStore::new());
    let rail = Arc::new(GatedRail::default());
    let state = state_with_rail(store, rail.clone());
    let app = app!(state);
    let (bob, balance) = bob_owes_alice!(app);

    let (status, _) = call!(
        app,
        test::TestRequest::post()
            .uri("/settlement")
            .insert_header(wallet(&bob))
            .set_json(&balance)
    );
    assert_eq!(status, StatusCode::OK);

    let confirm = async {
        call!(
            app,
            test::TestRequest::post()
                .uri("/settlement/confirm")
                .insert_header(wallet(&bob))
        )
    };
    let cancel = async {
        rail.entered.notified().await;
        let (_, view) = call!(
            app,
            test::TestRequest::get()
                .uri("/settlement")
                .insert_header(wallet(&bob))
        );
        let cancelled = call!(
            app,
            test::TestRequest::delete()
                .uri("/settlement")
                .insert_header(wallet(&bob))
        );
        rail.release.notify_one();
        (view, cancelled)
    };
    let ((status, body), (view, (cancel_status, cancel_body))) = tokio::join!(confirm, cancel);

    assert_eq!(view["phase"], "processing");
    assert_eq!(cancel_status, StatusCode::CONFLICT);
    assert_eq!(cancel_body["error"], "settlement_conflict");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "completed");
}
