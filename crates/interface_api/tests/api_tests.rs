//! HTTP tests over the in-memory billing store

use std::str::FromStr;
use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use core_kernel::{HealthCheckable, RoomId, UserId};
use domain_billing::ports::mock::InMemoryBillingStore;
use domain_billing::{BillingService, BillingSettings};
use interface_api::auth::create_token;
use interface_api::config::ApiConfig;
use interface_api::{create_router, AppState};
use test_utils::RateFixtures;

const SECRET: &str = "api-test-secret";

struct TestApp {
    server: TestServer,
    store: Arc<InMemoryBillingStore>,
    user: UserId,
    token: String,
}

impl TestApp {
    async fn new() -> Self {
        let store = Arc::new(InMemoryBillingStore::new());
        store.add_rate(RateFixtures::global_headcount()).await;

        let service = BillingService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            BillingSettings::default(),
        );
        let config = ApiConfig {
            jwt_secret: SECRET.to_string(),
            ..ApiConfig::default()
        };
        let state = AppState::new(service, config)
            .unwrap()
            .with_health_checks(vec![store.clone() as Arc<dyn HealthCheckable>]);
        let server = TestServer::new(create_router(state)).unwrap();

        let user = UserId::new();
        let token = token_for(user, &["admin"]);
        Self {
            server,
            store,
            user,
            token,
        }
    }

    async fn create_bill(&self, room: RoomId, month: u32, fees: Value) -> Value {
        let response = self
            .server
            .post("/api/v1/bills")
            .authorization_bearer(&self.token)
            .json(&json!({
                "room_id": room.as_uuid(),
                "month": month,
                "year": 2024,
                "readings": {
                    "electricity": { "old_reading": 1000, "new_reading": 1120, "max_capacity": 99999 }
                },
                "fees": fees,
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json::<Value>()
    }
}

fn token_for(user: UserId, roles: &[&str]) -> String {
    create_token(
        user,
        Some("Landlord"),
        roles.iter().map(|r| r.to_string()).collect(),
        SECRET,
        600,
    )
    .unwrap()
}

fn decimal(value: &Value) -> Decimal {
    Decimal::from_str(value.as_str().expect("decimal encoded as string")).unwrap()
}

#[tokio::test]
async fn test_health_is_public() {
    let app = TestApp::new().await;

    app.server.get("/health").await.assert_status_ok();

    let ready = app.server.get("/health/ready").await;
    ready.assert_status_ok();
    assert_eq!(ready.json::<Value>()["status"], "ready");
}

#[tokio::test]
async fn test_api_requires_bearer_token() {
    let app = TestApp::new().await;

    app.server
        .get("/api/v1/debt/warnings")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    app.server
        .get("/api/v1/debt/warnings")
        .authorization_bearer("not-a-jwt")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_permission_is_forbidden() {
    let app = TestApp::new().await;
    let reader = token_for(UserId::new(), &["bill:read"]);

    app.server
        .get("/api/v1/debt/warnings")
        .authorization_bearer(&reader)
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_create_bill_prices_tiers_headcount_and_fees() {
    let app = TestApp::new().await;
    let room = RoomId::new();
    app.store.set_additional_occupants(room, 2).await;

    let body = app
        .create_bill(room, 1, json!([{ "name": "Cleaning", "amount": "50000" }]))
        .await;

    let bill = &body["data"];
    assert_eq!(body["audit_recorded"], true);
    assert_eq!(bill["electricity"]["usage"], 120);
    assert_eq!(decimal(&bill["electricity_cost"]), Decimal::from(210_880));
    assert_eq!(decimal(&bill["water_cost"]), Decimal::from(300_000));
    assert_eq!(decimal(&bill["total_cost"]), Decimal::from(560_880));
    assert_eq!(bill["occupant_count"], 3);
    assert_eq!(bill["payment_state"], "UNPAID");
    assert_eq!(bill["owner_id"], json!(app.user.as_uuid()));
    assert!(!bill["total_cost_text"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_second_bill_for_same_month_is_rejected() {
    let app = TestApp::new().await;
    let room = RoomId::new();
    app.create_bill(room, 3, json!([])).await;

    let response = app
        .server
        .post("/api/v1/bills")
        .authorization_bearer(&app.token)
        .json(&json!({
            "room_id": room.as_uuid(),
            "month": 3,
            "year": 2024,
            "readings": { "electricity": { "old_reading": 0, "new_reading": 10, "max_capacity": 99999 } },
        }))
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json::<Value>()["error"], "validation_error");
}

#[tokio::test]
async fn test_invalid_month_fails_request_validation() {
    let app = TestApp::new().await;

    let response = app
        .server
        .post("/api/v1/bills")
        .authorization_bearer(&app.token)
        .json(&json!({
            "room_id": RoomId::new().as_uuid(),
            "month": 13,
            "year": 2024,
            "readings": { "electricity": { "old_reading": 0, "new_reading": 10, "max_capacity": 99999 } },
        }))
        .await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.json::<Value>()["details"].is_array());
}

#[tokio::test]
async fn test_preview_stores_nothing() {
    let app = TestApp::new().await;
    let room = RoomId::new();

    let response = app
        .server
        .post("/api/v1/bills/preview")
        .authorization_bearer(&app.token)
        .json(&json!({
            "room_id": room.as_uuid(),
            "readings": { "electricity": { "old_reading": 9990, "new_reading": 50, "max_capacity": 9999 } },
        }))
        .await;
    response.assert_status_ok();
    let calc = response.json::<Value>();
    assert_eq!(calc["electricity_usage"], 59);
    assert_eq!(calc["electricity_rollover"], true);

    let debt = app
        .server
        .get(&format!("/api/v1/rooms/{}/debt", room.as_uuid()))
        .authorization_bearer(&app.token)
        .await
        .json::<Value>();
    assert_eq!(debt["unpaid_bills"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_missing_rate_configuration_is_a_server_error() {
    let store = Arc::new(InMemoryBillingStore::new());
    let service = BillingService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store,
        BillingSettings::default(),
    );
    let config = ApiConfig {
        jwt_secret: SECRET.to_string(),
        ..ApiConfig::default()
    };
    let server = TestServer::new(create_router(AppState::new(service, config).unwrap())).unwrap();

    let response = server
        .post("/api/v1/bills/preview")
        .authorization_bearer(&token_for(UserId::new(), &["admin"]))
        .json(&json!({
            "room_id": RoomId::new().as_uuid(),
            "readings": { "electricity": { "old_reading": 0, "new_reading": 10, "max_capacity": 99999 } },
        }))
        .await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json::<Value>()["error"], "configuration_error");
}

#[tokio::test]
async fn test_payment_fee_and_history_flow() {
    let app = TestApp::new().await;
    let room = RoomId::new();
    let created = app.create_bill(room, 2, json!([])).await;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    // 210 880 electricity + 100 000 water for one occupant
    let overpaid = app
        .server
        .put(&format!("/api/v1/bills/{}/payment", id))
        .authorization_bearer(&app.token)
        .json(&json!({ "amount": "400000" }))
        .await;
    overpaid.assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    let paid = app
        .server
        .put(&format!("/api/v1/bills/{}/payment", id))
        .authorization_bearer(&app.token)
        .json(&json!({ "amount": "100000" }))
        .await;
    paid.assert_status_ok();
    let body = paid.json::<Value>();
    let bill = &body["data"];
    assert_eq!(bill["payment_state"], "PARTIALLY_PAID");
    assert_eq!(decimal(&bill["shortfall"]), Decimal::from(210_880));

    let with_fee = app
        .server
        .post(&format!("/api/v1/bills/{}/fees", id))
        .authorization_bearer(&app.token)
        .json(&json!({ "name": "Internet", "amount": "90000" }))
        .await;
    with_fee.assert_status_ok();
    let bill = with_fee.json::<Value>()["data"].clone();
    assert_eq!(decimal(&bill["total_cost"]), Decimal::from(400_880));
    let fee_id = bill["fees"][0]["id"].as_str().unwrap().to_string();

    app.server
        .delete(&format!("/api/v1/bills/{}/fees/{}", id, fee_id))
        .authorization_bearer(&app.token)
        .await
        .assert_status_ok();

    let marked = app
        .server
        .put(&format!("/api/v1/bills/{}/paid", id))
        .authorization_bearer(&app.token)
        .json(&json!({ "is_paid": true }))
        .await;
    marked.assert_status_ok();
    let body = marked.json::<Value>();
    let bill = &body["data"];
    assert_eq!(bill["payment_state"], "PAID");
    assert!(decimal(&bill["shortfall"]).is_zero());

    let history = app
        .server
        .get(&format!("/api/v1/bills/{}/history", id))
        .authorization_bearer(&app.token)
        .await
        .json::<Vec<Value>>();
    let actions: Vec<&str> = history.iter().map(|e| e["action"].as_str().unwrap()).collect();
    assert_eq!(
        actions,
        vec!["CREATE", "UPDATE_PAYMENT", "ADD_FEE", "REMOVE_FEE", "UPDATE_PAYMENT"]
    );
}

#[tokio::test]
async fn test_deleted_bill_keeps_history_but_is_gone() {
    let app = TestApp::new().await;
    let created = app.create_bill(RoomId::new(), 4, json!([])).await;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let deleted = app
        .server
        .delete(&format!("/api/v1/bills/{}", id))
        .authorization_bearer(&app.token)
        .await;
    deleted.assert_status_ok();
    assert_eq!(deleted.json::<Value>()["audit_recorded"], true);

    app.server
        .get(&format!("/api/v1/bills/{}", id))
        .authorization_bearer(&app.token)
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let history = app
        .server
        .get(&format!("/api/v1/bills/{}/history", id))
        .authorization_bearer(&app.token)
        .await
        .json::<Vec<Value>>();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|e| e["bill_id"].is_null()));
}

#[tokio::test]
async fn test_history_is_hidden_from_other_users() {
    let app = TestApp::new().await;
    let created = app.create_bill(RoomId::new(), 5, json!([])).await;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let stranger = token_for(UserId::new(), &["bill:read"]);
    let history = app
        .server
        .get(&format!("/api/v1/bills/{}/history", id))
        .authorization_bearer(&stranger)
        .await
        .json::<Vec<Value>>();
    assert!(history.is_empty());
}

#[tokio::test]
async fn test_debt_warning_after_two_short_months() {
    let app = TestApp::new().await;
    let room = RoomId::new();

    // Each bill: 210 880 + 100 000 = 310 880
    for (month, paid) in [(1u32, "310880"), (2, "10880"), (3, "110880")] {
        let created = app.create_bill(room, month, json!([])).await;
        let id = created["data"]["id"].as_str().unwrap().to_string();
        app.server
            .put(&format!("/api/v1/bills/{}/payment", id))
            .authorization_bearer(&app.token)
            .json(&json!({ "amount": paid }))
            .await
            .assert_status_ok();
    }

    let debt = app
        .server
        .get(&format!("/api/v1/rooms/{}/debt", room.as_uuid()))
        .authorization_bearer(&app.token)
        .await
        .json::<Value>();
    assert_eq!(debt["consecutive_months_at_risk"], 2);
    assert_eq!(decimal(&debt["total_debt"]["amount"]), Decimal::from(500_000));

    let warnings = app
        .server
        .get("/api/v1/debt/warnings")
        .authorization_bearer(&app.token)
        .await
        .json::<Vec<Value>>();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0]["room_id"], json!(room.as_uuid()));
    assert_eq!(warnings[0]["consecutive_months"], 2);
}
