// End-to-end HTTP tests against a seeded temporary database
#![cfg(feature = "server")]

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use shiptrack::api::{router, AppState};
use shiptrack::db::{SAMPLE_ADMIN_EMAIL, SAMPLE_CUSTOMER_EMAIL, SAMPLE_PASSWORD, SAMPLE_STAFF_EMAIL};
use shiptrack::{seed_sample_data, Database, TokenSigner};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    app: Router,
    db: Database,
    _dir: TempDir,
}

impl TestApp {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("shipping.db"));
        db.init().unwrap();
        db.write(|tx| seed_sample_data(tx)).unwrap();

        let state = AppState::new(db.clone(), TokenSigner::new("integration-test-secret"));
        TestApp {
            app: router(state),
            db,
            _dir: dir,
        }
    }

    async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.call(Method::GET, uri, token, None).await
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, token, Some(body)).await
    }

    async fn login(&self, email: &str, password: &str) -> String {
        let (status, body) = self
            .post("/login", None, json!({ "email": email, "password": password }))
            .await;
        assert_eq!(status, StatusCode::OK, "login failed for {}: {}", email, body);
        body["token"].as_str().unwrap().to_string()
    }

    async fn service_id(&self, name: &str) -> i64 {
        let (_, body) = self.get("/services", None).await;
        body["services"]
            .as_array()
            .unwrap()
            .iter()
            .find(|s| s["name"] == name)
            .unwrap()["service_id"]
            .as_i64()
            .unwrap()
    }

    async fn ship(&self, token: &str, service_id: i64, weight: f64, payment_type: &str) -> (StatusCode, Value) {
        self.post("/ship", Some(token), ship_form(service_id, weight, payment_type))
            .await
    }
}

fn ship_form(service_id: i64, weight: f64, payment_type: &str) -> Value {
    json!({
        "sender_name": "Sample Customer",
        "sender_addr1": "1 Main St",
        "sender_city": "Storrs",
        "sender_state": "CT",
        "sender_zip": "06269",
        "recipient_name": "Jane Receiver",
        "recipient_addr1": "99 Elm St",
        "recipient_addr2": "Apt 4",
        "recipient_city": "Boston",
        "recipient_state": "MA",
        "recipient_zip": "02108",
        "service_id": service_id,
        "weight_lb": weight,
        "payment_type": payment_type,
    })
}

#[tokio::test]
async fn test_health_at_root_and_api_prefix() {
    let app = TestApp::new();
    for uri in ["/", "/api"] {
        let (status, body) = app.get(uri, None).await;
        assert_eq!(status, StatusCode::OK, "{}", uri);
        assert_eq!(body["message"], "Package Delivery API is running.");
    }
}

#[tokio::test]
async fn test_register_duplicate_email() {
    let app = TestApp::new();
    let creds = json!({ "email": "new@test.com", "password": "password123" });

    let (status, body) = app.post("/register", None, creds.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["role"], "customer");

    let (status, body) = app.post("/api/register", None, creds).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Email already registered");
}

#[tokio::test]
async fn test_register_and_login_rejections() {
    let app = TestApp::new();

    let (status, _) = app
        .post("/register", None, json!({ "email": "x@test.com", "password": "short" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post("/login", None, json!({ "email": SAMPLE_ADMIN_EMAIL, "password": "wrong-password" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid credentials");

    let (status, body) = app.post("/login", None, json!({ "email": 42 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_ship_and_track_with_ownership() {
    let app = TestApp::new();
    let owner = app.login(SAMPLE_CUSTOMER_EMAIL, SAMPLE_PASSWORD).await;
    let service = app.service_id("2-Day Box").await;

    let (status, body) = app.ship(&owner, service, 5.5, "credit_card").await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["estimated_cost"], 19.99);
    let tracking_number = body["tracking_number"].as_i64().unwrap();

    let uri = format!("/tracking/{}", tracking_number);
    let (status, report) = app.get(&uri, Some(&owner)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["tracking_history"].as_array().unwrap().len(), 1);
    assert_eq!(report["tracking_history"][0]["status"], "processing");
    assert_eq!(report["current_status"]["status"], "processing");
    assert_eq!(report["package"]["recipient"]["city"], "Boston");

    let (_, mine) = app.get("/user/packages", Some(&owner)).await;
    assert_eq!(mine["packages"][0]["tracking_number"], tracking_number);

    app.post("/register", None, json!({ "email": "other@test.com", "password": "password123" }))
        .await;
    let other = app.login("other@test.com", "password123").await;
    let (status, _) = app.get(&uri, Some(&other)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get("/tracking/999999", Some(&owner)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = app.get(&uri, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Authentication required");
    let (status, _) = app.get(&uri, Some("1")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "raw user ids are not tokens");
    let (status, _) = app.get("/tracking/abc", Some(&owner)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ship_validation() {
    let app = TestApp::new();
    let owner = app.login(SAMPLE_CUSTOMER_EMAIL, SAMPLE_PASSWORD).await;
    let letter = app.service_id("Overnight Letter").await;

    let (status, body) = app.ship(&owner, letter, 2.0, "credit_card").await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);

    let (status, body) = app.ship(&owner, letter, 0.2, "account").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("requires a contract"));

    let (status, _) = app.ship(&owner, letter, 0.2, "bitcoin").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_staff_delivery_shows_in_admin_listing() {
    let app = TestApp::new();
    let owner = app.login(SAMPLE_CUSTOMER_EMAIL, SAMPLE_PASSWORD).await;
    let staff = app.login(SAMPLE_STAFF_EMAIL, SAMPLE_PASSWORD).await;
    let service = app.service_id("Ground Shipping").await;

    let (_, body) = app.ship(&owner, service, 12.0, "prepaid").await;
    let tracking_number = body["tracking_number"].as_i64().unwrap();
    let update_uri = format!("/api/admin/packages/{}/update-status", tracking_number);

    let (status, _) = app
        .post(&update_uri, Some(&owner), json!({ "location_id": 1, "status": "delivered" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "customers cannot update status");

    let (status, body) = app
        .post(&update_uri, Some(&staff), json!({ "location_id": 1, "status": "teleported" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);

    let (status, body) = app
        .post(
            &update_uri,
            Some(&staff),
            json!({ "location_id": 3, "status": "delivered", "signature": "J. Receiver" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    let (status, listing) = app.get("/admin/packages", Some(&staff)).await;
    assert_eq!(status, StatusCode::OK);
    let row = listing["packages"]
        .as_array()
        .unwrap()
        .iter()
        .find(|p| p["tracking_number"] == tracking_number)
        .unwrap();
    assert_eq!(row["current_status"], "delivered");
    assert_eq!(row["current_location"], "Truck 17");
    assert!(row["date_delivered"].is_string());

    let (_, report) = app.get(&format!("/tracking/{}", tracking_number), Some(&owner)).await;
    assert_eq!(report["package"]["delivered_signature"], "J. Receiver");
    assert_eq!(report["tracking_history"].as_array().unwrap().len(), 2);

    let (status, location) = app
        .get(&format!("/admin/packages/{}/location", tracking_number), Some(&staff))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(location["location"]["status"], "delivered");

    let (_, stats) = app.get("/admin/stats", Some(&staff)).await;
    assert_eq!(stats["stats"]["delivered_today"], 1);
    assert_eq!(stats["stats"]["in_transit"], 0);
}

#[tokio::test]
async fn test_status_update_accepts_form_values() {
    let app = TestApp::new();
    let owner = app.login(SAMPLE_CUSTOMER_EMAIL, SAMPLE_PASSWORD).await;
    let staff = app.login(SAMPLE_STAFF_EMAIL, SAMPLE_PASSWORD).await;
    let service = app.service_id("2-Day Box").await;

    let (_, body) = app.ship(&owner, service, 3.0, "credit_card").await;
    let tracking_number = body["tracking_number"].as_i64().unwrap();
    let update_uri = format!("/api/admin/packages/{}/update-status", tracking_number);

    // Shape posted by the staff dashboard's select box and free-text status
    let (status, body) = app
        .post(
            &update_uri,
            Some(&staff),
            json!({ "location_id": "3", "status": "out for delivery", "notes": "" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["event"]["status"], "out-for-delivery");

    let (_, report) = app.get(&format!("/tracking/{}", tracking_number), Some(&owner)).await;
    assert_eq!(report["current_status"]["status"], "out-for-delivery");
    assert_eq!(report["current_status"]["location"], "Truck 17");
    assert!(report["tracking_history"][0]["notes"].is_null());

    let (status, body) = app
        .post(&update_uri, Some(&staff), json!({ "location_id": "truck", "status": "loaded" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("numeric id"));
}

#[tokio::test]
async fn test_database_failure_is_500_with_raw_message() {
    let app = TestApp::new();
    app.db
        .write(|tx| {
            tx.execute_batch("DROP TABLE ServiceType")?;
            Ok(())
        })
        .unwrap();

    let (status, body) = app.get("/api/services", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("no such table: ServiceType"), "{}", message);
}

#[tokio::test]
async fn test_contract_conversion_is_idempotent() {
    let app = TestApp::new();
    let admin = app.login(SAMPLE_ADMIN_EMAIL, SAMPLE_PASSWORD).await;
    let staff = app.login(SAMPLE_STAFF_EMAIL, SAMPLE_PASSWORD).await;

    let (status, _) = app.get("/admin/customers", Some(&staff)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.get("/admin/customers", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    let customer_id = body["customers"][0]["customer_id"].as_i64().unwrap();
    let uri = format!("/admin/customers/{}/contract", customer_id);

    let (status, first) = app.post(&uri, Some(&admin), json!({ "has_contract": true })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["account_number"], 1001);

    let (_, second) = app.post(&uri, Some(&admin), json!({ "has_contract": true })).await;
    assert_eq!(second["account_number"], first["account_number"]);

    let (status, _) = app
        .post("/admin/customers/999/contract", Some(&admin), json!({ "has_contract": true }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_statement_generation_and_payment() {
    let app = TestApp::new();
    let admin = app.login(SAMPLE_ADMIN_EMAIL, SAMPLE_PASSWORD).await;
    let owner = app.login(SAMPLE_CUSTOMER_EMAIL, SAMPLE_PASSWORD).await;

    let (status, _) = app.get("/billing/statements", Some(&owner)).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "no contract yet");

    let (_, customers) = app.get("/admin/customers", Some(&admin)).await;
    let customer_id = customers["customers"][0]["customer_id"].as_i64().unwrap();
    app.post(
        &format!("/admin/customers/{}/contract", customer_id),
        Some(&admin),
        json!({ "has_contract": true }),
    )
    .await;

    let two_day = app.service_id("2-Day Box").await;
    let ground = app.service_id("Ground Shipping").await;
    app.ship(&owner, two_day, 5.5, "account").await;
    app.ship(&owner, ground, 20.0, "account").await;
    app.ship(&owner, ground, 20.0, "credit_card").await;

    let month = Utc::now().format("%Y-%m").to_string();
    let statements_uri = format!("/admin/customers/{}/statements", customer_id);
    let (status, generated) = app
        .post(&statements_uri, Some(&admin), json!({ "month": month }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", generated);
    let total = generated["statement"]["total_amount"].as_f64().unwrap();
    assert!((total - 29.98).abs() < 1e-9, "total was {}", total);
    assert_eq!(generated["packages"].as_array().unwrap().len(), 2);

    let (status, _) = app
        .post(&statements_uri, Some(&admin), json!({ "month": month }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "duplicate month");

    let (status, list) = app.get("/billing/statements", Some(&owner)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["account_number"], 1001);
    assert_eq!(list["statements"][0]["status"], "unpaid");
    let statement_id = list["statements"][0]["statement_id"].as_i64().unwrap();

    let (status, paid) = app
        .post(
            "/billing/make-payment",
            Some(&owner),
            json!({ "amount": total, "method": "credit_card", "statement_id": statement_id }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", paid);

    let (_, detail) = app
        .get(&format!("/billing/statements/{}", statement_id), Some(&owner))
        .await;
    assert_eq!(detail["statement"]["status"], "paid");
    assert_eq!(detail["packages"].as_array().unwrap().len(), 2);

    let (_, history) = app.get("/billing/payment-history", Some(&owner)).await;
    assert_eq!(history["payments"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_admin_user_management() {
    let app = TestApp::new();
    let admin = app.login(SAMPLE_ADMIN_EMAIL, SAMPLE_PASSWORD).await;

    let (status, created) = app
        .post(
            "/admin/users/create",
            Some(&admin),
            json!({ "email": "driver@shipping.com", "password": "password123", "role": "staff", "department": "Fleet" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", created);
    let new_id = created["id"].as_i64().unwrap();

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/admin/users/{}/update-role", new_id),
            Some(&admin),
            Some(json!({ "role": "admin" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["new_role"], "admin");

    let (_, users) = app.get("/admin/users", Some(&admin)).await;
    assert_eq!(users["users"].as_array().unwrap().len(), 3);

    let (status, _) = app
        .call(Method::DELETE, &format!("/admin/users/{}", new_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, me) = app
        .post("/login", None, json!({ "email": SAMPLE_ADMIN_EMAIL, "password": SAMPLE_PASSWORD }))
        .await;
    let admin_id = me["user"]["id"].as_i64().unwrap();
    let (status, body) = app
        .call(Method::DELETE, &format!("/admin/users/{}", admin_id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Cannot delete your own account");
}
