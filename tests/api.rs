use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

use seat_booking::{
    cache::MemoryRevocationStore,
    clock::ManualClock,
    config::Config,
    middleware::Claims,
    models::Money,
    repository::MemoryRepository,
    router,
    services::payment::{PaymentError, PaymentGateway, PaymentVerdict},
    AppState,
};

/// Шлюз-заглушка: `pay_*` проходят, `declined_*` отклоняются, остальное - сбой сети.
struct StubGateway;

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn confirm_payment(&self, payment_ref: &str, _amount: Money) -> Result<PaymentVerdict, PaymentError> {
        if payment_ref.starts_with("pay_") {
            Ok(PaymentVerdict::Confirmed)
        } else if payment_ref.starts_with("declined_") {
            Ok(PaymentVerdict::Declined { reason: "insufficient funds".into() })
        } else {
            Err(PaymentError::Gateway("gateway is down".into()))
        }
    }
}

struct TestApp {
    app: Router,
    state: Arc<AppState>,
    clock: Arc<ManualClock>,
}

impl TestApp {
    async fn new() -> Self {
        let vars = HashMap::from([
            ("STORAGE_BACKEND", "memory"),
            ("JWT_SECRET", "integration-secret"),
            ("MERCHANT_ID", "cinema"),
            ("MERCHANT_PASSWORD", "pw"),
            ("PLATFORM_FEE", "40"),
            ("HOLD_TTL_SECONDS", "120"),
        ]);
        let config = Config::from_map(&vars).unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let state = AppState::from_parts(
            config,
            Arc::new(MemoryRepository::new()),
            Arc::new(MemoryRevocationStore::new()),
            Arc::new(StubGateway),
            clock.clone(),
        )
        .await
        .unwrap();

        Self { app: router(state.clone()), state, clock }
    }

    fn token(&self, user: &str, role: Option<&str>) -> String {
        self.state
            .verifier
            .issue(&Claims {
                sub: user.to_string(),
                role: role.map(str::to_string),
                exp: (Utc::now() + Duration::hours(1)).timestamp(),
                jti: Some(format!("{user}-session")),
            })
            .unwrap()
    }

    async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    /// Шоу 5x4, ряды 1-2 по 100, остальные по 200, и один сеанс.
    async fn seed(&self, provider: &str) -> (String, String) {
        let token = self.token(provider, None);
        let (status, show) = self
            .call(
                Method::POST,
                "/api/shows",
                Some(&token),
                Some(json!({
                    "title": "Interstellar",
                    "release_date": "2014-11-07",
                    "rating": 8.7,
                    "seating": { "rows": 5, "columns": 4, "low_price_rows": 2, "low_price": 100, "high_price": 200 }
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let show_id = show["id"].as_str().unwrap().to_string();

        let (status, showtime) = self
            .call(
                Method::POST,
                &format!("/api/shows/{show_id}/showtimes"),
                Some(&token),
                Some(json!({ "location": "PVR Forum", "date": "2025-06-01", "time": "19:30:00" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        (show_id, showtime["id"].as_str().unwrap().to_string())
    }
}

#[tokio::test]
async fn health_is_public() {
    let t = TestApp::new().await;
    let (status, body) = t.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".into()));
}

#[tokio::test]
async fn protected_routes_require_token() {
    let t = TestApp::new().await;
    let (status, body) = t.call(Method::GET, "/api/bookings", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthenticated");

    let (status, _) = t.call(Method::GET, "/api/bookings", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn show_details_list_tiers_and_showtimes() {
    let t = TestApp::new().await;
    let (show_id, showtime_id) = t.seed("provider").await;

    let (status, body) = t.call(Method::GET, &format!("/api/shows/{show_id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Interstellar");
    assert_eq!(body["price_tiers"][1]["price"], 200);
    assert_eq!(body["showtimes"][0]["id"], Value::String(showtime_id));

    let (status, body) = t.call(Method::GET, "/api/shows", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn hold_confirm_refund_flow() {
    let t = TestApp::new().await;
    let (_, showtime_id) = t.seed("provider").await;
    let alice = t.token("alice", None);
    let bob = t.token("bob", None);
    let admin = t.token("root", Some("admin"));

    // alice держит A1, A2, C3
    let (status, hold) = t
        .call(
            Method::POST,
            &format!("/api/showtimes/{showtime_id}/holds"),
            Some(&alice),
            Some(json!({ "seats": ["A1", "A2", "C3"] })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(hold["quote"]["ticket_cost"], 400);
    assert_eq!(hold["quote"]["tax"], 72);
    assert_eq!(hold["quote"]["total"], 512);
    let hold_id = hold["id"].as_str().unwrap().to_string();

    // bob пересекается по C3
    let (status, body) = t
        .call(
            Method::POST,
            &format!("/api/showtimes/{showtime_id}/holds"),
            Some(&bob),
            Some(json!({ "seats": ["C3", "C4"] })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "seat_unavailable");
    assert_eq!(body["conflicts"], json!(["C3"]));

    // чужой холд подтвердить нельзя
    let (status, _) = t
        .call(
            Method::POST,
            &format!("/api/holds/{hold_id}/confirm"),
            Some(&bob),
            Some(json!({ "payment_ref": "pay_bob" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, booking) = t
        .call(
            Method::POST,
            &format!("/api/holds/{hold_id}/confirm"),
            Some(&alice),
            Some(json!({ "payment_ref": "pay_alice_1" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking["status"], "confirmed");
    assert_eq!(booking["seats"], json!(["A1", "A2", "C3"]));
    let booking_id = booking["id"].as_str().unwrap().to_string();

    let (_, seat_map) = t.call(Method::GET, &format!("/api/showtimes/{showtime_id}/seats"), None, None).await;
    assert_eq!(seat_map["occupied"], 3);
    assert_eq!(seat_map["seats"][2][2], "occupied");

    let (status, list) = t.call(Method::GET, "/api/bookings", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, _) = t.call(Method::GET, &format!("/api/bookings/{booking_id}"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = t.call(Method::GET, &format!("/api/bookings/{booking_id}"), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, pending) = t
        .call(Method::POST, &format!("/api/bookings/{booking_id}/refund"), Some(&alice), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending["status"], "refund_requested");

    // очередь возвратов видит только администратор
    let (status, _) = t.call(Method::GET, "/api/bookings/refunds", Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, queue) = t.call(Method::GET, "/api/bookings/refunds", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(queue.as_array().unwrap().len(), 1);
    assert_eq!(queue[0]["id"], booking_id.as_str());

    let resolve = format!("/api/bookings/{booking_id}/refund/resolve");
    let (status, _) = t.call(Method::POST, &resolve, Some(&alice), Some(json!({ "approve": true }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, refunded) = t.call(Method::POST, &resolve, Some(&admin), Some(json!({ "approve": true }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refunded["status"], "refunded");

    let (status, _) = t.call(Method::POST, &resolve, Some(&admin), Some(json!({ "approve": true }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, queue) = t.call(Method::GET, "/api/bookings/refunds", Some(&admin), None).await;
    assert_eq!(queue, json!([]));

    // места снова свободны
    let (status, _) = t
        .call(
            Method::POST,
            &format!("/api/showtimes/{showtime_id}/holds"),
            Some(&bob),
            Some(json!({ "seats": ["C3"] })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn expired_hold_is_gone() {
    let t = TestApp::new().await;
    let (_, showtime_id) = t.seed("provider").await;
    let alice = t.token("alice", None);

    let (_, hold) = t
        .call(
            Method::POST,
            &format!("/api/showtimes/{showtime_id}/holds"),
            Some(&alice),
            Some(json!({ "seats": ["B1"] })),
        )
        .await;
    let hold_id = hold["id"].as_str().unwrap().to_string();

    t.clock.advance(Duration::seconds(121));

    let (status, body) = t
        .call(
            Method::POST,
            &format!("/api/holds/{hold_id}/confirm"),
            Some(&alice),
            Some(json!({ "payment_ref": "pay_late" })),
        )
        .await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["error"], "hold_expired");

    let (_, seat_map) = t.call(Method::GET, &format!("/api/showtimes/{showtime_id}/seats"), None, None).await;
    assert_eq!(seat_map["free"], 20);
}

#[tokio::test]
async fn payment_outcomes_keep_the_hold() {
    let t = TestApp::new().await;
    let (_, showtime_id) = t.seed("provider").await;
    let alice = t.token("alice", None);

    let (_, hold) = t
        .call(
            Method::POST,
            &format!("/api/showtimes/{showtime_id}/holds"),
            Some(&alice),
            Some(json!({ "seats": ["D4"] })),
        )
        .await;
    let confirm = format!("/api/holds/{}/confirm", hold["id"].as_str().unwrap());

    let (status, _) = t.call(Method::POST, &confirm, Some(&alice), Some(json!({ "payment_ref": "declined_1" }))).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);

    let (status, _) = t.call(Method::POST, &confirm, Some(&alice), Some(json!({ "payment_ref": "offline_1" }))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (status, _) = t.call(Method::POST, &confirm, Some(&alice), Some(json!({ "payment_ref": "pay_ok" }))).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn payment_reference_cannot_be_reused() {
    let t = TestApp::new().await;
    let (_, showtime_id) = t.seed("provider").await;
    let alice = t.token("alice", None);
    let holds = format!("/api/showtimes/{showtime_id}/holds");

    let (_, first) = t.call(Method::POST, &holds, Some(&alice), Some(json!({ "seats": ["A1"] }))).await;
    let (_, second) = t.call(Method::POST, &holds, Some(&alice), Some(json!({ "seats": ["A2"] }))).await;

    let (status, _) = t
        .call(
            Method::POST,
            &format!("/api/holds/{}/confirm", first["id"].as_str().unwrap()),
            Some(&alice),
            Some(json!({ "payment_ref": "pay_same" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = t
        .call(
            Method::POST,
            &format!("/api/holds/{}/confirm", second["id"].as_str().unwrap()),
            Some(&alice),
            Some(json!({ "payment_ref": "pay_same" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_transition");
}

#[tokio::test]
async fn concurrent_confirms_with_one_payment_reference() {
    let t = TestApp::new().await;
    let (_, showtime_id) = t.seed("provider").await;
    let alice = t.token("alice", None);
    let holds = format!("/api/showtimes/{showtime_id}/holds");

    let (_, first) = t.call(Method::POST, &holds, Some(&alice), Some(json!({ "seats": ["E1"] }))).await;
    let (_, second) = t.call(Method::POST, &holds, Some(&alice), Some(json!({ "seats": ["E2"] }))).await;
    let confirm = |hold: &Value| format!("/api/holds/{}/confirm", hold["id"].as_str().unwrap());
    let (first_uri, second_uri) = (confirm(&first), confirm(&second));

    let ((a, _), (b, _)) = tokio::join!(
        t.call(Method::POST, &first_uri, Some(&alice), Some(json!({ "payment_ref": "pay_shared" }))),
        t.call(Method::POST, &second_uri, Some(&alice), Some(json!({ "payment_ref": "pay_shared" }))),
    );

    let mut outcomes = vec![a, b];
    outcomes.sort();
    assert_eq!(outcomes, vec![StatusCode::CREATED, StatusCode::CONFLICT]);

    let (_, list) = t.call(Method::GET, "/api/bookings", Some(&alice), None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn oversized_seating_is_rejected() {
    let t = TestApp::new().await;
    let token = t.token("provider", None);

    for seating in [
        json!({ "rows": 100000, "columns": 100000, "low_price_rows": 1, "low_price": 100, "high_price": 200 }),
        json!({ "rows": 5, "columns": 4, "low_price_rows": 2, "low_price": 100, "high_price": i64::MAX / 10 }),
    ] {
        let (status, body) = t
            .call(
                Method::POST,
                "/api/shows",
                Some(&token),
                Some(json!({ "title": "Tenet", "release_date": "2020-08-26", "rating": 7.3, "seating": seating })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_spec");
    }

    let (_, shows) = t.call(Method::GET, "/api/shows", None, None).await;
    assert_eq!(shows, json!([]));
}

#[tokio::test]
async fn bad_seat_requests_are_rejected() {
    let t = TestApp::new().await;
    let (_, showtime_id) = t.seed("provider").await;
    let alice = t.token("alice", None);
    let holds = format!("/api/showtimes/{showtime_id}/holds");

    let (status, _) = t.call(Method::POST, &holds, Some(&alice), Some(json!({ "seats": [] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t.call(Method::POST, &holds, Some(&alice), Some(json!({ "seats": ["Z9"] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t.call(Method::POST, &holds, Some(&alice), Some(json!({ "seats": ["1A"] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unknown = format!("/api/showtimes/{}/holds", uuid::Uuid::new_v4());
    let (status, _) = t.call(Method::POST, &unknown, Some(&alice), Some(json!({ "seats": ["A1"] }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn release_then_rehold() {
    let t = TestApp::new().await;
    let (_, showtime_id) = t.seed("provider").await;
    let alice = t.token("alice", None);
    let bob = t.token("bob", None);
    let holds = format!("/api/showtimes/{showtime_id}/holds");

    let (_, hold) = t.call(Method::POST, &holds, Some(&alice), Some(json!({ "seats": ["E1"] }))).await;
    let hold_uri = format!("/api/holds/{}", hold["id"].as_str().unwrap());

    let (status, body) = t.call(Method::GET, &hold_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["seats"], json!(["E1"]));

    let (status, _) = t.call(Method::DELETE, &hold_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = t.call(Method::DELETE, &hold_uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = t.call(Method::POST, &holds, Some(&bob), Some(json!({ "seats": ["E1"] }))).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn provider_owns_show_lifecycle() {
    let t = TestApp::new().await;
    let (show_id, showtime_id) = t.seed("provider").await;
    let provider = t.token("provider", None);
    let stranger = t.token("stranger", None);
    let show_uri = format!("/api/shows/{show_id}");

    let (status, _) = t.call(Method::PUT, &show_uri, Some(&stranger), Some(json!({ "title": "Mine" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = t.call(Method::PUT, &show_uri, Some(&provider), Some(json!({ "rating": 9.0 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rating"], 9.0);

    let (status, _) = t.call(Method::PUT, &show_uri, Some(&provider), Some(json!({ "rating": 11.0 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // активный холд блокирует удаление
    let alice = t.token("alice", None);
    let (_, hold) = t
        .call(
            Method::POST,
            &format!("/api/showtimes/{showtime_id}/holds"),
            Some(&alice),
            Some(json!({ "seats": ["A1"] })),
        )
        .await;
    let (status, _) = t.call(Method::DELETE, &show_uri, Some(&provider), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    t.call(Method::DELETE, &format!("/api/holds/{}", hold["id"].as_str().unwrap()), Some(&alice), None)
        .await;
    let (status, _) = t.call(Method::DELETE, &show_uri, Some(&provider), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = t.call(Method::GET, &show_uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = t.call(Method::GET, &format!("/api/showtimes/{showtime_id}/seats"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn revoked_token_stops_working() {
    let t = TestApp::new().await;
    let alice = t.token("alice", None);

    let (status, _) = t.call(Method::POST, "/api/auth/revoke", Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = t.call(Method::GET, "/api/bookings", Some(&alice), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
