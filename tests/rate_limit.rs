#![cfg(feature = "inmem-store")]

mod common;

use actix_web::{test, web, App};
use common::{jwt_keys, report_multipart, token, wallet_report, MockImageStore};
use lostfound::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use lostfound::repo::inmem::InMemRepo;
use lostfound::{config, AppState, EnginePolicy};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn limited_state() -> web::Data<AppState> {
    // only 1 report and 1 claim per large window so the second is denied
    let cfg = RateLimitConfig {
        report_limit: 1,
        report_window: Duration::from_secs(300),
        claim_limit: 1,
        claim_window: Duration::from_secs(300),
    };
    let limiter = RateLimiterFacade::new(InMemoryRateLimiter::new(true), cfg);
    web::Data::new(
        AppState::new(Arc::new(InMemRepo::new()), Arc::new(MockImageStore::default()), EnginePolicy::default())
            .with_rate_limiter(limiter),
    )
}

fn report(user: &str) -> test::TestRequest {
    let (ct, body) = report_multipart(&wallet_report(), &[], "RLBOUNDARY");
    test::TestRequest::post()
        .uri("/api/v1/items")
        .insert_header(("Authorization", format!("Bearer {}", token(user))))
        .insert_header(("Content-Type", ct))
        .set_payload(body)
}

#[actix_web::test]
#[serial_test::serial]
async fn rate_limit_reports_per_user() {
    let app = test::init_service(App::new().app_data(limited_state()).app_data(jwt_keys()).configure(config)).await;

    assert_eq!(test::call_service(&app, report("ana").to_request()).await.status(), 201);
    let resp = test::call_service(&app, report("ana").to_request()).await;
    assert_eq!(resp.status(), 429);
    let v: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["error"], "too_many_requests");

    // another user has their own budget
    assert_eq!(test::call_service(&app, report("ben").to_request()).await.status(), 201);
}

#[actix_web::test]
#[serial_test::serial]
async fn rate_limit_claims_per_user() {
    let app = test::init_service(App::new().app_data(limited_state()).app_data(jwt_keys()).configure(config)).await;
    let resp = test::call_service(&app, report("ana").to_request()).await;
    let item: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let id = item["id"].as_i64().unwrap();

    let claim = |user: &str| {
        test::TestRequest::post()
            .uri(&format!("/api/v1/items/{id}/claim"))
            .insert_header(("Authorization", format!("Bearer {}", token(user))))
            .set_json(&json!({"message": "mine"}))
            .to_request()
    };
    assert_eq!(test::call_service(&app, claim("ben")).await.status(), 200);
    // limiter runs before the duplicate check
    assert_eq!(test::call_service(&app, claim("ben")).await.status(), 429);
    assert_eq!(test::call_service(&app, claim("cat")).await.status(), 200);
}
