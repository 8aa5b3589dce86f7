#![cfg(feature = "inmem-store")]

mod common;

use actix_web::{test, web, App};
use common::{jwt_keys, keys, report_multipart, sample_png, token, wallet_report, MockImageStore};
use lostfound::repo::inmem::InMemRepo;
use lostfound::{config, AppState, EnginePolicy, SecurityHeaders};
use serde_json::{json, Value};
use serial_test::serial;
use std::sync::Arc;

fn bearer(user: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token(user)))
}

fn state() -> web::Data<AppState> {
    web::Data::new(AppState::new(
        Arc::new(InMemRepo::new()),
        Arc::new(MockImageStore::default()),
        EnginePolicy::default(),
    ))
}

#[actix_web::test]
#[serial]
async fn test_report_claim_resolve_flow_routes() {
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::default())
            .app_data(state())
            .app_data(jwt_keys())
            .configure(config),
    )
    .await;

    // health names the backend
    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let v: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(v["store"], "memory");

    // list empty
    let req = test::TestRequest::get().uri("/api/v1/items").to_request();
    let v: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(v["items"].as_array().unwrap().len(), 0);
    assert_eq!(v["total"], 0);

    // reporting needs a token
    let (ct, body) = report_multipart(&wallet_report(), &[], "XBOUNDARY");
    let req = test::TestRequest::post()
        .uri("/api/v1/items")
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    // report with one image
    let (ct, body) = report_multipart(&wallet_report(), &[("front.png", sample_png())], "XBOUNDARY");
    let req = test::TestRequest::post()
        .uri("/api/v1/items")
        .insert_header(bearer("ana"))
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let item: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let id = item["id"].as_i64().unwrap();
    assert_eq!(item["type"], "lost");
    assert_eq!(item["status"], "open");
    assert_eq!(item["owner"]["id"], "ana");
    assert_eq!(item["contactEmail"], "ana@campus.edu");
    assert_eq!(item["images"].as_array().unwrap().len(), 1);

    // public detail and filtered listing
    let req = test::TestRequest::get().uri(&format!("/api/v1/items/{id}")).to_request();
    let v: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(v["title"], "Blue wallet");
    let req = test::TestRequest::get().uri("/api/v1/items?type=found").to_request();
    let v: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(v["total"], 0);
    let req = test::TestRequest::get().uri("/api/v1/items?q=wallet&category=wallet").to_request();
    let v: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(v["total"], 1);

    // owner cannot claim
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/items/{id}/claim"))
        .insert_header(bearer("ana"))
        .set_json(&json!({"message": "mine"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
    let v: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["error"], "forbidden");

    // ben claims
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/items/{id}/claim"))
        .insert_header(bearer("ben"))
        .set_json(&json!({"message": "I lost it Monday", "proofDescription": "initials B.K. inside"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let v: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert!(v["message"].as_str().unwrap().starts_with("Claim submitted successfully"));
    assert_eq!(v["item"]["status"], "claimed");
    assert_eq!(v["item"]["claims"][0]["claimantId"], "ben");
    assert_eq!(v["item"]["claims"][0]["proofDescription"], "initials B.K. inside");

    // ben again -> conflict
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/items/{id}/claim"))
        .insert_header(bearer("ben"))
        .set_json(&json!({"message": "again"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 409);

    // ben sees his claim
    let req = test::TestRequest::get().uri("/api/v1/my/claims").insert_header(bearer("ben")).to_request();
    let v: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(v["items"][0]["id"], id);
    assert_eq!(v["items"][0]["myClaim"]["status"], "pending");

    // only the owner resolves
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/items/{id}/resolve"))
        .insert_header(bearer("ben"))
        .set_json(&json!({"claimantId": "ben"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/items/{id}/resolve"))
        .insert_header(bearer("ana"))
        .set_json(&json!({"claimantId": "ben", "note": "handed over"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let v: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["status"], "resolved");
    assert_eq!(v["claims"][0]["status"], "approved");
    assert_eq!(v["resolvedWith"]["userId"], "ben");

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/items/{id}/resolve"))
        .insert_header(bearer("ana"))
        .set_json(&json!({"claimantId": "ben"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 409);

    // my items for the owner, resolved items visible with status=all
    let req = test::TestRequest::get().uri("/api/v1/my/items").insert_header(bearer("ana")).to_request();
    let v: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(v["total"], 1);
    let req = test::TestRequest::get().uri("/api/v1/items?status=resolved").to_request();
    let v: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(v["total"], 1);
}

#[actix_web::test]
#[serial]
async fn test_validation_errors_are_field_level() {
    let app = test::init_service(App::new().app_data(state()).app_data(jwt_keys()).configure(config)).await;
    let mut form = wallet_report();
    form.kind = Some("misplaced".into());
    form.description = Some("short".into());
    form.date = None;
    let (ct, body) = report_multipart(&form, &[], "B0UNDARY");
    let req = test::TestRequest::post()
        .uri("/api/v1/items")
        .insert_header(bearer("ana"))
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let v: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["error"], "validation_error");
    let fields: Vec<&str> = v["fields"].as_array().unwrap().iter().map(|f| f["field"].as_str().unwrap()).collect();
    assert!(fields.contains(&"type"));
    assert!(fields.contains(&"description"));
    assert!(fields.contains(&"date"));
}

#[actix_web::test]
#[serial]
async fn test_not_found_and_bad_filters() {
    let app = test::init_service(App::new().app_data(state()).app_data(jwt_keys()).configure(config)).await;
    let req = test::TestRequest::get().uri("/api/v1/items/404").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::post()
        .uri("/api/v1/items/404/claim")
        .insert_header(bearer("ben"))
        .set_json(&json!({}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::get().uri("/api/v1/items?category=Spaceships").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
}

#[actix_web::test]
#[serial]
async fn test_auth_me_and_refresh() {
    let app = test::init_service(App::new().app_data(state()).app_data(jwt_keys()).configure(config)).await;
    let req = test::TestRequest::get().uri("/api/v1/auth/me").insert_header(bearer("ana")).to_request();
    let v: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(v["id"], "ana");
    assert_eq!(v["name"], "ana name");

    let req = test::TestRequest::post().uri("/api/v1/auth/refresh").insert_header(bearer("ana")).to_request();
    let v: Value = test::call_and_read_body_json(&app, req).await;
    let fresh = v["token"].as_str().unwrap();
    assert_eq!(lostfound::auth::resolve_identity(&keys(), fresh).unwrap().sub, "ana");

    let req = test::TestRequest::get().uri("/api/v1/auth/me").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
#[serial]
async fn test_mistyped_claim_body_is_rejected_and_retry_succeeds() {
    let app = test::init_service(App::new().app_data(state()).app_data(jwt_keys()).configure(config)).await;
    let (ct, body) = report_multipart(&wallet_report(), &[], "CLAIMBOUNDARY");
    let req = test::TestRequest::post()
        .uri("/api/v1/items")
        .insert_header(bearer("ana"))
        .insert_header(("Content-Type", ct))
        .set_payload(body)
        .to_request();
    let item: Value = serde_json::from_slice(&test::read_body(test::call_service(&app, req).await).await).unwrap();
    let id = item["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/items/{id}/claim"))
        .insert_header(bearer("ben"))
        .set_json(&json!({"message": "It's mine", "proofDescription": 42}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let v: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["error"], "validation_error");
    assert_eq!(v["fields"][0]["field"], "body");

    // nothing was stored, so the corrected claim goes through
    let req = test::TestRequest::get().uri(&format!("/api/v1/items/{id}")).to_request();
    let v: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(v["claims"].as_array().unwrap().len(), 0);
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/items/{id}/claim"))
        .insert_header(bearer("ben"))
        .set_json(&json!({"message": "It's mine", "proofDescription": "red stitching"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let v: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["item"]["claims"][0]["proofDescription"], "red stitching");

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/items/{id}/claim"))
        .insert_header(bearer("cat"))
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{not json")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
}

#[actix_web::test]
#[serial]
async fn test_extractor_failures_use_error_body() {
    let app = test::init_service(App::new().app_data(state()).app_data(jwt_keys()).configure(config)).await;

    let req = test::TestRequest::get().uri("/api/v1/items/abc").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    let v: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["error"], "not_found");
    assert!(v["message"].is_string());

    let req = test::TestRequest::get().uri("/api/v1/items?page=x").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let v: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["error"], "validation_error");
    assert_eq!(v["fields"][0]["field"], "query");

    let req = test::TestRequest::get().uri("/api/v1/my/items?limit=-1").insert_header(bearer("ana")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let v: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["error"], "validation_error");

    let req = test::TestRequest::post()
        .uri("/api/v1/items/1/resolve")
        .insert_header(bearer("ana"))
        .set_json(&json!({"claimantId": "ben", "note": 5}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let v: Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(v["fields"][0]["field"], "body");
}
