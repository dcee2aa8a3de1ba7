mod common;

use actix_web::http::{header, StatusCode};
use actix_web::{test, App};
use common::{Harness, PASSWORD, TEST_SECRET};
use newsdesk_backend::helper::auth_helpers;
use newsdesk_backend::models::{Role, User};
use newsdesk_backend::routes;
use serde_json::{json, Value};

macro_rules! service {
    ($data:expr) => {
        test::init_service(
            App::new()
                .app_data($data.config.clone())
                .app_data($data.db.clone())
                .app_data($data.pool.clone())
                .app_data($data.state.clone())
                .configure(routes::config_api),
        )
        .await
    };
}

fn bearer(user: &User) -> (header::HeaderName, String) {
    let token = auth_helpers::generate_token(user, TEST_SECRET, 1).unwrap();
    (header::AUTHORIZATION, format!("Bearer {}", token))
}

#[actix_web::test]
async fn health_check_is_public() {
    let data = Harness::new().into_app_data();
    let app = service!(data);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "active");
}

#[actix_web::test]
async fn protected_routes_require_a_valid_token() {
    let data = Harness::new().into_app_data();
    let app = service!(data);

    let resp = test::call_service(&app, test::TestRequest::get().uri("/api/posts").to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "unauthorized");

    let req = test::TestRequest::get()
        .uri("/api/auth/me")
        .insert_header((header::AUTHORIZATION, "Bearer not-a-token"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn login_issues_a_token_for_me() {
    let h = Harness::new();
    h.superadmin();
    let data = h.into_app_data();
    let app = service!(data);

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "username": "chief", "password": "wrong-password" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "username": "chief", "password": PASSWORD }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["success"], true);
    let token = body["data"]["token"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri("/api/auth/me")
        .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["username"], "chief");
    assert_eq!(body["data"]["role"], "superadmin");
}

#[actix_web::test]
async fn malformed_bodies_are_validation_errors() {
    let h = Harness::new();
    let chief = h.superadmin();
    let data = h.into_app_data();
    let app = service!(data);

    let req = test::TestRequest::post()
        .uri("/api/categories")
        .insert_header(bearer(&chief))
        .insert_header((header::CONTENT_TYPE, "application/json"))
        .set_payload("{\"name\": ")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "validation");
}

#[actix_web::test]
async fn publish_and_list_posts_over_http() {
    let h = Harness::new();
    let chief = h.superadmin();
    let viewer = h.user("viewer", Role::Admin, false);
    let data = h.into_app_data();
    let app = service!(data);

    let req = test::TestRequest::post()
        .uri("/api/categories")
        .insert_header(bearer(&viewer))
        .set_json(json!({ "name": "Markets" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::post()
        .uri("/api/categories")
        .insert_header(bearer(&chief))
        .set_json(json!({ "name": "Markets", "description": "Equities and bonds" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    let category_id = body["data"]["id"].as_i64().unwrap();

    for title in ["Stocks climb", "Bonds slip", "Dollar firm"] {
        let req = test::TestRequest::post()
            .uri("/api/posts")
            .insert_header(bearer(&chief))
            .set_json(json!({ "title": title, "body": "Full story.", "categoryId": category_id, "tags": ["markets"] }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["post"]["status"], "published");
    }

    let req = test::TestRequest::get()
        .uri("/api/posts?status=published&limit=2&page=1")
        .insert_header(bearer(&viewer))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["pagination"]["total"], 3);
    assert_eq!(body["pagination"]["totalPages"], 2);

    let req = test::TestRequest::get().uri("/api/posts/not-a-uuid").insert_header(bearer(&viewer)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn unread_count_starts_at_zero() {
    let h = Harness::new();
    let viewer = h.user("viewer", Role::Admin, false);
    let data = h.into_app_data();
    let app = service!(data);

    let req = test::TestRequest::get()
        .uri("/api/notifications/in-app/count")
        .insert_header(bearer(&viewer))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["unread"], 0);

    let req = test::TestRequest::post()
        .uri("/api/notifications/in-app/42/read")
        .insert_header(bearer(&viewer))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}
