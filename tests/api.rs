//! End-to-end tests for the HTTP surface. Each test builds the router over a
//! fresh SQLite catalog in a temp directory and drives it with `oneshot`.

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;
use videocat::api::{self, AppState};
use videocat::fields::{FieldPaths, SearchFallback};
use videocat::pager::MAX_PAGE_LIMIT;
use videocat::query::FilterCompiler;
use videocat::store::SqliteStore;

fn build_app(paths: FieldPaths) -> (TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("catalog.db"), paths.clone()).unwrap();
    let compiler = FilterCompiler::new(paths, SearchFallback::Skip);
    let app = api::router(AppState::new(store, compiler, MAX_PAGE_LIMIT));
    (dir, app)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn create(app: &Router, body: Value) -> Value {
    let (status, json) = send(app, Method::POST, "/api/videos", Some(body)).await;
    assert_eq!(status, StatusCode::OK, "create failed: {json}");
    json
}

#[tokio::test]
async fn root_reports_liveness() {
    let (_dir, app) = build_app(FieldPaths::flat());
    let (status, json) = send(&app, Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["message"].as_str().unwrap().contains("running"));
}

#[tokio::test]
async fn create_rejects_blank_title() {
    let (_dir, app) = build_app(FieldPaths::flat());
    let (status, json) =
        send(&app, Method::POST, "/api/videos", Some(json!({"title": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "Title is mandatory and cannot be empty.");
}

#[tokio::test]
async fn created_video_is_listed() {
    let (_dir, app) = build_app(FieldPaths::nested());
    let created = create(
        &app,
        json!({"title": "X", "sourceUrl": "https://youtu.be/k3y", "ignored": 1}),
    )
    .await;
    assert_eq!(created["title"], "X");
    assert_eq!(created["sourceUrl"], "https://www.youtube.com/watch?v=k3y");
    assert!(created.get("ignored").is_none());

    let (status, page) = send(&app, Method::GET, "/api/videos?title=x", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["count"], 1);
    assert_eq!(page["data"][0]["id"], created["id"]);
    assert_eq!(page["data"][0]["title"], "X");
    assert_eq!(page["next_cursor"], Value::Null);
    assert_eq!(page["estimated_count"], 1);
    assert!(page.get("filter_counts").is_none());
}

#[tokio::test]
async fn listing_pages_with_cursor() {
    let (_dir, app) = build_app(FieldPaths::flat());
    for title in ["one", "two", "three"] {
        create(&app, json!({"title": title})).await;
    }

    let (_, first) = send(&app, Method::GET, "/api/videos?limit=2", None).await;
    assert_eq!(first["count"], 2);
    let cursor = first["next_cursor"].as_str().unwrap().to_string();
    assert_eq!(first["data"][1]["id"], cursor.as_str());

    let uri = format!("/api/videos?limit=2&last_id={cursor}");
    let (_, second) = send(&app, Method::GET, &uri, None).await;
    assert_eq!(second["count"], 1);
    assert_eq!(second["data"][0]["title"], "three");
    assert_eq!(second["next_cursor"], Value::Null);
}

#[tokio::test]
async fn listing_validates_limit_and_cursor() {
    let (_dir, app) = build_app(FieldPaths::flat());

    let (status, json) = send(&app, Method::GET, "/api/videos?limit=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");

    let (status, _) = send(&app, Method::GET, "/api/videos?limit=-4", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(&app, Method::GET, "/api/videos?last_id=xyz", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_CURSOR");
}

#[tokio::test]
async fn listing_reports_filter_counts_on_request() {
    let (_dir, app) = build_app(FieldPaths::flat());
    create(&app, json!({"title": "cat nap", "transcriptText": "purr"})).await;
    create(&app, json!({"title": "dog walk", "transcriptText": "purr purr"})).await;

    let uri = "/api/videos?title=cat&transcriptText=purr&filter_counts=true";
    let (status, page) = send(&app, Method::GET, uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["count"], 1);
    assert_eq!(
        page["filter_counts"],
        json!({"title": 1, "description": 0, "transcriptText": 2, "search": 0})
    );
}

#[tokio::test]
async fn update_changes_only_named_fields() {
    let (_dir, app) = build_app(FieldPaths::flat());
    let created = create(&app, json!({"title": "X", "description": "d"})).await;
    let uri = format!("/api/videos/{}", created["id"].as_str().unwrap());

    let (status, json) = send(&app, Method::PUT, &uri, Some(json!({"unknownField": 1}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "No valid fields to update");

    let (status, updated) = send(&app, Method::PUT, &uri, Some(json!({"title": "Y"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "Y");
    assert_eq!(updated["description"], "d");

    let (status, _) = send(&app, Method::PUT, "/api/videos/987", Some(json!({"title": "Z"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) =
        send(&app, Method::PUT, "/api/videos/nope", Some(json!({"title": "Z"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "INVALID_IDENTIFIER");
}

#[tokio::test]
async fn delete_then_delete_again_is_not_found() {
    let (_dir, app) = build_app(FieldPaths::flat());
    let created = create(&app, json!({"title": "X"})).await;
    let uri = format!("/api/videos/{}", created["id"].as_str().unwrap());

    let (status, json) = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Video deleted successfully");

    let (status, json) = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");

    let (status, _) = send(&app, Method::DELETE, "/api/videos/bad-id", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn filter_counts_on_both_routes() {
    let (_dir, app) = build_app(FieldPaths::nested());
    create(&app, json!({"title": "My cat", "description": "pets"})).await;
    create(&app, json!({"title": "Morning", "description": "a cat sleeps"})).await;
    create(&app, json!({"title": "Dogs", "description": "walks"})).await;

    let expected = json!({"titleDocs": 1, "descDocs": 1, "transDocs": 0, "totalDocs": 2});
    for uri in ["/api/filter_counts?search=cat", "/api/videos/filter_counts?search=cat"] {
        let (status, json) = send(&app, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(json, expected, "{uri}");
    }

    let (status, json) = send(&app, Method::GET, "/api/filter_counts?keyword=zebra", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["totalDocs"], 0);

    let (status, _) = send(&app, Method::GET, "/api/filter_counts", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn search_modes_through_listing() {
    let (_dir, app) = build_app(FieldPaths::flat());
    create(&app, json!({"title": "Cat basics", "viewCount": 1234})).await;
    create(&app, json!({"title": "Dog basics", "viewCount": 99, "transcriptText": "a cat"})).await;
    create(&app, json!({"title": "Birds", "viewCount": 5})).await;

    let titles = |page: &Value| -> Vec<String> {
        page["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|record| record["title"].as_str().unwrap().to_string())
            .collect()
    };

    let (status, page) = send(&app, Method::GET, "/api/videos?search=cat", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(titles(&page), ["Cat basics", "Dog basics"]);

    let uri = "/api/videos?search=23&search_field=viewCount";
    let (_, page) = send(&app, Method::GET, uri, None).await;
    assert_eq!(titles(&page), ["Cat basics"]);

    let uri = "/api/videos?search=cat&search_field=bogus";
    let (_, page) = send(&app, Method::GET, uri, None).await;
    assert_eq!(titles(&page), ["Cat basics", "Dog basics", "Birds"]);
}

#[tokio::test]
async fn malformed_requests_use_the_error_envelope() {
    let (_dir, app) = build_app(FieldPaths::flat());

    let (status, json) = send(&app, Method::GET, "/api/videos?limit=abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(json["error"].is_string());

    let (status, json) = send(&app, Method::GET, "/api/videos?filter_counts=maybe", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/videos")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn listing_matches_non_ascii_case_insensitively() {
    let (_dir, app) = build_app(FieldPaths::nested());
    create(&app, json!({"title": "école primaire"})).await;

    let (_, page) = send(&app, Method::GET, "/api/videos?title=%C3%89COLE", None).await;
    assert_eq!(page["count"], 1);

    let (_, counts) = send(&app, Method::GET, "/api/filter_counts?search=%C3%89COLE", None).await;
    assert_eq!(counts["titleDocs"], 1);
}
