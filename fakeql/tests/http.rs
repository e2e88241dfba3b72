use std::time::Duration;

use axum::body::Body;
use fakeql::MockSchema;
use fakeql::MockServer;
use http::Request;
use http::StatusCode;
use http_body_util::BodyExt;
use serde_json::Value;
use serde_json::json;
use tower::ServiceExt;

fn test_router() -> axum::Router {
    let schema = MockSchema::builder()
        .resolver_latency(Duration::ZERO)
        .fetch_latency(Duration::ZERO)
        .build()
        .expect("canned schema assembles");
    MockServer::builder().schema(schema).build().router()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body is json")
}

#[tokio::test]
async fn posted_queries_come_back_with_fabricated_data() {
    let router = test_router();
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/graphql")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"query":"{ shop { name } }"}"#))
                .expect("request builds"),
        )
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json.get("errors").is_none(), "unexpected errors: {json}");
    assert!(json["data"]["shop"]["name"].is_string());
}

#[tokio::test]
async fn health_check_reports_up() {
    let router = test_router();
    let response = router
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "status": "UP" }));
}

#[tokio::test]
async fn the_graphql_endpoint_serves_graphiql_on_get() {
    let router = test_router();
    let response = router
        .oneshot(
            Request::builder()
                .uri("/graphql")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/html"), "{content_type}");
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes();
    let page = String::from_utf8_lossy(&bytes);
    assert!(page.to_ascii_lowercase().contains("graphiql"));
}
