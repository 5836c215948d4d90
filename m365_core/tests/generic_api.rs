mod common;

use common::{call_tool, json_body, registry, text, token_endpoint, TOKEN};
use m365_core::ToolError;
use mockito::{Matcher, Server};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::io::Write;
use std::time::{Duration, Instant};

#[tokio::test]
async fn transient_failure_is_retried_then_succeeds() {
    let mut server = Server::new_async().await;
    token_endpoint(&mut server, 3600).create_async().await;
    let unavailable = server
        .mock("GET", "/v1.0/organization")
        .with_status(503)
        .with_body(r#"{"error":{"code":"serviceNotAvailable","message":"try later"}}"#)
        .expect(1)
        .create_async()
        .await;
    let ok = server
        .mock("GET", "/v1.0/organization")
        .match_header("authorization", format!("Bearer {}", TOKEN).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"value":[{"id":"org-1","displayName":"Contoso"}]}"#)
        .expect(1)
        .create_async()
        .await;

    let registry = registry(&server);
    let result = call_tool(
        &registry,
        "call_microsoft_api",
        json!({"apiType": "graph", "path": "/organization", "retryDelay": 1}),
    )
    .await
    .unwrap();

    assert_eq!(json_body(&result)["value"][0]["displayName"], "Contoso");
    unavailable.assert_async().await;
    ok.assert_async().await;
}

#[tokio::test]
async fn exhausted_retries_surface_the_upstream_error() {
    let mut server = Server::new_async().await;
    token_endpoint(&mut server, 3600).create_async().await;
    let throttled = server
        .mock("GET", "/v1.0/users")
        .with_status(429)
        .with_body(r#"{"error":{"code":"TooManyRequests","message":"Rate limit exceeded"}}"#)
        .expect(3)
        .create_async()
        .await;

    let registry = registry(&server);
    let err = call_tool(
        &registry,
        "call_microsoft_api",
        json!({"apiType": "graph", "path": "/users", "maxRetries": 2, "retryDelay": 1}),
    )
    .await
    .unwrap_err();

    match err {
        ToolError::Upstream { status, message } => {
            assert_eq!(status, 429);
            assert!(message.contains("Rate limit exceeded"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    throttled.assert_async().await;
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let mut server = Server::new_async().await;
    token_endpoint(&mut server, 3600).create_async().await;
    let missing = server
        .mock("GET", "/v1.0/users/nobody")
        .with_status(404)
        .with_body(r#"{"error":{"code":"Request_ResourceNotFound","message":"Resource 'nobody' does not exist"}}"#)
        .expect(1)
        .create_async()
        .await;

    let registry = registry(&server);
    let err = call_tool(
        &registry,
        "call_microsoft_api",
        json!({"apiType": "graph", "path": "/users/nobody", "retryDelay": 1}),
    )
    .await
    .unwrap_err();

    assert_eq!(err.upstream_status(), Some(404));
    missing.assert_async().await;
}

#[tokio::test]
async fn fetch_all_concatenates_pages() {
    let mut server = Server::new_async().await;
    token_endpoint(&mut server, 3600).create_async().await;
    let next = format!("{}/v1.0/users?$skiptoken=p2", server.url());
    let first = server
        .mock("GET", "/v1.0/users")
        .match_query(Matcher::UrlEncoded("$top".into(), "2".into()))
        .with_status(200)
        .with_body(
            json!({
                "value": [{"id": "u1"}, {"id": "u2"}],
                "@odata.nextLink": next
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let second = server
        .mock("GET", "/v1.0/users")
        .match_query(Matcher::UrlEncoded("$skiptoken".into(), "p2".into()))
        .with_status(200)
        .with_body(json!({"value": [{"id": "u3"}]}).to_string())
        .expect(1)
        .create_async()
        .await;

    let registry = registry(&server);
    let result = call_tool(
        &registry,
        "call_microsoft_api",
        json!({"apiType": "graph", "path": "/users", "queryParams": {"$top": 2}, "fetchAll": true}),
    )
    .await
    .unwrap();

    let body = json_body(&result);
    assert_eq!(body["pageCount"], 2);
    assert_eq!(body["value"], json!([{"id": "u1"}, {"id": "u2"}, {"id": "u3"}]));
    assert!(body.get("@odata.nextLink").is_none());
    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn azure_calls_require_api_version_before_any_request() {
    let mut server = Server::new_async().await;
    let token = token_endpoint(&mut server, 3600).expect(0).create_async().await;
    let arm = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let registry = registry(&server);
    let err = call_tool(
        &registry,
        "call_microsoft_api",
        json!({"apiType": "azure", "path": "/resourceGroups", "subscriptionId": "sub-1"}),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ToolError::InvalidParams(_)));
    token.assert_async().await;
    arm.assert_async().await;
}

#[tokio::test]
async fn azure_paths_get_subscription_prefix_and_api_version() {
    let mut server = Server::new_async().await;
    token_endpoint(&mut server, 3600)
        .match_body(Matcher::UrlEncoded(
            "scope".into(),
            "https://management.azure.com/.default".into(),
        ))
        .create_async()
        .await;
    let arm = server
        .mock("GET", "/subscriptions/sub-1/resourceGroups")
        .match_query(Matcher::UrlEncoded("api-version".into(), "2021-04-01".into()))
        .with_status(200)
        .with_body(r#"{"value":[{"name":"rg-prod"}]}"#)
        .expect(1)
        .create_async()
        .await;

    let registry = registry(&server);
    let result = call_tool(
        &registry,
        "call_microsoft_api",
        json!({
            "apiType": "azure",
            "path": "/resourceGroups",
            "subscriptionId": "sub-1",
            "apiVersion": "2021-04-01",
            "responseFormat": "minimal"
        }),
    )
    .await
    .unwrap();

    assert_eq!(json_body(&result), json!([{"name": "rg-prod"}]));
    arm.assert_async().await;
}

#[tokio::test]
async fn empty_response_reports_status() {
    let mut server = Server::new_async().await;
    token_endpoint(&mut server, 3600).create_async().await;
    server
        .mock("DELETE", "/v1.0/groups/g1")
        .with_status(204)
        .create_async()
        .await;

    let registry = registry(&server);
    let result = call_tool(
        &registry,
        "call_microsoft_api",
        json!({"apiType": "graph", "path": "/groups/g1", "method": "DELETE"}),
    )
    .await
    .unwrap();

    assert_eq!(text(&result), "Request completed with status 204");
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_token_endpoint_is_bounded_by_the_call_timeout() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", format!("/{}/oauth2/v2.0/token", common::TENANT).as_str())
        .with_status(200)
        .with_chunked_body(|w| {
            std::thread::sleep(Duration::from_secs(3));
            w.write_all(br#"{"access_token":"late","expires_in":3600}"#)
        })
        .create_async()
        .await;
    let graph = server
        .mock("GET", "/v1.0/organization")
        .expect(0)
        .create_async()
        .await;

    let registry = registry(&server);
    let started = Instant::now();
    let err = call_tool(
        &registry,
        "call_microsoft_api",
        json!({"apiType": "graph", "path": "/organization", "timeout": 200, "maxRetries": 0}),
    )
    .await
    .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    assert!(matches!(err, ToolError::Timeout(_)), "{err:?}");
    graph.assert_async().await;
}
