mod common;

use common::{call_tool, client, json_body, registry, token_endpoint};
use m365_core::mcp_server::{JsonRpcHandler, McpServer};
use m365_core::ToolError;
use mockito::{Matcher, Server};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn missing_required_field_fails_without_network() {
    let mut server = Server::new_async().await;
    let token = token_endpoint(&mut server, 3600).expect(0).create_async().await;
    let graph = server
        .mock("POST", "/v1.0/groups")
        .expect(0)
        .create_async()
        .await;

    let registry = registry(&server);
    let err = call_tool(
        &registry,
        "manage_distribution_lists",
        json!({"action": "create", "description": "no name given"}),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ToolError::InvalidParams(_)));
    assert_eq!(err.to_jsonrpc_error()["code"], -32602);
    token.assert_async().await;
    graph.assert_async().await;
}

#[tokio::test]
async fn security_group_create_posts_expected_body() {
    let mut server = Server::new_async().await;
    token_endpoint(&mut server, 3600).create_async().await;
    let create = server
        .mock("POST", "/v1.0/groups")
        .match_body(Matcher::PartialJson(json!({
            "displayName": "Sales Team",
            "securityEnabled": true,
            "mailEnabled": false,
            "mailNickname": "salesteam",
            "groupTypes": []
        })))
        .with_status(201)
        .with_body(r#"{"id":"g-123","displayName":"Sales Team"}"#)
        .expect(1)
        .create_async()
        .await;

    let registry = registry(&server);
    let result = call_tool(
        &registry,
        "manage_security_groups",
        json!({"action": "create", "displayName": "Sales Team"}),
    )
    .await
    .unwrap();

    assert_eq!(json_body(&result)["id"], "g-123");
    create.assert_async().await;
}

#[tokio::test]
async fn batch_size_is_checked_before_any_request() {
    let mut server = Server::new_async().await;
    let token = token_endpoint(&mut server, 3600).expect(0).create_async().await;
    let batch = server
        .mock("POST", "/v1.0/$batch")
        .expect(0)
        .create_async()
        .await;
    let registry = registry(&server);

    let empty = call_tool(&registry, "execute_graph_batch", json!({"requests": []})).await;
    assert!(matches!(empty, Err(ToolError::InvalidParams(_))));

    let requests: Vec<_> = (0..21)
        .map(|i| json!({"id": i.to_string(), "method": "GET", "url": "/me"}))
        .collect();
    let too_many = call_tool(&registry, "execute_graph_batch", json!({"requests": requests})).await;
    assert!(matches!(too_many, Err(ToolError::InvalidParams(_))));

    token.assert_async().await;
    batch.assert_async().await;
}

#[tokio::test]
async fn batch_responses_come_back_in_request_order() {
    let mut server = Server::new_async().await;
    token_endpoint(&mut server, 3600).create_async().await;
    server
        .mock("POST", "/v1.0/$batch")
        .with_status(200)
        .with_body(
            json!({"responses": [
                {"id": "2", "status": 404, "body": {"error": {"code": "NotFound"}}},
                {"id": "1", "status": 200, "body": {"id": "u1"}}
            ]})
            .to_string(),
        )
        .create_async()
        .await;

    let registry = registry(&server);
    let result = call_tool(
        &registry,
        "execute_graph_batch",
        json!({"requests": [
            {"id": "1", "method": "GET", "url": "/users/u1"},
            {"id": "2", "method": "GET", "url": "/users/u2"}
        ]}),
    )
    .await
    .unwrap();

    let body = json_body(&result);
    assert_eq!(body["responses"][0]["id"], "1");
    assert_eq!(body["responses"][1]["id"], "2");
    assert_eq!(body["succeeded"], 1);
    assert_eq!(body["failed"], 1);
}

#[tokio::test]
async fn delta_start_then_resume() {
    let mut server = Server::new_async().await;
    token_endpoint(&mut server, 3600).create_async().await;
    let next = format!("{}/v1.0/users/delta?$skiptoken=abc", server.url());
    let done = format!("{}/v1.0/users/delta?$deltatoken=xyz", server.url());
    server
        .mock("GET", "/v1.0/users/delta")
        .with_status(200)
        .with_body(json!({"value": [{"id": "u1"}], "@odata.nextLink": next}).to_string())
        .expect(1)
        .create_async()
        .await;
    let resume = server
        .mock("GET", "/v1.0/users/delta")
        .match_query(Matcher::UrlEncoded("$skiptoken".into(), "abc".into()))
        .with_status(200)
        .with_body(json!({"value": [], "@odata.deltaLink": done}).to_string())
        .expect(1)
        .create_async()
        .await;

    let registry = registry(&server);
    let first = json_body(
        &call_tool(
            &registry,
            "manage_delta_queries",
            json!({"action": "start", "resource": "users"}),
        )
        .await
        .unwrap(),
    );
    assert_eq!(first["hasMoreChanges"], true);
    assert_eq!(first["changeCount"], 1);

    let token = first["deltaToken"].as_str().unwrap();
    let second = json_body(
        &call_tool(
            &registry,
            "manage_delta_queries",
            json!({"action": "resume", "deltaToken": token}),
        )
        .await
        .unwrap(),
    );
    assert_eq!(second["hasMoreChanges"], false);
    assert!(second["deltaToken"].is_string());
    resume.assert_async().await;
}

#[tokio::test]
async fn member_loop_stops_at_first_failure() {
    let mut server = Server::new_async().await;
    token_endpoint(&mut server, 3600).create_async().await;
    let added = server
        .mock("POST", "/v1.0/groups/g1/members/$ref")
        .match_body(Matcher::Regex("directoryObjects/a\"".into()))
        .with_status(204)
        .expect(1)
        .create_async()
        .await;
    let rejected = server
        .mock("POST", "/v1.0/groups/g1/members/$ref")
        .match_body(Matcher::Regex("directoryObjects/b\"".into()))
        .with_status(400)
        .with_body(r#"{"error":{"code":"Request_BadRequest","message":"One or more added object references already exist"}}"#)
        .expect(1)
        .create_async()
        .await;

    let registry = registry(&server);
    let err = call_tool(
        &registry,
        "manage_security_groups",
        json!({"action": "add_members", "groupId": "g1", "memberIds": ["a", "b", "c"]}),
    )
    .await
    .unwrap_err();

    match err {
        ToolError::Upstream { status, message } => {
            assert_eq!(status, 400);
            assert!(message.contains("1 of 3"), "{message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    added.assert_async().await;
    rejected.assert_async().await;
}

#[tokio::test]
async fn resources_read_issues_one_get() {
    let mut server = Server::new_async().await;
    token_endpoint(&mut server, 3600).create_async().await;
    let users = server
        .mock("GET", "/v1.0/users")
        .match_query(Matcher::UrlEncoded("$top".into(), "50".into()))
        .with_status(200)
        .with_body(r#"{"value":[{"id":"u1"}]}"#)
        .expect(1)
        .create_async()
        .await;

    let client = client(&server);
    let registry = m365_core::build_registry(client.clone()).unwrap();
    let handler = JsonRpcHandler::new(McpServer::new(Arc::new(registry), client));
    let resp = handler
        .handle_request(json!({
            "jsonrpc": "2.0", "id": 1, "method": "resources/read",
            "params": {"uri": "m365://users"}
        }))
        .await
        .unwrap();

    let contents = &resp["result"]["contents"][0];
    assert_eq!(contents["uri"], "m365://users");
    assert_eq!(contents["mimeType"], "application/json");
    assert!(contents["text"].as_str().unwrap().contains("u1"));
    users.assert_async().await;
}

#[tokio::test]
async fn every_tool_is_listed_with_an_object_schema() {
    let server = Server::new_async().await;
    let registry = registry(&server);
    assert_eq!(registry.tools().len(), 32);
    for tool in registry.tools() {
        assert_eq!(tool.input_schema.get("type"), Some(&json!("object")), "{}", tool.name);
        assert!(tool.annotations.is_some(), "{}", tool.name);
    }
}
