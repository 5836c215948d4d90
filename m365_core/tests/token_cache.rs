mod common;

use common::{client, token_endpoint, TOKEN};
use m365_core::oauth::{AZURE_SCOPE, GRAPH_SCOPE};
use m365_core::ToolError;
use mockito::Server;

#[tokio::test]
async fn live_token_is_reused() {
    let mut server = Server::new_async().await;
    let token = token_endpoint(&mut server, 3600).expect(1).create_async().await;

    let client = client(&server);
    let first = client.tokens().get_access_token(GRAPH_SCOPE).await.unwrap();
    let second = client.tokens().get_access_token(GRAPH_SCOPE).await.unwrap();

    assert_eq!(first, TOKEN);
    assert_eq!(first, second);
    token.assert_async().await;
}

#[tokio::test]
async fn token_inside_expiry_margin_is_refetched() {
    let mut server = Server::new_async().await;
    let token = token_endpoint(&mut server, 30).expect(2).create_async().await;

    let client = client(&server);
    client.tokens().get_access_token(GRAPH_SCOPE).await.unwrap();
    client.tokens().get_access_token(GRAPH_SCOPE).await.unwrap();

    token.assert_async().await;
}

#[tokio::test]
async fn concurrent_first_calls_share_one_request() {
    let mut server = Server::new_async().await;
    let token = token_endpoint(&mut server, 3600).expect(1).create_async().await;

    let client = client(&server);
    let calls = (0..8).map(|_| client.tokens().get_access_token(GRAPH_SCOPE));
    let results = futures::future::join_all(calls).await;

    assert!(results.iter().all(|r| matches!(r, Ok(t) if t == TOKEN)));
    token.assert_async().await;
}

#[tokio::test]
async fn scopes_are_cached_independently() {
    let mut server = Server::new_async().await;
    let token = token_endpoint(&mut server, 3600).expect(2).create_async().await;

    let client = client(&server);
    client.tokens().get_access_token(GRAPH_SCOPE).await.unwrap();
    client.tokens().get_access_token(AZURE_SCOPE).await.unwrap();
    client.tokens().get_access_token(AZURE_SCOPE).await.unwrap();

    token.assert_async().await;
}

#[tokio::test]
async fn rejected_credentials_are_an_authentication_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/contoso-tenant/oauth2/v2.0/token")
        .with_status(401)
        .with_body(r#"{"error":"invalid_client","error_description":"AADSTS7000215: Invalid client secret"}"#)
        .create_async()
        .await;

    let err = client(&server)
        .tokens()
        .get_access_token(GRAPH_SCOPE)
        .await
        .unwrap_err();
    assert!(matches!(err, ToolError::Authentication(ref m) if m.contains("AADSTS7000215")));
}
