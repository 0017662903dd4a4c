//! Integration tests for the REST client against a mock API.

use buildcord::{DirectoryApi, Error, RestClient};
use buildcord_common::{BuildNotification, MessageBody};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_send_embed_message() {
    let mock_server = MockServer::start().await;

    let notification = BuildNotification {
        repository_name: "repo".to_string(),
        owner_name: "me".to_string(),
        status_message: "passed".to_string(),
        author_name: "A".to_string(),
        build_type: "push".to_string(),
        compare_url: "u1".to_string(),
        build_url: "u2".to_string(),
    };

    Mock::given(method("POST"))
        .and(path("/channels/42/messages"))
        .and(header("authorization", "Bot secret"))
        .and(body_json(json!({
            "embed": {
                "title": "me/repo passed",
                "type": "rich",
                "description": "A push <u1>",
                "url": "u2"
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "1"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = RestClient::new(&mock_server.uri(), "secret");
    client
        .send_message("42", &MessageBody::Embed(notification.to_embed()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_send_content_message() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/channels/7/messages"))
        .and(body_json(json!({"content": "hello"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = RestClient::new(&mock_server.uri(), "secret");
    client
        .send_message("7", &MessageBody::Content("hello".to_string()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_non_success_status_is_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/channels/42/messages"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Missing Permissions"))
        .mount(&mock_server)
        .await;

    let client = RestClient::new(&mock_server.uri(), "secret");
    let err = client
        .send_message("42", &MessageBody::Content("hi".to_string()))
        .await
        .unwrap_err();

    match err {
        Error::Api { status, body } => {
            assert_eq!(status, 403);
            assert_eq!(body, "Missing Permissions");
        }
        other => panic!("Expected Api error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_gateway_url() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/gateway"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"url": "wss://gateway.example"})),
        )
        .mount(&mock_server)
        .await;

    let client = RestClient::new(&mock_server.uri(), "secret");
    assert_eq!(client.gateway_url().await.unwrap(), "wss://gateway.example");
}
