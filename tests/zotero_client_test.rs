use notero_sync::zotero::client::{ZoteroClient, ZoteroError, ZoteroHttpClient};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client_against(server: &MockServer) -> ZoteroHttpClient {
    ZoteroHttpClient::with_base_url("test-key".to_string(), server.uri())
}

#[tokio::test]
async fn get_item_returns_not_found_on_404() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/groups/123/items/ABC123"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client_against(&server).await;
    let result = client.get_item("groups", 123, "ABC123").await;

    assert!(matches!(result, Err(ZoteroError::NotFound(_))));
}

#[tokio::test]
async fn get_item_parses_version_and_data() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/groups/123/items/ABC123"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Last-Modified-Version", "7")
                .set_body_json(serde_json::json!({
                    "key": "ABC123",
                    "version": 7,
                    "data": {"tags": []},
                })),
        )
        .mount(&server)
        .await;

    let client = client_against(&server).await;
    let item = client.get_item("groups", 123, "ABC123").await.unwrap();

    assert_eq!(item.key, "ABC123");
    assert_eq!(item.version, 7);
}

#[tokio::test]
async fn patch_item_returns_conflict_on_412() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/groups/123/items/ABC123"))
        .respond_with(
            ResponseTemplate::new(412).insert_header("Last-Modified-Version", "9"),
        )
        .mount(&server)
        .await;

    let client = client_against(&server).await;
    let result = client
        .patch_item("groups", 123, "ABC123", &serde_json::json!({"tags": []}), 5)
        .await;

    assert!(matches!(result, Err(ZoteroError::Conflict { current_version: 9 })));
}

#[tokio::test]
async fn retries_once_after_429_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/groups/123/items/ABC123"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/groups/123/items/ABC123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "key": "ABC123",
            "version": 1,
            "data": {},
        })))
        .mount(&server)
        .await;

    let client = client_against(&server).await;
    let item = client.get_item("groups", 123, "ABC123").await.unwrap();

    assert_eq!(item.key, "ABC123");
}
