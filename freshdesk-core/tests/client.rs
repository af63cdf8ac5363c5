use freshdesk_core::{ApiErrorClass, ArticlePayload, Collection, FreshdeskClient, NewEntry, Visibility};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// base64("test-token:X")
const AUTH: &str = "Basic dGVzdC10b2tlbjpY";

#[tokio::test]
async fn list_all_sends_basic_auth_and_maps_entries() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/solutions/categories"))
        .and(query_param("page", "1"))
        .and(query_param("per_page", "100"))
        .and(header("authorization", AUTH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "name": "Guide", "description": "Guide"},
            {"id": 2, "name": "Reference", "description": null}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = FreshdeskClient::with_base_url(&server.uri(), "test-token").unwrap();
    let items = client.list_all(&Collection::Categories).await.unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].name, "Guide");
    assert_eq!(items[1].id, 2);
    assert_eq!(items[1].parent_id, None);
}

#[tokio::test]
async fn list_all_follows_pages_until_short_page() {
    let server = MockServer::start().await;
    let full_page: Vec<_> = (0..100)
        .map(|i| json!({"id": i, "title": format!("Article {i}"), "folder_id": 9}))
        .collect();

    Mock::given(method("GET"))
        .and(path("/api/v2/solutions/folders/9/articles"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(full_page)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/solutions/folders/9/articles"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 500, "title": "Last", "folder_id": 9}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = FreshdeskClient::with_base_url(&server.uri(), "test-token").unwrap();
    let items = client
        .list_all(&Collection::Articles { folder_id: 9 })
        .await
        .unwrap();

    assert_eq!(items.len(), 101);
    assert_eq!(items[100].name, "Last");
    assert_eq!(items[100].parent_id, Some(9));
}

#[tokio::test]
async fn list_all_stops_when_server_repeats_the_same_page() {
    let server = MockServer::start().await;
    let full_page: Vec<_> = (0..100)
        .map(|i| json!({"id": i, "name": format!("Category {i}")}))
        .collect();

    Mock::given(method("GET"))
        .and(path("/api/v2/solutions/categories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(full_page)))
        .expect(2)
        .mount(&server)
        .await;

    let client = FreshdeskClient::with_base_url(&server.uri(), "test-token").unwrap();
    let items = tokio::time::timeout(
        Duration::from_secs(5),
        client.list_all(&Collection::Categories),
    )
    .await
    .expect("listing must terminate")
    .unwrap();

    assert_eq!(items.len(), 100);
}

#[tokio::test]
async fn find_by_name_matches_exact_case() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/solutions/categories/3/folders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 10, "name": "setup", "category_id": 3},
            {"id": 11, "name": "Setup", "category_id": 3}
        ])))
        .mount(&server)
        .await;

    let client = FreshdeskClient::with_base_url(&server.uri(), "test-token").unwrap();
    let folders = Collection::Folders { category_id: 3 };

    assert_eq!(client.find_by_name(&folders, "Setup").await.unwrap(), Some(11));
    assert_eq!(client.find_by_name(&folders, "SETUP").await.unwrap(), None);
}

#[tokio::test]
async fn create_folder_posts_visibility() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v2/solutions/categories/3/folders"))
        .and(header("authorization", AUTH))
        .and(body_json(json!({
            "name": "Install",
            "description": "Install",
            "visibility": 1
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 44,
            "name": "Install",
            "category_id": 3
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = FreshdeskClient::with_base_url(&server.uri(), "test-token").unwrap();
    let id = client
        .create(
            &Collection::Folders { category_id: 3 },
            &NewEntry::folder("Install"),
        )
        .await
        .unwrap();

    assert_eq!(id, 44);
}

#[tokio::test]
async fn create_article_uses_folder_endpoint_and_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v2/solutions/folders/44/articles"))
        .and(body_json(json!({
            "title": "Intro",
            "description": "<p>hi</p>",
            "status": 2
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 900,
            "title": "Intro",
            "folder_id": 44
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = FreshdeskClient::with_base_url(&server.uri(), "test-token").unwrap();
    let article = ArticlePayload::new("Intro", "<p>hi</p>", Visibility::Published);
    assert_eq!(client.create_article(44, &article).await.unwrap(), 900);
}

#[tokio::test]
async fn update_article_puts_to_article_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/v2/solutions/articles/900"))
        .and(body_json(json!({
            "title": "Intro",
            "description": "<p>changed</p>",
            "status": 1
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 900,
            "title": "Intro"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = FreshdeskClient::with_base_url(&server.uri(), "test-token").unwrap();
    let article = ArticlePayload::new("Intro", "<p>changed</p>", Visibility::Draft);
    assert_eq!(client.update_article(900, &article).await.unwrap(), 900);
}

#[tokio::test]
async fn api_errors_carry_status_and_classification() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/solutions/categories"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let client = FreshdeskClient::with_base_url(&server.uri(), "test-token").unwrap();
    let err = client.list_all(&Collection::Categories).await.unwrap_err();

    assert_eq!(err.classification(), Some(ApiErrorClass::RateLimit));
    assert!(err.is_retryable());
    assert!(err.is_safe_to_resend());
    assert!(err.to_string().contains("slow down"));
}

#[tokio::test]
async fn unauthorized_is_not_retryable() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/v2/solutions/articles/1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "code": "invalid_credentials"
        })))
        .mount(&server)
        .await;

    let client = FreshdeskClient::with_base_url(&server.uri(), "test-token").unwrap();
    let err = client
        .update_article(1, &ArticlePayload::new("A", "b", Visibility::Draft))
        .await
        .unwrap_err();

    assert_eq!(err.classification(), Some(ApiErrorClass::Auth));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn server_errors_on_create_are_not_safe_to_resend() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v2/solutions/categories"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let client = FreshdeskClient::with_base_url(&server.uri(), "test-token").unwrap();
    let err = client
        .create(&Collection::Categories, &NewEntry::category("Guide"))
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert!(!err.is_safe_to_resend());
}

#[test]
fn new_derives_helpdesk_url() {
    let client = FreshdeskClient::new("acme", "test-token").unwrap();
    assert_eq!(client.base_url().as_str(), "https://acme.freshdesk.com/");
}
