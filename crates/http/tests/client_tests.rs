//! Integration tests for the authenticated request layer

use async_trait::async_trait;
use latch_core::{
    Action, AuthState, MemoryStorage, PersistConfig, Persistor, RootState, Store, StoreApi,
    UserState,
};
use latch_http::{ClientError, FetchArgs, RequestApi, RequestClient};
use reqwest::Method;
use serde_json::json;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn logged_in_store() -> Arc<Store> {
    let store = Store::builder()
        .middleware(RequestApi::middleware())
        .build()
        .await
        .unwrap();
    store.dispatch(Action::login("old-access", "old-refresh")).await;
    store
        .dispatch(Action::SetUser(UserState::new("someone@example.com")))
        .await;
    Arc::new(store)
}

async fn mount_refresh_success(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("authorization", "old-access"))
        .and(header("user-token", "old-refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "new-access",
            "refreshToken": "new-refresh"
        })))
        .expect(1)
        .mount(server)
        .await;
}

/// Store that records dispatched actions and never changes state
struct RecordingStore {
    state: RootState,
    dispatched: Mutex<Vec<Action>>,
}

impl RecordingStore {
    fn new(state: RootState) -> Self {
        Self {
            state,
            dispatched: Mutex::new(Vec::new()),
        }
    }

    fn dispatched(&self) -> Vec<Action> {
        self.dispatched.lock().unwrap().clone()
    }
}

#[async_trait]
impl StoreApi for RecordingStore {
    async fn get_state(&self) -> RootState {
        self.state.clone()
    }

    async fn dispatch(&self, action: Action) {
        self.dispatched.lock().unwrap().push(action);
    }
}

#[tokio::test]
async fn test_success_passes_data_through() {
    let mock_server = MockServer::start().await;
    let body = json!({"items": [{"id": 1}, {"id": 2}], "total": 2});

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = logged_in_store().await;
    let client = RequestClient::new(mock_server.uri()).unwrap();

    let result = client
        .fetch_with_reauth("/items", store.as_ref())
        .await
        .unwrap();
    assert_eq!(result, body);
}

#[tokio::test]
async fn test_credentials_sent_when_logged_in() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", "old-access"))
        .and(header("user-token", "old-refresh"))
        .and(header("user-email", "someone@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = logged_in_store().await;
    let client = RequestClient::new(mock_server.uri()).unwrap();

    let result = client.fetch_with_reauth("me", store.as_ref()).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_no_credentials_without_access_token() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/public"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let store = Store::builder().build().await.unwrap();
    store
        .dispatch(Action::SetUser(UserState::new("someone@example.com")))
        .await;
    let client = RequestClient::new(mock_server.uri()).unwrap();

    client.fetch_with_reauth("/public", &store).await.unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let headers = &requests[0].headers;
    assert!(!headers.contains_key("authorization"));
    assert!(!headers.contains_key("user-token"));
    assert!(!headers.contains_key("user-email"));
}

#[tokio::test]
async fn test_unauthorized_refreshes_and_replays_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .and(header("authorization", "old-access"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_refresh_success(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(header("authorization", "new-access"))
        .and(header("user-token", "new-refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = logged_in_store().await;
    let client = RequestClient::new(mock_server.uri()).unwrap();

    let result = client
        .fetch_with_reauth("/items", store.as_ref())
        .await
        .unwrap();
    assert_eq!(result, json!({"items": []}));
    assert_eq!(
        store.get_state().await.auth,
        AuthState::logged_in("new-access", "new-refresh")
    );
}

#[tokio::test]
async fn test_forbidden_mutation_is_replayed_with_body() {
    let mock_server = MockServer::start().await;
    let payload = json!({"name": "widget"});

    Mock::given(method("POST"))
        .and(path("/items"))
        .and(header("authorization", "old-access"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_refresh_success(&mock_server).await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(header("authorization", "new-access"))
        .and(body_json(&payload))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 7})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = logged_in_store().await;
    let api = RequestApi::new(
        RequestClient::new(mock_server.uri()).unwrap(),
        store.clone(),
    );

    let result = api
        .send_data("/items", Some(payload.clone()), Method::POST)
        .await
        .unwrap();
    assert_eq!(result, json!({"id": 7}));
    assert!(store.select(|s| s.auth.is_auth).await);
}

#[tokio::test]
async fn test_failed_refresh_logs_out_and_returns_original_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(401).set_body_string("refresh rejected"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = logged_in_store().await;
    let client = RequestClient::new(mock_server.uri()).unwrap();

    let result = client.fetch_with_reauth("/items", store.as_ref()).await;
    assert!(matches!(
        result,
        Err(ClientError::AuthenticationFailed(ref message)) if message == "token expired"
    ));

    let auth = store.get_state().await.auth;
    assert!(!auth.is_auth);
    assert!(auth.access_token.is_none());
    assert!(auth.refresh_token.is_none());
}

#[tokio::test]
async fn test_refresh_without_payload_logs_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let state = RootState {
        auth: AuthState::logged_in("old-access", "old-refresh"),
        ..RootState::default()
    };
    let store = RecordingStore::new(state);
    let client = RequestClient::new(mock_server.uri()).unwrap();

    let result = client.fetch_with_reauth("/items", &store).await;
    assert!(matches!(result, Err(ClientError::Forbidden(_))));
    assert_eq!(store.dispatched(), vec![Action::LogOut]);
}

#[tokio::test]
async fn test_other_errors_do_not_refresh() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such thing"))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "new-access",
            "refreshToken": "new-refresh"
        })))
        .expect(0)
        .mount(&mock_server)
        .await;

    let state = RootState {
        auth: AuthState::logged_in("old-access", "old-refresh"),
        ..RootState::default()
    };
    let store = RecordingStore::new(state);
    let client = RequestClient::new(mock_server.uri()).unwrap();

    let result = client.fetch_with_reauth("/broken", &store).await;
    assert!(matches!(
        result,
        Err(ClientError::ServerError { status: 500, ref message }) if message == "boom"
    ));

    let result = client.fetch_with_reauth("/missing", &store).await;
    assert!(matches!(result, Err(ClientError::NotFound(_))));

    assert!(store.dispatched().is_empty());
}

#[tokio::test]
async fn test_transport_error_propagates_unchanged() {
    // Nothing listens on port 1
    let client = RequestClient::new("http://127.0.0.1:1").unwrap();
    let store = logged_in_store().await;

    let result = client.fetch_with_reauth("/items", store.as_ref()).await;
    assert!(matches!(result, Err(ClientError::Request(_))));
    assert!(store.select(|s| s.auth.is_auth).await);
}

#[tokio::test]
async fn test_second_auth_failure_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
        .expect(2)
        .mount(&mock_server)
        .await;
    mount_refresh_success(&mock_server).await;

    let store = logged_in_store().await;
    let client = RequestClient::new(mock_server.uri()).unwrap();

    let result = client.fetch_with_reauth("/items", store.as_ref()).await;
    assert!(matches!(result, Err(ClientError::AuthenticationFailed(_))));
    // The refresh itself succeeded, so the new tokens stay
    assert_eq!(
        store.get_state().await.auth,
        AuthState::logged_in("new-access", "new-refresh")
    );
}

#[tokio::test]
async fn test_get_data_serves_cached_result() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2, 3])))
        .expect(2)
        .mount(&mock_server)
        .await;

    let store = logged_in_store().await;
    let api = RequestApi::new(
        RequestClient::new(mock_server.uri()).unwrap(),
        store.clone(),
    );

    assert_eq!(api.get_data("/items").await.unwrap(), json!([1, 2, 3]));
    assert_eq!(api.get_data("/items").await.unwrap(), json!([1, 2, 3]));
    assert!(
        store
            .select(|s| s.request.queries.contains_key("/items"))
            .await
    );

    // Bypasses the cache
    assert_eq!(api.refetch_data("/items").await.unwrap(), json!([1, 2, 3]));
}

#[tokio::test]
async fn test_expired_cache_entry_is_refetched() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&mock_server)
        .await;

    let store = logged_in_store().await;
    let api = RequestApi::new(RequestClient::new(mock_server.uri()).unwrap(), store)
        .keep_unused_data_for(std::time::Duration::ZERO);

    api.get_data("/items").await.unwrap();
    api.get_data("/items").await.unwrap();
}

#[tokio::test]
async fn test_logout_clears_query_cache() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let store = logged_in_store().await;
    let api = RequestApi::new(
        RequestClient::new(mock_server.uri()).unwrap(),
        store.clone(),
    );

    api.get_data("/items").await.unwrap();
    assert_eq!(store.select(|s| s.request.queries.len()).await, 1);

    store.dispatch(Action::LogOut).await;
    assert!(store.select(|s| s.request.queries.is_empty()).await);
}

#[tokio::test]
async fn test_refreshed_tokens_survive_reload() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .and(header("authorization", "old-access"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;
    mount_refresh_success(&mock_server).await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(header("authorization", "new-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let storage = MemoryStorage::new();
    let persistor = Persistor::new(PersistConfig::default(), Arc::new(storage.clone()));
    let store = Store::builder()
        .middleware(RequestApi::middleware())
        .persistor(persistor)
        .build()
        .await
        .unwrap();
    store.dispatch(Action::login("old-access", "old-refresh")).await;

    let client = RequestClient::new(mock_server.uri()).unwrap();
    client
        .fetch_with_reauth(FetchArgs::new("/items"), &store)
        .await
        .unwrap();

    let persistor = Persistor::new(PersistConfig::default(), Arc::new(storage));
    let reloaded = Store::builder().persistor(persistor).build().await.unwrap();
    assert_eq!(
        reloaded.get_state().await.auth,
        AuthState::logged_in("new-access", "new-refresh")
    );
}
