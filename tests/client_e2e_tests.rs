//! Chat client end-to-end tests.
//!
//! The in-crate [`ChatClient`] talking to a real bridge server whose
//! Completion Service is a wiremock endpoint: reply assembly, recipe
//! confirmation, and the fixed failure message.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use souschef_bridge::client::{
    ChatClient, RECIPE_CONFIRMATION_SUFFIX, STREAM_FAILURE_MESSAGE,
};
use souschef_bridge::core::completion::ChatTurn;
use souschef_bridge::core::recipe::{Ingredient, RecipeSnapshot, RecipeStore, Step};
use souschef_bridge::{ServerConfig, routes, state::AppState};

fn test_config(completion_url: String) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        tls: None,
        live_api_url: "ws://127.0.0.1:1".to_string(),
        live_api_key: None,
        live_model: "test-live-model".to_string(),
        completion_api_url: completion_url,
        completion_api_key: Some("test-key".to_string()),
        completion_model: "test-model".to_string(),
        assistant_instructions: None,
        cors_allowed_origins: None,
        idle_timeout_seconds: 300,
        connect_timeout_seconds: 1,
    }
}

async fn spawn_server(completion_url: String) -> (SocketAddr, Arc<AppState>) {
    let state = AppState::new(test_config(completion_url));
    let app = axum::Router::new()
        .merge(routes::chat::create_chat_router())
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .await
            .expect("serve");
    });
    (addr, state)
}

fn plain_recipe() -> RecipeSnapshot {
    RecipeSnapshot {
        id: "r1".to_string(),
        title: "Plain Pasta".to_string(),
        servings: Some(2),
        ingredients: vec![Ingredient {
            text: "pasta".to_string(),
        }],
        steps: vec![Step {
            title: "Step 1".to_string(),
            description: "boil".to_string(),
        }],
        last_updated: 1000,
    }
}

#[tokio::test]
async fn reply_text_assembles_in_order() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Try \"}}]}\n\n\
             data: {\"choices\":[{\"delta\":{\"content\":\"chili \"}}]}\n\n\
             data: {\"choices\":[{\"delta\":{\"content\":\"flakes.\"}}]}\n\n\
             data: [DONE]\n\n",
            "text/event-stream",
        ))
        .mount(&mock)
        .await;
    let (addr, _state) = spawn_server(format!("{}/v1", mock.uri())).await;

    let store = Arc::new(RecipeStore::new());
    let client = ChatClient::new(format!("http://{addr}/chat"), store);

    let history = vec![
        ChatTurn::user("hi"),
        ChatTurn::assistant("Hello! What are we cooking?"),
    ];
    let reply = client
        .send_message("Make it spicier", None, &history)
        .await
        .expect("reply");

    assert_eq!(reply.text, "Try chili flakes.");
    assert!(!reply.recipe_updated);
}

#[tokio::test]
async fn recipe_update_is_applied_and_confirmed() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Spiced it up!\"}}]}\n\n\
             data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"function\":{\"name\":\"set_recipe\",\"arguments\":\"{\\\"title\\\":\\\"Spicy Pasta\\\",\\\"ingredients\\\":[\\\"pasta\\\",\\\"chili\\\"],\\\"steps\\\":[\\\"boil\\\",\\\"toss\\\"]}\"}}]}}]}\n\n\
             data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n\
             data: [DONE]\n\n",
            "text/event-stream",
        ))
        .mount(&mock)
        .await;
    let (addr, state) = spawn_server(format!("{}/v1", mock.uri())).await;

    let store = Arc::new(RecipeStore::new());
    store.replace(plain_recipe());
    let client = ChatClient::new(format!("http://{addr}/chat"), store.clone());

    let reply = client
        .send_message("Make it spicier", Some(plain_recipe()), &[])
        .await
        .expect("reply");

    assert_eq!(
        reply.text,
        format!("Spiced it up!{RECIPE_CONFIRMATION_SUFFIX}")
    );
    assert!(reply.recipe_updated);

    // Both stores converged on the new snapshot
    let local = store.get("r1").expect("client store");
    assert_eq!(local.title, "Spicy Pasta");
    assert!(local.last_updated > 1000);
    assert_eq!(state.recipes.get("r1"), Some(local));
}

#[tokio::test]
async fn upstream_failure_replaces_reply_with_fixed_message() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&mock)
        .await;
    let (addr, _state) = spawn_server(format!("{}/v1", mock.uri())).await;

    let store = Arc::new(RecipeStore::new());
    let client = ChatClient::new(format!("http://{addr}/chat"), store);

    let reply = client
        .send_message("Make it spicier", None, &[])
        .await
        .expect("reply");

    assert_eq!(reply.text, STREAM_FAILURE_MESSAGE);
    assert!(!reply.recipe_updated);
}
