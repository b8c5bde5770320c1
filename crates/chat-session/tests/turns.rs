//! End-to-end turns: store -> context builder -> registry -> HTTP client.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use wiremock::matchers::{body_json, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chat_context::{ContextBuilder, CurrentMessage, HeuristicTokenEstimator};
use chat_core::Message;
use chat_llm::ChatClient;
use chat_requests::RequestRegistry;
use chat_session::{
    ChatSession, ConversationSettings, MessageStore, SessionError, SettingsProvider,
};

struct FixedStore {
    messages: Vec<Message>,
    prelude: Option<String>,
}

#[async_trait]
impl MessageStore for FixedStore {
    async fn conversation_messages(&self, _: &str) -> Result<Vec<Message>, SessionError> {
        Ok(self.messages.clone())
    }

    async fn system_prelude(&self, _: &str) -> Result<Option<String>, SessionError> {
        Ok(self.prelude.clone())
    }
}

struct FixedSettings(ConversationSettings);

#[async_trait]
impl SettingsProvider for FixedSettings {
    async fn settings(&self, _: &str) -> Result<ConversationSettings, SessionError> {
        Ok(self.0.clone())
    }
}

fn session(server: &MockServer, store: FixedStore, settings: ConversationSettings) -> ChatSession {
    ChatSession::new(
        Arc::new(store),
        Arc::new(FixedSettings(settings)),
        ContextBuilder::new(Arc::new(HeuristicTokenEstimator::default())),
        RequestRegistry::new(),
        ChatClient::new("sk-test").with_base_url(server.uri()),
    )
}

fn history() -> FixedStore {
    FixedStore {
        messages: vec![
            Message::user("earlier question")
                .with_created_at(Utc.timestamp_opt(100, 0).unwrap()),
            Message::assistant("earlier answer")
                .with_created_at(Utc.timestamp_opt(200, 0).unwrap()),
        ],
        prelude: Some("Be brief.".to_string()),
    }
}

#[tokio::test]
async fn send_turn_posts_history_and_returns_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_json(serde_json::json!({
            "model": "gpt-test",
            "messages": [
                {"role": "system", "content": "Be brief."},
                {"role": "user", "content": "earlier question"},
                {"role": "assistant", "content": "earlier answer"},
                {"role": "user", "content": "new question"},
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "chatcmpl-1",
            "model": "gpt-test",
            "choices": [{"message": {"content": "short answer"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 20, "completion_tokens": 3, "total_tokens": 23}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = session(&server, history(), ConversationSettings::new("gpt-test"));
    let completion = session
        .send_turn("conv", &CurrentMessage::user("new question"))
        .await
        .unwrap();

    assert_eq!(completion.content, "short answer");
    assert_eq!(completion.usage.total_tokens, 23);
    assert!(!session.has_active_request("conv").await);
}

#[tokio::test]
async fn pure_aside_turn_sends_only_prelude_and_current() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_json(serde_json::json!({
            "model": "gpt-test",
            "messages": [
                {"role": "system", "content": "Be brief."},
                {"role": "user", "content": "between us"},
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "chatcmpl-2",
            "model": "gpt-test",
            "choices": [{"message": {"content": "ok"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 1, "total_tokens": 6}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = session(&server, history(), ConversationSettings::new("gpt-test"));
    let completion = session
        .send_turn("conv", &CurrentMessage::pure_aside("between us"))
        .await
        .unwrap();

    assert_eq!(completion.content, "ok");
}

#[tokio::test]
async fn stream_turn_delivers_tokens_and_accumulates_content() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"to\"},\"finish_reason\":null}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"ken\"},\"finish_reason\":null}]}\n\n",
        "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&server)
        .await;

    let session = session(&server, history(), ConversationSettings::new("gpt-test"));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let outcome = session
        .stream_turn("conv", &CurrentMessage::user("go"), move |token| {
            sink.lock().unwrap().push(token.to_string());
        })
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["to", "ken"]);
    assert_eq!(outcome.content, "token");
    assert_eq!(outcome.finish_reason.as_deref(), Some("stop"));
    assert!(!outcome.cancelled);
    assert!(!session.has_active_request("conv").await);
}

#[tokio::test]
async fn request_timeout_cancels_the_turn_and_keeps_partial_text() {
    let server = MockServer::start().await;
    // Server sits on the response far longer than the allowed timeout.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string("data: [DONE]\n\n")
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let mut settings = ConversationSettings::new("gpt-test");
    settings.request_timeout = Duration::from_millis(80);
    let session = session(&server, history(), settings);

    let outcome = session
        .stream_turn("conv", &CurrentMessage::user("anyone there?"), |_| {})
        .await
        .unwrap();

    assert!(outcome.cancelled);
    assert_eq!(outcome.content, "");
    assert!(!session.has_active_request("conv").await);
}

#[tokio::test]
async fn superseding_turn_stays_tracked_after_the_first_is_cancelled() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string("data: [DONE]\n\n")
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&server)
        .await;

    let session = Arc::new(session(
        &server,
        history(),
        ConversationSettings::new("gpt-test"),
    ));

    let superseded_session = session.clone();
    let superseded = tokio::spawn(async move {
        superseded_session
            .stream_turn("conv", &CurrentMessage::user("first draft"), |_| {})
            .await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let replacing_session = session.clone();
    let replacing = tokio::spawn(async move {
        replacing_session
            .stream_turn("conv", &CurrentMessage::user("never mind, this instead"), |_| {})
            .await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let first = superseded.await.unwrap().unwrap();
    assert!(first.cancelled);

    // The first turn's cleanup ran, but the replacement is still in flight
    // and must remain cancellable through the registry.
    assert!(session.has_active_request("conv").await);

    let second = replacing.await.unwrap().unwrap();
    assert!(!second.cancelled);
    assert!(!session.has_active_request("conv").await);
}

#[tokio::test]
async fn store_failures_surface_before_any_request() {
    struct BrokenStore;

    #[async_trait]
    impl MessageStore for BrokenStore {
        async fn conversation_messages(&self, _: &str) -> Result<Vec<Message>, SessionError> {
            Err(SessionError::Store("disk on fire".to_string()))
        }

        async fn system_prelude(&self, _: &str) -> Result<Option<String>, SessionError> {
            Ok(None)
        }
    }

    let server = MockServer::start().await;
    let session = ChatSession::new(
        Arc::new(BrokenStore),
        Arc::new(FixedSettings(ConversationSettings::new("gpt-test"))),
        ContextBuilder::new(Arc::new(HeuristicTokenEstimator::default())),
        RequestRegistry::new(),
        ChatClient::new("sk-test").with_base_url(server.uri()),
    );

    let error = session
        .send_turn("conv", &CurrentMessage::user("hello?"))
        .await
        .unwrap_err();
    assert!(matches!(error, SessionError::Store(_)));
    assert!(!session.has_active_request("conv").await);
}
