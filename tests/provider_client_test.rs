//! OCR and LLM provider clients exercised against a local stub server, so
//! the submit/poll protocol and its terminal states run end to end without
//! touching the real providers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

use nutriscan::services::llm::{CompletionClient, LlmError, OpenAiChat};
use nutriscan::services::ocr::{OcrConfig, OcrError, ReplicateOcr, TextExtractor};

/// Serve `app` on an ephemeral local port, returning its base URL.
async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind stub server");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Stub server error");
    });
    format!("http://{addr}")
}

#[derive(Clone)]
struct OcrStub {
    poll_url: String,
    polls: Arc<AtomicUsize>,
    /// Poll body by zero-based attempt number.
    script: Arc<dyn Fn(usize) -> Value + Send + Sync>,
}

async fn submit_prediction(State(stub): State<OcrStub>) -> Json<Value> {
    Json(json!({"urls": {"get": stub.poll_url}}))
}

async fn poll_prediction(State(stub): State<OcrStub>) -> Json<Value> {
    let attempt = stub.polls.fetch_add(1, Ordering::SeqCst);
    Json((stub.script)(attempt))
}

/// Stub prediction API whose poll responses follow `script`. Returns the
/// submission endpoint and the poll counter.
async fn spawn_ocr_stub(
    script: impl Fn(usize) -> Value + Send + Sync + 'static,
) -> (String, Arc<AtomicUsize>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind stub server");
    let addr = listener.local_addr().unwrap();
    let polls = Arc::new(AtomicUsize::new(0));
    let stub = OcrStub {
        poll_url: format!("http://{addr}/poll"),
        polls: polls.clone(),
        script: Arc::new(script),
    };
    let app = Router::new()
        .route("/predictions", post(submit_prediction))
        .route("/poll", get(poll_prediction))
        .with_state(stub);
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Stub server error");
    });
    (format!("http://{addr}/predictions"), polls)
}

/// Production defaults with a millisecond cadence so exhaustion is fast.
fn fast_config(endpoint: String, max_poll_attempts: u32) -> OcrConfig {
    let mut config = OcrConfig::new(Some("test-token".to_string()));
    config.endpoint = endpoint;
    config.poll_interval = Duration::from_millis(1);
    config.max_poll_attempts = max_poll_attempts;
    config
}

#[tokio::test]
async fn test_poll_exhaustion_times_out() {
    let (endpoint, polls) = spawn_ocr_stub(|_| json!({"status": "processing"})).await;
    let ocr = ReplicateOcr::new(fast_config(endpoint, 3));

    let err = assert_err!(
        ocr.extract_text("mem://scan_1.png", &CancellationToken::new())
            .await
    );
    assert_eq!(err, OcrError::Timeout);
    // Every attempt in the budget was spent before giving up.
    assert_eq!(polls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_cancellation_aborts_poll_loop_as_timeout() {
    let (endpoint, polls) = spawn_ocr_stub(|_| json!({"status": "processing"})).await;
    let ocr = ReplicateOcr::new(fast_config(endpoint, 10));

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = assert_err!(ocr.extract_text("mem://scan_1.png", &cancel).await);
    assert_eq!(err, OcrError::Timeout);
    // Cancellation wins before the first poll request goes out.
    assert_eq!(polls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_output_after_pending_polls_succeeds() {
    let (endpoint, polls) = spawn_ocr_stub(|attempt| {
        if attempt < 2 {
            json!({"status": "processing"})
        } else {
            json!({"status": "succeeded", "output": "NUTRITION\nEnergy 232 kcal"})
        }
    })
    .await;
    let ocr = ReplicateOcr::new(fast_config(endpoint, 10));

    let text = assert_ok!(
        ocr.extract_text("mem://scan_1.png", &CancellationToken::new())
            .await
    );
    assert_eq!(text, "NUTRITION\nEnergy 232 kcal");
    assert_eq!(polls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_provider_error_stops_polling_immediately() {
    let (endpoint, polls) = spawn_ocr_stub(|_| json!({"error": "boom"})).await;
    let ocr = ReplicateOcr::new(fast_config(endpoint, 10));

    let err = assert_err!(
        ocr.extract_text("mem://scan_1.png", &CancellationToken::new())
            .await
    );
    assert_eq!(err, OcrError::Job("boom".to_string()));
    assert_eq!(polls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_submission_without_poll_url_is_init_error() {
    let app = Router::new().route(
        "/predictions",
        post(|| async { Json(json!({"detail": "unauthorized"})) }),
    );
    let base = spawn_server(app).await;
    let ocr = ReplicateOcr::new(fast_config(format!("{base}/predictions"), 3));

    let err = assert_err!(
        ocr.extract_text("mem://scan_1.png", &CancellationToken::new())
            .await
    );
    assert!(matches!(err, OcrError::Init(msg) if msg.contains("poll URL")));
}

#[tokio::test]
async fn test_missing_credential_is_init_error() {
    let mut config = fast_config("http://127.0.0.1:1/predictions".to_string(), 3);
    config.api_token = None;
    let ocr = ReplicateOcr::new(config);

    let err = assert_err!(
        ocr.extract_text("mem://scan_1.png", &CancellationToken::new())
            .await
    );
    assert!(matches!(err, OcrError::Init(msg) if msg.contains("credential")));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_init_error() {
    // Nothing listens on port 1.
    let ocr = ReplicateOcr::new(fast_config("http://127.0.0.1:1/predictions".to_string(), 3));

    let err = assert_err!(
        ocr.extract_text("mem://scan_1.png", &CancellationToken::new())
            .await
    );
    assert!(matches!(err, OcrError::Init(_)));
}

#[tokio::test]
async fn test_chat_completion_returns_message_content() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            Json(json!({"choices": [{"message": {"content": "NUTRITION\nFat 64.4 g"}}]}))
        }),
    );
    let base = spawn_server(app).await;
    let client = OpenAiChat::new("test-key", "gpt-3.5-turbo")
        .with_endpoint(format!("{base}/v1/chat/completions"));

    let content = assert_ok!(client.complete("system", "user", 250).await);
    assert_eq!(content, "NUTRITION\nFat 64.4 g");
}

#[tokio::test]
async fn test_chat_error_status_is_provider_error() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({"error": {"message": "rate limited"}})),
            )
        }),
    );
    let base = spawn_server(app).await;
    let client = OpenAiChat::new("test-key", "gpt-3.5-turbo")
        .with_endpoint(format!("{base}/v1/chat/completions"));

    let err = assert_err!(client.complete("system", "user", 250).await);
    assert!(matches!(err, LlmError::Provider(msg) if msg.contains("429")));
}

#[tokio::test]
async fn test_chat_without_choices_yields_empty_content() {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|| async { Json(json!({"choices": []})) }),
    );
    let base = spawn_server(app).await;
    let client = OpenAiChat::new("test-key", "gpt-3.5-turbo")
        .with_endpoint(format!("{base}/v1/chat/completions"));

    let content = assert_ok!(client.complete("system", "user", 250).await);
    assert_eq!(content, "");
}
