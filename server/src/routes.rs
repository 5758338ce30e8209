//! HTTP surface
//!
//! `POST /v1/chat/completions` is the one real endpoint; the rest are
//! probes (`/health`), discovery (`/v1/models`), and scraping
//! (`/metrics`). Handlers translate at the edge and hand the domain
//! request to the loop runner; no wire shape crosses this boundary.

use std::convert::Infallible;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures::{StreamExt, future, stream};
use proxy_application::{LoopEvent, LoopOutcome, LoopRequest, ModelGateway, RunLoopError};
use proxy_domain::{ProxyError, TerminationReason};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::metrics;
use crate::openai::{self, DecodedRequest};
use crate::state::AppState;

/// Streaming buffer between the loop runner and the SSE encoder.
const EVENT_CHANNEL_CAPACITY: usize = 32;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/models", get(list_models))
        .route("/health", get(health))
        .route("/metrics", get(scrape_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn scrape_metrics() -> String {
    metrics::gather()
}

/// `GET /v1/models`: the configured allow-list, or whatever the backend
/// reports when no allow-list is set.
async fn list_models(State(state): State<AppState>) -> Response {
    let configured = &state.config.backend.supported_models;
    if !configured.is_empty() {
        return Json(openai::encode_models(configured)).into_response();
    }
    match state.gateway.available_models().await {
        Ok(models) => Json(openai::encode_models(&models)).into_response(),
        Err(e) => {
            warn!(error = %e, "model listing failed");
            error_response(&ProxyError::BackendError(e.to_string()))
        }
    }
}

async fn chat_completions(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    if !state.rate_limiter.try_acquire() {
        return reject("/v1/chat/completions", ProxyError::RateLimited);
    }

    let request = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(e) => {
            return reject(
                "/v1/chat/completions",
                ProxyError::MalformedRequest(e.to_string()),
            );
        }
    };
    let decoded = match openai::decode_request(request) {
        Ok(decoded) => decoded,
        Err(e) => return reject("/v1/chat/completions", e),
    };

    let supported = &state.config.backend.supported_models;
    if !supported.is_empty() && !supported.contains(&decoded.model) {
        return reject(
            "/v1/chat/completions",
            ProxyError::UnsupportedModel(decoded.model),
        );
    }

    let session_id = decoded
        .session_hint
        .clone()
        .unwrap_or_else(|| format!("sess-{}", Uuid::new_v4()));
    info!(session_id = %session_id, model = %decoded.model, stream = decoded.stream, "chat request");

    if decoded.stream {
        run_streaming(state, decoded, session_id).into_response()
    } else {
        run_blocking(state, decoded, session_id).await
    }
}

async fn run_blocking(state: AppState, decoded: DecodedRequest, session_id: String) -> Response {
    let model = decoded.model.clone();
    let runner = state.runner();
    let request = loop_request(decoded, session_id);

    let started = Instant::now();
    metrics::ACTIVE_RUNS.inc();
    let result = runner.execute(request).await;
    metrics::ACTIVE_RUNS.dec();
    metrics::RUN_DURATION
        .with_label_values(&[&model])
        .observe(started.elapsed().as_secs_f64());

    match result {
        Ok(outcome) => {
            metrics::REQUESTS_TOTAL
                .with_label_values(&["/v1/chat/completions", "ok"])
                .inc();
            let mut body = openai::encode_response(
                &response_id(),
                chrono::Utc::now().timestamp(),
                &model,
                &outcome.message,
                &outcome.usage,
            );
            body["session_id"] = Value::String(outcome.session_id);
            Json(body).into_response()
        }
        Err(e) => reject("/v1/chat/completions", to_proxy_error(e)),
    }
}

/// Run the loop in a spawned task and relay its events as SSE chunks.
/// The stream holds a cancellation drop guard, so a client disconnect
/// tears the loop down instead of letting it run tools unobserved.
fn run_streaming(
    state: AppState,
    decoded: DecodedRequest,
    session_id: String,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let model = decoded.model.clone();
    let token = CancellationToken::new();
    let runner = state.runner().with_cancellation(token.clone());
    let request = loop_request(decoded, session_id);
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    metrics::ACTIVE_RUNS.inc();
    let run_model = model.clone();
    tokio::spawn(async move {
        let started = Instant::now();
        let result = runner.execute_streaming(request, tx).await;
        metrics::ACTIVE_RUNS.dec();
        metrics::RUN_DURATION
            .with_label_values(&[&run_model])
            .observe(started.elapsed().as_secs_f64());
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => to_proxy_error_ref(e).code(),
        };
        metrics::REQUESTS_TOTAL
            .with_label_values(&["/v1/chat/completions", outcome])
            .inc();
    });

    let ctx = SseContext {
        id: response_id(),
        created: chrono::Utc::now().timestamp(),
        model,
        first: true,
        done: false,
        _cancel_on_drop: token.drop_guard(),
    };
    let events = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|ev| (ev, rx)) })
        .scan(ctx, |ctx, event| {
            future::ready(Some(stream::iter(encode_sse(ctx, event))))
        })
        .flatten();
    Sse::new(events).keep_alive(KeepAlive::default())
}

struct SseContext {
    id: String,
    created: i64,
    model: String,
    first: bool,
    done: bool,
    _cancel_on_drop: DropGuard,
}

fn encode_sse(ctx: &mut SseContext, event: LoopEvent) -> Vec<Result<Event, Infallible>> {
    if ctx.done {
        return Vec::new();
    }
    match event {
        LoopEvent::Delta(text) => {
            let chunk =
                openai::encode_stream_chunk(&ctx.id, ctx.created, &ctx.model, &text, ctx.first);
            ctx.first = false;
            vec![Ok(Event::default().data(chunk.to_string()))]
        }
        // Tool progress rides along as SSE comments so plain OpenAI
        // clients keep parsing chunks undisturbed.
        LoopEvent::ToolCallStarted { id, name } => {
            debug!(call_id = %id, tool = %name, "tool call started");
            vec![Ok(Event::default().comment(format!("tool {name} started")))]
        }
        LoopEvent::ToolCallFinished { id, ok } => {
            debug!(call_id = %id, ok, "tool call finished");
            vec![Ok(Event::default().comment(format!("tool call {id} finished")))]
        }
        LoopEvent::Completed(outcome) => {
            ctx.done = true;
            let mut end = openai::encode_stream_end(
                &ctx.id,
                ctx.created,
                &ctx.model,
                stream_finish_reason(&outcome),
            );
            end["session_id"] = Value::String(outcome.session_id);
            vec![
                Ok(Event::default().data(end.to_string())),
                Ok(Event::default().data("[DONE]")),
            ]
        }
        LoopEvent::Failed(message) => {
            ctx.done = true;
            let body = json!({"error": {"message": message, "code": "run_failed"}});
            vec![
                Ok(Event::default().data(body.to_string())),
                Ok(Event::default().data("[DONE]")),
            ]
        }
    }
}

fn stream_finish_reason(outcome: &LoopOutcome) -> &'static str {
    if outcome.message.has_tool_calls() {
        "tool_calls"
    } else if outcome.termination == TerminationReason::TurnLimitExceeded {
        "length"
    } else {
        "stop"
    }
}

fn loop_request(decoded: DecodedRequest, session_id: String) -> LoopRequest {
    LoopRequest {
        session_id,
        model: decoded.model,
        messages: decoded.messages,
        tools: decoded.tools,
        confirmations: decoded.confirmations,
    }
}

fn response_id() -> String {
    format!("chatcmpl-{}", Uuid::new_v4().simple())
}

fn to_proxy_error(error: RunLoopError) -> ProxyError {
    match error {
        RunLoopError::SessionBusy(id) => ProxyError::SessionBusy(id),
        RunLoopError::Store(e) => ProxyError::BackendError(format!("session store: {e}")),
        RunLoopError::Backend(e) => ProxyError::BackendError(e.to_string()),
        RunLoopError::Cancelled => ProxyError::Cancelled,
    }
}

fn to_proxy_error_ref(error: &RunLoopError) -> ProxyError {
    match error {
        RunLoopError::SessionBusy(id) => ProxyError::SessionBusy(id.clone()),
        RunLoopError::Store(e) => ProxyError::BackendError(format!("session store: {e}")),
        RunLoopError::Backend(e) => ProxyError::BackendError(e.to_string()),
        RunLoopError::Cancelled => ProxyError::Cancelled,
    }
}

fn reject(endpoint: &str, error: ProxyError) -> Response {
    metrics::REQUESTS_TOTAL
        .with_label_values(&[endpoint, error.code()])
        .inc();
    error_response(&error)
}

fn error_response(error: &ProxyError) -> Response {
    (status_for(error), Json(openai::encode_error(error))).into_response()
}

fn status_for(error: &ProxyError) -> StatusCode {
    match error {
        ProxyError::MalformedRequest(_) | ProxyError::UnsupportedModel(_) => {
            StatusCode::BAD_REQUEST
        }
        ProxyError::SessionBusy(_) => StatusCode::CONFLICT,
        ProxyError::BackendError(_) => StatusCode::BAD_GATEWAY,
        ProxyError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        // Client-closed-request; the client is gone either way.
        ProxyError::Cancelled => {
            StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use proxy_infrastructure::AppConfig;
    use tower::ServiceExt;

    fn test_state(mutate: impl FnOnce(&mut AppConfig)) -> AppState {
        let workspace = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.workspace.root = workspace.path().display().to_string();
        // Leak the tempdir so the workspace outlives the state.
        std::mem::forget(workspace);
        mutate(&mut config);
        AppState::from_config(config).unwrap()
    }

    async fn send(state: AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn chat_request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/chat/completions")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(test_state(|_| {}), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn malformed_body_is_rejected_with_structured_error() {
        let (status, body) =
            send(test_state(|_| {}), chat_request(json!({"messages": []}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "malformed_request");
    }

    #[tokio::test]
    async fn unsupported_model_is_rejected() {
        let state = test_state(|c| {
            c.backend.supported_models = vec!["allowed-model".to_string()];
        });
        let (status, body) = send(
            state,
            chat_request(json!({
                "model": "other-model",
                "messages": [{"role": "user", "content": "hi"}],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "unsupported_model");
    }

    #[tokio::test]
    async fn configured_model_list_is_served_without_backend() {
        let state = test_state(|c| {
            c.backend.supported_models = vec!["m1".to_string(), "m2".to_string()];
        });
        let request = Request::builder()
            .uri("/v1/models")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(state, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["id"], "m1");
        assert_eq!(body["data"][1]["id"], "m2");
    }

    #[tokio::test]
    async fn exhausted_rate_limit_yields_429() {
        let state = test_state(|c| c.limits.rate_limit_per_minute = 1);
        let body = json!({"messages": []});
        // First request consumes the only token; it fails on decode, not
        // on the limiter.
        let (first, _) = send(state.clone(), chat_request(body.clone())).await;
        assert_eq!(first, StatusCode::BAD_REQUEST);
        let (second, error) = send(state, chat_request(body)).await;
        assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(error["error"]["code"], "rate_limited");
    }

    #[tokio::test]
    async fn unreachable_backend_maps_to_bad_gateway() {
        let state = test_state(|c| {
            c.backend.base_url = "http://127.0.0.1:9".to_string();
            c.backend.request_timeout_secs = 2;
        });
        let (status, body) = send(
            state,
            chat_request(json!({
                "model": "m",
                "messages": [{"role": "user", "content": "hi"}],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "backend_error");
    }

    /// Fake Ollama backend: first turn asks for `list_files`, second
    /// turn answers with text. Captures request bodies for assertions.
    async fn fake_backend(seen: std::sync::Arc<std::sync::Mutex<Vec<Value>>>) -> String {
        use axum::routing::post;
        let handler_seen = seen.clone();
        let app = Router::new().route(
            "/api/chat",
            post(move |Json(body): Json<Value>| {
                let seen = handler_seen.clone();
                async move {
                    let turn = {
                        let mut seen = seen.lock().unwrap();
                        seen.push(body);
                        seen.len()
                    };
                    let reply = if turn == 1 {
                        json!({
                            "message": {
                                "role": "assistant",
                                "content": "",
                                "tool_calls": [{
                                    "function": {
                                        "name": "list_files",
                                        "arguments": {"directory": "."},
                                    },
                                }],
                            },
                            "done": true,
                            "prompt_eval_count": 12,
                            "eval_count": 5,
                        })
                    } else {
                        json!({
                            "message": {"role": "assistant", "content": "The workspace holds a.txt."},
                            "done": true,
                            "prompt_eval_count": 20,
                            "eval_count": 8,
                        })
                    };
                    Json(reply)
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn list_files_round_trip_produces_final_answer() {
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let backend = fake_backend(seen.clone()).await;

        let workspace = tempfile::tempdir().unwrap();
        std::fs::write(workspace.path().join("a.txt"), "hello").unwrap();
        let mut config = proxy_infrastructure::AppConfig::default();
        config.workspace.root = workspace.path().display().to_string();
        config.backend.base_url = backend;
        let state = AppState::from_config(config).unwrap();

        let (status, body) = send(
            state,
            chat_request(json!({
                "model": "m",
                "messages": [{"role": "user", "content": "list files in /"}],
                "stream": false,
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["choices"][0]["finish_reason"], "stop");
        let content = body["choices"][0]["message"]["content"].as_str().unwrap();
        assert!(!content.is_empty());
        assert_eq!(body["usage"]["prompt_tokens"], 32);

        // The second model turn saw the tool result for a.txt.
        let requests = seen.lock().unwrap();
        assert_eq!(requests.len(), 2);
        let second = requests[1]["messages"].as_array().unwrap();
        let tool_msg = second
            .iter()
            .find(|m| m["role"] == "tool")
            .expect("tool result fed back to the model");
        assert!(tool_msg["content"].as_str().unwrap().contains("a.txt"));
    }

    #[test]
    fn loop_errors_map_to_the_client_taxonomy() {
        let busy = to_proxy_error(RunLoopError::SessionBusy("s".to_string()));
        assert_eq!(status_for(&busy), StatusCode::CONFLICT);
        let cancelled = to_proxy_error(RunLoopError::Cancelled);
        assert_eq!(status_for(&cancelled).as_u16(), 499);
    }
}
