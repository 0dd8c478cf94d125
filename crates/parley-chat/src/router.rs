//! Axum route handlers for the chat completion endpoints

use std::convert::Infallible;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing,
};
use futures::{SinkExt, Stream, StreamExt, channel::mpsc};
use parley_core::{HttpError, RequestContext};
use serde_json::Value;

use crate::{error::ChatError, respond, state::ChatState, types::Reply};

/// Path the front-end posts chat completions to
pub const GENERATE_PATH: &str = "/api/backends/chat-completions/generate";

/// OpenAI-style alias for the same handler
pub const OPENAI_PATH: &str = "/v1/chat/completions";

/// Stream events buffered ahead of a slow client
const STREAM_BUFFER: usize = 16;

/// Build the chat router
pub fn chat_router(state: ChatState) -> Router {
    Router::new()
        .route(GENERATE_PATH, routing::post(generate))
        .route(OPENAI_PATH, routing::post(generate))
        .with_state(state)
}

/// Handle a chat completion request
///
/// The body is read as raw bytes so that a malformed payload degrades to an
/// empty request instead of a rejection.
async fn generate(
    State(state): State<ChatState>,
    axum::Extension(context): axum::Extension<RequestContext>,
    body: Bytes,
) -> Response {
    let payload = serde_json::from_slice::<Value>(&body).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "chat payload is not valid JSON, treating as empty");
        Value::Null
    });

    let request = state.normalize(&payload);
    let outcome = state.respond(&request, &context).await;
    let headers = outcome.diagnostics.headers();

    let response = match outcome.result {
        Ok(reply) if request.stream => {
            stream_response(&reply, state.settings().upstream.stream_chunk_chars).into_response()
        }
        Ok(reply) => Json(respond::completion_body(&reply)).into_response(),
        Err(e) => error_response(&e),
    };

    (headers, response).into_response()
}

/// Re-emit a finished reply as server-sent events
///
/// A producer task feeds the channel; it stops as soon as the client goes
/// away.
fn stream_response(reply: &Reply, chunk_chars: usize) -> Sse<impl Stream<Item = Result<Event, Infallible>> + use<>> {
    let events = respond::stream_events(reply, chunk_chars);
    let (mut tx, rx) = mpsc::channel::<Event>(STREAM_BUFFER);

    tokio::spawn(async move {
        for data in events {
            if tx.send(Event::default().data(data)).await.is_err() {
                tracing::debug!("client disconnected mid-stream");
                break;
            }
        }
    });

    Sse::new(rx.map(Ok)).keep_alive(KeepAlive::default())
}

/// Convert a chat error to a JSON error response
fn error_response(error: &ChatError) -> Response {
    let body = serde_json::json!({
        "error": {
            "message": error.client_message(),
            "type": error.error_type(),
            "upstream_status": error.upstream_status().map(|s| s.as_u16()),
            "detail": error.detail(),
        }
    });

    (error.status_code(), Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use http::StatusCode;

    use super::*;
    use crate::{
        error::UpstreamFailure,
        types::{ReplyOrigin, ReplyShape},
    };

    #[tokio::test]
    async fn error_body_carries_upstream_status() {
        let error = ChatError::from(UpstreamFailure::new(
            Some(StatusCode::INTERNAL_SERVER_ERROR),
            "model overloaded",
            3,
        ));

        let response = error_response(&error);
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(body["error"]["type"], "upstream_error");
        assert_eq!(body["error"]["upstream_status"], 500);
        assert_eq!(body["error"]["detail"], "model overloaded");
    }

    #[tokio::test]
    async fn stream_outlives_the_reply() {
        let response = {
            let reply = Reply {
                text: "Hi there".to_owned(),
                model: "test-model".to_owned(),
                shape: ReplyShape::OpenAi,
                origin: ReplyOrigin::Upstream,
                prompt_chars: 4,
            };
            stream_response(&reply, 3).into_response()
        };

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();

        assert!(body.contains("\"Hi \""));
        assert!(body.trim_end().ends_with("data: [DONE]"));
    }
}
