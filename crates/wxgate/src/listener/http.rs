use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, error, warn};
use wxgate_protocol::{Envelope, Message};

use super::Limits;
use crate::buffer::MessageBuffer;
use crate::context::{ServeContext, StopCause};

pub(super) async fn serve(
    listener: TcpListener,
    buffer: Arc<dyn MessageBuffer>,
    ctx: ServeContext,
    limits: Limits,
) {
    let app = Router::new()
        .fallback(receive)
        .layer(DefaultBodyLimit::max(limits.max_message_bytes))
        .with_state(buffer);

    let shutdown = {
        let ctx = ctx.clone();
        async move {
            ctx.stopped().await;
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!(error = %e, "Callback server failed");
        ctx.stop(StopCause::ListenerFailed(e.to_string()));
    }
}

async fn receive(
    State(buffer): State<Arc<dyn MessageBuffer>>,
    method: Method,
    body: Bytes,
) -> Response {
    if method != Method::POST {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let msg: Message = match serde_json::from_slice(&body) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(error = %e, "Dropped callback push");
            return (
                StatusCode::BAD_REQUEST,
                Json(Envelope::error(e.to_string())),
            )
                .into_response();
        }
    };
    debug!(msg_id = msg.msg_id, msg_type = msg.msg_type, "Received message");

    if let Err(e) = buffer.put(msg).await {
        warn!(error = %e, "Failed to queue callback push");
    }
    Json(json!({ "code": 0, "msg": "success" })).into_response()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::buffer::MemoryBuffer;

    async fn start(buffer: Arc<MemoryBuffer>, ctx: ServeContext) -> (String, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let limits = Limits {
            max_message_bytes: 1024,
            read_timeout: Duration::from_secs(2),
        };
        let handle = tokio::spawn(serve(listener, buffer, ctx, limits));
        (format!("http://{}", addr), handle)
    }

    #[tokio::test]
    async fn post_on_any_path_is_buffered() {
        let buffer = Arc::new(MemoryBuffer::new(10));
        let ctx = ServeContext::new();
        let (url, _handle) = start(buffer.clone(), ctx.clone()).await;

        let response = reqwest::Client::new()
            .post(format!("{url}/whatever"))
            .body(r#"{"msgId":3,"type":3,"base64Img":"aGk="}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body, json!({"code": 0, "msg": "success"}));

        let msg = buffer
            .get(&ctx, Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert!(msg.is_image());
        assert_eq!(msg.base64_img, "aGk=");
    }

    #[tokio::test]
    async fn bad_body_is_rejected() {
        let buffer = Arc::new(MemoryBuffer::new(10));
        let ctx = ServeContext::new();
        let (url, _handle) = start(buffer.clone(), ctx.clone()).await;

        let response = reqwest::Client::new()
            .post(&url)
            .body("{")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
        assert!(buffer.get(&ctx, Duration::from_millis(50)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stops_with_context() {
        let buffer = Arc::new(MemoryBuffer::new(10));
        let ctx = ServeContext::new();
        let (_url, handle) = start(buffer, ctx.clone()).await;

        ctx.stop(StopCause::Shutdown);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
