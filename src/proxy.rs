// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The stateless LLM proxy: `POST /api/gemini` forwards a prompt to the hosted
//! model so the API key never leaves the server.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, info_span, warn, Instrument};

use crate::config;

mod gemini;

pub use gemini::{GeminiClient, Upstream};

pub const ROUTE: &str = "/api/gemini";

const PROMPT_REQUIRED: &str = "Prompt is required";
const UPSTREAM_FAILED: &str = "Failed to get response from Gemini";

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("API key is not configured: set the {0} environment variable")]
    MissingApiKey(String),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("upstream returned no text")]
    EmptyResponse,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

#[derive(Deserialize)]
struct PromptRequest {
    prompt: Option<serde_json::Value>,
}

/// Extracts a non-empty string prompt from the request body.
fn parse_prompt(body: &[u8]) -> Option<String> {
    let request: PromptRequest = serde_json::from_slice(body).ok()?;
    match request.prompt? {
        serde_json::Value::String(prompt) if !prompt.is_empty() => Some(prompt),
        _ => None,
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn handle_prompt<U: Upstream>(State(upstream): State<Arc<U>>, body: Bytes) -> Response {
    let Some(prompt) = parse_prompt(&body) else {
        warn!("Rejected request without a prompt");
        return error_response(StatusCode::BAD_REQUEST, PROMPT_REQUIRED);
    };

    match upstream.generate(&prompt).await {
        Ok(result) => (StatusCode::OK, Json(json!({ "result": result }))).into_response(),
        Err(e @ ProxyError::MissingApiKey(_)) => {
            error!(err = %e, "Proxy is misconfigured");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
        Err(e) => {
            error!(err = %e, "Upstream model request failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, UPSTREAM_FAILED)
        }
    }
}

async fn handle_options() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Builds the proxy's routes. Only POST and OPTIONS are routed; other methods get
/// a 405.
pub fn router<U: Upstream>(upstream: U) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route(ROUTE, post(handle_prompt::<U>).options(handle_options))
        .layer(cors)
        .with_state(Arc::new(upstream))
}

/// Serves the proxy on `listener` until `shutdown` completes.
pub async fn serve<U: Upstream>(
    listener: TcpListener,
    upstream: U,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ProxyError> {
    let addr = listener.local_addr()?;
    async move {
        info!("Proxy listening");
        axum::serve(listener, router(upstream))
            .with_graceful_shutdown(shutdown)
            .await?;
        info!("Proxy stopped");
        Ok(())
    }
    .instrument(info_span!("proxy", %addr))
    .await
}

/// Binds the configured address and serves until Ctrl-C.
pub async fn run(config: &config::Proxy) -> Result<(), ProxyError> {
    let addr: SocketAddr = config.listen()?;
    let upstream = GeminiClient::from_env(config.upstream(), config.model(), config.api_key_env());
    if !upstream.has_api_key() {
        warn!(
            api_key_env = config.api_key_env(),
            "No API key configured, every prompt will fail"
        );
    }
    let listener = TcpListener::bind(addr).await?;
    serve(listener, upstream, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(err = %e, "Unable to listen for shutdown signal");
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use axum::extract::Path;
    use tokio::sync::oneshot;

    use super::*;

    struct StubUpstream(Result<&'static str, &'static str>);

    impl Upstream for StubUpstream {
        async fn generate(&self, prompt: &str) -> Result<String, ProxyError> {
            match self.0 {
                Ok(reply) => Ok(format!("{}: {}", reply, prompt)),
                Err("no key") => Err(ProxyError::MissingApiKey("GEMINI_API_KEY".to_string())),
                Err(_) => Err(ProxyError::EmptyResponse),
            }
        }
    }

    /// Serves `router` on an ephemeral port. The server stops when the sender drops.
    async fn spawn(router: Router) -> (String, oneshot::Sender<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });
        (format!("http://{}", addr), tx)
    }

    async fn post_json(url: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let response = reqwest::Client::new()
            .post(url)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
        (status, response.json().await.unwrap())
    }

    #[test]
    fn test_parse_prompt() {
        assert_eq!(parse_prompt(br#"{"prompt":"hi"}"#).as_deref(), Some("hi"));
        assert_eq!(parse_prompt(br#"{"prompt":""}"#), None);
        assert_eq!(parse_prompt(br#"{"prompt":42}"#), None);
        assert_eq!(parse_prompt(br#"{}"#), None);
        assert_eq!(parse_prompt(b"not json"), None);
        assert_eq!(parse_prompt(b""), None);
    }

    #[tokio::test]
    async fn test_prompt_forwarded() {
        let (base, _stop) = spawn(router(StubUpstream(Ok("echo")))).await;
        let url = format!("{}{}", base, ROUTE);
        let (status, body) = post_json(&url, json!({"prompt": "hello"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"result": "echo: hello"}));
    }

    #[tokio::test]
    async fn test_prompt_required() {
        let (base, _stop) = spawn(router(StubUpstream(Ok("echo")))).await;
        let url = format!("{}{}", base, ROUTE);
        for request in [json!({}), json!({"prompt": ""}), json!({"prompt": null})] {
            let (status, body) = post_json(&url, request).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body, json!({"error": "Prompt is required"}));
        }
    }

    #[tokio::test]
    async fn test_upstream_failure_is_generic() {
        let (base, _stop) = spawn(router(StubUpstream(Err("boom")))).await;
        let url = format!("{}{}", base, ROUTE);
        let (status, body) = post_json(&url, json!({"prompt": "hello"})).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "Failed to get response from Gemini"}));
    }

    #[tokio::test]
    async fn test_missing_api_key_reported() {
        let (base, _stop) = spawn(router(StubUpstream(Err("no key")))).await;
        let url = format!("{}{}", base, ROUTE);
        let (status, body) = post_json(&url, json!({"prompt": "hello"})).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body["error"],
            "API key is not configured: set the GEMINI_API_KEY environment variable"
        );
    }

    #[tokio::test]
    async fn test_other_methods_not_allowed() {
        let (base, _stop) = spawn(router(StubUpstream(Ok("echo")))).await;
        let client = reqwest::Client::new();
        let url = format!("{}{}", base, ROUTE);
        assert_eq!(client.get(&url).send().await.unwrap().status().as_u16(), 405);
        assert_eq!(client.put(&url).send().await.unwrap().status().as_u16(), 405);
        assert_eq!(client.delete(&url).send().await.unwrap().status().as_u16(), 405);
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let (base, _stop) = spawn(router(StubUpstream(Ok("echo")))).await;
        let response = reqwest::Client::new()
            .request(reqwest::Method::OPTIONS, format!("{}{}", base, ROUTE))
            .header("Origin", "https://example.com")
            .header("Access-Control-Request-Method", "POST")
            .header("Access-Control-Request-Headers", "content-type")
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );

        // Simple requests carry the header too.
        let response = reqwest::Client::new()
            .post(format!("{}{}", base, ROUTE))
            .header("Origin", "https://example.com")
            .json(&json!({"prompt": "hello"}))
            .send()
            .await
            .unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn test_gemini_client_against_fake_upstream() {
        async fn generate_content(
            Path(call): Path<String>,
            body: Json<serde_json::Value>,
        ) -> Response {
            if call != "test-model:generateContent" {
                return StatusCode::NOT_FOUND.into_response();
            }
            let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap_or("").to_string();
            Json(json!({
                "candidates": [{"content": {"parts": [{"text": format!("got {}", prompt)}]}}]
            }))
            .into_response()
        }
        let fake = Router::new().route("/models/:call", post(generate_content));
        let (upstream_base, _stop_upstream) = spawn(fake).await;

        let key = Some("secret".to_string());
        let client = GeminiClient::new(&upstream_base, "test-model", "KEY", key.clone());
        assert_eq!(client.generate("hello").await.unwrap(), "got hello");

        let (base, _stop) = spawn(router(client)).await;
        let url = format!("{}{}", base, ROUTE);
        let (status, body) = post_json(&url, json!({"prompt": "hi"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"result": "got hi"}));

        let missing = GeminiClient::new(&upstream_base, "other-model", "KEY", key);
        assert!(matches!(
            missing.generate("hi").await,
            Err(ProxyError::UpstreamStatus { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve(listener, StubUpstream(Ok("echo")), async {
            let _ = rx.await;
        }));
        tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
