//! HTTP proxy in front of the cloud speech and language services.
//!
//! Hosts never hold the cloud API keys; they talk to this proxy instead.
//!
//! | Route                  | Upstream                         | Reply            |
//! |------------------------|----------------------------------|------------------|
//! | `POST /api/tts`        | Google Cloud TTS `text:synthesize` | `audio/mpeg`   |
//! | `POST /api/preprocess` | Gemini `generateContent`         | `{conversions}`  |
//! | `GET /health`          | —                                | `{"status":"ok"}`|

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::backend::REMOTE_SPEED_RANGE;
use crate::config::ServerConfig;
use crate::error::ReaderError;
use crate::http::PreprocessResponse;
use crate::voices::DEFAULT_REMOTE_VOICE;

const TABLE_PROMPT: &str = "Convert tables to natural spoken prose. Describe data conversationally. \
Use transitions between rows. Don't say \"the table shows.\" No bullets, lists, or markdown. \
Plain text only. Keep concise.";

#[derive(Clone)]
pub struct AppState {
    config: Arc<ServerConfig>,
    client: reqwest::Client,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self { config: Arc::new(config), client: reqwest::Client::new() }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/tts", post(synthesize))
        .route("/api/preprocess", post(preprocess_tables))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum ApiError {
    BadRequest(&'static str),
    NotConfigured(&'static str),
    Upstream(&'static str),
    Internal(&'static str),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotConfigured(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
            ApiError::Upstream(m) => (StatusCode::BAD_GATEWAY, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

// ─── /api/tts ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TtsBody {
    #[serde(default)]
    text: String,
    #[serde(default = "default_voice")]
    voice: String,
    #[serde(default = "default_speed")]
    speed: f32,
}

fn default_voice() -> String {
    DEFAULT_REMOTE_VOICE.to_string()
}

fn default_speed() -> f32 {
    1.0
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

const TTS_FAILED: &str = "TTS generation failed";

async fn synthesize(
    State(state): State<AppState>,
    body: Result<Json<TtsBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body.map_err(|_| ApiError::BadRequest("text is required"))?;
    if body.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text is required"));
    }
    let Some(key) = state.config.google_api_key.as_deref() else {
        return Err(ApiError::NotConfigured("GOOGLE_CLOUD_API_KEY not configured"));
    };

    let (lo, hi) = REMOTE_SPEED_RANGE;
    let request = json!({
        "input": { "text": body.text },
        "voice": { "languageCode": "en-US", "name": body.voice },
        "audioConfig": { "audioEncoding": "MP3", "speakingRate": body.speed.clamp(lo, hi) },
    });

    let audio = fetch_audio(&state, key, &request).await.map_err(|e| match e {
        ReaderError::Status { status } => {
            error!(status, "Google TTS API error");
            ApiError::Upstream(TTS_FAILED)
        }
        e => {
            error!("TTS API error: {e}");
            ApiError::Internal(TTS_FAILED)
        }
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/mpeg"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        audio,
    )
        .into_response())
}

async fn fetch_audio(
    state: &AppState,
    key: &str,
    request: &serde_json::Value,
) -> crate::error::Result<Vec<u8>> {
    let response = state
        .client
        .post(&state.config.tts_url)
        .query(&[("key", key)])
        .json(request)
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ReaderError::Status { status: status.as_u16() });
    }
    let body: SynthesizeResponse = response.json().await?;
    base64::engine::general_purpose::STANDARD
        .decode(body.audio_content)
        .map_err(|e| ReaderError::Base64(e.to_string()))
}

// ─── /api/preprocess ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PreprocessBody {
    #[serde(default)]
    tables: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

async fn preprocess_tables(
    State(state): State<AppState>,
    body: Result<Json<PreprocessBody>, JsonRejection>,
) -> Result<Json<PreprocessResponse>, ApiError> {
    let Json(body) = body.map_err(|_| ApiError::BadRequest("tables array is required"))?;
    if body.tables.is_empty() {
        return Err(ApiError::BadRequest("tables array is required"));
    }
    let Some(key) = state.config.gemini_api_key.as_deref() else {
        return Err(ApiError::NotConfigured("GEMINI_API_KEY not configured"));
    };

    let state = &state;
    let conversions = futures::future::join_all(body.tables.iter().map(|table| async move {
        match rewrite_table(state, key, table).await {
            Ok(Some(prose)) => prose,
            Ok(None) => table.clone(),
            Err(e) => {
                warn!("Gemini API error, keeping original table: {e}");
                table.clone()
            }
        }
    }))
    .await;

    Ok(Json(PreprocessResponse { conversions }))
}

/// `Ok(None)` when the model answered without any text.
async fn rewrite_table(state: &AppState, key: &str, table: &str) -> crate::error::Result<Option<String>> {
    let request = GenerateRequest {
        system_instruction: Content { parts: [Part { text: TABLE_PROMPT }] },
        contents: [Content { parts: [Part { text: table }] }],
        generation_config: GenerationConfig { temperature: 0.2, max_output_tokens: 2048 },
    };
    let response = state
        .client
        .post(&state.config.gemini_url)
        .query(&[("key", key)])
        .json(&request)
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ReaderError::Status { status: status.as_u16() });
    }
    let data: serde_json::Value = response.json().await?;
    Ok(data["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .filter(|t| !t.is_empty())
        .map(str::to_string))
}

// ─── /health ─────────────────────────────────────────────────────────────────

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn config(google: Option<&str>, gemini: Option<&str>, upstream: &str) -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            google_api_key: google.map(str::to_string),
            gemini_api_key: gemini.map(str::to_string),
            tts_url: format!("{upstream}/tts"),
            gemini_url: format!("{upstream}/gemini"),
        }
    }

    fn app(google: Option<&str>, gemini: Option<&str>, upstream: &str) -> Router {
        create_router(AppState::new(config(google, gemini, upstream)))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Fake Google/Gemini upstream on a random local port.
    async fn upstream(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(None, None, "http://unused")
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_tts_requires_text() {
        let response = app(Some("k"), None, "http://unused")
            .oneshot(post_json("/api/tts", json!({ "text": "   " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await, json!({ "error": "text is required" }));
    }

    #[tokio::test]
    async fn test_tts_without_key_fails_fast() {
        let response = app(None, None, "http://unused")
            .oneshot(post_json("/api/tts", json!({ "text": "Hello." })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await,
            json!({ "error": "GOOGLE_CLOUD_API_KEY not configured" })
        );
    }

    #[tokio::test]
    async fn test_tts_proxies_and_clamps_speed() {
        let fake = Router::new().route(
            "/tts",
            post(|Json(req): Json<serde_json::Value>| async move {
                assert_eq!(req["audioConfig"]["speakingRate"], 4.0);
                assert_eq!(req["voice"]["name"], "en-US-Neural2-F");
                let audio = base64::engine::general_purpose::STANDARD.encode(b"mp3-bytes");
                Json(json!({ "audioContent": audio }))
            }),
        );
        let base = upstream(fake).await;
        let response = app(Some("k"), None, &base)
            .oneshot(post_json("/api/tts", json!({ "text": "Hi.", "speed": 9.0 })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=3600");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"mp3-bytes");
    }

    #[tokio::test]
    async fn test_tts_upstream_error_is_bad_gateway() {
        let fake = Router::new().route("/tts", post(|| async { StatusCode::FORBIDDEN }));
        let base = upstream(fake).await;
        let response = app(Some("k"), None, &base)
            .oneshot(post_json("/api/tts", json!({ "text": "Hi." })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_preprocess_validation() {
        let response = app(None, Some("k"), "http://unused")
            .oneshot(post_json("/api/preprocess", json!({ "tables": [] })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app(None, None, "http://unused")
            .oneshot(post_json("/api/preprocess", json!({ "tables": ["a|b"] })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await, json!({ "error": "GEMINI_API_KEY not configured" }));
    }

    #[tokio::test]
    async fn test_preprocess_falls_back_per_table() {
        let fake = Router::new().route(
            "/gemini",
            post(|Json(req): Json<serde_json::Value>| async move {
                let table = req["contents"][0]["parts"][0]["text"].as_str().unwrap_or_default();
                if table.contains("bad") {
                    return Err(StatusCode::INTERNAL_SERVER_ERROR);
                }
                Ok(Json(json!({
                    "candidates": [{ "content": { "parts": [{ "text": format!("prose: {table}") }] } }]
                })))
            }),
        );
        let base = upstream(fake).await;
        let response = app(None, Some("k"), &base)
            .oneshot(post_json("/api/preprocess", json!({ "tables": ["good|1", "bad|2"] })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({ "conversions": ["prose: good|1", "bad|2"] })
        );
    }
}
