//! reqwest clients for the remote services: clip synthesis
//! ([`HttpClipFetcher`]) and table rewriting ([`HttpTableRewriter`]).
//! Both speak the JSON contract served by `voicereader-server`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{ClipFetcher, ClipRequest};
use crate::error::{ReaderError, Result};
use crate::tables::TableRewriter;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

/// `POST {text, voice, speed}` → audio bytes.
pub struct HttpClipFetcher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpClipFetcher {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Ok(Self { client: client()?, endpoint: endpoint.into() })
    }
}

#[async_trait]
impl ClipFetcher for HttpClipFetcher {
    async fn fetch(&self, request: &ClipRequest) -> Result<Bytes> {
        let response = self.client.post(&self.endpoint).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ReaderError::Status { status: status.as_u16() });
        }
        let bytes = response.bytes().await?;
        debug!(voice = %request.voice, bytes = bytes.len(), "clip fetched");
        Ok(bytes)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PreprocessRequest {
    pub tables: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PreprocessResponse {
    pub conversions: Vec<String>,
}

/// `POST {tables}` → `{conversions}`.
pub struct HttpTableRewriter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTableRewriter {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Ok(Self { client: client()?, endpoint: endpoint.into() })
    }
}

#[async_trait]
impl TableRewriter for HttpTableRewriter {
    async fn rewrite(&self, tables: Vec<String>) -> Result<Vec<String>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&PreprocessRequest { tables })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ReaderError::Status { status: status.as_u16() });
        }
        Ok(response.json::<PreprocessResponse>().await?.conversions)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(all(test, feature = "server"))]
mod tests {
    use super::*;
    use crate::settings::VoiceId;
    use axum::routing::post;
    use axum::{Json, Router};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_clip_fetcher_posts_json() {
        let app = Router::new().route(
            "/api/tts",
            post(|Json(req): Json<ClipRequest>| async move {
                format!("{}|{}|{}", req.text, req.voice, req.speed)
            }),
        );
        let base = serve(app).await;
        let fetcher = HttpClipFetcher::new(format!("{base}/api/tts")).unwrap();
        let bytes = fetcher
            .fetch(&ClipRequest::new("Hi.", &VoiceId::new("en-US-Neural2-F"), 1.5))
            .await
            .unwrap();
        assert_eq!(bytes, Bytes::from("Hi.|en-US-Neural2-F|1.5"));
    }

    #[tokio::test]
    async fn test_clip_fetcher_maps_status() {
        let app = Router::new().route(
            "/api/tts",
            post(|| async { (axum::http::StatusCode::BAD_GATEWAY, "nope") }),
        );
        let base = serve(app).await;
        let fetcher = HttpClipFetcher::new(format!("{base}/api/tts")).unwrap();
        let err = fetcher.fetch(&ClipRequest::new("x", &VoiceId::new("v"), 1.0)).await.unwrap_err();
        assert!(matches!(err, ReaderError::Status { status: 502 }));
    }

    #[tokio::test]
    async fn test_table_rewriter() {
        let app = Router::new().route(
            "/api/preprocess",
            post(|Json(req): Json<PreprocessRequest>| async move {
                Json(PreprocessResponse {
                    conversions: req.tables.iter().map(|t| format!("prose of {t}")).collect(),
                })
            }),
        );
        let base = serve(app).await;
        let rewriter = HttpTableRewriter::new(format!("{base}/api/preprocess")).unwrap();
        let out = rewriter.rewrite(vec!["a|b".into()]).await.unwrap();
        assert_eq!(out, vec!["prose of a|b".to_string()]);
    }
}
