//! Asset fetching for panels
//!
//! Panels load meshes, textures and similar resources by URI. Plain URLs go
//! straight to the injected [`HttpFetch`]. `package://<pkg>/<path>` URIs are
//! tried in order:
//!
//! 1. The Player's own `fetch_asset`
//! 2. A direct fetch of the URI, when builtin fetching is enabled
//! 3. The caller's `reference_url` with everything from the last occurrence
//!    of `<pkg>` replaced by `<pkg>/<path>`
//!
//! Every fetch can be cut short with an [`AbortSignal`].

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::sync::Arc;
use tokio::sync::watch;
use url::Url;

use crate::config::HttpConfig;
use crate::error::{PipelineError, Result};
use crate::player::Player;
use crate::types::AssetData;

/// URI scheme resolved relative to a package
pub const PACKAGE_SCHEME: &str = "package://";

/// Minimal view of an HTTP response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub body: Option<Vec<u8>>,
    pub content_type: Option<String>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP transport used for asset fetching
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse>;
}

/// `HttpFetch` backed by a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body: Some(body.to_vec()),
            content_type,
        })
    }
}

/// Owner side of an abort signal
#[derive(Debug)]
pub struct AbortController {
    tx: watch::Sender<bool>,
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortController {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }

    pub fn abort(&self) {
        self.tx.send_replace(true);
    }
}

/// Cancellation handle passed along with a fetch
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once aborted; never resolves if the controller is dropped first
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchAssetOptions {
    /// URL of the resource that referenced the asset
    pub reference_url: Option<String>,
    pub abort: Option<AbortSignal>,
}

impl FetchAssetOptions {
    pub fn with_reference_url(mut self, url: impl Into<String>) -> Self {
        self.reference_url = Some(url.into());
        self
    }

    pub fn with_abort(mut self, signal: AbortSignal) -> Self {
        self.abort = Some(signal);
        self
    }
}

/// Resolves asset URIs through the Player and the HTTP transport
#[derive(Clone)]
pub struct AssetResolver {
    http: Arc<dyn HttpFetch>,
    builtin_fetch: bool,
}

impl AssetResolver {
    pub fn new(http: Arc<dyn HttpFetch>, builtin_fetch: bool) -> Self {
        Self { http, builtin_fetch }
    }

    pub async fn fetch(
        &self,
        uri: &str,
        options: &FetchAssetOptions,
        player: Option<&Arc<dyn Player>>,
    ) -> Result<AssetData> {
        let Some(signal) = options.abort.as_ref() else {
            return self.resolve(uri, options, player).await;
        };
        if signal.is_aborted() {
            return Err(PipelineError::Aborted);
        }

        tokio::select! {
            biased;
            _ = signal.aborted() => Err(PipelineError::Aborted),
            result = self.resolve(uri, options, player) => result,
        }
    }

    async fn resolve(
        &self,
        uri: &str,
        options: &FetchAssetOptions,
        player: Option<&Arc<dyn Player>>,
    ) -> Result<AssetData> {
        let Some(rest) = uri.strip_prefix(PACKAGE_SCHEME) else {
            return self.fetch_url(uri).await;
        };
        let pkg = rest.split('/').next().unwrap_or_default();

        let mut last_error = match player {
            Some(player) => match player.fetch_asset(uri).await {
                Ok(asset) => return Ok(asset),
                Err(e) => e,
            },
            None => PipelineError::NoPlayer,
        };

        if self.builtin_fetch {
            tracing::warn!("Player could not fetch {} ({}), fetching directly", uri, last_error);
            match self.fetch_url(uri).await {
                Ok(asset) => return Ok(asset),
                Err(e) => last_error = e,
            }
        }

        if let Some(target) = resolve_against_reference(options.reference_url.as_deref(), pkg, rest)
        {
            tracing::warn!("Falling back to {} for {} ({})", target, uri, last_error);
            match self.fetch_url(&target).await {
                Ok(asset) => {
                    return Ok(AssetData {
                        uri: uri.to_string(),
                        ..asset
                    })
                }
                Err(e) => last_error = e,
            }
        }

        Err(PipelineError::Asset {
            uri: uri.to_string(),
            reason: last_error.to_string(),
        })
    }

    async fn fetch_url(&self, url: &str) -> Result<AssetData> {
        Url::parse(url)?;
        let response = self.http.get(url).await?;

        if !response.is_success() {
            return Err(PipelineError::AssetFetch {
                uri: url.to_string(),
                status: response.status,
                status_text: response.status_text,
            });
        }
        let data = response
            .body
            .ok_or_else(|| PipelineError::MissingBody(url.to_string()))?;

        Ok(AssetData {
            uri: url.to_string(),
            data,
            media_type: response.content_type,
        })
    }
}

/// `reference_url[..last pkg]` + `pkg/path`, unless the reference is itself a package URI
fn resolve_against_reference(reference: Option<&str>, pkg: &str, rest: &str) -> Option<String> {
    let reference = reference?;
    if pkg.is_empty() || reference.starts_with(PACKAGE_SCHEME) {
        return None;
    }
    let idx = reference.rfind(pkg)?;
    Some(format!("{}{}", &reference[..idx], rest))
}
