//! Snapshot fetcher for still-image camera endpoints (`GET <base>/capture.jpg`)

use std::future::Future;
use std::time::Duration;

use bytes::BytesMut;
use color_eyre::Result;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use reqwest::{Client, Url};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::capture::frame::Frame;
use crate::{utils, CameraConfig};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("camera returned {status} {status_text}")]
    Status { status: u16, status_text: String },
    #[error("no response within {after:?}")]
    Timeout { after: Duration },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("camera returned an empty body")]
    EmptyBody,
    #[error("snapshot exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        match self {
            FetchError::Timeout { .. } => true,
            FetchError::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// Anything that can hand the producer its next encoded frame
pub trait FrameSource: Send + 'static {
    fn next_frame(&mut self) -> impl Future<Output = Result<Frame, FetchError>> + Send;
}

/// Single-request fetcher with a hard per-request deadline. No retries here;
/// resilience belongs to the producer loop.
pub struct HttpFetcher {
    client: Client,
    url: Url,
    timeout: Duration,
    max_frame_bytes: usize,
    sequence: u64,
}

impl HttpFetcher {
    pub fn new(config: &CameraConfig) -> Result<Self> {
        let url = utils::capture_url(config)?;

        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .connect_timeout(config.connect_timeout())
            .build()?;

        info!(
            "Camera endpoint: {} (timeout {}ms, connect {:?})",
            url,
            config.timeout_ms,
            config.connect_timeout()
        );

        Ok(Self {
            client,
            url,
            timeout: config.timeout(),
            max_frame_bytes: config.max_frame_bytes,
            sequence: 0,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Fetch the current snapshot. The whole exchange, body included, must finish
    /// within the timeout; on expiry the request future is dropped, which aborts
    /// the connection.
    #[instrument(skip(self), fields(seq = self.sequence + 1))]
    pub async fn fetch_frame(&mut self) -> Result<Frame, FetchError> {
        let started = Instant::now();

        let limit = self.max_frame_bytes;
        let request = async {
            let mut response = self.client.get(self.url.clone()).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    status: status.as_u16(),
                    status_text: status.canonical_reason().unwrap_or_default().to_string(),
                });
            }
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            if response.content_length().is_some_and(|len| len > limit as u64) {
                return Err(FetchError::TooLarge { limit });
            }
            // Content-Length may be missing or wrong; enforce the cap on the stream too
            let mut body = BytesMut::new();
            while let Some(chunk) = response.chunk().await? {
                if body.len() + chunk.len() > limit {
                    return Err(FetchError::TooLarge { limit });
                }
                body.extend_from_slice(&chunk);
            }
            Ok((body.freeze(), content_type))
        };

        let (body, content_type) = match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result?,
            Err(_) => return Err(FetchError::Timeout { after: self.timeout }),
        };

        if body.is_empty() {
            return Err(FetchError::EmptyBody);
        }

        let latency = started.elapsed();
        metrics::histogram!("fetch_latency_ms").record(latency.as_secs_f64() * 1000.0);

        self.sequence += 1;
        debug!("fetched {} bytes in {:?}", body.len(), latency);

        Ok(Frame::new(self.sequence, body, content_type, latency))
    }
}

impl FrameSource for HttpFetcher {
    fn next_frame(&mut self) -> impl Future<Output = Result<Frame, FetchError>> + Send {
        self.fetch_frame()
    }
}
