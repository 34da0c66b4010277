use std::pin::Pin;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use std::time::{Duration, Instant};

use futures::Stream;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::fetch::FetchStream;
use crate::ndjson::process_ndjson;
use crate::observability::{
    CLIENT_ABORTS, CLIENT_HEADER_LATENCY, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS,
};
use crate::types::{ChatMessage, ChatRequest, DEFAULT_KEEP_ALIVE, StreamFrame};

/// Where a locally hosted model server listens unless configured otherwise.
pub const DEFAULT_HOST: &str = "http://localhost:11434";

/// Local inference can be slow, so the default bound on a request is generous.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Decoded frames of a streaming chat response.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<StreamFrame>> + Send>>;

static SHARED: OnceLock<Arc<ChatClient>> = OnceLock::new();

/// The seam between a conversation and the model server.
///
/// [`ChatClient`] is the real implementation; tests substitute scripted transports.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Issue one streaming chat request and return its results.
    ///
    /// Failures are reported in-band as a single failed [`crate::FetchResult`].
    async fn fetch(
        &self,
        model: &str,
        messages: &[ChatMessage],
        format: Option<&Value>,
    ) -> FetchStream;

    /// Abort whatever request is in flight.  Later requests are unaffected.
    fn abort(&self);
}

/// Options for constructing a [`ChatClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Base URL of the model server.
    pub host: String,
    /// Upper bound on the duration of a whole request, body included.
    pub timeout: Duration,
    /// Keep-alive hint sent with every request.
    pub keep_alive: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            timeout: DEFAULT_TIMEOUT,
            keep_alive: DEFAULT_KEEP_ALIVE.to_string(),
        }
    }
}

/// Client for a locally hosted model server's streaming chat endpoint.
///
/// One client owns one connection pool, reused across turns and conversations.  The host can be
/// changed at any time; the change applies to the next request.
#[derive(Debug)]
pub struct ChatClient {
    client: ReqwestClient,
    host: RwLock<String>,
    timeout: Duration,
    keep_alive: String,
    cancel: Mutex<CancellationToken>,
}

impl ChatClient {
    /// Create a new client.
    pub fn new(options: ClientOptions) -> Result<Self> {
        let host = normalize_host(&options.host)?;
        let client = ReqwestClient::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            host: RwLock::new(host),
            timeout: options.timeout,
            keep_alive: options.keep_alive,
            cancel: Mutex::new(CancellationToken::new()),
        })
    }

    /// Create a client with default options talking to `host`.
    pub fn with_host(host: impl Into<String>) -> Result<Self> {
        Self::new(ClientOptions {
            host: host.into(),
            ..ClientOptions::default()
        })
    }

    /// The process-wide client, created with default options on first use.
    pub fn shared() -> Result<Arc<ChatClient>> {
        if let Some(client) = SHARED.get() {
            return Ok(Arc::clone(client));
        }
        let client = Arc::new(Self::new(ClientOptions::default())?);
        Ok(Arc::clone(SHARED.get_or_init(|| client)))
    }

    /// The current base URL.
    pub fn host(&self) -> String {
        self.host
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Point the client at a different server.  Takes effect on the next request.
    pub fn set_host(&self, host: &str) -> Result<()> {
        let host = normalize_host(host)?;
        tracing::info!(host = %host, "model server host changed");
        *self.host.write().unwrap_or_else(PoisonError::into_inner) = host;
        Ok(())
    }

    /// The request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The keep-alive hint sent with every request.
    pub fn keep_alive(&self) -> &str {
        &self.keep_alive
    }

    /// Abort the in-flight request, if any, and arm a fresh token for the next one.
    pub fn abort(&self) {
        let mut cancel = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        cancel.cancel();
        *cancel = CancellationToken::new();
        CLIENT_ABORTS.click();
        tracing::debug!("chat request aborted");
    }

    fn current_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.host())
    }

    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/x-ndjson"),
        );
        headers
    }

    /// Convert a non-success response into an [`Error::Api`].
    ///
    /// The server usually explains itself as `{"error": "..."}`; otherwise the raw body is used.
    async fn process_error_response(response: Response) -> Error {
        #[derive(Deserialize)]
        struct ErrorResponse {
            error: String,
        }

        let status_code = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|parsed| parsed.error)
            .unwrap_or(body);
        Error::api(status_code, message)
    }

    /// Send `request` and return its decoded frames.
    ///
    /// The response headers are read before anything else; a non-success status becomes an
    /// [`Error::Api`] carrying the status and body, and the body is never treated as a stream.
    pub async fn stream_chat(&self, request: &ChatRequest) -> Result<FrameStream> {
        let cancel = self.current_token();
        self.send_chat(request, &cancel).await
    }

    async fn send_chat(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<FrameStream> {
        CLIENT_REQUESTS.click();
        let url = self.chat_url();
        let start = Instant::now();

        let send = self
            .client
            .post(&url)
            .headers(Self::default_headers())
            .json(request)
            .send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(Error::abort("aborted before the server responded"));
            }
            response = send => response.map_err(|e| Error::from_send(e, self.timeout))?,
        };
        CLIENT_HEADER_LATENCY.add(start.elapsed().as_secs_f64());

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        Ok(Box::pin(process_ndjson(response.bytes_stream())))
    }

    /// Issue one chat request for `messages` and return its results.
    ///
    /// Never fails outright: a transport error becomes a single failed result.
    pub async fn fetch(
        &self,
        model: &str,
        messages: &[ChatMessage],
        format: Option<&Value>,
    ) -> FetchStream {
        let request = ChatRequest::new(model, messages.to_vec())
            .with_format(format.cloned())
            .with_keep_alive(self.keep_alive.clone());
        let cancel = self.current_token();
        match self.send_chat(&request, &cancel).await {
            Ok(frames) => FetchStream::new(frames, cancel),
            Err(err) => {
                if err.is_abort() {
                    tracing::debug!(model = %model, "chat request aborted");
                } else {
                    CLIENT_REQUEST_ERRORS.click();
                    tracing::warn!(error = %err, model = %model, "chat request failed");
                }
                FetchStream::failed(err, cancel)
            }
        }
    }
}

#[async_trait::async_trait]
impl Transport for ChatClient {
    async fn fetch(
        &self,
        model: &str,
        messages: &[ChatMessage],
        format: Option<&Value>,
    ) -> FetchStream {
        ChatClient::fetch(self, model, messages, format).await
    }

    fn abort(&self) {
        ChatClient::abort(self)
    }
}

/// Validate a base URL and strip any trailing slash.
fn normalize_host(host: &str) -> Result<String> {
    let host = host.trim().trim_end_matches('/');
    if host.is_empty() {
        return Err(Error::validation(
            "host must not be empty",
            Some("host".to_string()),
        ));
    }
    let parsed = url::Url::parse(host)?;
    match parsed.scheme() {
        "http" | "https" => Ok(host.to_string()),
        scheme => Err(Error::validation(
            format!("unsupported scheme {scheme:?}; expected http or https"),
            Some("host".to_string()),
        )),
    }
}
