use std::collections::{BTreeMap, VecDeque};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Boxed future returned by transport traits.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, HttpError>> + Send + 'a>>;

/// GET request envelope used by upstream transport calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub timeout_ms: u64,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
            timeout_ms: 3_000,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_headers<'h>(mut self, headers: impl IntoIterator<Item = (&'h str, &'h str)>) -> Self {
        for (name, value) in headers {
            self = self.with_header(name, value);
        }
        self
    }

    /// Append a URL-encoded query parameter.
    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        self.url = format!(
            "{}{separator}{}={}",
            self.url,
            urlencoding::encode(name),
            urlencoding::encode(value)
        );
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis().min(u128::from(u64::MAX)) as u64;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// HTTP response envelope returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok_json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    pub const fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Transport-level failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    Timeout,
    Connect,
    Status,
    Body,
    Other,
}

/// Transport-level HTTP error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    kind: HttpErrorKind,
    message: String,
}

impl HttpError {
    pub fn new(kind: HttpErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Timeout, message)
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Connect, message)
    }

    pub fn status(status: u16) -> Self {
        Self::new(HttpErrorKind::Status, format!("unexpected status {status}"))
    }

    pub const fn kind(&self) -> HttpErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn is_timeout(&self) -> bool {
        matches!(self.kind, HttpErrorKind::Timeout)
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

/// Metadata transport: one GET, whole body as text.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(&'a self, request: HttpRequest) -> TransportFuture<'a, HttpResponse>;
}

/// Media transport: stream a response body into `sink`, returning the byte count.
pub trait DownloadClient: Send + Sync {
    fn download<'a>(
        &'a self,
        request: HttpRequest,
        sink: &'a mut (dyn AsyncWrite + Send + Unpin),
    ) -> TransportFuture<'a, u64>;
}

/// Production HTTP client using reqwest for real upstream calls.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Arc<reqwest::Client>,
}

impl ReqwestHttpClient {
    /// Create a new ReqwestHttpClient with default configuration.
    pub fn new() -> Self {
        Self {
            client: Arc::new(
                reqwest::Client::builder()
                    .user_agent(concat!("tunefetch/", env!("CARGO_PKG_VERSION")))
                    .build()
                    .unwrap_or_else(|_| reqwest::Client::new()),
            ),
        }
    }

    /// Create a ReqwestHttpClient with a custom reqwest::Client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    async fn send(&self, request: &HttpRequest) -> Result<reqwest::Response, HttpError> {
        let mut builder = self.client.get(&request.url).timeout(request.timeout());

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        builder.send().await.map_err(map_reqwest_error)
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

fn map_reqwest_error(error: reqwest::Error) -> HttpError {
    if error.is_timeout() {
        HttpError::timeout(format!("request timeout: {error}"))
    } else if error.is_connect() {
        HttpError::connect(format!("connection failed: {error}"))
    } else {
        HttpError::new(HttpErrorKind::Other, format!("request failed: {error}"))
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> TransportFuture<'a, HttpResponse> {
        Box::pin(async move {
            let response = self.send(&request).await?;
            let status = response.status().as_u16();
            let body = response.text().await.map_err(|e| {
                HttpError::new(
                    HttpErrorKind::Body,
                    format!("failed to read response body: {e}"),
                )
            })?;

            Ok(HttpResponse { status, body })
        })
    }
}

impl DownloadClient for ReqwestHttpClient {
    fn download<'a>(
        &'a self,
        request: HttpRequest,
        sink: &'a mut (dyn AsyncWrite + Send + Unpin),
    ) -> TransportFuture<'a, u64> {
        Box::pin(async move {
            let mut response = self.send(&request).await?;
            if !response.status().is_success() {
                return Err(HttpError::status(response.status().as_u16()));
            }

            let mut written = 0_u64;
            while let Some(chunk) = response.chunk().await.map_err(|e| {
                HttpError::new(HttpErrorKind::Body, format!("media transfer interrupted: {e}"))
            })? {
                sink.write_all(&chunk).await.map_err(|e| {
                    HttpError::new(HttpErrorKind::Other, format!("failed to write media chunk: {e}"))
                })?;
                written += chunk.len() as u64;
            }
            sink.flush().await.map_err(|e| {
                HttpError::new(HttpErrorKind::Other, format!("failed to flush media: {e}"))
            })?;

            Ok(written)
        })
    }
}

/// Canned reply served by [`ScriptedHttpClient`].
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Respond with the given status and body.
    Respond { status: u16, body: Vec<u8> },
    /// Fail with a transport error.
    Fail(HttpError),
    /// Never complete; the caller's timeout decides the outcome.
    Hang,
    /// Wait, then produce the inner reply.
    Delayed(Duration, Box<ScriptedReply>),
}

impl ScriptedReply {
    pub fn json(body: impl Into<String>) -> Self {
        Self::Respond {
            status: 200,
            body: body.into().into_bytes(),
        }
    }

    pub fn bytes(body: impl Into<Vec<u8>>) -> Self {
        Self::Respond {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self::Respond {
            status,
            body: Vec::new(),
        }
    }

    pub fn delayed(self, delay: Duration) -> Self {
        Self::Delayed(delay, Box::new(self))
    }
}

#[derive(Debug)]
struct ScriptedRoute {
    pattern: String,
    replies: VecDeque<ScriptedReply>,
}

/// Deterministic in-process transport for offline tests and demos.
///
/// A request is answered by the first route whose pattern is a substring of
/// the URL. Replies are consumed in order; the last one repeats.
#[derive(Debug, Clone, Default)]
pub struct ScriptedHttpClient {
    routes: Arc<Mutex<Vec<ScriptedRoute>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, pattern: impl Into<String>, replies: Vec<ScriptedReply>) -> Self {
        if let Ok(mut routes) = self.routes.lock() {
            routes.push(ScriptedRoute {
                pattern: pattern.into(),
                replies: replies.into(),
            });
        }
        self
    }

    /// URLs requested so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn call_count_matching(&self, pattern: &str) -> usize {
        self.calls()
            .iter()
            .filter(|url| url.contains(pattern))
            .count()
    }

    fn next_reply(&self, url: &str) -> ScriptedReply {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(url.to_owned());
        }

        let Ok(mut routes) = self.routes.lock() else {
            return ScriptedReply::Fail(HttpError::connect("scripted routes poisoned"));
        };
        let Some(route) = routes.iter_mut().find(|route| url.contains(&route.pattern)) else {
            return ScriptedReply::Fail(HttpError::connect(format!("no scripted route for {url}")));
        };

        if route.replies.len() > 1 {
            route.replies.pop_front().unwrap_or(ScriptedReply::Hang)
        } else {
            route.replies.front().cloned().unwrap_or(ScriptedReply::Hang)
        }
    }
}

async fn play(reply: ScriptedReply) -> Result<(u16, Vec<u8>), HttpError> {
    let mut reply = reply;
    loop {
        match reply {
            ScriptedReply::Respond { status, body } => return Ok((status, body)),
            ScriptedReply::Fail(error) => return Err(error),
            ScriptedReply::Hang => return std::future::pending().await,
            ScriptedReply::Delayed(delay, inner) => {
                tokio::time::sleep(delay).await;
                reply = *inner;
            }
        }
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> TransportFuture<'a, HttpResponse> {
        let reply = self.next_reply(&request.url);
        Box::pin(async move {
            let (status, body) = play(reply).await?;
            Ok(HttpResponse {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            })
        })
    }
}

impl DownloadClient for ScriptedHttpClient {
    fn download<'a>(
        &'a self,
        request: HttpRequest,
        sink: &'a mut (dyn AsyncWrite + Send + Unpin),
    ) -> TransportFuture<'a, u64> {
        let reply = self.next_reply(&request.url);
        Box::pin(async move {
            let (status, body) = play(reply).await?;
            if !(200..300).contains(&status) {
                return Err(HttpError::status(status));
            }
            sink.write_all(&body).await.map_err(|e| {
                HttpError::new(HttpErrorKind::Other, format!("failed to write media chunk: {e}"))
            })?;
            sink.flush().await.map_err(|e| {
                HttpError::new(HttpErrorKind::Other, format!("failed to flush media: {e}"))
            })?;
            Ok(body.len() as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_parameters_are_url_encoded() {
        let request = HttpRequest::get("https://example.test/api.php")
            .with_query("__call", "search.getResults")
            .with_query("query", "arijit singh");

        assert_eq!(
            request.url,
            "https://example.test/api.php?__call=search.getResults&query=arijit%20singh"
        );
    }

    #[test]
    fn header_names_are_lowercased() {
        let request =
            HttpRequest::get("https://example.test").with_headers([("User-Agent", "demo")]);

        assert_eq!(
            request.headers.get("user-agent").map(String::as_str),
            Some("demo")
        );
    }

    #[tokio::test]
    async fn scripted_client_consumes_replies_in_order_and_repeats_the_last() {
        let client = ScriptedHttpClient::new().route(
            "a.test",
            vec![ScriptedReply::status(503), ScriptedReply::json("{}")],
        );

        let first = client.execute(HttpRequest::get("https://a.test/x")).await;
        let second = client.execute(HttpRequest::get("https://a.test/x")).await;
        let third = client.execute(HttpRequest::get("https://a.test/x")).await;

        assert_eq!(first.map(|r| r.status), Ok(503));
        assert_eq!(second.map(|r| r.status), Ok(200));
        assert_eq!(third.map(|r| r.status), Ok(200));
        assert_eq!(client.call_count_matching("a.test"), 3);
    }

    #[tokio::test]
    async fn scripted_client_fails_unknown_routes_with_connect_error() {
        let client = ScriptedHttpClient::new();

        let error = client
            .execute(HttpRequest::get("https://nowhere.test"))
            .await
            .expect_err("no route");

        assert_eq!(error.kind(), HttpErrorKind::Connect);
    }

    #[tokio::test]
    async fn scripted_download_writes_body_into_sink() {
        let client = ScriptedHttpClient::new().route("cdn.test", vec![ScriptedReply::bytes(b"abc".to_vec())]);
        let mut sink = Vec::new();

        let written = client
            .download(HttpRequest::get("https://cdn.test/a.mp4"), &mut sink)
            .await
            .expect("download succeeds");

        assert_eq!(written, 3);
        assert_eq!(sink, b"abc");
    }
}
