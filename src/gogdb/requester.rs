//! Retrying JSON fetches against the GOGDB data API
//!
//! A [`Requester`] borrows one transport (normally a [`super::Session`]) for
//! the duration of a logical operation. Failures never escape as errors: each
//! fetch resolves to a [`FetchResult`], and batches resolve to one result per
//! input in input order.

use std::fmt;
use std::time::Duration;

use futures::future::join_all;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tracing::{debug, error};

use super::session::{Transport, TransportError};
use crate::config::ApiConfig;

/// Classification of a failed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Response arrived with a non-2xx status
    HttpStatus,
    /// Could not connect to the host
    Connect,
    /// The attempt ran past the per-request timeout
    Timeout,
    /// Any other I/O failure, including reading the body
    Transport,
    /// Body was not valid JSON
    Decode,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::HttpStatus => "HttpStatus",
            FailureKind::Connect => "Connect",
            FailureKind::Timeout => "Timeout",
            FailureKind::Transport => "Transport",
            FailureKind::Decode => "Decode",
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, FailureKind::Decode)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured record of a fetch that did not produce JSON
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Present only when a response was received
    pub status: Option<u16>,
}

impl FetchFailure {
    fn from_status(status: StatusCode) -> Self {
        Self {
            kind: FailureKind::HttpStatus,
            message: status
                .canonical_reason()
                .unwrap_or("Unknown Status")
                .to_string(),
            status: Some(status.as_u16()),
        }
    }

    fn from_decode(err: serde_json::Error, status: StatusCode) -> Self {
        Self {
            kind: FailureKind::Decode,
            message: err.to_string(),
            status: Some(status.as_u16()),
        }
    }

    /// Diagnostic record in the shape the upstream bot logged
    pub fn to_record(&self) -> Value {
        let mut record = json!({
            "error": true,
            "errorType": self.kind.as_str(),
            "errorMessage": self.message,
        });
        if let Some(status) = self.status {
            record["responseStatus"] = json!(status);
        }
        record
    }
}

impl From<TransportError> for FetchFailure {
    fn from(err: TransportError) -> Self {
        Self {
            kind: err.kind,
            message: err.message,
            status: None,
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({}): {}", self.kind, status, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for FetchFailure {}

pub type FetchResult = Result<Value, FetchFailure>;

/// Query string parameters, kept in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

static NO_PARAMS: QueryParams = QueryParams(Vec::new());

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.0.push((key.to_string(), value.to_string()));
        self
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }
}

/// Fetches JSON documents through one borrowed transport
pub struct Requester<'a, T> {
    transport: &'a T,
    retries: u32,
    concurrency: usize,
    retry_delay: Duration,
}

impl<'a, T: Transport> Requester<'a, T> {
    pub fn new(transport: &'a T, config: &ApiConfig) -> Self {
        Self {
            transport,
            retries: config.retries(),
            concurrency: config.concurrency().max(1),
            retry_delay: config.retry_delay(),
        }
    }

    /// Fetch one URL, retrying transport and status failures up to the
    /// configured number of extra attempts
    pub async fn fetch_one(&self, url: &str, params: Option<&QueryParams>) -> FetchResult {
        let params = params.unwrap_or(&NO_PARAMS);
        let mut retries = 0u32;

        loop {
            debug!(url, ?params, attempt = retries + 1, "Requesting GOGDB resource");

            let failure = match self.transport.get(url, params).await {
                Ok(reply) if reply.status.is_success() => {
                    return serde_json::from_slice::<Value>(&reply.body).map_err(|e| {
                        let failure = FetchFailure::from_decode(e, reply.status);
                        error!(url, ?params, %failure, "Failed to decode GOGDB response");
                        failure
                    });
                }
                Ok(reply) => FetchFailure::from_status(reply.status),
                Err(err) => FetchFailure::from(err),
            };

            if !failure.kind.is_retryable() || retries >= self.retries {
                error!(url, ?params, retries, %failure, "Giving up on GOGDB request");
                return Err(failure);
            }

            retries += 1;
            debug!(url, retry = retries, max = self.retries, %failure, "Retrying GOGDB request");

            if !self.retry_delay.is_zero() {
                tokio::time::sleep(self.retry_delay).await;
            }
        }
    }

    /// Fetch several URLs sharing the same parameters
    pub async fn fetch_many_urls<S: AsRef<str>>(
        &self,
        urls: &[S],
        params: Option<&QueryParams>,
    ) -> Vec<FetchResult> {
        let mut results = Vec::with_capacity(urls.len());

        for chunk in urls.chunks(self.concurrency) {
            let batch = chunk.iter().map(|url| self.fetch_one(url.as_ref(), params));
            results.extend(join_all(batch).await);
        }

        results
    }

    /// Fetch one URL once per parameter set
    pub async fn fetch_many_params(&self, url: &str, params_list: &[QueryParams]) -> Vec<FetchResult> {
        let mut results = Vec::with_capacity(params_list.len());

        for chunk in params_list.chunks(self.concurrency) {
            let batch = chunk.iter().map(|params| self.fetch_one(url, Some(params)));
            results.extend(join_all(batch).await);
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gogdb::session::{Reply, Session};
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Answers every URL with `{"url": .., "country": ..}` after a delay
    /// taken from the trailing number in the URL, failing URLs containing "bad"
    #[derive(Default)]
    struct ScriptedTransport {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl Transport for ScriptedTransport {
        fn get(
            &self,
            url: &str,
            params: &QueryParams,
        ) -> impl Future<Output = Result<Reply, TransportError>> + Send {
            let url = url.to_string();
            let country = params
                .pairs()
                .iter()
                .find(|(k, _)| k == "countryCode")
                .map(|(_, v)| v.clone());
            async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(now, Ordering::SeqCst);

                let delay: u64 = url
                    .rsplit('/')
                    .next()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1);
                tokio::time::sleep(Duration::from_millis(delay)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);

                if url.contains("bad") {
                    return Ok(Reply {
                        status: StatusCode::INTERNAL_SERVER_ERROR,
                        body: Vec::new(),
                    });
                }
                let body = json!({ "url": url, "country": country }).to_string();
                Ok(Reply {
                    status: StatusCode::OK,
                    body: body.into_bytes(),
                })
            }
        }
    }

    fn config(root: &str) -> ApiConfig {
        ApiConfig::new(root)
    }

    #[tokio::test]
    async fn test_fetch_one_first_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products"))
            .and(query_param("query", "x4"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"count": 1, "products": []})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = config(&server.uri());
        let session = Session::open(&config).unwrap();
        let requester = Requester::new(&session, &config);
        let params = QueryParams::new().with("query", "x4").with("limit", 0);

        let result = requester
            .fetch_one(&format!("{}/products", server.uri()), Some(&params))
            .await;

        assert_eq!(result.unwrap(), json!({"count": 1, "products": []}));
    }

    #[tokio::test]
    async fn test_fetch_one_success_makes_single_call() {
        let transport = ScriptedTransport::default();
        let config = config("http://gogdb.test");
        let requester = Requester::new(&transport, &config);

        let result = requester.fetch_one("http://gogdb.test/products/1", None).await;

        assert_eq!(result.unwrap()["url"], "http://gogdb.test/products/1");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_one_recovers_after_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(3)
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let config = config(&server.uri());
        let session = Session::open(&config).unwrap();
        let requester = Requester::new(&session, &config);

        let result = requester
            .fetch_one(&format!("{}/products/1", server.uri()), None)
            .await;

        assert_eq!(result.unwrap(), json!({"id": 1}));
    }

    #[tokio::test]
    async fn test_fetch_one_retries_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let config = config(&server.uri()).with_retries(2);
        let session = Session::open(&config).unwrap();
        let requester = Requester::new(&session, &config);

        let failure = requester
            .fetch_one(&format!("{}/price/1", server.uri()), None)
            .await
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::HttpStatus);
        assert_eq!(failure.status, Some(503));
        assert_eq!(failure.message, "Service Unavailable");
    }

    #[tokio::test]
    async fn test_fetch_one_default_retry_bound() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(6)
            .mount(&server)
            .await;

        let config = config(&server.uri());
        let session = Session::open(&config).unwrap();
        let requester = Requester::new(&session, &config);

        let failure = requester
            .fetch_one(&format!("{}/changes/1", server.uri()), None)
            .await
            .unwrap_err();

        assert_eq!(failure.status, Some(500));
    }

    #[tokio::test]
    async fn test_fetch_one_decode_failure_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let config = config(&server.uri());
        let session = Session::open(&config).unwrap();
        let requester = Requester::new(&session, &config);

        let failure = requester
            .fetch_one(&format!("{}/products/1", server.uri()), None)
            .await
            .unwrap_err();

        assert_eq!(failure.kind, FailureKind::Decode);
        assert_eq!(failure.status, Some(200));
        assert!(!failure.kind.is_retryable());
    }

    #[tokio::test]
    async fn test_fetch_one_connection_failure() {
        // Bind then drop a listener so the port is known to be closed
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let root = format!("http://127.0.0.1:{}", port);
        let config = config(&root)
            .with_retries(1)
            .with_request_timeout(Duration::from_secs(2));
        let session = Session::open(&config).unwrap();
        let requester = Requester::new(&session, &config);

        let failure = requester
            .fetch_one(&format!("{}/products", root), None)
            .await
            .unwrap_err();

        assert!(failure.kind.is_retryable());
        assert_eq!(failure.status, None);
    }

    #[tokio::test]
    async fn test_batch_preserves_input_order() {
        let transport = ScriptedTransport::default();
        let config = config("http://gogdb.test").with_concurrency(4);
        let requester = Requester::new(&transport, &config);

        // Later entries finish first
        let urls = ["http://gogdb.test/40", "http://gogdb.test/30", "http://gogdb.test/20", "http://gogdb.test/10"];
        let results = requester.fetch_many_urls(&urls, None).await;

        assert_eq!(results.len(), urls.len());
        for (url, result) in urls.iter().zip(&results) {
            assert_eq!(result.as_ref().unwrap()["url"], json!(url));
        }
        assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_batch_respects_concurrency_limit() {
        let transport = ScriptedTransport::default();
        let config = config("http://gogdb.test").with_concurrency(3);
        let requester = Requester::new(&transport, &config);

        let urls: Vec<String> = (0..7).map(|i| format!("http://gogdb.test/{}", 10 + i)).collect();
        let results = requester.fetch_many_urls(&urls, None).await;

        assert_eq!(results.len(), 7);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 7);
        // A full chunk runs together, and chunks never overlap
        assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 3);
        assert_eq!(transport.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_batch_by_params_respects_concurrency_limit() {
        let transport = ScriptedTransport::default();
        let config = config("http://gogdb.test").with_concurrency(3);
        let requester = Requester::new(&transport, &config);

        let params: Vec<QueryParams> = (0..7)
            .map(|i| QueryParams::new().with("countryCode", format!("c{}", i)))
            .collect();
        let results = requester.fetch_many_params("http://gogdb.test/price/20", &params).await;

        assert_eq!(results.len(), 7);
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 7);
        assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let transport = ScriptedTransport::default();
        let config = config("http://gogdb.test").with_retries(1).with_concurrency(2);
        let requester = Requester::new(&transport, &config);

        let urls = ["http://gogdb.test/1", "http://gogdb.test/bad/1", "http://gogdb.test/2"];
        let results = requester.fetch_many_urls(&urls, None).await;

        assert!(results[0].is_ok());
        assert_eq!(results[1].as_ref().unwrap_err().status, Some(500));
        assert!(results[2].is_ok());
        // Two good fetches plus one initial attempt and one retry for the bad one
        assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_batch_empty_issues_no_requests() {
        let transport = ScriptedTransport::default();
        let config = config("http://gogdb.test");
        let requester = Requester::new(&transport, &config);

        let urls: Vec<&str> = Vec::new();
        assert!(requester.fetch_many_urls(&urls, None).await.is_empty());
        assert!(requester.fetch_many_params("http://gogdb.test/1", &[]).await.is_empty());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_batch_by_params_keeps_order() {
        let transport = ScriptedTransport::default();
        let config = config("http://gogdb.test").with_concurrency(2);
        let requester = Requester::new(&transport, &config);

        let params: Vec<QueryParams> = ["us", "de", "cn", "ru", "gb"]
            .iter()
            .map(|cc| QueryParams::new().with("countryCode", cc))
            .collect();
        let results = requester.fetch_many_params("http://gogdb.test/price/5", &params).await;

        let countries: Vec<&str> = results
            .iter()
            .map(|r| r.as_ref().unwrap()["country"].as_str().unwrap())
            .collect();
        assert_eq!(countries, vec!["us", "de", "cn", "ru", "gb"]);
    }

    #[test]
    fn test_failure_record_shape() {
        let failure = FetchFailure::from_status(StatusCode::NOT_FOUND);
        assert_eq!(
            failure.to_record(),
            json!({
                "error": true,
                "errorType": "HttpStatus",
                "errorMessage": "Not Found",
                "responseStatus": 404,
            })
        );

        let failure = FetchFailure::from(TransportError {
            kind: FailureKind::Timeout,
            message: "timed out".to_string(),
        });
        assert!(failure.to_record().get("responseStatus").is_none());
        assert_eq!(failure.to_string(), "Timeout: timed out");
    }
}
