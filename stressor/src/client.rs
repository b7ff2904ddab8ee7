use crate::pool::PooledRequest;
use crate::statistics::RequestResult;
use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::Full;
use http_test_util::drain::DrainCountFuture;
use hyper::body::Incoming;
use hyper::Response;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Instant;
use tracing::trace;

#[derive(Clone)]
pub struct HttpClient {
    client: Client<HttpConnector, Full<Bytes>>,
}

impl HttpClient {
    #[must_use]
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client }
    }

    pub async fn send(&self, request: PooledRequest) -> Result<Response<Incoming>> {
        self.client
            .request(request)
            .await
            .context("Failed to send request")
    }

    /// Sends `request` and times it until the response is complete.
    /// With `count_bytes` the body is drained inside the timed section and
    /// its length recorded; otherwise timing stops at the response head and
    /// zero bytes are reported.
    pub async fn execute(&self, request: PooledRequest, count_bytes: bool) -> RequestResult {
        let start = Instant::now();
        let resp = match self.send(request).await {
            Ok(resp) => resp,
            Err(e) => {
                let elapsed = start.elapsed();
                trace!(error = ?e, "request failed");
                return RequestResult::failed(elapsed);
            }
        };
        if count_bytes {
            return match DrainCountFuture::new(resp.into_body()).await {
                Ok(received) => RequestResult::succeeded(start.elapsed(), received),
                Err(e) => {
                    trace!(error = %e, "failed to read response body");
                    RequestResult::failed(start.elapsed())
                }
            };
        }
        let elapsed = start.elapsed();
        // Unread body: hyper closes the connection instead of pooling it
        drop(resp);
        RequestResult::succeeded(elapsed, 0)
    }
}
