// The `http` module wraps the hyper client used for webhooks, price feeds and mail APIs.

use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, StatusCode, header::HeaderMap};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::Client, client::legacy::connect::HttpConnector, rt::TokioExecutor,
};
use rustls::crypto::{CryptoProvider, ring::default_provider};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio_util::bytes::Bytes;
use tracing::{debug, warn};

/// A type alias for the HTTPS connector.
pub type HttpsConnectorType = HttpsConnector<HttpConnector>;
/// A type alias for the Hyper client.
pub type HyperClient = Client<HttpsConnectorType, Full<Bytes>>;

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Request failed: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),
    #[error("Failed to read response body: {0}")]
    Body(#[from] hyper::Error),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

/// Builds the HTTPS connector, preferring the platform's root certificates.
pub fn https_connector() -> HttpsConnectorType {
    _ = CryptoProvider::install_default(default_provider());

    let builder = match HttpsConnectorBuilder::new().with_native_roots() {
        Ok(builder) => builder,
        Err(e) => {
            warn!(error = %e, "No native root certificates, falling back to webpki roots");
            HttpsConnectorBuilder::new().with_webpki_roots()
        }
    };
    builder.https_or_http().enable_http1().build()
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// The body as JSON, falling back to a JSON string of the raw text.
    pub fn json_or_text(&self) -> Value {
        serde_json::from_slice(&self.body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&self.body).into_owned()))
    }
}

/// A cheap-to-clone HTTP client with per-request timeouts.
#[derive(Clone)]
pub struct HttpClient {
    inner: HyperClient,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            inner: Client::builder(TokioExecutor::new()).build(https_connector()),
        }
    }

    pub async fn send(
        &self,
        method: &str,
        url: &str,
        headers: &[(String, String)],
        body: Option<Vec<u8>>,
        timeout: Duration,
    ) -> Result<HttpResponse, HttpError> {
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|e| HttpError::InvalidRequest(e.to_string()))?;
        let mut builder = Request::builder().method(method.clone()).uri(url);
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let request = builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| HttpError::InvalidRequest(e.to_string()))?;

        debug!(%method, url, "Sending HTTP request");
        let response = tokio::time::timeout(timeout, self.inner.request(request))
            .await
            .map_err(|_| HttpError::Timeout(timeout))??;

        let status = response.status();
        let headers = response.headers().clone();
        let body = tokio::time::timeout(timeout, response.into_body().collect())
            .await
            .map_err(|_| HttpError::Timeout(timeout))??
            .to_bytes();
        debug!(%status, url, "HTTP response received");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    pub async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, HttpError> {
        self.send("GET", url, &[], None, timeout).await
    }

    pub async fn post_json(
        &self,
        url: &str,
        headers: &[(String, String)],
        payload: &Value,
        timeout: Duration,
    ) -> Result<HttpResponse, HttpError> {
        let mut all = vec![("Content-Type".to_string(), "application/json".to_string())];
        all.extend_from_slice(headers);
        let body = serde_json::to_vec(payload)
            .map_err(|e| HttpError::InvalidRequest(e.to_string()))?;
        self.send("POST", url, &all, Some(body), timeout).await
    }
}

#[cfg(test)]
pub(crate) mod test_server {
    use axum::Router;
    use std::net::SocketAddr;

    /// Serves `router` on an ephemeral local port and returns its base URL.
    pub async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }
}
