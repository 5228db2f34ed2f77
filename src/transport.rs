use std::future::Future;

use derive_more::Display;
use serde_json::Value as JsonValue;

use crate::error::Error;
use crate::types::AccessToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Method {
    #[display("GET")]
    Get,
    #[display("POST")]
    Post,
    #[display("PUT")]
    Put,
}

/// A request to the identity service.
///
/// The credential travels with each request; transports keep no
/// authentication defaults of their own.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<JsonValue>,
    pub bearer: Option<AccessToken>,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            bearer: None,
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_bearer(mut self, token: Option<AccessToken>) -> Self {
        self.bearer = token;
        self
    }

    /// `Authorization` header value this request will carry, if any.
    #[must_use]
    pub fn authorization(&self) -> Option<String> {
        self.bearer.as_ref().map(AccessToken::bearer)
    }
}

/// Error response from the identity service.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("identity service rejected request (status {status:?})")]
#[non_exhaustive]
pub struct ApiError {
    pub status: Option<u16>,
    pub body: Option<JsonValue>,
}

impl ApiError {
    #[must_use]
    pub fn new(status: Option<u16>, body: Option<JsonValue>) -> Self {
        Self { status, body }
    }

    /// Service-provided `error` text, if the body carries a non-empty one.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.body
            .as_ref()?
            .get("error")?
            .as_str()
            .filter(|message| !message.is_empty())
    }
}

/// Sends requests to the identity service.
///
/// Success yields the parsed response body (`Null` when empty). Any
/// failure, network or application level, is an [`Error`].
pub trait Transport: Send + Sync + 'static {
    fn send(&self, request: ApiRequest) -> impl Future<Output = Result<JsonValue, Error>> + Send;
}

#[cfg(feature = "http")]
pub use self::http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use serde_json::Value as JsonValue;
    use url::Url;

    use super::{ApiError, ApiRequest, Method, Transport};
    use crate::config::ClientConfig;
    use crate::error::Error;

    /// [`Transport`] over HTTP, resolving request paths against a base URL.
    #[derive(Debug, Clone)]
    pub struct HttpTransport {
        base_url: Url,
        http: reqwest::Client,
    }

    impl HttpTransport {
        #[must_use]
        pub fn new(config: &ClientConfig) -> Self {
            Self {
                base_url: config.base_url().clone(),
                http: reqwest::Client::new(),
            }
        }

        /// Use a custom HTTP client (for connection pool reuse, timeouts or testing).
        #[must_use]
        pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
            self.http = client;
            self
        }

        /// Resolve a request path against the base URL.
        ///
        /// # Errors
        ///
        /// Returns [`Error::Config`] if the path does not form a valid URL.
        pub fn url_for(&self, path: &str) -> Result<Url, Error> {
            self.base_url
                .join(path)
                .map_err(|e| Error::Config(format!("invalid request path {path:?}: {e}")))
        }

        async fn execute(&self, request: ApiRequest) -> Result<JsonValue, Error> {
            let url = self.url_for(&request.path)?;
            tracing::debug!(method = %request.method, %url, "identity service request");

            let mut builder = match request.method {
                Method::Get => self.http.get(url),
                Method::Post => self.http.post(url),
                Method::Put => self.http.put(url),
            };
            if let Some(token) = &request.bearer {
                builder = builder.bearer_auth(token.as_str());
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = Self::ensure_success(builder.send().await?).await?;
            let bytes = response.bytes().await?;
            if bytes.is_empty() {
                return Ok(JsonValue::Null);
            }
            serde_json::from_slice(&bytes).map_err(Into::into)
        }

        /// Checks HTTP response status; returns the response on success or the
        /// service's error body.
        async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, Error> {
            if response.status().is_success() {
                return Ok(response);
            }
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::new(Some(status), serde_json::from_str(&body).ok()).into())
        }
    }

    impl Transport for HttpTransport {
        async fn send(&self, request: ApiRequest) -> Result<JsonValue, Error> {
            self.execute(request).await
        }
    }

}
