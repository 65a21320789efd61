//! Backend REST client
//!
//! `ApiClient::fetch` is the only point of contact with the backend. It
//! attaches the bearer token, serializes bodies, and turns HTTP and transport
//! failures into [`Error`] values carrying a human readable message. The
//! submodules add typed wrappers for each backend area.

pub mod auth;
pub mod conversations;
pub mod sources;
pub mod tracked;

use crate::error::{Error, Result};
use crate::token::TokenStore;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

/// A request description: method, optional JSON body, and whether to authenticate
#[derive(Debug)]
pub struct ApiRequest {
    method: Method,
    body: Option<serde_json::Result<Vec<u8>>>,
    auth: bool,
}

impl ApiRequest {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            body: None,
            auth: false,
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    pub fn put() -> Self {
        Self::new(Method::PUT)
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    /// Attach a JSON body. Serialization failures surface when the request is sent.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Self {
        self.body = Some(serde_json::to_vec(body));
        self
    }

    /// Send the stored bearer token, if there is one
    pub fn authenticated(mut self) -> Self {
        self.auth = true;
        self
    }
}

/// Percent-encode a value for use as a single path segment
pub fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Client for the RAG backend
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    tokens: Arc<TokenStore>,
}

impl ApiClient {
    pub fn new(base_url: &str, tokens: Arc<TokenStore>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .map_err(|e| Error::Config(format!("Invalid backend URL '{}': {}", base_url, e)))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            tokens,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Perform a request and decode the JSON response into `T`
    pub async fn fetch<T: DeserializeOwned>(&self, path: &str, request: ApiRequest) -> Result<T> {
        let value = self.fetch_value(path, request).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Like [`fetch`](Self::fetch), but gives up as soon as `cancel` fires.
    ///
    /// The in-flight request is dropped and `Error::Cancelled` is returned, so
    /// callers never apply a response their consumer no longer waits for.
    pub async fn fetch_cancellable<T: DeserializeOwned>(
        &self,
        path: &str,
        request: ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<T> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Request to {} cancelled", path);
                Err(Error::Cancelled)
            }
            result = self.fetch(path, request) => result,
        }
    }

    /// Perform a request and return the raw JSON response (`{}` for empty bodies)
    pub async fn fetch_value(&self, path: &str, request: ApiRequest) -> Result<Value> {
        let url = self.url_for(path);

        let body = match request.body {
            Some(Ok(bytes)) => Some(bytes),
            Some(Err(e)) => return Err(Error::Serialization(e)),
            None => None,
        };

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .header(CONTENT_TYPE, "application/json");

        if request.auth {
            if let Some(token) = self.tokens.get() {
                builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
            }
        }

        if let Some(bytes) = body {
            builder = builder.body(bytes);
        }

        debug!("{} {}", request.method, url);

        let response = builder.send().await.map_err(|e| Error::Network {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        let text = response.text().await?;
        let data: Value = if text.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&text)?
        };

        if !status.is_success() {
            let message = message_field(&data, "message")
                .or_else(|| message_field(&data, "error"))
                .unwrap_or_else(|| {
                    format!(
                        "HTTP {} {}",
                        status.as_u16(),
                        status.canonical_reason().unwrap_or("")
                    )
                    .trim_end()
                    .to_string()
                });
            debug!("{} {} failed: {} {}", request.method, url, status, message);
            return Err(Error::Http {
                status: status.as_u16(),
                message,
            });
        }

        Ok(data)
    }
}

fn message_field(data: &Value, key: &str) -> Option<String> {
    data.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Client pointed at a mock server, logged in with `token`
    pub fn client_for(uri: &str, token: Option<&str>) -> ApiClient {
        let tokens = TokenStore::in_memory();
        if let Some(token) = token {
            tokens.save(token, "Tester").unwrap();
        }
        ApiClient::new(uri, Arc::new(tokens), Duration::from_secs(5)).unwrap()
    }
}
