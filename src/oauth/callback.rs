//! Local HTTP listener for the OAuth completion redirect
//!
//! The listener answers the first completion request only. That request
//! stores the tokens, hands the outcome to whoever awaits [`CallbackServer::wait`],
//! and schedules the listener to stop after the outcome's close delay.
//! Later requests get an "already processed" page and are never resubmitted.

use super::{complete_oauth, OAuthCallback, OAuthOutcome};
use crate::api::ApiClient;
use crate::config::OAuthConfig;
use crate::error::{Error, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct CallbackState {
    api: ApiClient,
    config: OAuthConfig,
    signal: Mutex<Option<oneshot::Sender<OAuthOutcome>>>,
    shutdown: CancellationToken,
}

impl CallbackState {
    fn take_signal(&self) -> Option<oneshot::Sender<OAuthOutcome>> {
        self.signal
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}

pub struct CallbackServer {
    addr: SocketAddr,
    path: String,
    outcome: oneshot::Receiver<OAuthOutcome>,
    shutdown: CancellationToken,
    handle: JoinHandle<std::io::Result<()>>,
}

impl CallbackServer {
    /// Start listening on `config.callback_addr`
    pub async fn bind(api: ApiClient, config: &OAuthConfig) -> Result<Self> {
        let addr: SocketAddr = config.callback_addr.parse().map_err(|e| {
            Error::Config(format!(
                "Invalid OAuth callback address '{}': {}",
                config.callback_addr, e
            ))
        })?;
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;

        let (tx, rx) = oneshot::channel();
        let shutdown = CancellationToken::new();
        let state = Arc::new(CallbackState {
            api,
            config: config.clone(),
            signal: Mutex::new(Some(tx)),
            shutdown: shutdown.clone(),
        });

        let app = Router::new()
            .route(&config.callback_path, get(handle_completion))
            .with_state(state);

        let token = shutdown.clone();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
        });

        info!("OAuth callback listening on http://{}{}", addr, config.callback_path);
        Ok(Self {
            addr,
            path: config.callback_path.clone(),
            outcome: rx,
            shutdown,
            handle,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Full URL of the completion route
    pub fn callback_url(&self) -> String {
        format!("http://{}{}", self.addr, self.path)
    }

    /// Wait for the completion request, then for the listener to close.
    ///
    /// Gives up with an error after `timeout`.
    pub async fn wait(mut self, timeout: Duration) -> Result<OAuthOutcome> {
        let outcome = match tokio::time::timeout(timeout, &mut self.outcome).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                self.close().await;
                return Err(Error::OAuth("The callback listener stopped".to_string()));
            }
            Err(_) => {
                self.close().await;
                return Err(Error::OAuth(
                    "Timed out waiting for the provider authorization".to_string(),
                ));
            }
        };

        self.join().await;
        Ok(outcome)
    }

    /// Stop listening without waiting for a completion request
    pub async fn close(mut self) {
        self.shutdown.cancel();
        self.join().await;
    }

    async fn join(&mut self) {
        match (&mut self.handle).await {
            Ok(Ok(())) => debug!("OAuth callback listener closed"),
            Ok(Err(e)) => warn!("OAuth callback listener failed: {}", e),
            Err(e) => warn!("OAuth callback listener task failed: {}", e),
        }
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle_completion(
    State(state): State<Arc<CallbackState>>,
    Query(callback): Query<OAuthCallback>,
) -> (StatusCode, Html<String>) {
    let Some(signal) = state.take_signal() else {
        debug!("Ignoring repeated OAuth completion request");
        return (
            StatusCode::CONFLICT,
            Html(page("Already processed", "You can close this window.")),
        );
    };

    let outcome = OAuthOutcome::from(complete_oauth(&state.api, &callback).await);
    let delay = outcome.close_delay(&state.config);
    let response = match &outcome {
        OAuthOutcome::Failed(message) => {
            warn!("OAuth completion failed: {}", message);
            (
                StatusCode::BAD_REQUEST,
                Html(page("Authentication failed", message)),
            )
        }
        _ => (
            StatusCode::OK,
            Html(page(
                "Authentication successful",
                "You can close this window and return to the terminal.",
            )),
        ),
    };

    if signal.send(outcome).is_err() {
        debug!("Nobody is waiting for the OAuth outcome");
    }
    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        shutdown.cancel();
    });

    response
}

fn page(title: &str, message: &str) -> String {
    format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>ragdesk</title></head>\
         <body><h2>{}</h2><p>{}</p></body></html>",
        escape(title),
        escape(message)
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::client_for;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(close_ms: u64) -> OAuthConfig {
        OAuthConfig {
            callback_addr: "127.0.0.1:0".to_string(),
            success_close_ms: close_ms,
            error_close_ms: close_ms,
            ..OAuthConfig::default()
        }
    }

    #[tokio::test]
    async fn test_completion_is_processed_once() {
        let backend = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/document-sources"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 4, "name": "Drive", "provider": "google_drive", "isActive": true
            })))
            .expect(1)
            .mount(&backend)
            .await;

        let api = client_for(&backend.uri(), Some("jwt"));
        let server = CallbackServer::bind(api, &test_config(500)).await.unwrap();
        let url = format!(
            "{}?provider=google_drive&accessToken=tok&sourceName=Drive",
            server.callback_url()
        );

        let http = reqwest::Client::new();
        let first = http.get(&url).send().await.unwrap();
        assert_eq!(first.status(), 200);
        let second = http.get(&url).send().await.unwrap();
        assert_eq!(second.status(), 409);

        let outcome = server.wait(Duration::from_secs(5)).await.unwrap();
        assert!(matches!(outcome, OAuthOutcome::Created(ref s) if s.id == 4));
    }

    #[tokio::test]
    async fn test_failed_completion_is_reported() {
        let backend = MockServer::start().await;
        let api = client_for(&backend.uri(), Some("jwt"));
        let server = CallbackServer::bind(api, &test_config(10)).await.unwrap();

        let response = reqwest::get(format!("{}?provider=dropbox", server.callback_url()))
            .await
            .unwrap();
        assert_eq!(response.status(), 400);

        let outcome = server.wait(Duration::from_secs(5)).await.unwrap();
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let backend = MockServer::start().await;
        let api = client_for(&backend.uri(), None);
        let server = CallbackServer::bind(api, &test_config(10)).await.unwrap();

        let err = server.wait(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, Error::OAuth(_)));
    }

    #[tokio::test]
    async fn test_close_releases_address() {
        let backend = MockServer::start().await;
        let api = client_for(&backend.uri(), None);
        let server = CallbackServer::bind(api.clone(), &test_config(10)).await.unwrap();
        let addr = server.local_addr();

        server.close().await;

        let config = OAuthConfig {
            callback_addr: addr.to_string(),
            ..test_config(10)
        };
        let again = CallbackServer::bind(api, &config).await.unwrap();
        assert_eq!(again.local_addr(), addr);
    }

    #[tokio::test]
    async fn test_dropped_server_stops_listening() {
        let backend = MockServer::start().await;
        let api = client_for(&backend.uri(), None);
        let server = CallbackServer::bind(api, &test_config(10)).await.unwrap();
        let url = server.callback_url();

        drop(server);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(reqwest::get(url).await.is_err());
    }

    #[test]
    fn test_page_escapes_messages() {
        assert!(page("t", "<b>x</b>").contains("&lt;b&gt;x&lt;/b&gt;"));
    }
}
