//! Completion of provider OAuth flows
//!
//! After the user consents, the backend redirects the browser to a completion
//! URL carrying the provider tokens as query parameters. [`complete_oauth`]
//! persists them: it updates an existing source when `sourceId` is given and
//! creates a new one otherwise. [`CallbackServer`] serves that URL locally.

mod callback;

pub use callback::CallbackServer;

use crate::api::sources::{NewSource, SourceUpdate};
use crate::api::ApiClient;
use crate::config::OAuthConfig;
use crate::error::{Error, Result};
use crate::models::{Credentials, DocumentSource, Provider};
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

/// Query parameters of the completion URL
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthCallback {
    pub provider: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub source_name: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub root_folder_id: Option<String>,
    pub source_id: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl OAuthCallback {
    /// Parse the query string of a completion URL (with or without leading `?`)
    pub fn from_query(query: &str) -> Result<Self> {
        let query = query.trim_start_matches('?');
        let url = url::Url::parse(&format!("http://callback.local/?{}", query))?;
        let mut callback = Self::default();
        for (key, value) in url.query_pairs() {
            let value = Some(value.into_owned());
            match key.as_ref() {
                "provider" => callback.provider = value,
                "accessToken" => callback.access_token = value,
                "refreshToken" => callback.refresh_token = value,
                "sourceName" => callback.source_name = value,
                "clientId" => callback.client_id = value,
                "clientSecret" => callback.client_secret = value,
                "rootFolderId" => callback.root_folder_id = value,
                "sourceId" => callback.source_id = value,
                _ => {}
            }
        }
        Ok(callback)
    }

    fn credentials(&self, access_token: &str) -> Credentials {
        Credentials::new(access_token, self.refresh_token.clone())
    }
}

/// How a completion attempt ended
#[derive(Debug, Clone)]
pub enum OAuthOutcome {
    Created(DocumentSource),
    Updated(i64),
    Failed(String),
}

impl OAuthOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, OAuthOutcome::Failed(_))
    }

    /// How long the completion page stays up before the listener closes
    pub fn close_delay(&self, config: &OAuthConfig) -> Duration {
        if self.is_success() {
            Duration::from_millis(config.success_close_ms)
        } else {
            Duration::from_millis(config.error_close_ms)
        }
    }
}

impl From<Result<OAuthOutcome>> for OAuthOutcome {
    fn from(result: Result<OAuthOutcome>) -> Self {
        result.unwrap_or_else(|e| OAuthOutcome::Failed(e.to_string()))
    }
}

/// Persist the tokens of a completed OAuth flow
pub async fn complete_oauth(api: &ApiClient, callback: &OAuthCallback) -> Result<OAuthOutcome> {
    let (Some(provider), Some(access_token)) =
        (present(&callback.provider), present(&callback.access_token))
    else {
        return Err(Error::OAuth("Missing OAuth parameters".to_string()));
    };

    if let Some(source_id) = present(&callback.source_id) {
        let id: i64 = source_id
            .parse()
            .map_err(|_| Error::OAuth(format!("Invalid source id '{}'", source_id)))?;
        let update = SourceUpdate {
            credentials: Some(callback.credentials(access_token)),
            ..Default::default()
        };
        api.update_source(id, &update).await?;
        info!("Stored new {} credentials for source {}", provider, id);
        return Ok(OAuthOutcome::Updated(id));
    }

    let source = NewSource {
        name: present(&callback.source_name)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} source", provider)),
        provider: provider.parse::<Provider>()?,
        credentials: callback.credentials(access_token),
        root_folder_id: present(&callback.root_folder_id).map(str::to_string),
        client_id: callback.client_id.clone(),
        client_secret: callback.client_secret.clone(),
    };
    let created = api.create_source(&source).await?;
    info!("Created source {} ({})", created.id, created.name);
    Ok(OAuthOutcome::Created(created))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::client_for;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_from_query() {
        let cb = OAuthCallback::from_query(
            "?provider=dropbox&accessToken=a%2Bb&refreshToken=&sourceName=Team%20box&extra=1",
        )
        .unwrap();
        assert_eq!(cb.provider.as_deref(), Some("dropbox"));
        assert_eq!(cb.access_token.as_deref(), Some("a+b"));
        assert_eq!(present(&cb.refresh_token), None);
        assert_eq!(cb.source_name.as_deref(), Some("Team box"));
        assert_eq!(cb.source_id, None);
    }

    #[tokio::test]
    async fn test_missing_parameters_fail_without_request() {
        let server = MockServer::start().await;
        let api = client_for(&server.uri(), Some("jwt"));

        let cb = OAuthCallback::from_query("provider=dropbox").unwrap();
        let err = complete_oauth(&api, &cb).await.unwrap_err();
        assert!(err.to_string().contains("Missing OAuth parameters"));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_source_id_updates_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/document-sources/5"))
            .and(body_json(json!({
                "credentials": { "accessToken": "new", "refreshToken": "ref" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 5 })))
            .expect(1)
            .mount(&server)
            .await;

        let api = client_for(&server.uri(), Some("jwt"));
        let cb = OAuthCallback::from_query(
            "provider=google_drive&accessToken=new&refreshToken=ref&sourceId=5",
        )
        .unwrap();
        let outcome = complete_oauth(&api, &cb).await.unwrap();
        assert!(matches!(outcome, OAuthOutcome::Updated(5)));
    }

    #[tokio::test]
    async fn test_new_source_gets_default_name_and_client_pair() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/document-sources"))
            .and(body_json(json!({
                "name": "onedrive source",
                "provider": "onedrive",
                "credentials": { "accessToken": "tok" },
                "clientId": "cid",
                "clientSecret": "sec"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 9, "name": "onedrive source", "provider": "onedrive", "isActive": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = client_for(&server.uri(), Some("jwt"));
        let cb = OAuthCallback::from_query(
            "provider=onedrive&accessToken=tok&clientId=cid&clientSecret=sec",
        )
        .unwrap();
        match complete_oauth(&api, &cb).await.unwrap() {
            OAuthOutcome::Created(source) => assert_eq!(source.id, 9),
            other => panic!("expected creation, got {:?}", other),
        }
    }

    #[test]
    fn test_close_delays() {
        let config = OAuthConfig::default();
        assert_eq!(
            OAuthOutcome::Updated(1).close_delay(&config),
            Duration::from_millis(1500)
        );
        assert_eq!(
            OAuthOutcome::Failed("x".to_string()).close_delay(&config),
            Duration::from_millis(3000)
        );
    }
}
