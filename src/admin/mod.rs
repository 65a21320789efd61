//! Administration of document sources across all users

use crate::api::sources::{AuthorizeRequest, NewSource, SourceUpdate};
use crate::api::ApiClient;
use crate::config::OAuthConfig;
use crate::error::{Error, Result};
use crate::models::{Credentials, DocumentSource, Provider};
use crate::oauth::{CallbackServer, OAuthOutcome};
use std::time::Duration;
use tracing::{info, warn};

/// Form for a new document source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSourceForm {
    pub name: String,
    pub provider: Provider,
    /// Authorize through the provider's consent page instead of pasting tokens
    pub use_oauth: bool,
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
    pub refresh_token: String,
    pub root_folder_id: String,
}

impl Default for NewSourceForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            provider: Provider::GoogleDrive,
            use_oauth: true,
            client_id: String::new(),
            client_secret: String::new(),
            access_token: String::new(),
            refresh_token: String::new(),
            root_folder_id: String::new(),
        }
    }
}

impl NewSourceForm {
    /// Check the fields required by the selected mode
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation(
                "Please enter a name for the source".to_string(),
            ));
        }
        if self.use_oauth {
            if self.client_id.is_empty() || self.client_secret.is_empty() {
                return Err(Error::Validation(
                    "Please fill in the Client ID and Client Secret".to_string(),
                ));
            }
        } else if self.access_token.is_empty() {
            return Err(Error::Validation(
                "Please enter the Access Token".to_string(),
            ));
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn root_folder(&self) -> Option<String> {
        Some(self.root_folder_id.clone()).filter(|f| !f.is_empty())
    }
}

pub struct AdminPanel {
    api: ApiClient,
    oauth: OAuthConfig,
}

impl AdminPanel {
    pub fn new(api: ApiClient, oauth: OAuthConfig) -> Self {
        Self { api, oauth }
    }

    pub async fn list_all(&self) -> Result<Vec<DocumentSource>> {
        self.api.list_all_sources().await
    }

    /// A source with decrypted credentials
    pub async fn details(&self, source_id: i64) -> Result<DocumentSource> {
        self.api.source_with_credentials(source_id).await
    }

    pub async fn set_active(&self, source_id: i64, active: bool) -> Result<()> {
        let update = SourceUpdate {
            is_active: Some(active),
            ..Default::default()
        };
        self.api.update_source(source_id, &update).await?;
        info!(
            "Source {} {}",
            source_id,
            if active { "activated" } else { "deactivated" }
        );
        Ok(())
    }

    pub async fn delete(&self, source_id: i64) -> Result<()> {
        self.api.delete_source(source_id).await?;
        info!("Deleted source {}", source_id);
        Ok(())
    }

    /// Create a source from pasted tokens and check that it can list files.
    ///
    /// If the listing fails the new source is deleted again and the listing
    /// error is returned. On success the form is reset.
    pub async fn create_manual(&self, form: &mut NewSourceForm) -> Result<DocumentSource> {
        if form.use_oauth {
            return Err(Error::Validation(
                "This form is set up for OAuth authorization".to_string(),
            ));
        }
        form.validate()?;

        let created = self
            .api
            .create_source(&NewSource {
                name: form.name.clone(),
                provider: form.provider,
                credentials: Credentials::new(
                    form.access_token.clone(),
                    Some(form.refresh_token.clone()),
                ),
                root_folder_id: form.root_folder(),
                client_id: None,
                client_secret: None,
            })
            .await?;

        info!("Validating connection for source {}", created.id);
        if let Err(e) = self.api.list_files(created.id, None).await {
            warn!("Source {} failed validation: {}", created.id, e);
            if let Err(cleanup) = self.api.delete_source(created.id).await {
                warn!("Could not delete invalid source {}: {}", created.id, cleanup);
            }
            return Err(e);
        }

        info!("Source {} created and validated", created.id);
        form.reset();
        Ok(created)
    }

    /// Ask the backend for the provider consent URL
    pub async fn begin_oauth(&self, form: &NewSourceForm) -> Result<String> {
        if !form.use_oauth {
            return Err(Error::Validation(
                "This form is set up for manual tokens".to_string(),
            ));
        }
        form.validate()?;
        self.api
            .oauth_authorize(&AuthorizeRequest {
                provider: form.provider,
                client_id: form.client_id.clone(),
                client_secret: form.client_secret.clone(),
                source_name: form.name.clone(),
                root_folder_id: form.root_folder(),
            })
            .await
    }

    /// Run the full OAuth creation flow.
    ///
    /// The local completion listener is started first, `present_url` receives
    /// the consent URL, and the call returns once the completion page has been
    /// served and closed. The form is reset afterwards, whatever the outcome.
    /// If the backend refuses to start the flow, the listener is closed
    /// before the error is returned.
    pub async fn create_with_oauth(
        &self,
        form: &mut NewSourceForm,
        present_url: impl FnOnce(&str),
    ) -> Result<OAuthOutcome> {
        form.validate()?;
        let server = CallbackServer::bind(self.api.clone(), &self.oauth).await?;
        let auth_url = match self.begin_oauth(form).await {
            Ok(url) => url,
            Err(e) => {
                server.close().await;
                return Err(e);
            }
        };
        present_url(&auth_url);

        let outcome = server
            .wait(Duration::from_secs(self.oauth.wait_timeout_secs))
            .await?;
        form.reset();
        Ok(outcome)
    }
}
