//! Administrator commands over every user's document sources

use super::require_admin;
use super::sources::print_source_details;
use crate::admin::{AdminPanel, NewSourceForm};
use crate::api::ApiClient;
use crate::error::{Error, Result};
use crate::models::DocumentSource;
use crate::oauth::OAuthOutcome;
use serde::Serialize;
use tracing::info;

pub async fn cmd_admin_list(api: &ApiClient, panel: &AdminPanel) -> Result<Vec<DocumentSource>> {
    require_admin(api)?;
    panel.list_all().await
}

pub async fn cmd_admin_show(api: &ApiClient, panel: &AdminPanel, source_id: i64) -> Result<DocumentSource> {
    require_admin(api)?;
    panel.details(source_id).await
}

pub async fn cmd_admin_set_active(
    api: &ApiClient,
    panel: &AdminPanel,
    source_id: i64,
    active: bool,
) -> Result<()> {
    require_admin(api)?;
    panel.set_active(source_id, active).await
}

pub async fn cmd_admin_delete(api: &ApiClient, panel: &AdminPanel, source_id: i64) -> Result<()> {
    require_admin(api)?;
    panel.delete(source_id).await
}

/// How `admin create` ended
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Created {
    Source(DocumentSource),
    CredentialsUpdated { source_id: i64 },
}

/// Create a source from the form, either from pasted tokens or through the
/// provider's consent page. `present_url` receives the consent URL.
pub async fn cmd_admin_create(
    api: &ApiClient,
    panel: &AdminPanel,
    mut form: NewSourceForm,
    present_url: impl FnOnce(&str),
) -> Result<Created> {
    require_admin(api)?;
    if !form.use_oauth {
        let source = panel.create_manual(&mut form).await?;
        return Ok(Created::Source(source));
    }

    info!("Starting {} authorization", form.provider.display_name());
    match panel.create_with_oauth(&mut form, present_url).await? {
        OAuthOutcome::Created(source) => Ok(Created::Source(source)),
        OAuthOutcome::Updated(source_id) => Ok(Created::CredentialsUpdated { source_id }),
        OAuthOutcome::Failed(message) => Err(Error::OAuth(message)),
    }
}

pub fn print_admin_sources(sources: &[DocumentSource]) {
    println!("\n🛠  All Document Sources\n");

    if sources.is_empty() {
        println!("No document sources yet. Use 'ragdesk admin create' to add one.");
        return;
    }

    for source in sources {
        println!(
            "{} #{} {} [{}] owner: {}",
            if source.is_active { "✓" } else { "✗" },
            source.id,
            source.name,
            source.provider.display_name(),
            source.user_name.as_deref().unwrap_or("-")
        );
        if let Some(at) = &source.last_sync_at {
            println!("  Last sync: {}", at);
        }
        if let Some(error) = &source.last_error {
            println!("  Last error: {}", error);
        }
    }
}

pub fn print_admin_source(source: &DocumentSource, reveal: bool) {
    print_source_details(source, reveal);
}

pub fn print_created(created: &Created) {
    match created {
        Created::Source(source) => {
            println!(
                "\n✅ Source \"{}\" (#{}) created and connected\n",
                source.name, source.id
            );
        }
        Created::CredentialsUpdated { source_id } => {
            println!("\n✅ Credentials of source #{} updated\n", source_id);
        }
    }
}

pub fn print_consent_url(url: &str) {
    println!("\n🔐 Open this URL in your browser to authorize access:\n");
    println!("  {}\n", url);
    println!("Waiting for the authorization to complete...");
}
