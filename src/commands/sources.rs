//! Document source commands: browsing, tracking, sync and editing

use super::require_admin;
use crate::api::ApiClient;
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::explorer::{Explorer, ExplorerState, Opened, SourceEdit, ToggleOutcome};
use crate::models::{format_file_size, DocumentSource, SyncLevel, SyncReport, TrackedFile};
use crate::navigation::Navigation;
use serde::Serialize;
use tracing::{debug, info};

/// Where inside a source a command operates
#[derive(Debug, Clone, Default)]
pub struct Location {
    /// Folder id as returned by the provider
    pub folder_id: Option<String>,
    /// Folder names from the root, separated by `/`
    pub path: Option<String>,
}

/// Select `source_id` and descend to `location`
async fn goto(explorer: &Explorer, source_id: i64, location: &Location) -> Result<()> {
    explorer.load_sources().await?;
    explorer.select_source(source_id).await?;

    if let Some(path) = location.path.as_deref() {
        for name in path.split('/').filter(|s| !s.is_empty()) {
            let folder = explorer
                .snapshot()
                .files
                .into_iter()
                .find(|f| f.is_folder && f.name == name)
                .ok_or_else(|| Error::Validation(format!("No folder named '{}'", name)))?;
            explorer.open(&folder.id).await?;
        }
    }
    // A bare id has no name, so the breadcrumb stays as it is
    if let Some(folder) = location.folder_id.as_deref() {
        explorer.load_folder(Some(folder), None).await?;
    }
    Ok(())
}

pub async fn cmd_sources_list(api: &ApiClient) -> Result<Vec<DocumentSource>> {
    info!("Listing document sources");
    api.list_sources().await
}

/// List a folder along with the tracking state of its entries
pub async fn cmd_files(explorer: &Explorer, source_id: i64, location: &Location) -> Result<ExplorerState> {
    goto(explorer, source_id, location).await?;
    Ok(explorer.snapshot())
}

/// Result of a track or untrack request
#[derive(Debug, Clone, Serialize)]
pub struct TrackChange {
    pub file_id: String,
    pub file_name: String,
    pub tracked: bool,
    /// False when the entry was already in the requested state
    pub changed: bool,
}

/// Bring an entry of a folder into the requested tracking state.
///
/// Tracking records the entry's path by folder names, so a folder given by
/// id alone is only accepted for untracking.
pub async fn cmd_set_tracked(
    explorer: &Explorer,
    source_id: i64,
    location: &Location,
    file_id: &str,
    track: bool,
) -> Result<TrackChange> {
    if track && location.folder_id.is_some() {
        return Err(Error::Validation(
            "Use --path to track entries inside a folder".to_string(),
        ));
    }
    goto(explorer, source_id, location).await?;
    let state = explorer.snapshot();
    let file = state
        .files
        .iter()
        .find(|f| f.id == file_id)
        .ok_or_else(|| Error::Validation(format!("No entry '{}' in this folder", file_id)))?;

    let mut change = TrackChange {
        file_id: file.id.clone(),
        file_name: file.name.clone(),
        tracked: state.is_tracked(file_id),
        changed: false,
    };
    if change.tracked == track {
        debug!("{} already in the requested state", file.name);
        return Ok(change);
    }

    match explorer.toggle(file_id).await? {
        ToggleOutcome::Busy => {
            return Err(Error::Validation(
                "Another tracking change is still running".to_string(),
            ))
        }
        ToggleOutcome::Tracked => change.tracked = true,
        ToggleOutcome::Untracked => change.tracked = false,
    }
    change.changed = true;
    Ok(change)
}

pub async fn cmd_tracked(explorer: &Explorer, source_id: i64) -> Result<Vec<TrackedFile>> {
    goto(explorer, source_id, &Location::default()).await?;
    explorer.tracked_files().await
}

pub async fn cmd_unrag(explorer: &Explorer, source_id: i64, file_id: &str) -> Result<()> {
    goto(explorer, source_id, &Location::default()).await?;
    explorer.unrag(file_id).await
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub report: SyncReport,
    /// Refreshed tracking state of the watched source, if one was given
    pub tracked: Option<Vec<TrackedFile>>,
}

/// Run a backend sync (administrators only). With `watch_source` the
/// source's tracked files are refreshed once the sync announces completion.
pub async fn cmd_sync(
    api: &ApiClient,
    explorer: &Explorer,
    events: &EventBus,
    watch_source: Option<i64>,
) -> Result<SyncOutcome> {
    require_admin(api)?;
    if let Some(source_id) = watch_source {
        goto(explorer, source_id, &Location::default()).await?;
    }

    let mut completions = events.subscribe();
    let report = explorer.sync().await?;

    let mut tracked = None;
    if let Ok(event) = completions.try_recv() {
        explorer.handle_event(&event).await?;
        if watch_source.is_some() {
            let mut files: Vec<TrackedFile> = explorer.snapshot().tracked.into_values().collect();
            files.sort_by(|a, b| a.file_path.cmp(&b.file_path));
            tracked = Some(files);
        }
    }
    Ok(SyncOutcome { report, tracked })
}

/// Open a file of a folder for chatting. The returned navigation carries
/// the file to the chat view.
pub async fn cmd_open_file(
    explorer: &Explorer,
    source_id: i64,
    location: &Location,
    file_id: &str,
) -> Result<Navigation> {
    goto(explorer, source_id, location).await?;
    match explorer.open(file_id).await? {
        Opened::File(navigation) => Ok(navigation),
        Opened::Folder(_) => Err(Error::Validation(format!(
            "'{}' is a folder; use 'ragdesk sources files' to browse it",
            file_id
        ))),
    }
}

pub async fn cmd_source_show(explorer: &Explorer, source_id: i64) -> Result<DocumentSource> {
    explorer.source_details(source_id).await
}

/// Field overrides for `sources edit`; unset fields keep their current value
#[derive(Debug, Clone, Default)]
pub struct SourceEditArgs {
    pub name: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub folder_id: Option<String>,
}

pub async fn cmd_source_edit(
    explorer: &Explorer,
    source_id: i64,
    args: SourceEditArgs,
) -> Result<DocumentSource> {
    let current = explorer.source_details(source_id).await?;
    let mut edit = SourceEdit::from_source(&current);
    if let Some(name) = args.name {
        edit.name = name;
    }
    if let Some(token) = args.access_token {
        edit.access_token = token;
    }
    if let Some(token) = args.refresh_token {
        edit.refresh_token = token;
    }
    if let Some(folder) = args.folder_id {
        edit.folder_id = folder;
    }

    explorer.update_source(&current, &edit).await?;
    explorer
        .snapshot()
        .sources
        .into_iter()
        .find(|s| s.id == source_id)
        .ok_or_else(|| Error::Other(format!("Source {} disappeared after the update", source_id)))
}

pub fn print_document_sources(sources: &[DocumentSource]) {
    println!("\n📚 Document Sources\n");

    if sources.is_empty() {
        println!("No document sources available. Ask an administrator to add one.");
        return;
    }

    for source in sources {
        let status = if source.is_active { "✓" } else { "✗" };
        println!(
            "{} #{} {} [{}]",
            status,
            source.id,
            source.name,
            source.provider.display_name()
        );
        if let Some(owner) = &source.user_name {
            println!("  Owner: {}", owner);
        }
        if let Some(error) = &source.last_error {
            println!("  Last error: {}", error);
        }
    }
}

pub fn print_listing(state: &ExplorerState) {
    let source = state
        .selected_source
        .as_ref()
        .map(|s| s.name.as_str())
        .unwrap_or("-");
    let path: Vec<&str> = state.breadcrumb.iter().map(|c| c.name.as_str()).collect();
    println!("\n📁 {} : {}\n", source, path.join(" / "));

    if state.files.is_empty() {
        println!("This folder is empty.");
        return;
    }

    for file in &state.files {
        let kind = if file.is_folder { "📁" } else { "📄" };
        let tracked = match state.tracked.get(&file.id) {
            Some(t) => format!(" [RAG: {}]", t.status),
            None => String::new(),
        };
        println!(
            "{} {}  {}  ({}){}",
            kind,
            file.name,
            format_file_size(file.size),
            file.id,
            tracked
        );
    }
}

pub fn print_track_change(change: &TrackChange) {
    let verb = match (change.changed, change.tracked) {
        (true, true) => "added to the RAG index",
        (true, false) => "removed from the RAG index",
        (false, true) => "is already tracked",
        (false, false) => "is not tracked",
    };
    println!("✓ {} {}", change.file_name, verb);
}

pub fn print_tracked(files: &[TrackedFile]) {
    println!("\n🗂  Tracked Files\n");

    if files.is_empty() {
        println!("No tracked files. Use 'ragdesk sources track' to add some.");
        return;
    }

    for file in files {
        println!("• {} [{}]", file.file_path, file.status);
        if file.chunks_count > 0 {
            println!("  Chunks: {}", file.chunks_count);
        }
        if let Some(at) = &file.last_processed_at {
            println!("  Processed: {}", at);
        }
        if let Some(error) = &file.error_message {
            println!("  Error: {}", error);
        }
    }
}

pub fn print_sync(outcome: &SyncOutcome) {
    let report = &outcome.report;
    if report.success {
        println!("\n✅ Sync complete\n");
    } else {
        println!("\n⚠ Sync finished with errors\n");
    }
    println!("Processed: {}", report.processed_count);
    println!("Errors: {}", report.error_count);

    if !report.logs.is_empty() {
        println!("\nLog:");
        for log in &report.logs {
            let mark = match log.level {
                SyncLevel::Success => "✓",
                SyncLevel::Error => "✗",
                SyncLevel::Warning => "⚠",
                SyncLevel::Info => "•",
            };
            println!("  {} {}", mark, log.message);
        }
    }
    if let Some(tracked) = &outcome.tracked {
        print_tracked(tracked);
    }
}

/// Print a source; tokens are masked unless `reveal` is set
pub fn print_source_details(source: &DocumentSource, reveal: bool) {
    println!("\n🔌 {} (#{})\n", source.name, source.id);
    println!("Provider: {}", source.provider.display_name());
    println!("Active: {}", if source.is_active { "yes" } else { "no" });
    println!(
        "Root folder: {}",
        source.root_folder_id.as_deref().unwrap_or("(provider root)")
    );
    if let Some(owner) = &source.user_name {
        println!("Owner: {}", owner);
    }
    if let Some(at) = &source.last_sync_at {
        println!("Last sync: {}", at);
    }
    if let Some(error) = &source.last_error {
        println!("Last error: {}", error);
    }
    if let Some(creds) = &source.decrypted_credentials {
        let show = |token: &Option<String>| match token.as_deref() {
            None | Some("") => "(none)".to_string(),
            Some(t) if reveal => t.to_string(),
            Some(t) => mask(t),
        };
        println!("Access token: {}", show(&creds.access_token));
        println!("Refresh token: {}", show(&creds.refresh_token));
    }
}

fn mask(token: &str) -> String {
    let tail: String = token
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if token.chars().count() <= 8 {
        "••••".to_string()
    } else {
        format!("••••{}", tail)
    }
}
