//! Document explorer: browse a source's folders and pick what goes into the RAG index
//!
//! The explorer keeps the current source, folder listing, breadcrumb and
//! tracked-file map. Tracking toggles are exclusive: while one is in flight
//! every other toggle is refused without touching the network.

use crate::api::sources::SourceUpdate;
use crate::api::ApiClient;
use crate::error::{Error, Result};
use crate::events::{AppEvent, EventBus};
use crate::models::{
    CloudFile, Credentials, DocumentSource, SyncReport, TrackFileRequest, TrackedFile,
};
use crate::navigation::{FileOpen, Navigation};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Name of the first breadcrumb entry
pub const ROOT_CRUMB: &str = "Root";

/// One step of the folder path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Crumb {
    /// Folder id; `None` for the source root
    pub id: Option<String>,
    pub name: String,
}

impl Crumb {
    fn root() -> Self {
        Self {
            id: None,
            name: ROOT_CRUMB.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExplorerState {
    pub sources: Vec<DocumentSource>,
    pub selected_source: Option<DocumentSource>,
    pub files: Vec<CloudFile>,
    pub current_folder: Option<String>,
    pub breadcrumb: Vec<Crumb>,
    /// Tracked files of the selected source keyed by file id
    pub tracked: HashMap<String, TrackedFile>,
}

impl ExplorerState {
    pub fn is_tracked(&self, file_id: &str) -> bool {
        self.tracked.contains_key(file_id)
    }

    /// Path of a file inside the current folder, e.g. `Root/Reports/q1.pdf`
    pub fn file_path(&self, file_name: &str) -> String {
        let folders: Vec<&str> = self.breadcrumb.iter().map(|c| c.name.as_str()).collect();
        format!("{}/{}", folders.join("/"), file_name)
    }
}

/// What opening an entry did
#[derive(Debug, Clone)]
pub enum Opened {
    /// Descended into a folder; its listing
    Folder(Vec<CloudFile>),
    /// A file was opened; hand this to the chat view
    File(Navigation),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Another toggle is still running; nothing was sent
    Busy,
    Tracked,
    Untracked,
}

/// Edit form for a source, prefilled from its current values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceEdit {
    pub name: String,
    pub access_token: String,
    pub refresh_token: String,
    pub folder_id: String,
}

impl SourceEdit {
    pub fn from_source(source: &DocumentSource) -> Self {
        let creds = source.decrypted_credentials.clone().unwrap_or_default();
        Self {
            name: source.name.clone(),
            access_token: creds.access_token.unwrap_or_default(),
            refresh_token: creds.refresh_token.unwrap_or_default(),
            folder_id: source.root_folder_id.clone().unwrap_or_default(),
        }
    }

    /// Turn the form into a partial update containing only changed fields
    pub fn to_update(&self, current: &DocumentSource) -> Result<SourceUpdate> {
        if self.name.is_empty() && self.access_token.is_empty() && self.folder_id.is_empty() {
            return Err(Error::Validation(
                "Fill in at least one field to update".to_string(),
            ));
        }

        let mut update = SourceUpdate::default();
        if !self.name.trim().is_empty() {
            update.name = Some(self.name.clone());
        }
        if !self.access_token.trim().is_empty() {
            update.credentials = Some(Credentials::new(
                self.access_token.clone(),
                Some(self.refresh_token.clone()),
            ));
        }
        if self.folder_id != current.root_folder_id.clone().unwrap_or_default() {
            update.root_folder_id = Some(Some(self.folder_id.clone()).filter(|f| !f.is_empty()));
        }
        Ok(update)
    }
}

/// Resets the in-flight toggle flag when dropped
struct ToggleGuard<'a>(&'a AtomicBool);

impl Drop for ToggleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Explorer {
    api: ApiClient,
    events: EventBus,
    state: Mutex<ExplorerState>,
    toggling: AtomicBool,
}

impl Explorer {
    pub fn new(api: ApiClient, events: EventBus) -> Self {
        Self {
            api,
            events,
            state: Mutex::new(ExplorerState::default()),
            toggling: AtomicBool::new(false),
        }
    }

    fn state(&self) -> MutexGuard<'_, ExplorerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> ExplorerState {
        self.state().clone()
    }

    pub fn is_toggling(&self) -> bool {
        self.toggling.load(Ordering::Acquire)
    }

    fn selected_source_id(&self) -> Result<i64> {
        self.state()
            .selected_source
            .as_ref()
            .map(|s| s.id)
            .ok_or_else(|| Error::Validation("No document source selected".to_string()))
    }

    /// Load the user's sources and open the root of the first one.
    ///
    /// Listing failures for that first root are logged, not returned.
    pub async fn load_sources(&self) -> Result<Vec<DocumentSource>> {
        let sources = self.api.list_sources().await?;
        info!("Loaded {} document sources", sources.len());

        let first = sources.first().cloned();
        {
            let mut state = self.state();
            state.sources = sources.clone();
            if first.is_some() {
                state.selected_source = first.clone();
                state.breadcrumb = vec![Crumb::root()];
            }
        }

        if first.is_some() {
            if let Err(e) = self.load_folder(None, None).await {
                warn!("Could not list the source root: {}", e);
            }
            if let Err(e) = self.load_tracked().await {
                warn!("Could not load tracked files: {}", e);
            }
        }
        Ok(sources)
    }

    /// Switch to another loaded source and list its root
    pub async fn select_source(&self, source_id: i64) -> Result<Vec<CloudFile>> {
        {
            let mut state = self.state();
            let source = state
                .sources
                .iter()
                .find(|s| s.id == source_id)
                .cloned()
                .ok_or_else(|| Error::Validation(format!("Unknown source {}", source_id)))?;
            state.selected_source = Some(source);
            state.breadcrumb = vec![Crumb::root()];
            state.tracked.clear();
        }

        let files = self.load_folder(None, None).await?;
        if let Err(e) = self.load_tracked().await {
            warn!("Could not load tracked files: {}", e);
        }
        Ok(files)
    }

    /// List a folder of the selected source (`None` for the root).
    ///
    /// With a `folder_name` the breadcrumb is extended, or cut back if the
    /// folder is already on it.
    pub async fn load_folder(
        &self,
        folder_id: Option<&str>,
        folder_name: Option<&str>,
    ) -> Result<Vec<CloudFile>> {
        let source_id = self.selected_source_id()?;

        let files = match self.api.list_files(source_id, folder_id).await {
            Ok(files) => files,
            Err(e) => {
                self.state().files.clear();
                return Err(e);
            }
        };
        debug!("Listed {} entries in {:?}", files.len(), folder_id);

        let mut state = self.state();
        state.files = files.clone();
        state.current_folder = folder_id.map(str::to_string);
        match (folder_id, folder_name) {
            (None, _) => state.breadcrumb = vec![Crumb::root()],
            (Some(id), Some(name)) => {
                match state
                    .breadcrumb
                    .iter()
                    .position(|c| c.id.as_deref() == Some(id))
                {
                    Some(index) => state.breadcrumb.truncate(index + 1),
                    None => state.breadcrumb.push(Crumb {
                        id: Some(id.to_string()),
                        name: name.to_string(),
                    }),
                }
            }
            (Some(_), None) => {}
        }
        Ok(files)
    }

    /// Open an entry of the current listing
    pub async fn open(&self, file_id: &str) -> Result<Opened> {
        let (file, source_id) = {
            let state = self.state();
            let file = state
                .files
                .iter()
                .find(|f| f.id == file_id)
                .cloned()
                .ok_or_else(|| Error::Validation(format!("No entry '{}' in this folder", file_id)))?;
            let source_id = state.selected_source.as_ref().map(|s| s.id);
            (file, source_id)
        };

        if file.is_folder {
            let files = self.load_folder(Some(&file.id), Some(&file.name)).await?;
            return Ok(Opened::Folder(files));
        }

        let source_id =
            source_id.ok_or_else(|| Error::Validation("No document source selected".to_string()))?;
        Ok(Opened::File(Navigation::open_file(FileOpen {
            source_id,
            file_id: file.id,
            file_name: file.name,
        })))
    }

    /// Go up one folder. Returns false at the root.
    pub async fn go_back(&self) -> Result<bool> {
        let target = {
            let mut state = self.state();
            if state.breadcrumb.len() <= 1 {
                return Ok(false);
            }
            let len = state.breadcrumb.len();
            let previous = state.breadcrumb[len - 2].id.clone();
            state.breadcrumb.truncate(len - 1);
            previous
        };
        self.load_folder(target.as_deref(), None).await?;
        Ok(true)
    }

    /// Jump to a breadcrumb entry. Returns false for an out-of-range index.
    pub async fn navigate_to_breadcrumb(&self, index: usize) -> Result<bool> {
        let target = {
            let mut state = self.state();
            if index >= state.breadcrumb.len() {
                return Ok(false);
            }
            state.breadcrumb.truncate(index + 1);
            state.breadcrumb[index].id.clone()
        };
        self.load_folder(target.as_deref(), None).await?;
        Ok(true)
    }

    /// Refresh the tracked-file map of the selected source
    pub async fn load_tracked(&self) -> Result<HashMap<String, TrackedFile>> {
        let source_id = self.selected_source_id()?;
        let tracked = self.api.tracked_map(source_id).await?;
        self.state().tracked = tracked.clone();
        Ok(tracked)
    }

    /// Tracked files of the selected source as a list
    pub async fn tracked_files(&self) -> Result<Vec<TrackedFile>> {
        let source_id = self.selected_source_id()?;
        self.api.tracked_files(source_id).await
    }

    /// Track or untrack an entry of the current listing, then refresh the map.
    ///
    /// Returns [`ToggleOutcome::Busy`] without any request if another toggle
    /// has not finished yet.
    pub async fn toggle(&self, file_id: &str) -> Result<ToggleOutcome> {
        if self
            .toggling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Toggle of {} ignored: another toggle is running", file_id);
            return Ok(ToggleOutcome::Busy);
        }
        let _guard = ToggleGuard(&self.toggling);

        let (source_id, file, tracked, file_path) = {
            let state = self.state();
            let source_id = state
                .selected_source
                .as_ref()
                .map(|s| s.id)
                .ok_or_else(|| Error::Validation("No document source selected".to_string()))?;
            let file = state
                .files
                .iter()
                .find(|f| f.id == file_id)
                .cloned()
                .ok_or_else(|| Error::Validation(format!("No entry '{}' in this folder", file_id)))?;
            let tracked = state.is_tracked(file_id);
            let file_path = state.file_path(&file.name);
            (source_id, file, tracked, file_path)
        };

        let outcome = if tracked {
            self.api.untrack_file(source_id, &file.id).await?;
            info!("{} removed from the RAG index", file.name);
            ToggleOutcome::Untracked
        } else {
            self.api
                .track_file(&TrackFileRequest {
                    source_id,
                    file_id: file.id.clone(),
                    file_name: file.name.clone(),
                    file_path,
                    is_folder: file.is_folder,
                    include_children: file.is_folder,
                })
                .await?;
            info!(
                "{} added to the RAG index ({})",
                file.name,
                if file.is_folder { "including subfolders" } else { "file" }
            );
            ToggleOutcome::Tracked
        };

        self.load_tracked().await?;
        Ok(outcome)
    }

    /// Drop a file's indexed chunks, keeping it tracked
    pub async fn unrag(&self, file_id: &str) -> Result<()> {
        let source_id = self.selected_source_id()?;
        self.api.unrag_file(source_id, file_id).await?;
        info!("Removed indexed content of {}", file_id);
        self.load_tracked().await?;
        Ok(())
    }

    /// Run a backend sync and announce its completion, even when some files failed
    pub async fn sync(&self) -> Result<SyncReport> {
        let report = self.api.sync().await?;
        if report.success {
            info!("Sync completed: {} files processed", report.processed_count);
        } else {
            warn!(
                "Sync completed with errors: {} processed, {} failed",
                report.processed_count, report.error_count
            );
        }
        self.events.emit(AppEvent::RagSyncCompleted {
            success: report.success,
        });
        Ok(report)
    }

    pub async fn handle_event(&self, event: &AppEvent) -> Result<()> {
        match event {
            AppEvent::RagSyncCompleted { .. } => {
                if self.state().selected_source.is_none() {
                    return Ok(());
                }
                self.load_tracked().await?;
                Ok(())
            }
        }
    }

    /// React to bus events until `cancel` fires
    pub fn spawn_listener(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let explorer = Arc::clone(self);
        let mut rx = self.events.subscribe();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = rx.recv() => event,
                };
                match event {
                    Ok(event) => {
                        if let Err(e) = explorer.handle_event(&event).await {
                            warn!("Could not refresh after {:?}: {}", event, e);
                        }
                    }
                    Err(RecvError::Lagged(n)) => debug!("Explorer skipped {} events", n),
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// A source with its decrypted credentials, for editing
    pub async fn source_details(&self, source_id: i64) -> Result<DocumentSource> {
        self.api.source_with_credentials(source_id).await
    }

    /// Save an edit form and reload the sources
    pub async fn update_source(&self, current: &DocumentSource, edit: &SourceEdit) -> Result<()> {
        let update = edit.to_update(current)?;
        self.api.update_source(current.id, &update).await?;
        info!("Updated source {}", current.id);
        self.load_sources().await?;
        Ok(())
    }
}
