use std::fs::File;
use std::io::BufWriter;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{CatalogItem, DownloadTarget};
use crate::error::KitapError;
use crate::filename::derive_filename;
use crate::http::HttpClient;
use crate::launcher::{ClipboardSink, Launcher};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Downloading,
    Downloaded,
    Launched,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadState {
    pub item: CatalogItem,
    pub saved_path: Option<Utf8PathBuf>,
    pub launched: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AcquireOutcome {
    OpenedLink {
        target: String,
    },
    Saved {
        path: Utf8PathBuf,
        bytes: u64,
        unlock_key: Option<String>,
        copied_to_clipboard: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReturnOutcome {
    pub path: Option<Utf8PathBuf>,
    pub removed: bool,
}

pub struct Acquisition<H: HttpClient, L: Launcher, C: ClipboardSink> {
    store: Store,
    http: H,
    launcher: L,
    clipboard: C,
    phase: Phase,
    state: Option<DownloadState>,
}

impl<H: HttpClient, L: Launcher, C: ClipboardSink> Acquisition<H, L, C> {
    pub fn new(store: Store, http: H, launcher: L, clipboard: C) -> Self {
        Self {
            store,
            http,
            launcher,
            clipboard,
            phase: Phase::Idle,
            state: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> Option<&DownloadState> {
        self.state.as_ref()
    }

    pub fn saved_path_for(&self, item: &CatalogItem) -> Utf8PathBuf {
        let file_name = derive_filename(&item.download_url, item.unlock_key(), &item.name);
        self.store.download_path(&file_name)
    }

    pub fn acquire(
        &mut self,
        item: &CatalogItem,
        sink: &dyn ProgressSink,
    ) -> Result<AcquireOutcome, KitapError> {
        if let Some(held) = &self.state {
            return Err(KitapError::AcquisitionBusy(held.item.name.clone()));
        }
        let target = item
            .target()
            .ok_or_else(|| KitapError::MissingDownloadUrl(item.name.clone()))?;

        let url = match target {
            DownloadTarget::Link { target } => {
                sink.event(ProgressEvent::message(format!(
                    "phase=Open; opening link for {}",
                    item.name
                )));
                self.launcher.open_link(&target)?;
                info!(item = %item.name, %target, "opened external link");
                return Ok(AcquireOutcome::OpenedLink { target });
            }
            DownloadTarget::File { url } => url,
        };

        self.phase = Phase::Downloading;
        let result = self.download(item, &url, sink);
        match result {
            Ok(outcome) => {
                if let AcquireOutcome::Saved { path, .. } = &outcome {
                    self.state = Some(DownloadState {
                        item: item.clone(),
                        saved_path: Some(path.clone()),
                        launched: false,
                    });
                }
                self.phase = Phase::Downloaded;
                Ok(outcome)
            }
            Err(err) => {
                self.phase = Phase::Idle;
                Err(err)
            }
        }
    }

    fn download(
        &self,
        item: &CatalogItem,
        url: &str,
        sink: &dyn ProgressSink,
    ) -> Result<AcquireOutcome, KitapError> {
        let unlock_key = item.unlock_key().map(str::to_string);
        let copied_to_clipboard = match &unlock_key {
            Some(key) => match self.clipboard.copy_text(key) {
                Ok(()) => true,
                Err(err) => {
                    warn!(item = %item.name, error = %err, "could not copy unlock key");
                    false
                }
            },
            None => false,
        };

        self.store.ensure_download_dir()?;
        let path = self.saved_path_for(item);

        sink.event(ProgressEvent::message(format!(
            "phase=Fetch; downloading {}",
            item.name
        )));
        let start = Instant::now();
        let file = File::create(path.as_std_path())
            .map_err(|err| KitapError::Filesystem(format!("{path}: {err}")))?;
        let mut writer = BufWriter::new(file);
        let bytes = match self.http.download(url, &mut writer) {
            Ok(bytes) => bytes,
            Err(err) => {
                drop(writer);
                if let Err(cleanup) = Store::remove_file_idempotent(&path) {
                    warn!(path = %path, error = %cleanup, "failed to remove partial download");
                }
                warn!(item = %item.name, %url, error = %err, "download failed");
                return Err(err);
            }
        };
        writer
            .into_inner()
            .map_err(|err| KitapError::Filesystem(err.to_string()))?;

        let elapsed = start.elapsed();
        sink.event(ProgressEvent {
            message: format!("phase=Store; saved {path} ({bytes} bytes)"),
            elapsed: Some(elapsed),
        });
        info!(item = %item.name, path = %path, bytes, "download complete");

        Ok(AcquireOutcome::Saved {
            path,
            bytes,
            unlock_key,
            copied_to_clipboard,
        })
    }

    pub fn launch(&mut self) -> Result<Utf8PathBuf, KitapError> {
        let path = self
            .state
            .as_ref()
            .and_then(|state| state.saved_path.clone())
            .ok_or(KitapError::NothingDownloaded)?;
        self.launcher.open_path(path.as_std_path())?;
        if let Some(state) = self.state.as_mut() {
            state.launched = true;
        }
        self.phase = Phase::Launched;
        info!(path = %path, "launched download");
        Ok(path)
    }

    pub fn open_folder(&self) -> Result<(), KitapError> {
        self.store.ensure_download_dir()?;
        self.launcher
            .open_path(self.store.download_dir().as_std_path())
    }

    /// Deletes the downloaded file and goes back to `Idle`. Directories the
    /// launched program created are left alone.
    pub fn return_to_catalog(&mut self) -> Result<ReturnOutcome, KitapError> {
        let Some(state) = &self.state else {
            self.phase = Phase::Idle;
            return Ok(ReturnOutcome {
                path: None,
                removed: false,
            });
        };
        let removed = match &state.saved_path {
            Some(path) => remove_download(path)?,
            None => false,
        };
        let path = state.saved_path.clone();
        self.state = None;
        self.phase = Phase::Idle;
        Ok(ReturnOutcome { path, removed })
    }

    /// Forgets the held download without deleting it.
    pub fn release(&mut self) -> Option<DownloadState> {
        self.phase = Phase::Idle;
        self.state.take()
    }
}

/// Idempotent: a file that is already gone counts as removed successfully.
pub fn remove_download(path: &Utf8Path) -> Result<bool, KitapError> {
    let removed = Store::remove_file_idempotent(path)?;
    if removed {
        info!(path = %path, "removed download");
    } else {
        info!(path = %path, "download already gone");
    }
    Ok(removed)
}
