use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;

use crate::catalog::{CatalogSnapshot, CatalogStore, SyncConflict, SyncOutcome};
use crate::config::ResolvedConfig;
use crate::domain::CatalogItem;
use crate::error::KitapError;
use crate::grouping::{self, CategoryGroups};
use crate::http::HttpClient;
use crate::images::{CoverImage, ImageCache, ImageSize, RetryPolicy, WarmSummary};
use crate::launcher::{ClipboardSink, Launcher};
use crate::lifecycle::{
    AcquireOutcome, Acquisition, DownloadState, Phase, ReturnOutcome, remove_download,
};
use crate::store::Store;

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub catalog_path: String,
    pub warning: Option<String>,
    pub total_items: usize,
    pub groups: Vec<GroupEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupEntry {
    pub category: String,
    pub items: Vec<ListEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub name: String,
    pub publisher: String,
    pub category: String,
    pub link: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShowResult {
    pub item: CatalogItem,
    pub saved_path: Option<String>,
    pub downloaded: bool,
    pub cover: CoverInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverInfo {
    pub source: crate::images::CoverSource,
    pub width: u32,
    pub height: u32,
    pub cache_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub catalog_path: String,
    pub remote_url: String,
    pub outcome: SyncOutcome,
    pub items: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoversResult {
    pub cache_dir: String,
    pub items: usize,
    pub summary: WarmSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub name: String,
    pub outcome: AcquireOutcome,
    pub launched: bool,
    pub finished_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoveResult {
    pub name: String,
    pub path: String,
    pub removed: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum ProgressSinkKind {
    Browse,
    Fetch,
    Sync,
    Covers,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            elapsed: None,
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<H: HttpClient, L: Launcher, C: ClipboardSink> {
    config: ResolvedConfig,
    store: Store,
    catalog: CatalogStore,
    http: H,
    images: ImageCache<H>,
    acquisition: Mutex<Acquisition<H, L, C>>,
}

impl<H, L, C> App<H, L, C>
where
    H: HttpClient + Clone,
    L: Launcher,
    C: ClipboardSink,
{
    /// `http` serves catalog and cover requests; `download_http` streams item
    /// downloads and usually carries a longer timeout.
    pub fn new(
        config: ResolvedConfig,
        store: Store,
        http: H,
        download_http: H,
        launcher: L,
        clipboard: C,
    ) -> Self {
        let catalog = CatalogStore::new(store.catalog_path().to_path_buf());
        let images = ImageCache::new(
            store.cache_dir().to_path_buf(),
            http.clone(),
            RetryPolicy {
                max_retries: config.image_retries,
                ..RetryPolicy::default()
            },
        );
        let acquisition = Acquisition::new(store.clone(), download_http, launcher, clipboard);
        Self {
            config,
            store,
            catalog,
            http,
            images,
            acquisition: Mutex::new(acquisition),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn cover_size(&self) -> ImageSize {
        ImageSize::square(self.config.cover_size)
    }

    pub fn load_catalog(&self) -> (CatalogSnapshot, Option<String>) {
        let outcome = self.catalog.load();
        (outcome.snapshot, outcome.warning.map(|err| err.to_string()))
    }

    pub fn groups(&self, snapshot: &CatalogSnapshot) -> CategoryGroups {
        grouping::group(snapshot.items(), &self.config.category_mode)
    }

    pub fn list(&self, sink: &dyn ProgressSink) -> Result<ListResult, KitapError> {
        sink.event(ProgressEvent::message(format!(
            "phase=Resolve; reading {}",
            self.catalog.path()
        )));
        let (snapshot, warning) = self.load_catalog();
        let groups = self
            .groups(&snapshot)
            .into_vec()
            .into_iter()
            .map(|group| GroupEntry {
                category: group.key,
                items: group
                    .items
                    .into_iter()
                    .map(|item| ListEntry {
                        link: matches!(
                            item.target(),
                            Some(crate::domain::DownloadTarget::Link { .. })
                        ),
                        name: item.name,
                        publisher: item.publisher,
                        category: item.category,
                    })
                    .collect(),
            })
            .collect();
        Ok(ListResult {
            catalog_path: self.catalog.path().to_string(),
            warning,
            total_items: snapshot.len(),
            groups,
        })
    }

    pub fn find_item(&self, name: &str) -> Result<CatalogItem, KitapError> {
        let (snapshot, warning) = self.load_catalog();
        snapshot.find(name).cloned().ok_or_else(|| {
            KitapError::ItemNotFound(match warning {
                Some(warning) => format!("{name} ({warning})"),
                None => name.to_string(),
            })
        })
    }

    pub fn show(&self, name: &str, sink: &dyn ProgressSink) -> Result<ShowResult, KitapError> {
        let item = self.find_item(name)?;
        sink.event(ProgressEvent::message(format!(
            "phase=Fetch; resolving cover for {}",
            item.name
        )));
        let cover = self.cover(&item);
        let saved_path = item
            .target()
            .filter(|target| matches!(target, crate::domain::DownloadTarget::File { .. }))
            .map(|_| self.lock_acquisition().map(|acq| acq.saved_path_for(&item)))
            .transpose()?;
        let downloaded = saved_path
            .as_ref()
            .map(|path| path.as_std_path().exists())
            .unwrap_or(false);
        Ok(ShowResult {
            cover: CoverInfo {
                source: cover.source,
                width: cover.bitmap.width(),
                height: cover.bitmap.height(),
                cache_path: (item.has_cover() && !cover.is_placeholder())
                    .then(|| self.images.cache_path(&item.cover_image_url).to_string()),
            },
            saved_path: saved_path.map(|path| path.to_string()),
            downloaded,
            item,
        })
    }

    pub fn cover(&self, item: &CatalogItem) -> CoverImage {
        self.images.resolve_item(item, self.cover_size())
    }

    pub fn sync_catalog<F>(&self, sink: &dyn ProgressSink, confirm: F) -> Result<SyncResult, KitapError>
    where
        F: FnOnce(&SyncConflict) -> bool,
    {
        let remote_url = self
            .config
            .remote_catalog_url
            .clone()
            .ok_or(KitapError::MissingRemote)?;
        sink.event(ProgressEvent::message(format!(
            "phase=Fetch; syncing catalog from {remote_url}"
        )));
        let outcome = self.catalog.sync(&self.http, &remote_url, confirm);
        sink.event(ProgressEvent::message(format!(
            "phase=Store; catalog sync {outcome:?}"
        )));
        let (snapshot, _) = self.load_catalog();
        Ok(SyncResult {
            catalog_path: self.catalog.path().to_string(),
            remote_url,
            outcome,
            items: snapshot.len(),
        })
    }

    pub fn warm_covers(&self, sink: &dyn ProgressSink) -> Result<CoversResult, KitapError> {
        let (snapshot, _) = self.load_catalog();
        sink.event(ProgressEvent::message(format!(
            "phase=Fetch; resolving {} covers",
            snapshot.len()
        )));
        let start = std::time::Instant::now();
        let summary = self.images.warm(snapshot.items(), self.cover_size());
        sink.event(ProgressEvent {
            message: "phase=Store; covers cached".to_string(),
            elapsed: Some(start.elapsed()),
        });
        Ok(CoversResult {
            cache_dir: self.images.cache_dir().to_string(),
            items: snapshot.len(),
            summary,
        })
    }

    pub fn acquire(
        &self,
        item: &CatalogItem,
        sink: &dyn ProgressSink,
    ) -> Result<AcquireOutcome, KitapError> {
        self.lock_acquisition()?.acquire(item, sink)
    }

    pub fn fetch(
        &self,
        name: &str,
        launch: bool,
        sink: &dyn ProgressSink,
    ) -> Result<FetchResult, KitapError> {
        let item = self.find_item(name)?;
        let mut acquisition = self.lock_acquisition()?;
        let outcome = acquisition.acquire(&item, sink)?;
        let launched = if launch && matches!(outcome, AcquireOutcome::Saved { .. }) {
            acquisition.launch().map(|_| true)
        } else {
            Ok(false)
        };
        acquisition.release();
        let launched = launched?;
        Ok(FetchResult {
            name: item.name,
            outcome,
            launched,
            finished_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn launch(&self) -> Result<camino::Utf8PathBuf, KitapError> {
        self.lock_acquisition()?.launch()
    }

    pub fn open_folder(&self) -> Result<(), KitapError> {
        self.lock_acquisition()?.open_folder()
    }

    pub fn return_to_catalog(&self) -> Result<ReturnOutcome, KitapError> {
        self.lock_acquisition()?.return_to_catalog()
    }

    pub fn remove(&self, name: &str) -> Result<RemoveResult, KitapError> {
        let item = self.find_item(name)?;
        let path = self.lock_acquisition()?.saved_path_for(&item);
        let removed = remove_download(&path)?;
        Ok(RemoveResult {
            name: item.name,
            path: path.to_string(),
            removed,
        })
    }

    pub fn phase(&self) -> Phase {
        self.lock_acquisition()
            .map(|acq| acq.phase())
            .unwrap_or(Phase::Idle)
    }

    pub fn download_state(&self) -> Option<DownloadState> {
        self.lock_acquisition()
            .ok()
            .and_then(|acq| acq.state().cloned())
    }

    fn lock_acquisition(&self) -> Result<MutexGuard<'_, Acquisition<H, L, C>>, KitapError> {
        self.acquisition
            .lock()
            .map_err(|_| KitapError::Filesystem("acquisition state lock poisoned".to_string()))
    }
}
