use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::domain::{CatalogItem, is_none_marker};
use crate::error::KitapError;
use crate::http::HttpClient;
use crate::store::Store;

const PLACEHOLDER_FILL: Rgba<u8> = Rgba([214, 214, 214, 255]);
const PLACEHOLDER_GLYPH: Rgba<u8> = Rgba([196, 40, 40, 255]);
const WARM_WORKERS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn square(side: u32) -> Self {
        Self {
            width: side.max(1),
            height: side.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverSource {
    Memory,
    Disk,
    Network,
    Placeholder,
}

/// A resolved cover. Holders keep the bitmap alive through the `Arc`.
#[derive(Debug, Clone)]
pub struct CoverImage {
    pub bitmap: Arc<RgbaImage>,
    pub source: CoverSource,
}

impl CoverImage {
    pub fn is_placeholder(&self) -> bool {
        self.source == CoverSource::Placeholder
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WarmSummary {
    pub memory: usize,
    pub disk: usize,
    pub network: usize,
    pub placeholder: usize,
}

impl WarmSummary {
    fn record(&mut self, source: CoverSource) {
        match source {
            CoverSource::Memory => self.memory += 1,
            CoverSource::Disk => self.disk += 1,
            CoverSource::Network => self.network += 1,
            CoverSource::Placeholder => self.placeholder += 1,
        }
    }
}

pub struct ImageCache<H: HttpClient> {
    cache_dir: Utf8PathBuf,
    http: H,
    policy: RetryPolicy,
    memory: Mutex<HashMap<(String, ImageSize), Arc<RgbaImage>>>,
}

impl<H: HttpClient> ImageCache<H> {
    pub fn new(cache_dir: impl Into<Utf8PathBuf>, http: H, policy: RetryPolicy) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            http,
            policy,
            memory: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache_dir(&self) -> &Utf8Path {
        &self.cache_dir
    }

    pub fn cache_path(&self, url: &str) -> Utf8PathBuf {
        self.cache_dir.join(format!("{}.png", url_hash(url.trim())))
    }

    pub fn resolve(&self, url: &str, size: ImageSize) -> CoverImage {
        let url = url.trim();
        if is_none_marker(url) {
            return placeholder_cover(size);
        }

        let key = (url.to_string(), size);
        if let Some(bitmap) = self.remembered(&key) {
            return CoverImage {
                bitmap,
                source: CoverSource::Memory,
            };
        }

        let path = self.cache_path(url);
        let mut stale = None;
        if path.as_std_path().exists() {
            match read_cached(&path) {
                Ok(image) if image.width() == size.width && image.height() == size.height => {
                    debug!(%url, path = %path, "cover cache hit");
                    return CoverImage {
                        bitmap: self.remember(key, image.into_rgba8()),
                        source: CoverSource::Disk,
                    };
                }
                Ok(image) => {
                    debug!(%url, path = %path, "cached cover has another size, refetching");
                    stale = Some(image);
                }
                Err(err) => {
                    warn!(path = %path, error = %err, "discarding unreadable cover cache entry");
                    if let Err(cleanup) = Store::remove_file_idempotent(&path) {
                        warn!(path = %path, error = %cleanup, "failed to remove cover cache entry");
                    }
                }
            }
        }

        match self.fetch_with_retries(url, size) {
            Ok(bitmap) => {
                if let Err(err) = persist(&path, &bitmap) {
                    warn!(path = %path, error = %err, "failed to persist cover");
                }
                CoverImage {
                    bitmap: self.remember(key, bitmap),
                    source: CoverSource::Network,
                }
            }
            Err(err) => match stale {
                Some(image) => {
                    warn!(%url, error = %err, "cover refetch failed, resizing cached copy");
                    CoverImage {
                        bitmap: self.remember(key, normalize(image, size)),
                        source: CoverSource::Disk,
                    }
                }
                None => {
                    warn!(%url, error = %err, "cover unavailable, using placeholder");
                    placeholder_cover(size)
                }
            },
        }
    }

    pub fn resolve_item(&self, item: &CatalogItem, size: ImageSize) -> CoverImage {
        self.resolve(&item.cover_image_url, size)
    }

    /// Resolves every cover on a few scoped worker threads.
    pub fn warm(&self, items: &[CatalogItem], size: ImageSize) -> WarmSummary {
        let next = AtomicUsize::new(0);
        let summary = Mutex::new(WarmSummary::default());
        let workers = WARM_WORKERS.min(items.len()).max(1);
        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(item) = items.get(index) else {
                            break;
                        };
                        let cover = self.resolve_item(item, size);
                        if let Ok(mut summary) = summary.lock() {
                            summary.record(cover.source);
                        }
                    }
                });
            }
        });
        summary.into_inner().unwrap_or_default()
    }

    fn fetch_with_retries(&self, url: &str, size: ImageSize) -> Result<RgbaImage, KitapError> {
        let attempts = self.policy.max_retries.max(1);
        let mut last_error = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                thread::sleep(self.policy.base_delay * attempt);
            }
            let result = self
                .http
                .get_bytes(url)
                .and_then(|bytes| decode(&bytes, size));
            match result {
                Ok(bitmap) => return Ok(bitmap),
                Err(err) => {
                    debug!(%url, attempt = attempt + 1, error = %err, "cover fetch attempt failed");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| KitapError::NetworkError(url.to_string())))
    }

    fn remembered(&self, key: &(String, ImageSize)) -> Option<Arc<RgbaImage>> {
        self.memory
            .lock()
            .ok()
            .and_then(|memory| memory.get(key).cloned())
    }

    fn remember(&self, key: (String, ImageSize), bitmap: RgbaImage) -> Arc<RgbaImage> {
        let bitmap = Arc::new(bitmap);
        if let Ok(mut memory) = self.memory.lock() {
            memory.insert(key, bitmap.clone());
        }
        bitmap
    }
}

pub fn url_hash(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}

/// Flat fill with a red cross, used whenever the real cover is unavailable.
pub fn placeholder(size: ImageSize) -> RgbaImage {
    let ImageSize { width, height } = size;
    let mut bitmap = RgbaImage::from_pixel(width, height, PLACEHOLDER_FILL);
    let side = width.min(height);
    let margin = side / 4;
    let thickness = (side / 24).max(1) as i64;
    let span = side.saturating_sub(margin * 2);
    let left = (width - side) / 2 + margin;
    let top = (height - side) / 2 + margin;

    for step in 0..span {
        let x_down = (left + step) as i64;
        let x_up = (left + span - 1 - step) as i64;
        let y = (top + step) as i64;
        for offset in -(thickness / 2)..=(thickness / 2) {
            for x in [x_down + offset, x_up + offset] {
                if x >= 0 && (x as u32) < width && (y as u32) < height {
                    bitmap.put_pixel(x as u32, y as u32, PLACEHOLDER_GLYPH);
                }
            }
        }
    }
    bitmap
}

fn placeholder_cover(size: ImageSize) -> CoverImage {
    CoverImage {
        bitmap: Arc::new(placeholder(size)),
        source: CoverSource::Placeholder,
    }
}

fn decode(bytes: &[u8], size: ImageSize) -> Result<RgbaImage, KitapError> {
    let image = image::load_from_memory(bytes)
        .map_err(|err| KitapError::NetworkError(format!("undecodable image: {err}")))?;
    Ok(normalize(image, size))
}

fn read_cached(path: &Utf8Path) -> Result<DynamicImage, KitapError> {
    let bytes =
        fs::read(path.as_std_path()).map_err(|err| KitapError::Filesystem(err.to_string()))?;
    image::load_from_memory_with_format(&bytes, ImageFormat::Png)
        .map_err(|err| KitapError::Filesystem(format!("corrupt cache file: {err}")))
}

fn normalize(image: DynamicImage, size: ImageSize) -> RgbaImage {
    if image.width() == size.width && image.height() == size.height {
        return image.into_rgba8();
    }
    image
        .resize_exact(size.width, size.height, FilterType::Lanczos3)
        .into_rgba8()
}

fn persist(path: &Utf8Path, bitmap: &RgbaImage) -> Result<(), KitapError> {
    let mut encoded = Vec::new();
    bitmap
        .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)
        .map_err(|err| KitapError::Filesystem(err.to_string()))?;
    Store::write_bytes_atomic(path, &encoded)
}
