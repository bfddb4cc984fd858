use std::collections::HashMap;
use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{CatalogItem, NONE_MARKER, UNKNOWN_PUBLISHER};
use crate::error::KitapError;
use crate::http::HttpClient;
use crate::store::Store;

pub const CATALOG_HEADER: &str = "name,downloadurl,unlockkey,category,publisher,coverimageurl";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CatalogSnapshot {
    items: Vec<CatalogItem>,
}

impl CatalogSnapshot {
    pub fn new(items: Vec<CatalogItem>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<&CatalogItem> {
        let name = name.trim();
        self.items
            .iter()
            .find(|item| item.name == name)
            .or_else(|| {
                self.items
                    .iter()
                    .find(|item| item.name.eq_ignore_ascii_case(name))
            })
    }
}

#[derive(Debug)]
pub struct LoadOutcome {
    pub snapshot: CatalogSnapshot,
    pub warning: Option<KitapError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncConflict {
    pub local_bytes: usize,
    pub remote_bytes: usize,
    pub remote_items: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Created,
    Unchanged,
    Updated,
    KeptLocal,
    Offline { wrote_empty: bool, reason: String },
    Failed { reason: String },
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncOutcome::Created => write!(f, "catalog created from remote"),
            SyncOutcome::Unchanged => write!(f, "catalog already up to date"),
            SyncOutcome::Updated => write!(f, "catalog replaced with remote copy"),
            SyncOutcome::KeptLocal => write!(f, "kept local catalog"),
            SyncOutcome::Offline {
                wrote_empty: true,
                reason,
            } => write!(f, "remote unreachable, wrote empty catalog ({reason})"),
            SyncOutcome::Offline { reason, .. } => {
                write!(f, "remote unreachable, using local catalog ({reason})")
            }
            SyncOutcome::Failed { reason } => write!(f, "sync failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: Utf8PathBuf,
}

impl CatalogStore {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn load(&self) -> LoadOutcome {
        match self.try_load() {
            Ok(snapshot) => LoadOutcome {
                snapshot,
                warning: None,
            },
            Err(err) => {
                warn!(path = %self.path, error = %err, "catalog unavailable, continuing with an empty list");
                LoadOutcome {
                    snapshot: CatalogSnapshot::default(),
                    warning: Some(err),
                }
            }
        }
    }

    pub fn try_load(&self) -> Result<CatalogSnapshot, KitapError> {
        let content = match fs::read(self.path.as_std_path()) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(KitapError::CatalogMissing(
                    self.path.clone().into_std_path_buf(),
                ));
            }
            Err(err) => return Err(KitapError::CatalogParse(format!("{}: {err}", self.path))),
        };
        parse_catalog(&content)
    }

    /// Reconciles the local file with the remote copy. `confirm` is only asked
    /// when a local file exists and differs from the remote bytes.
    pub fn sync<H, F>(&self, http: &H, remote_url: &str, confirm: F) -> SyncOutcome
    where
        H: HttpClient + ?Sized,
        F: FnOnce(&SyncConflict) -> bool,
    {
        let local = match fs::read(self.path.as_std_path()) {
            Ok(content) => Some(content),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                return SyncOutcome::Failed {
                    reason: format!("{}: {err}", self.path),
                };
            }
        };

        let remote = match http.get_bytes(remote_url) {
            Ok(remote) => remote,
            Err(err) => {
                warn!(url = remote_url, error = %err, "catalog sync failed, keeping local copy");
                return self.offline(local.is_some(), err.to_string());
            }
        };

        match local {
            None => self.adopt(&remote, SyncOutcome::Created),
            Some(local) if local == remote => SyncOutcome::Unchanged,
            Some(local) => {
                let conflict = SyncConflict {
                    local_bytes: local.len(),
                    remote_bytes: remote.len(),
                    remote_items: parse_catalog(&remote).ok().map(|snapshot| snapshot.len()),
                };
                if confirm(&conflict) {
                    self.adopt(&remote, SyncOutcome::Updated)
                } else {
                    info!(path = %self.path, "remote catalog differs, local copy kept");
                    SyncOutcome::KeptLocal
                }
            }
        }
    }

    fn adopt(&self, remote: &[u8], outcome: SyncOutcome) -> SyncOutcome {
        match Store::write_bytes_atomic(&self.path, remote) {
            Ok(()) => {
                info!(path = %self.path, bytes = remote.len(), "catalog written from remote");
                outcome
            }
            Err(err) => {
                warn!(path = %self.path, error = %err, "failed to write catalog");
                SyncOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    fn offline(&self, has_local: bool, reason: String) -> SyncOutcome {
        if has_local {
            return SyncOutcome::Offline {
                wrote_empty: false,
                reason,
            };
        }
        let empty = format!("{CATALOG_HEADER}\n");
        match Store::write_bytes_atomic(&self.path, empty.as_bytes()) {
            Ok(()) => SyncOutcome::Offline {
                wrote_empty: true,
                reason,
            },
            Err(err) => SyncOutcome::Failed {
                reason: format!("{reason}; {err}"),
            },
        }
    }
}

pub fn parse_catalog(content: &[u8]) -> Result<CatalogSnapshot, KitapError> {
    let content = content.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(content);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content);

    let headers = reader
        .headers()
        .map_err(|err| KitapError::CatalogParse(err.to_string()))?
        .clone();
    let columns: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(index, name)| (name.trim().to_ascii_lowercase(), index))
        .collect();
    if !columns.contains_key("name") {
        return Err(KitapError::CatalogParse(format!(
            "missing 'name' column (expected header {CATALOG_HEADER})"
        )));
    }

    let mut items = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record
            .map_err(|err| KitapError::CatalogParse(format!("row {}: {err}", row + 2)))?;
        let field = |column: &str, default: &str| -> String {
            columns
                .get(column)
                .and_then(|index| record.get(*index))
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .unwrap_or(default)
                .to_string()
        };

        let name = field("name", "");
        if name.is_empty() {
            continue;
        }
        items.push(CatalogItem {
            name,
            download_url: field("downloadurl", ""),
            unlock_key: field("unlockkey", NONE_MARKER),
            category: field("category", ""),
            publisher: field("publisher", UNKNOWN_PUBLISHER),
            cover_image_url: field("coverimageurl", NONE_MARKER),
        });
    }

    Ok(CatalogSnapshot::new(items))
}
