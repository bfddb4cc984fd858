use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KitapError {
    #[error("catalog file not found: {0}")]
    CatalogMissing(PathBuf),

    #[error("failed to parse catalog: {0}")]
    CatalogParse(String),

    #[error("request timed out: {0}")]
    NetworkTimeout(String),

    #[error("request failed: {0}")]
    NetworkError(String),

    #[error("server returned status {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to launch {0}")]
    LaunchFailure(String),

    #[error("clipboard unavailable: {0}")]
    Clipboard(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("catalog item not found: {0}")]
    ItemNotFound(String),

    #[error("item has no download url: {0}")]
    MissingDownloadUrl(String),

    #[error("no remote catalog url configured (set remote_catalog_url in ekitap.json)")]
    MissingRemote,

    #[error("{0} is still downloaded; go back to the catalog first")]
    AcquisitionBusy(String),

    #[error("nothing has been downloaded yet")]
    NothingDownloaded,

    #[error("access key rejected")]
    Unauthorized,

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl KitapError {
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            KitapError::NetworkTimeout(_)
                | KitapError::NetworkError(_)
                | KitapError::HttpStatus { .. }
        )
    }
}
