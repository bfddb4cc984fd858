use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;

use crate::config::ResolvedConfig;
use crate::error::KitapError;

#[derive(Debug, Clone)]
pub struct Store {
    catalog_path: Utf8PathBuf,
    download_dir: Utf8PathBuf,
    cache_dir: Utf8PathBuf,
}

impl Store {
    pub fn new(config: &ResolvedConfig) -> Result<Self, KitapError> {
        let cache_dir = match &config.cache_dir {
            Some(dir) => dir.clone(),
            None => default_cache_dir()?,
        };
        Ok(Self {
            catalog_path: config.catalog_path.clone(),
            download_dir: config.download_dir.clone(),
            cache_dir,
        })
    }

    pub fn new_with_paths(
        catalog_path: Utf8PathBuf,
        download_dir: Utf8PathBuf,
        cache_dir: Utf8PathBuf,
    ) -> Self {
        Self {
            catalog_path,
            download_dir,
            cache_dir,
        }
    }

    pub fn catalog_path(&self) -> &Utf8Path {
        &self.catalog_path
    }

    pub fn download_dir(&self) -> &Utf8Path {
        &self.download_dir
    }

    pub fn cache_dir(&self) -> &Utf8Path {
        &self.cache_dir
    }

    pub fn download_path(&self, file_name: &str) -> Utf8PathBuf {
        self.download_dir.join(file_name)
    }

    pub fn ensure_download_dir(&self) -> Result<(), KitapError> {
        fs::create_dir_all(self.download_dir.as_std_path())
            .map_err(|err| KitapError::Filesystem(format!("{}: {err}", self.download_dir)))
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), KitapError> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        };
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| KitapError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".ekitap-write")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| KitapError::Filesystem(err.to_string()))?;
        io::Write::write_all(&mut temp, content)
            .map_err(|err| KitapError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| KitapError::Filesystem(format!("{path}: {}", err.error)))?;
        Ok(())
    }

    /// Removes a single file. Returns `false` when it was already gone.
    pub fn remove_file_idempotent(path: &Utf8Path) -> Result<bool, KitapError> {
        match fs::remove_file(path.as_std_path()) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(KitapError::Filesystem(format!("remove {path}: {err}"))),
        }
    }
}

fn default_cache_dir() -> Result<Utf8PathBuf, KitapError> {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(
                dirs.home_dir()
                    .join(".cache")
                    .join("ekitap-downloader")
                    .join("covers"),
            )
            .ok()
        })
        .ok_or_else(|| KitapError::Filesystem("unable to resolve cache directory".to_string()))
}
