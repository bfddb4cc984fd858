use std::path::Path;
use std::sync::Mutex;

use crate::error::KitapError;

pub trait Launcher: Send + Sync {
    fn open_path(&self, path: &Path) -> Result<(), KitapError>;
    fn open_link(&self, url: &str) -> Result<(), KitapError>;
}

pub trait ClipboardSink: Send + Sync {
    fn copy_text(&self, text: &str) -> Result<(), KitapError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn open_path(&self, path: &Path) -> Result<(), KitapError> {
        open::that_detached(path)
            .map_err(|err| KitapError::LaunchFailure(format!("{}: {err}", path.display())))
    }

    fn open_link(&self, url: &str) -> Result<(), KitapError> {
        open::that_detached(url).map_err(|err| KitapError::LaunchFailure(format!("{url}: {err}")))
    }
}

/// Keeps the platform clipboard handle alive for the whole process; on X11 the
/// copied text disappears when the owning handle is dropped.
#[derive(Default)]
pub struct SystemClipboard {
    handle: Mutex<Option<arboard::Clipboard>>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClipboardSink for SystemClipboard {
    fn copy_text(&self, text: &str) -> Result<(), KitapError> {
        let mut guard = self
            .handle
            .lock()
            .map_err(|_| KitapError::Clipboard("clipboard lock poisoned".to_string()))?;
        if guard.is_none() {
            let clipboard =
                arboard::Clipboard::new().map_err(|err| KitapError::Clipboard(err.to_string()))?;
            *guard = Some(clipboard);
        }
        match guard.as_mut() {
            Some(clipboard) => clipboard
                .set_text(text.to_string())
                .map_err(|err| KitapError::Clipboard(err.to_string())),
            None => Err(KitapError::Clipboard("clipboard not initialised".to_string())),
        }
    }
}

/// For headless runs (the remote endpoint) where no clipboard exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClipboard;

impl ClipboardSink for NoClipboard {
    fn copy_text(&self, _text: &str) -> Result<(), KitapError> {
        Ok(())
    }
}
