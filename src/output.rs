use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    CoversResult, FetchResult, ListResult, RemoveResult, ShowResult, SyncResult,
};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_show(result: &ShowResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_sync(result: &SyncResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_covers(result: &CoversResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_fetch(result: &FetchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_remove(result: &RemoveResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl crate::app::ProgressSink for JsonOutput {
    fn event(&self, _event: crate::app::ProgressEvent) {}
}

/// Plain-text progress on stderr for interactive runs outside the browser.
pub struct StderrProgress;

impl crate::app::ProgressSink for StderrProgress {
    fn event(&self, event: crate::app::ProgressEvent) {
        let message = event
            .message
            .split_once("; ")
            .map(|(_, payload)| payload.to_string())
            .unwrap_or(event.message);
        match event.elapsed {
            Some(elapsed) => eprintln!("{message} [{} ms]", elapsed.as_millis()),
            None => eprintln!("{message}"),
        }
    }
}
