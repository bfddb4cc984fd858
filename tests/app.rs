mod common;

use std::fs;

use assert_matches::assert_matches;

use ekitap_downloader::app::App;
use ekitap_downloader::catalog::{CATALOG_HEADER, SyncOutcome};
use ekitap_downloader::config::ResolvedConfig;
use ekitap_downloader::error::KitapError;
use ekitap_downloader::images::CoverSource;
use ekitap_downloader::lifecycle::{AcquireOutcome, Phase};
use ekitap_downloader::output::JsonOutput;

use common::{MockHttp, RecordingClipboard, RecordingLauncher, png_bytes, temp_store};

const REMOTE: &str = "https://catalog.example/data.csv";
const COVER: &str = "https://covers.example/atlas.png";

type TestApp = App<MockHttp, RecordingLauncher, RecordingClipboard>;

fn catalog_text() -> String {
    format!(
        "{CATALOG_HEADER}\n\
         Atlas,https://files.example/atlas.zip,AT-1,5,Maps Inc,{COVER}\n\
         Reader,site://https://reader.example,none,all,Acme,none\n\
         Chem,https://files.example/chem.exe,none,6,,\n"
    )
}

fn app_with(
    dir: &tempfile::TempDir,
    http: &MockHttp,
    launcher: &RecordingLauncher,
    remote: Option<&str>,
) -> TestApp {
    let config = ResolvedConfig {
        remote_catalog_url: remote.map(str::to_string),
        cover_size: 24,
        ..ResolvedConfig::default()
    };
    App::new(
        config,
        temp_store(dir.path()),
        http.clone(),
        http.clone(),
        launcher.clone(),
        RecordingClipboard::default(),
    )
}

#[test]
fn list_groups_catalog() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("data.csv"), catalog_text()).unwrap();
    let app = app_with(&dir, &MockHttp::new(), &RecordingLauncher::default(), None);

    let result = app.list(&JsonOutput).unwrap();

    assert_eq!(result.total_items, 3);
    assert!(result.warning.is_none());
    let categories: Vec<_> = result.groups.iter().map(|g| g.category.as_str()).collect();
    assert_eq!(categories, vec!["5", "6"]);
    let five: Vec<_> = result.groups[0].items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(five, vec!["Atlas", "Reader"]);
    assert!(result.groups[0].items[1].link);
}

#[test]
fn missing_catalog_lists_empty_with_warning() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_with(&dir, &MockHttp::new(), &RecordingLauncher::default(), None);

    let result = app.list(&JsonOutput).unwrap();

    assert_eq!(result.total_items, 0);
    assert!(result.groups.is_empty());
    assert!(result.warning.is_some());
}

#[test]
fn show_resolves_cover_and_saved_path() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("data.csv"), catalog_text()).unwrap();
    let http = MockHttp::new().with(COVER, png_bytes(3, 3, [50, 60, 70, 255]));
    let app = app_with(&dir, &http, &RecordingLauncher::default(), None);

    let shown = app.show("atlas", &JsonOutput).unwrap();
    assert_eq!(shown.item.name, "Atlas");
    assert_eq!(shown.cover.source, CoverSource::Network);
    assert_eq!((shown.cover.width, shown.cover.height), (24, 24));
    assert!(shown.saved_path.unwrap().ends_with("atlas_AT-1.zip"));
    assert!(!shown.downloaded);

    let chem = app.show("Chem", &JsonOutput).unwrap();
    assert_eq!(chem.cover.source, CoverSource::Placeholder);
    assert!(chem.cover.cache_path.is_none());
}

#[test]
fn fetch_launch_and_remove() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("data.csv"), catalog_text()).unwrap();
    let http = MockHttp::new().with("https://files.example/atlas.zip", b"PK".to_vec());
    let launcher = RecordingLauncher::default();
    let app = app_with(&dir, &http, &launcher, None);

    let fetched = app.fetch("Atlas", true, &JsonOutput).unwrap();
    assert!(fetched.launched);
    assert_matches!(fetched.outcome, AcquireOutcome::Saved { copied_to_clipboard: true, .. });
    assert_eq!(app.phase(), Phase::Idle);
    assert_eq!(launcher.paths.lock().unwrap().len(), 1);

    let removed = app.remove("Atlas").unwrap();
    assert!(removed.removed);
    assert!(!dir.path().join("data").join("atlas_AT-1.zip").exists());
    assert!(!app.remove("Atlas").unwrap().removed);
}

#[test]
fn browser_flow_holds_until_return() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("data.csv"), catalog_text()).unwrap();
    let http = MockHttp::new().with("https://files.example/chem.exe", b"MZ".to_vec());
    let app = app_with(&dir, &http, &RecordingLauncher::default(), None);
    let chem = app.find_item("chem").unwrap();

    app.acquire(&chem, &JsonOutput).unwrap();
    assert_eq!(app.phase(), Phase::Downloaded);
    assert_eq!(app.download_state().unwrap().item.name, "Chem");

    app.launch().unwrap();
    let back = app.return_to_catalog().unwrap();
    assert!(back.removed);
    assert_eq!(app.phase(), Phase::Idle);
    assert!(app.download_state().is_none());
}

#[test]
fn unknown_item_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("data.csv"), catalog_text()).unwrap();
    let app = app_with(&dir, &MockHttp::new(), &RecordingLauncher::default(), None);
    assert_matches!(app.find_item("Nope"), Err(KitapError::ItemNotFound(_)));
}

#[test]
fn sync_requires_remote_url() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_with(&dir, &MockHttp::new(), &RecordingLauncher::default(), None);
    assert_matches!(
        app.sync_catalog(&JsonOutput, |_| true),
        Err(KitapError::MissingRemote)
    );
}

#[test]
fn sync_creates_catalog_and_reports_items() {
    let dir = tempfile::tempdir().unwrap();
    let http = MockHttp::new().with(REMOTE, catalog_text());
    let app = app_with(&dir, &http, &RecordingLauncher::default(), Some(REMOTE));

    let result = app.sync_catalog(&JsonOutput, |_| false).unwrap();

    assert_eq!(result.outcome, SyncOutcome::Created);
    assert_eq!(result.items, 3);
}
