mod common;

use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

use assert_matches::assert_matches;

use ekitap_downloader::launcher::NoClipboard;
use ekitap_downloader::lifecycle::Acquisition;
use ekitap_downloader::remote::{AccessKey, InstallResponse, RemoteInstaller};

use common::{MockHttp, RecordingLauncher, raw_request, temp_store};

const APP_URL: &str = "https://files.example/apps/reader.exe";

fn installer(
    dir: &tempfile::TempDir,
    http: &MockHttp,
    launcher: &RecordingLauncher,
) -> RemoteInstaller<MockHttp, RecordingLauncher, NoClipboard> {
    let acquisition = Acquisition::new(
        temp_store(dir.path()),
        http.clone(),
        launcher.clone(),
        NoClipboard,
    );
    RemoteInstaller::new(acquisition, AccessKey::new("hunter2").unwrap())
}

#[test]
fn rejects_missing_or_wrong_key() {
    let dir = tempfile::tempdir().unwrap();
    let http = MockHttp::new();
    let remote = installer(&dir, &http, &RecordingLauncher::default());
    let body = format!(r#"{{"url":"{APP_URL}"}}"#);

    let (status, response) = remote.handle(None, body.as_bytes());
    assert_eq!(status, 401);
    assert_matches!(response, InstallResponse::Error { .. });

    let (status, _) = remote.handle(Some("hunter3"), body.as_bytes());
    assert_eq!(status, 401);
    assert_eq!(http.calls(), 0);
}

#[test]
fn malformed_body_is_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let remote = installer(&dir, &MockHttp::new(), &RecordingLauncher::default());

    let (status, _) = remote.handle(Some("hunter2"), b"{not json");
    assert_eq!(status, 400);
}

#[test]
fn installs_and_launches_repeatedly() {
    let dir = tempfile::tempdir().unwrap();
    let http = MockHttp::new().with(APP_URL, b"MZ".to_vec());
    let launcher = RecordingLauncher::default();
    let remote = installer(&dir, &http, &launcher);
    let body = format!(r#"{{"url":"{APP_URL}","unlock_key":"K9"}}"#);

    for _ in 0..2 {
        let (status, response) = remote.handle(Some("hunter2"), body.as_bytes());
        assert_eq!(status, 200);
        assert_matches!(response, InstallResponse::Success { message } => {
            assert!(message.contains("reader_K9.exe"));
        });
    }
    assert!(dir.path().join("data").join("reader_K9.exe").exists());
    assert_eq!(launcher.paths.lock().unwrap().len(), 2);
}

#[test]
fn unreachable_download_is_gateway_error() {
    let dir = tempfile::tempdir().unwrap();
    let remote = installer(&dir, &MockHttp::new(), &RecordingLauncher::default());
    let body = format!(r#"{{"url":"{APP_URL}"}}"#);

    let (status, response) = remote.handle(Some("hunter2"), body.as_bytes());
    assert_eq!(status, 502);
    assert_matches!(response, InstallResponse::Error { .. });
}

#[test]
fn serves_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let http = MockHttp::new().with(APP_URL, b"MZ".to_vec());
    let remote = Arc::new(installer(&dir, &http, &RecordingLauncher::default()));
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let server = Arc::clone(&remote);
    thread::spawn(move || server.serve(listener));

    let body = format!(r#"{{"url":"{APP_URL}"}}"#);
    let request = |key: &str| {
        format!(
            "POST /install HTTP/1.1\r\nHost: test\r\nX-Access-Key: {key}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        )
    };

    let (status, response) = raw_request(&addr, &request("nope"));
    assert_eq!(status, 401);
    assert!(response.contains(r#""status":"error""#));

    let (status, response) = raw_request(&addr, &request("hunter2"));
    assert_eq!(status, 200);
    assert!(response.contains(r#""status":"success""#));

    let (status, _) = raw_request(&addr, "GET /install HTTP/1.1\r\nHost: test\r\n\r\n");
    assert_eq!(status, 405);
}

#[test]
fn new_install_replaces_previous_download() {
    const OTHER_URL: &str = "https://files.example/apps/atlas.zip";
    let dir = tempfile::tempdir().unwrap();
    let http = MockHttp::new()
        .with(APP_URL, b"MZ".to_vec())
        .with(OTHER_URL, b"PK".to_vec());
    let remote = installer(&dir, &http, &RecordingLauncher::default());
    let data = dir.path().join("data");

    let (status, _) = remote.handle(Some("hunter2"), format!(r#"{{"url":"{APP_URL}"}}"#).as_bytes());
    assert_eq!(status, 200);
    assert!(data.join("reader.exe").exists());

    let (status, _) = remote.handle(Some("hunter2"), format!(r#"{{"url":"{OTHER_URL}"}}"#).as_bytes());
    assert_eq!(status, 200);
    assert!(data.join("atlas.zip").exists());
    assert!(!data.join("reader.exe").exists());
}
