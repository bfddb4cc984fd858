#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use camino::Utf8PathBuf;
use image::{ImageFormat, Rgba, RgbaImage};

use ekitap_downloader::error::KitapError;
use ekitap_downloader::http::HttpClient;
use ekitap_downloader::launcher::{ClipboardSink, Launcher};
use ekitap_downloader::store::Store;

/// In-memory HTTP double. Unknown URLs fail with a network error.
#[derive(Clone, Default)]
pub struct MockHttp {
    responses: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    calls: Arc<AtomicUsize>,
}

impl MockHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), body.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lookup(&self, url: &str) -> Result<Vec<u8>, KitapError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| KitapError::NetworkError(format!("{url}: connection refused")))
    }
}

impl HttpClient for MockHttp {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, KitapError> {
        self.lookup(url)
    }

    fn download(&self, url: &str, sink: &mut dyn Write) -> Result<u64, KitapError> {
        let body = self.lookup(url)?;
        sink.write_all(&body)
            .map_err(|err| KitapError::Filesystem(err.to_string()))?;
        Ok(body.len() as u64)
    }
}

#[derive(Clone, Default)]
pub struct RecordingLauncher {
    pub paths: Arc<Mutex<Vec<PathBuf>>>,
    pub links: Arc<Mutex<Vec<String>>>,
    pub fail: bool,
}

impl RecordingLauncher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

impl Launcher for RecordingLauncher {
    fn open_path(&self, path: &Path) -> Result<(), KitapError> {
        if self.fail {
            return Err(KitapError::LaunchFailure(path.display().to_string()));
        }
        self.paths.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    fn open_link(&self, url: &str) -> Result<(), KitapError> {
        if self.fail {
            return Err(KitapError::LaunchFailure(url.to_string()));
        }
        self.links.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingClipboard {
    pub texts: Arc<Mutex<Vec<String>>>,
}

impl ClipboardSink for RecordingClipboard {
    fn copy_text(&self, text: &str) -> Result<(), KitapError> {
        self.texts.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

pub fn temp_store(root: &Path) -> Store {
    let root = Utf8PathBuf::from_path_buf(root.to_path_buf()).unwrap();
    Store::new_with_paths(root.join("data.csv"), root.join("data"), root.join("covers"))
}

pub fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba(color));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Minimal HTTP/1.1 server answering GET requests from a fixed route table.
pub struct StaticServer {
    pub base: String,
    hits: Arc<AtomicUsize>,
}

impl StaticServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub fn start_static(routes: Vec<(&str, u16, Vec<u8>)>) -> StaticServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let routes: Arc<HashMap<String, (u16, Vec<u8>)>> = Arc::new(
        routes
            .into_iter()
            .map(|(path, status, body)| (path.to_string(), (status, body)))
            .collect(),
    );
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let routes = Arc::clone(&routes);
            counter.fetch_add(1, Ordering::SeqCst);
            thread::spawn(move || handle(stream, &routes));
        }
    });
    StaticServer {
        base: format!("http://127.0.0.1:{port}"),
        hits,
    }
}

fn handle(mut stream: TcpStream, routes: &HashMap<String, (u16, Vec<u8>)>) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let request = String::from_utf8_lossy(&buf[..n]);
    let path = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    let (status, body) = routes
        .get(&path)
        .cloned()
        .unwrap_or((404, b"not found".to_vec()));
    let head = format!(
        "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&body);
}

/// Sends one raw HTTP request and returns (status, body).
pub fn raw_request(addr: &str, request: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream.write_all(request.as_bytes()).unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    let status = response
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or(0);
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}
