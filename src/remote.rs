//! Authenticated fetch-and-launch endpoint for running the downloader on another
//! machine. One request is handled at a time, so at most one acquisition is in
//! flight. Only the latest install is kept on disk: the previous download is
//! deleted once a different one has been saved.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Mutex;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{CatalogItem, NONE_MARKER, UNKNOWN_PUBLISHER};
use crate::error::KitapError;
use crate::filename::last_path_segment;
use crate::http::HttpClient;
use crate::launcher::{ClipboardSink, Launcher};
use crate::lifecycle::{AcquireOutcome, Acquisition, remove_download};

pub const ACCESS_HEADER: &str = "x-access-key";
pub const INSTALL_PATH: &str = "/install";

const MAX_HEADER_BYTES: usize = 16 * 1024;
const MAX_BODY_BYTES: usize = 64 * 1024;
const IO_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Deserialize)]
pub struct InstallRequest {
    pub url: String,
    #[serde(default)]
    pub unlock_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum InstallResponse {
    Success { message: String },
    Error { error: String },
}

/// Shared secret for the endpoint. Lives in memory only.
pub struct AccessKey(String);

impl AccessKey {
    pub fn new(value: &str) -> Result<Self, KitapError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(KitapError::BadRequest("access key must not be empty".to_string()));
        }
        Ok(Self(value.to_string()))
    }

    pub fn matches(&self, candidate: &str) -> bool {
        let expected = self.0.as_bytes();
        let candidate = candidate.trim().as_bytes();
        if expected.len() != candidate.len() {
            return false;
        }
        expected
            .iter()
            .zip(candidate)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl std::fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessKey(***)")
    }
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl HttpRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        info!(message = %event.message, "remote install progress");
    }
}

struct Installs<H: HttpClient, L: Launcher, C: ClipboardSink> {
    acquisition: Acquisition<H, L, C>,
    previous: Option<Utf8PathBuf>,
}

pub struct RemoteInstaller<H: HttpClient, L: Launcher, C: ClipboardSink> {
    installs: Mutex<Installs<H, L, C>>,
    key: AccessKey,
}

impl<H: HttpClient, L: Launcher, C: ClipboardSink> RemoteInstaller<H, L, C> {
    pub fn new(acquisition: Acquisition<H, L, C>, key: AccessKey) -> Self {
        Self {
            installs: Mutex::new(Installs {
                acquisition,
                previous: None,
            }),
            key,
        }
    }

    pub fn handle(&self, access_key: Option<&str>, body: &[u8]) -> (u16, InstallResponse) {
        let result = self.authorize(access_key).and_then(|()| {
            let request: InstallRequest = serde_json::from_slice(body)
                .map_err(|err| KitapError::BadRequest(err.to_string()))?;
            self.install(request)
        });
        match result {
            Ok(message) => (200, InstallResponse::Success { message }),
            Err(err) => {
                warn!(error = %err, "remote install failed");
                (
                    status_for(&err),
                    InstallResponse::Error {
                        error: err.to_string(),
                    },
                )
            }
        }
    }

    pub fn install(&self, request: InstallRequest) -> Result<String, KitapError> {
        let url = request.url.trim().to_string();
        if url.is_empty() {
            return Err(KitapError::BadRequest("url is required".to_string()));
        }
        let item = CatalogItem {
            name: last_path_segment(&url).unwrap_or_else(|| "remote item".to_string()),
            download_url: url,
            unlock_key: request
                .unlock_key
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty())
                .unwrap_or_else(|| NONE_MARKER.to_string()),
            category: String::new(),
            publisher: UNKNOWN_PUBLISHER.to_string(),
            cover_image_url: NONE_MARKER.to_string(),
        };

        let mut installs = self
            .installs
            .lock()
            .map_err(|_| KitapError::Filesystem("acquisition state lock poisoned".to_string()))?;
        let Installs {
            acquisition,
            previous,
        } = &mut *installs;
        let outcome = acquisition.acquire(&item, &LogProgress)?;
        let result = match outcome {
            AcquireOutcome::OpenedLink { target } => Ok(format!("opened {target}")),
            AcquireOutcome::Saved { path, .. } => {
                if let Some(old) = previous.take().filter(|old| *old != path) {
                    if let Err(err) = remove_download(&old) {
                        warn!(path = %old, error = %err, "failed to remove previous install");
                    }
                }
                *previous = Some(path.clone());
                acquisition
                    .launch()
                    .map(|_| format!("downloaded and launched {path}"))
            }
        };
        acquisition.release();
        result
    }

    pub fn serve(&self, listener: TcpListener) -> Result<(), KitapError> {
        let addr = listener
            .local_addr()
            .map_err(|err| KitapError::NetworkError(err.to_string()))?;
        info!(%addr, "remote install endpoint listening");
        for stream in listener.incoming() {
            match stream {
                Ok(stream) => self.handle_stream(stream),
                Err(err) => warn!(error = %err, "failed to accept connection"),
            }
        }
        Ok(())
    }

    fn handle_stream(&self, mut stream: TcpStream) {
        let _ = stream.set_read_timeout(Some(IO_TIMEOUT));
        let _ = stream.set_write_timeout(Some(IO_TIMEOUT));
        let (status, response) = match read_request(&mut stream) {
            Ok(request) => self.route(&request),
            Err(err) => (
                400,
                InstallResponse::Error {
                    error: err.to_string(),
                },
            ),
        };
        if let Err(err) = write_response(&mut stream, status, &response) {
            warn!(error = %err, "failed to write response");
        }
    }

    fn route(&self, request: &HttpRequest) -> (u16, InstallResponse) {
        match (request.method.as_str(), request.path.as_str()) {
            ("POST", INSTALL_PATH) => self.handle(request.header(ACCESS_HEADER), &request.body),
            ("GET", "/health") => (
                200,
                InstallResponse::Success {
                    message: "ready".to_string(),
                },
            ),
            (_, INSTALL_PATH) => (
                405,
                InstallResponse::Error {
                    error: "use POST".to_string(),
                },
            ),
            _ => (
                404,
                InstallResponse::Error {
                    error: "not found".to_string(),
                },
            ),
        }
    }

    fn authorize(&self, access_key: Option<&str>) -> Result<(), KitapError> {
        match access_key {
            Some(candidate) if self.key.matches(candidate) => Ok(()),
            _ => Err(KitapError::Unauthorized),
        }
    }
}

fn status_for(err: &KitapError) -> u16 {
    match err {
        KitapError::Unauthorized => 401,
        KitapError::BadRequest(_) | KitapError::MissingDownloadUrl(_) => 400,
        KitapError::AcquisitionBusy(_) => 409,
        err if err.is_network() => 502,
        _ => 500,
    }
}

fn read_request(stream: &mut impl Read) -> Result<HttpRequest, KitapError> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(end) = find_header_end(&buffer) {
            break end;
        }
        if buffer.len() > MAX_HEADER_BYTES {
            return Err(KitapError::BadRequest("headers too large".to_string()));
        }
        let read = stream
            .read(&mut chunk)
            .map_err(|err| KitapError::BadRequest(err.to_string()))?;
        if read == 0 {
            return Err(KitapError::BadRequest("connection closed".to_string()));
        }
        buffer.extend_from_slice(&chunk[..read]);
    };

    let head = std::str::from_utf8(&buffer[..header_end])
        .map_err(|_| KitapError::BadRequest("headers are not UTF-8".to_string()))?;
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_ascii_uppercase();
    let path = parts
        .next()
        .unwrap_or_default()
        .split('?')
        .next()
        .unwrap_or_default()
        .to_string();
    if method.is_empty() || path.is_empty() {
        return Err(KitapError::BadRequest("malformed request line".to_string()));
    }
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect::<Vec<_>>();

    let content_length = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .map(|(_, value)| {
            value
                .parse::<usize>()
                .map_err(|_| KitapError::BadRequest("invalid content-length".to_string()))
        })
        .transpose()?
        .unwrap_or(0);
    if content_length > MAX_BODY_BYTES {
        return Err(KitapError::BadRequest("body too large".to_string()));
    }

    let mut body = buffer[header_end + 4..].to_vec();
    while body.len() < content_length {
        let read = stream
            .read(&mut chunk)
            .map_err(|err| KitapError::BadRequest(err.to_string()))?;
        if read == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    Ok(HttpRequest {
        method,
        path,
        headers,
        body,
    })
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}

fn write_response(
    stream: &mut impl Write,
    status: u16,
    response: &InstallResponse,
) -> std::io::Result<()> {
    let body = serde_json::to_vec(response).map_err(std::io::Error::other)?;
    let head = format!(
        "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        reason_phrase(status),
        body.len()
    );
    stream.write_all(head.as_bytes())?;
    stream.write_all(&body)?;
    stream.flush()
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        502 => "Bad Gateway",
        _ => "Internal Server Error",
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn access_key_comparison() {
        let key = AccessKey::new("s3cret").unwrap();
        assert!(key.matches("s3cret"));
        assert!(!key.matches("s3cre"));
        assert!(!key.matches("S3CRET"));
        assert!(AccessKey::new("  ").is_err());
    }

    #[test]
    fn parses_request_with_body() {
        let raw = b"POST /install?x=1 HTTP/1.1\r\nHost: a\r\nX-Access-Key: k\r\nContent-Length: 13\r\n\r\n{\"url\":\"u\"}\r\n";
        let request = read_request(&mut Cursor::new(raw.to_vec())).unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/install");
        assert_eq!(request.header(ACCESS_HEADER), Some("k"));
        assert_eq!(request.body.len(), 13);
    }

    #[test]
    fn response_is_tagged_by_status() {
        let json = serde_json::to_value(InstallResponse::Error {
            error: "nope".to_string(),
        })
        .unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "nope");
    }
}
