use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::KitapError;

const CHUNK_SIZE: usize = 8192;

pub trait HttpClient: Send + Sync {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, KitapError>;

    /// Streams the response body into `sink` and returns the number of bytes written.
    fn download(&self, url: &str, sink: &mut dyn Write) -> Result<u64, KitapError>;
}

impl<T: HttpClient + ?Sized> HttpClient for Arc<T> {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, KitapError> {
        (**self).get_bytes(url)
    }

    fn download(&self, url: &str, sink: &mut dyn Write) -> Result<u64, KitapError> {
        (**self).download(url, sink)
    }
}

#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, KitapError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("ekitap/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| KitapError::NetworkError(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(timeout.min(Duration::from_secs(30)))
            .timeout(timeout)
            .build()
            .map_err(|err| KitapError::NetworkError(err.to_string()))?;
        Ok(Self { client })
    }

    fn send(&self, url: &str) -> Result<Response, KitapError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| classify_error(url, &err))?;
        if !response.status().is_success() {
            return Err(KitapError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

impl HttpClient for ReqwestHttpClient {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, KitapError> {
        let response = self.send(url)?;
        let bytes = response.bytes().map_err(|err| classify_error(url, &err))?;
        Ok(bytes.to_vec())
    }

    fn download(&self, url: &str, sink: &mut dyn Write) -> Result<u64, KitapError> {
        let mut response = self.send(url)?;
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut written = 0u64;
        loop {
            let read = response
                .read(&mut buffer)
                .map_err(|err| classify_read_error(url, &err))?;
            if read == 0 {
                break;
            }
            sink.write_all(&buffer[..read])
                .map_err(|err| KitapError::Filesystem(err.to_string()))?;
            written += read as u64;
        }
        sink.flush()
            .map_err(|err| KitapError::Filesystem(err.to_string()))?;
        Ok(written)
    }
}

fn classify_error(url: &str, err: &reqwest::Error) -> KitapError {
    if err.is_timeout() {
        KitapError::NetworkTimeout(url.to_string())
    } else {
        KitapError::NetworkError(format!("{url}: {err}"))
    }
}

fn classify_read_error(url: &str, err: &std::io::Error) -> KitapError {
    let inner_timeout = err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<reqwest::Error>())
        .map(|inner| inner.is_timeout())
        .unwrap_or(false);
    if err.kind() == std::io::ErrorKind::TimedOut || inner_timeout {
        KitapError::NetworkTimeout(url.to_string())
    } else {
        KitapError::NetworkError(format!("{url}: {err}"))
    }
}
