use std::path::Path;

use encoding_rs::{Encoding, GBK, UTF_8};
use futures::stream::{self, StreamExt};
use reqwest::header::{HeaderMap, CONTENT_TYPE, REFERER};
use tracing::{info, warn};

use crate::channels::{PlaylistFormat, RawPlaylist, SourceEndpoint};
use crate::error::FetchError;
use crate::metrics::FETCH_TOTAL;
use crate::settings::FetchConfig;

/// Downloads playlist documents from remote or local endpoints.
pub struct Fetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;
        Ok(Self { client, config })
    }

    /// Fetches every endpoint with at most `concurrency` requests in flight.
    /// Failed endpoints are logged and skipped; the result keeps endpoint order.
    pub async fn fetch_all(&self, endpoints: &[SourceEndpoint]) -> Vec<RawPlaylist> {
        let mut results: Vec<(usize, Result<RawPlaylist, FetchError>)> =
            stream::iter(endpoints.iter().enumerate())
                .map(|(i, endpoint)| async move { (i, self.fetch(endpoint).await) })
                .buffer_unordered(self.config.concurrency.max(1))
                .collect()
                .await;
        results.sort_by_key(|(i, _)| *i);

        let mut documents = Vec::with_capacity(results.len());
        for (i, result) in results {
            match result {
                Ok(doc) => {
                    info!(
                        "Fetched {} ({:?}, {} bytes)",
                        doc.endpoint,
                        doc.format,
                        doc.body.len()
                    );
                    FETCH_TOTAL.with_label_values(&["ok"]).inc();
                    documents.push(doc);
                }
                Err(e) => {
                    warn!("Giving up on {}: {}", endpoints[i], e);
                    FETCH_TOTAL.with_label_values(&["failed"]).inc();
                }
            }
        }
        documents
    }

    pub async fn fetch(&self, endpoint: &SourceEndpoint) -> Result<RawPlaylist, FetchError> {
        let body = match endpoint {
            SourceEndpoint::Remote(url) => self.fetch_remote(url).await?,
            SourceEndpoint::Local(path) => read_local(path).await?,
        };
        let format = PlaylistFormat::detect(&body).ok_or(FetchError::NotAPlaylist)?;
        Ok(RawPlaylist {
            endpoint: endpoint.clone(),
            format,
            body,
        })
    }

    async fn fetch_remote(&self, url: &str) -> Result<String, FetchError> {
        let attempts = self.config.attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.get_once(url).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(
                        "Fetch of {} failed (attempt {}/{}): {}",
                        url, attempt, attempts, e
                    );
                    // Sleeps only this task; other fetches keep running.
                    tokio::time::sleep(self.config.backoff()).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once(&self, url: &str) -> Result<String, FetchError> {
        let resp = self
            .client
            .get(url)
            .header(REFERER, self.config.referer.as_str())
            .send()
            .await?
            .error_for_status()?;
        let charset = charset_of(resp.headers());
        let bytes = resp.bytes().await?;
        Ok(decode_body(&bytes, charset.as_deref()))
    }
}

async fn read_local(path: &Path) -> Result<String, FetchError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(decode_body(&bytes, None)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(FetchError::NotFound(path.to_path_buf()))
        }
        Err(source) => Err(FetchError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn charset_of(headers: &HeaderMap) -> Option<String> {
    let content_type = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}

/// Decodes with the BOM's encoding, else the declared charset (UTF-8 when
/// absent or unknown), falling back to lossy GBK when the bytes are not
/// valid in that encoding. The BOM itself is dropped.
pub fn decode_body(bytes: &[u8], charset: Option<&str>) -> String {
    let (encoding, bytes) = match Encoding::for_bom(bytes) {
        Some((encoding, bom_len)) => (encoding, &bytes[bom_len..]),
        None => (
            charset
                .and_then(|label| Encoding::for_label(label.as_bytes()))
                .unwrap_or(UTF_8),
            bytes,
        ),
    };
    if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
        return text.into_owned();
    }
    let (text, _had_errors) = GBK.decode_without_bom_handling(bytes);
    text.into_owned()
}
