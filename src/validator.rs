use std::time::Instant;

use bytes::BytesMut;
use futures::stream::{self, StreamExt};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};
use url::Url;

use crate::channels::{latency_millis, ChannelCandidate, ValidatedSource};
use crate::error::Rejection;
use crate::metrics::{PROBE_LATENCY, PROBE_TOTAL};
use crate::settings::ValidateConfig;

pub const M3U_MARKER: &[u8] = b"#EXTM3U";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

lazy_static! {
    // Matches `RESOLUTION=1280x720` (EXT-X-STREAM-INF) and `#EXT-X-RESOLUTION:1280x720`.
    static ref RESOLUTION_RE: Regex =
        Regex::new(r"(?i)RESOLUTION\s*[=:]\s*(\d+)\s*[x×]\s*(\d+)").unwrap();
}

/// Probes stream URLs for liveness, type and quality.
pub struct StreamValidator {
    client: reqwest::Client,
    config: ValidateConfig,
}

impl StreamValidator {
    pub fn new(config: ValidateConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;
        Ok(Self { client, config })
    }

    /// Probes all candidates with at most `concurrency` probes in flight and
    /// returns the valid ones in discovery order.
    pub async fn validate_all(&self, candidates: Vec<ChannelCandidate>) -> Vec<ValidatedSource> {
        let mut results: Vec<(usize, ChannelCandidate, Result<ValidatedSource, Rejection>)> =
            stream::iter(candidates.into_iter().enumerate())
                .map(|(i, candidate)| async move {
                    let result = self.probe(&candidate, i).await;
                    (i, candidate, result)
                })
                .buffer_unordered(self.config.concurrency.max(1))
                .collect()
                .await;
        results.sort_by_key(|(i, _, _)| *i);

        let mut valid = Vec::new();
        for (_, candidate, result) in results {
            match result {
                Ok(source) => {
                    let resolution = source
                        .resolution_height
                        .map(|h| format!("{}p", h))
                        .unwrap_or_else(|| "unknown".to_string());
                    info!(
                        "[{}] valid: latency={}ms resolution={} url={}",
                        source.name,
                        latency_millis(source.latency),
                        resolution,
                        source.url
                    );
                    PROBE_TOTAL.with_label_values(&["valid"]).inc();
                    PROBE_LATENCY.observe(source.latency.as_secs_f64());
                    valid.push(source);
                }
                Err(rejection) => {
                    warn!(
                        "[{}] invalid: {} url={}",
                        candidate.name, rejection, candidate.url
                    );
                    PROBE_TOTAL.with_label_values(&[rejection.reason()]).inc();
                }
            }
        }
        valid
    }

    pub async fn probe(
        &self,
        candidate: &ChannelCandidate,
        discovery: usize,
    ) -> Result<ValidatedSource, Rejection> {
        let start = Instant::now();

        let mut resp = self.client.get(&candidate.url).send().await?;
        if !resp.status().is_success() {
            return Err(Rejection::Status(resp.status()));
        }
        let mut buf = BytesMut::new();
        while awaiting_marker(&buf) {
            match resp.chunk().await? {
                Some(chunk) => buf.extend_from_slice(&chunk),
                None => break,
            }
        }

        if !strip_bom(&buf).starts_with(M3U_MARKER) {
            // A bare segment: only transport streams are playable, and the
            // bytes just read already prove data flows.
            if !is_transport_stream(&candidate.url) {
                return Err(Rejection::UnrecognizedStreamType);
            }
            if buf.is_empty() {
                return Err(Rejection::EmptyStream);
            }
            return Ok(ValidatedSource {
                name: candidate.name.clone(),
                url: candidate.url.clone(),
                latency: start.elapsed(),
                resolution_height: None,
                discovery,
            });
        }

        read_into(&mut resp, &mut buf, self.config.manifest_limit_bytes).await?;
        drop(resp);
        let head = strip_bom(&buf);

        let height = parse_resolution_height(&String::from_utf8_lossy(head));
        if let Some(height) = height {
            if height < self.config.min_height {
                return Err(Rejection::LowResolution { height });
            }
        }

        let resp = self.client.get(&candidate.url).send().await?;
        if !resp.status().is_success() {
            return Err(Rejection::Status(resp.status()));
        }
        let probe = read_prefix(resp, self.config.probe_bytes).await?;
        if probe.is_empty() {
            return Err(Rejection::EmptyStream);
        }

        Ok(ValidatedSource {
            name: candidate.name.clone(),
            url: candidate.url.clone(),
            latency: start.elapsed(),
            resolution_height: height,
            discovery,
        })
    }
}

/// Reads body chunks until at least `limit` bytes arrived or the body ends.
async fn read_prefix(mut resp: reqwest::Response, limit: usize) -> Result<BytesMut, reqwest::Error> {
    let mut buf = BytesMut::new();
    read_into(&mut resp, &mut buf, limit).await?;
    Ok(buf)
}

async fn read_into(
    resp: &mut reqwest::Response,
    buf: &mut BytesMut,
    limit: usize,
) -> Result<(), reqwest::Error> {
    while buf.len() < limit {
        match resp.chunk().await? {
            Some(chunk) => buf.extend_from_slice(&chunk),
            None => break,
        }
    }
    Ok(())
}

fn strip_bom(buf: &[u8]) -> &[u8] {
    buf.strip_prefix(UTF8_BOM).unwrap_or(buf)
}

/// True while `buf` is still a proper prefix of the manifest marker,
/// optionally behind a BOM.
fn awaiting_marker(buf: &[u8]) -> bool {
    if UTF8_BOM.starts_with(buf) {
        return true;
    }
    let rest = strip_bom(buf);
    rest.len() < M3U_MARKER.len() && M3U_MARKER.starts_with(rest)
}

/// Height of the first resolution tag in a manifest.
pub fn parse_resolution_height(manifest: &str) -> Option<u32> {
    RESOLUTION_RE
        .captures_iter(manifest)
        .find_map(|caps| caps[2].parse::<u32>().ok())
}

fn is_transport_stream(url: &str) -> bool {
    Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase().ends_with(".ts"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolution_stream_inf() {
        let manifest = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=2000000,RESOLUTION=1280x720\nhd/index.m3u8\n#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360\nsd/index.m3u8\n";
        assert_eq!(parse_resolution_height(manifest), Some(720));
    }

    #[test]
    fn test_parse_resolution_tag_form() {
        assert_eq!(
            parse_resolution_height("#EXTM3U\n#EXT-X-RESOLUTION:1920x1080\n"),
            Some(1080)
        );
        assert_eq!(
            parse_resolution_height("#EXTM3U\n#EXT-X-RESOLUTION: 640x360\n"),
            Some(360)
        );
    }

    #[test]
    fn test_parse_resolution_absent() {
        let media = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:10,\nseg1.ts\n";
        assert_eq!(parse_resolution_height(media), None);
    }

    #[test]
    fn test_awaiting_marker() {
        assert!(awaiting_marker(b""));
        assert!(awaiting_marker(b"\xEF\xBB"));
        assert!(awaiting_marker(b"#EXT"));
        assert!(awaiting_marker(b"\xEF\xBB\xBF#EX"));
        assert!(!awaiting_marker(b"#EXTM3U"));
        assert!(!awaiting_marker(b"\xEF\xBB\xBF#EXTM3U\n"));
        assert!(!awaiting_marker(&[0x47, 0x40, 0x00]));
        assert!(!awaiting_marker(b"<html>"));
    }

    #[test]
    fn test_is_transport_stream() {
        assert!(is_transport_stream("http://x/live/seg.ts"));
        assert!(is_transport_stream("http://x/live/seg.TS?token=1"));
        assert!(!is_transport_stream("http://x/live/index.m3u8"));
        assert!(!is_transport_stream("http://x/live.ts/index"));
    }
}
