use tracing::{debug, info};
use url::Url;

use crate::channels::{CandidateSet, PlaylistFormat, RawPlaylist};
use crate::metrics::CANDIDATES_REJECTED;
use crate::settings::FilterConfig;

/// Why an extracted `(name, url)` pair did not become a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    Denied,
    NotAllowed,
    UnsupportedUrl,
}

impl FilterReason {
    fn label(self) -> &'static str {
        match self {
            FilterReason::Denied => "denied",
            FilterReason::NotAllowed => "not_allowed",
            FilterReason::UnsupportedUrl => "unsupported_url",
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParseStats {
    pub extracted: usize,
    pub denied: usize,
    pub not_allowed: usize,
    pub unsupported_url: usize,
    pub duplicates: usize,
}

pub struct PlaylistParser {
    config: FilterConfig,
}

impl PlaylistParser {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    /// Parses each document with its own format and merges the accepted
    /// pairs into one candidate set, in document order.
    pub fn parse(&self, documents: &[RawPlaylist]) -> (CandidateSet, ParseStats) {
        let mut set = CandidateSet::new();
        let mut stats = ParseStats::default();
        for doc in documents {
            let before = set.candidate_count();
            self.parse_into(doc.format, &doc.body, &mut set, &mut stats);
            debug!(
                "{}: {} new candidates",
                doc.endpoint,
                set.candidate_count() - before
            );
        }
        info!(
            "Parsed {} channels / {} candidates from {} entries (denied={}, not_allowed={}, unsupported_url={}, duplicates={})",
            set.channel_count(),
            set.candidate_count(),
            stats.extracted,
            stats.denied,
            stats.not_allowed,
            stats.unsupported_url,
            stats.duplicates
        );
        (set, stats)
    }

    pub fn parse_into(
        &self,
        format: PlaylistFormat,
        body: &str,
        set: &mut CandidateSet,
        stats: &mut ParseStats,
    ) {
        let pairs = match format {
            PlaylistFormat::ExtendedM3u => extract_m3u(body),
            PlaylistFormat::DelimitedText => self.extract_delimited(body),
        };

        for (name, url) in pairs {
            stats.extracted += 1;
            match self.admit(name, url) {
                Ok(()) => {
                    if !set.insert(name, url) {
                        stats.duplicates += 1;
                    }
                }
                Err(reason) => {
                    debug!("Dropping {} ({}): {:?}", name, url, reason);
                    CANDIDATES_REJECTED.with_label_values(&[reason.label()]).inc();
                    match reason {
                        FilterReason::Denied => stats.denied += 1,
                        FilterReason::NotAllowed => stats.not_allowed += 1,
                        FilterReason::UnsupportedUrl => stats.unsupported_url += 1,
                    }
                }
            }
        }
    }

    /// Deny-list first, then allow-list, then the URL shape.
    pub fn admit(&self, name: &str, url: &str) -> Result<(), FilterReason> {
        if self.config.deny.iter().any(|k| name.contains(k.as_str())) {
            return Err(FilterReason::Denied);
        }
        if !self.config.allow.iter().any(|k| name.contains(k.as_str())) {
            return Err(FilterReason::NotAllowed);
        }
        if !is_stream_url(url) {
            return Err(FilterReason::UnsupportedUrl);
        }
        Ok(())
    }

    fn extract_delimited<'a>(&self, body: &'a str) -> Vec<(&'a str, &'a str)> {
        body.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| {
                !self
                    .config
                    .skip_prefixes
                    .iter()
                    .any(|p| line.starts_with(p.as_str()))
            })
            .filter_map(|line| line.split_once(','))
            .map(|(name, url)| (name.trim(), url.trim()))
            .collect()
    }
}

/// `#EXTINF` lines immediately followed by a non-comment line. The display
/// name is the text after the last comma.
fn extract_m3u(body: &str) -> Vec<(&str, &str)> {
    let lines: Vec<&str> = body
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    lines
        .windows(2)
        .filter_map(|pair| {
            let (meta, url) = (pair[0], pair[1]);
            if !meta.starts_with("#EXTINF:") || url.starts_with('#') {
                return None;
            }
            let name = meta[meta.rfind(',')? + 1..].trim();
            (!name.is_empty()).then_some((name, url))
        })
        .collect()
}

/// HTTP(S) URL whose path names an HLS playlist or a transport stream.
pub fn is_stream_url(url: &str) -> bool {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return false;
    }
    match Url::parse(url) {
        Ok(parsed) => {
            let path = parsed.path();
            path.contains(".m3u8") || path.contains(".ts")
        }
        Err(_) => false,
    }
}
