use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// Where a playlist document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEndpoint {
    Remote(String),
    Local(PathBuf),
}

impl SourceEndpoint {
    /// `http(s)://` is remote, `file://` and bare paths are local.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.starts_with("http://") || raw.starts_with("https://") {
            SourceEndpoint::Remote(raw.to_string())
        } else if let Some(path) = raw.strip_prefix("file://") {
            SourceEndpoint::Local(PathBuf::from(path))
        } else {
            SourceEndpoint::Local(PathBuf::from(raw))
        }
    }
}

impl fmt::Display for SourceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceEndpoint::Remote(url) => f.write_str(url),
            SourceEndpoint::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistFormat {
    ExtendedM3u,
    DelimitedText,
}

impl PlaylistFormat {
    /// Returns `None` when the text looks like neither format.
    pub fn detect(text: &str) -> Option<Self> {
        let text = text.trim_start_matches('\u{feff}');
        if text.starts_with("#EXTM3U") {
            return Some(PlaylistFormat::ExtendedM3u);
        }
        let first = text.lines().map(str::trim).find(|l| !l.is_empty())?;
        if first.contains(',') {
            Some(PlaylistFormat::DelimitedText)
        } else {
            None
        }
    }
}

/// A fetched playlist body, tagged with its detected format.
#[derive(Debug, Clone)]
pub struct RawPlaylist {
    pub endpoint: SourceEndpoint,
    pub format: PlaylistFormat,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCandidate {
    pub name: String,
    pub url: String,
}

/// Channel name -> candidate URLs, in discovery order, with no duplicate
/// `(name, url)` pair.
#[derive(Debug, Default, Clone)]
pub struct CandidateSet {
    channels: Vec<(String, Vec<String>)>,
    index: HashMap<String, usize>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the pair was already present.
    pub fn insert(&mut self, name: &str, url: &str) -> bool {
        match self.index.get(name) {
            Some(&i) => {
                let urls = &mut self.channels[i].1;
                if urls.iter().any(|u| u == url) {
                    return false;
                }
                urls.push(url.to_string());
                true
            }
            None => {
                self.index.insert(name.to_string(), self.channels.len());
                self.channels.push((name.to_string(), vec![url.to_string()]));
                true
            }
        }
    }

    pub fn urls(&self, name: &str) -> Option<&[String]> {
        self.index.get(name).map(|&i| self.channels[i].1.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.channels.iter().map(|(n, u)| (n.as_str(), u.as_slice()))
    }

    /// Flattens into candidates, keeping at most `per_channel` URLs of each channel.
    pub fn candidates(&self, per_channel: usize) -> Vec<ChannelCandidate> {
        self.channels
            .iter()
            .flat_map(|(name, urls)| {
                urls.iter().take(per_channel).map(move |url| ChannelCandidate {
                    name: name.clone(),
                    url: url.clone(),
                })
            })
            .collect()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn candidate_count(&self) -> usize {
        self.channels.iter().map(|(_, u)| u.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// A candidate that passed every probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSource {
    pub name: String,
    pub url: String,
    pub latency: Duration,
    pub resolution_height: Option<u32>,
    /// Position of the candidate in discovery order, used as the latency tie-break.
    pub discovery: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedSource {
    pub url: String,
    #[serde(rename = "latency_ms")]
    pub latency_millis: f64,
}

impl RankedSource {
    pub fn from_validated(source: &ValidatedSource) -> Self {
        Self {
            url: source.url.clone(),
            latency_millis: latency_millis(source.latency),
        }
    }
}

/// Milliseconds rounded to two decimals.
pub fn latency_millis(latency: Duration) -> f64 {
    (latency.as_micros() as f64 / 10.0).round() / 100.0
}

/// Selector output: the best sources of one channel, before categorization.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedChannel {
    pub name: String,
    pub sources: Vec<RankedSource>,
}

/// The unit handed to the playlist writer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelEntry {
    pub name: String,
    pub category: String,
    pub sources: Vec<RankedSource>,
}
