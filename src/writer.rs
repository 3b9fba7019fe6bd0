use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::channels::ChannelEntry;
use crate::error::WriteError;
use crate::settings::OutputConfig;

/// What ended up on disk.
#[derive(Debug, Clone, Serialize)]
pub struct WriteReport {
    pub path: PathBuf,
    pub bytes: u64,
    pub total_lines: usize,
    /// `(total_lines - 1) / 3`, the count players derive from the
    /// three-lines-per-source layout.
    pub derived_channel_count: usize,
    pub channels: usize,
    pub sources: usize,
}

pub struct PlaylistWriter {
    config: OutputConfig,
}

impl PlaylistWriter {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Renders categories in `category_order`, channels by name within a
    /// category, and sources in the order given.
    pub fn render(&self, entries: &[ChannelEntry], category_order: &[&str]) -> String {
        let mut out = String::new();
        match &self.config.epg_url {
            Some(epg) => out.push_str(&format!(
                "#EXTM3U x-tvg-url=\"{}\",charset=\"utf-8\"\n",
                epg
            )),
            None => out.push_str("#EXTM3U charset=\"utf-8\"\n"),
        }
        out.push('\n');

        let mut by_category: BTreeMap<&str, Vec<&ChannelEntry>> = BTreeMap::new();
        for entry in entries {
            by_category.entry(entry.category.as_str()).or_default().push(entry);
        }

        for category in category_order {
            let Some(channels) = by_category.get_mut(category) else {
                continue;
            };
            channels.sort_by(|a, b| a.name.cmp(&b.name));

            out.push_str(&format!("#EXTGRP:{}\n", category));
            for channel in channels.iter() {
                for source in &channel.sources {
                    out.push_str(&format!(
                        "#EXTINF:-1 tvg-id=\"{name}\" tvg-logo=\"{logo}\" group-title=\"{category}\",{name}\n{url}\n\n",
                        name = channel.name,
                        logo = self.config.logo_url,
                        category = category,
                        url = source.url,
                    ));
                }
            }
        }
        out
    }

    /// Writes through a temporary sibling file so an existing playlist is
    /// only replaced by a complete one.
    pub async fn write(
        &self,
        entries: &[ChannelEntry],
        category_order: &[&str],
    ) -> Result<WriteReport, WriteError> {
        let path = self.config.path.clone();
        let io_err = |source| WriteError::Io {
            path: path.clone(),
            source,
        };

        let body = self.render(entries, category_order);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let tmp = temp_path(&path);
        tokio::fs::write(&tmp, body.as_bytes()).await.map_err(io_err)?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(e));
        }

        let bytes = tokio::fs::metadata(&path).await.map_err(io_err)?.len();
        let total_lines = body.lines().count();
        let report = WriteReport {
            path: path.clone(),
            bytes,
            total_lines,
            derived_channel_count: total_lines.saturating_sub(1) / 3,
            channels: entries.len(),
            sources: entries.iter().map(|e| e.sources.len()).sum(),
        };
        info!(
            "Wrote {} ({:.2} KiB): {} channels, {} sources",
            report.path.display(),
            report.bytes as f64 / 1024.0,
            report.derived_channel_count,
            report.sources
        );
        Ok(report)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "playlist".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}
