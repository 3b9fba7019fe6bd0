use std::path::Path;

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge, Encoder, Histogram,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    pub static ref FETCH_TOTAL: IntCounterVec = register_int_counter_vec!(
        "iptv_fetch_total",
        "Playlist endpoint fetches by outcome",
        &["outcome"]
    )
    .unwrap();
    pub static ref CANDIDATES_REJECTED: IntCounterVec = register_int_counter_vec!(
        "iptv_candidates_rejected_total",
        "Playlist entries dropped by the parser filters",
        &["reason"]
    )
    .unwrap();
    pub static ref PROBE_TOTAL: IntCounterVec = register_int_counter_vec!(
        "iptv_probe_total",
        "Stream probes by outcome",
        &["outcome"]
    )
    .unwrap();
    pub static ref PROBE_LATENCY: Histogram = register_histogram!(
        "iptv_probe_latency_seconds",
        "Time to first stream bytes for valid sources",
        vec![0.1, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0]
    )
    .unwrap();
    pub static ref CHANNELS_WRITTEN: IntGauge = register_int_gauge!(
        "iptv_channels_written",
        "Channels in the last written playlist"
    )
    .unwrap();
}

pub fn gather_metrics() -> anyhow::Result<String> {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Dumps the registry for a node-exporter textfile collector.
pub async fn write_textfile(path: &Path) -> anyhow::Result<()> {
    let body = gather_metrics()?;
    tokio::fs::write(path, body).await?;
    Ok(())
}
