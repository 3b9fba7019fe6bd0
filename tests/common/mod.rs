#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures::stream;
use tokio::net::TcpListener;

pub const HD_MANIFEST: &str =
    "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=2000000,RESOLUTION=1280x720\nhd/index.m3u8\n";
pub const SD_MANIFEST: &str =
    "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=600000,RESOLUTION=640x360\nsd/index.m3u8\n";
pub const MEDIA_PLAYLIST: &str =
    "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:10,\nseg-1.ts\n#EXTINF:10,\nseg-2.ts\n";

/// Binds a server on an ephemeral port and returns its base URL. The
/// router builder receives the base URL so bodies can link back to it.
pub async fn spawn_server<F>(build: F) -> String
where
    F: FnOnce(&str) -> Router,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let app = build(&base);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base
}

/// Tracks how many requests a handler is serving at once.
#[derive(Clone, Default)]
pub struct InFlight {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl InFlight {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn hold(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Serves `body` on `path`, holding each request for 100ms.
pub fn tracked_route(path: &str, body: &'static str, in_flight: InFlight) -> Router {
    Router::new().route(
        path,
        get(move || {
            let in_flight = in_flight.clone();
            async move {
                in_flight.hold().await;
                body
            }
        }),
    )
}

/// An endless transport stream: one burst of packets, then 4 KiB every 250ms.
fn live_ts_body() -> Body {
    let chunks = stream::unfold(0u32, |n| async move {
        let chunk = if n == 0 {
            vec![0x47u8; 188 * 20]
        } else {
            tokio::time::sleep(Duration::from_millis(250)).await;
            vec![0x47u8; 4096]
        };
        Some((Ok::<_, std::io::Error>(Bytes::from(chunk)), n + 1))
    });
    Body::from_stream(chunks)
}

/// Stream endpoints covering every validator outcome.
pub fn stream_routes() -> Router {
    Router::new()
        .route("/hd/index.m3u8", get(|| async { HD_MANIFEST }))
        .route("/sd/index.m3u8", get(|| async { SD_MANIFEST }))
        .route("/media/index.m3u8", get(|| async { MEDIA_PLAYLIST }))
        .route(
            "/live/seg.ts",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "video/mp2t")],
                    vec![0x47u8; 188 * 10],
                )
            }),
        )
        .route(
            "/live/channel.ts",
            get(|| async { ([(header::CONTENT_TYPE, "video/mp2t")], live_ts_body()) }),
        )
        .route("/empty/seg.ts", get(|| async { Vec::<u8>::new() }))
        .route(
            "/fake/index.m3u8",
            get(|| async { "<html><body>channel offline</body></html>" }),
        )
        .route(
            "/gone/index.m3u8",
            get(|| async { (StatusCode::NOT_FOUND, "not found") }),
        )
        .route(
            "/moved/index.m3u8",
            get(|| async { Redirect::temporary("/hd/index.m3u8") }),
        )
        .route(
            "/slow/index.m3u8",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                HD_MANIFEST.into_response()
            }),
        )
}
