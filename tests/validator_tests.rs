mod common;

use std::time::Duration;

use iptv_aggregator::channels::ChannelCandidate;
use iptv_aggregator::error::Rejection;
use iptv_aggregator::settings::ValidateConfig;
use iptv_aggregator::validator::StreamValidator;

fn candidate(name: &str, url: String) -> ChannelCandidate {
    ChannelCandidate {
        name: name.to_string(),
        url,
    }
}

fn validator() -> StreamValidator {
    StreamValidator::new(ValidateConfig {
        timeout_secs: 1,
        ..ValidateConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_hd_manifest_is_valid() {
    let base = common::spawn_server(|_| common::stream_routes()).await;
    let c = candidate("湖南卫视", format!("{}/hd/index.m3u8", base));

    let source = validator().probe(&c, 7).await.unwrap();
    assert_eq!(source.name, "湖南卫视");
    assert_eq!(source.resolution_height, Some(720));
    assert_eq!(source.discovery, 7);
    assert!(source.latency.as_secs() < 1);
}

#[tokio::test]
async fn test_low_resolution_rejected() {
    let base = common::spawn_server(|_| common::stream_routes()).await;
    let c = candidate("湖南卫视", format!("{}/sd/index.m3u8", base));

    let err = validator().probe(&c, 0).await.unwrap_err();
    assert!(matches!(err, Rejection::LowResolution { height: 360 }));
}

#[tokio::test]
async fn test_unknown_resolution_accepted() {
    let base = common::spawn_server(|_| common::stream_routes()).await;
    let c = candidate("湖南经视", format!("{}/media/index.m3u8", base));

    let source = validator().probe(&c, 0).await.unwrap();
    assert_eq!(source.resolution_height, None);
}

#[tokio::test]
async fn test_transport_stream_accepted() {
    let base = common::spawn_server(|_| common::stream_routes()).await;
    let c = candidate("湖南都市", format!("{}/live/seg.ts", base));

    let source = validator().probe(&c, 0).await.unwrap();
    assert_eq!(source.resolution_height, None);
}

#[tokio::test]
async fn test_live_transport_stream_accepted_on_first_bytes() {
    let base = common::spawn_server(|_| common::stream_routes()).await;
    let c = candidate("湖南都市", format!("{}/live/channel.ts", base));

    // the body never ends; validation must not wait for it
    let source = validator().probe(&c, 0).await.unwrap();
    assert_eq!(source.resolution_height, None);
    assert!(source.latency < Duration::from_millis(500));
}

#[tokio::test]
async fn test_empty_transport_stream_rejected() {
    let base = common::spawn_server(|_| common::stream_routes()).await;
    let c = candidate("湖南都市", format!("{}/empty/seg.ts", base));

    let err = validator().probe(&c, 0).await.unwrap_err();
    assert!(matches!(err, Rejection::EmptyStream));
}

#[tokio::test]
async fn test_non_stream_body_rejected() {
    let base = common::spawn_server(|_| common::stream_routes()).await;
    let c = candidate("长沙新闻", format!("{}/fake/index.m3u8", base));

    let err = validator().probe(&c, 0).await.unwrap_err();
    assert!(matches!(err, Rejection::UnrecognizedStreamType));
}

#[tokio::test]
async fn test_http_error_rejected() {
    let base = common::spawn_server(|_| common::stream_routes()).await;
    let c = candidate("长沙新闻", format!("{}/gone/index.m3u8", base));

    let err = validator().probe(&c, 0).await.unwrap_err();
    match err {
        Rejection::Status(status) => assert_eq!(status.as_u16(), 404),
        other => panic!("unexpected rejection: {other:?}"),
    }
}

#[tokio::test]
async fn test_redirect_followed() {
    let base = common::spawn_server(|_| common::stream_routes()).await;
    let c = candidate("湖南卫视", format!("{}/moved/index.m3u8", base));

    let source = validator().probe(&c, 0).await.unwrap();
    assert_eq!(source.resolution_height, Some(720));
}

#[tokio::test]
async fn test_timeout_rejected() {
    let base = common::spawn_server(|_| common::stream_routes()).await;
    let c = candidate("湖南卫视", format!("{}/slow/index.m3u8", base));

    let err = validator().probe(&c, 0).await.unwrap_err();
    assert_eq!(err.reason(), "timeout");
}

#[tokio::test]
async fn test_unreachable_host_rejected() {
    // port 9 (discard) is not served on the loopback interface
    let c = candidate("湖南卫视", "http://127.0.0.1:9/hd/index.m3u8".to_string());
    let err = validator().probe(&c, 0).await.unwrap_err();
    assert!(matches!(err, Rejection::Transport(_)));
}

#[tokio::test]
async fn test_validate_all_keeps_discovery_order() {
    let base = common::spawn_server(|_| common::stream_routes()).await;
    let candidates = vec![
        candidate("湖南卫视", format!("{}/sd/index.m3u8", base)),
        candidate("湖南卫视", format!("{}/hd/index.m3u8", base)),
        candidate("湖南都市", format!("{}/gone/index.m3u8", base)),
        candidate("湖南都市", format!("{}/live/seg.ts", base)),
        candidate("湖南经视", format!("{}/media/index.m3u8", base)),
    ];

    let valid = validator().validate_all(candidates).await;
    let found: Vec<(usize, &str)> = valid.iter().map(|s| (s.discovery, s.name.as_str())).collect();
    assert_eq!(found, vec![(1, "湖南卫视"), (3, "湖南都市"), (4, "湖南经视")]);
}

#[tokio::test]
async fn test_validate_all_bounds_probes_in_flight() {
    let in_flight = common::InFlight::default();
    let tracker = in_flight.clone();
    let base = common::spawn_server(move |_| {
        common::tracked_route("/live/seg.ts", "\x47\x40\x00\x10", tracker)
    })
    .await;

    let candidates = (0..6)
        .map(|i| candidate("湖南卫视", format!("{}/live/seg.ts?n={}", base, i)))
        .collect();
    let validator = StreamValidator::new(ValidateConfig {
        timeout_secs: 2,
        concurrency: 2,
        ..ValidateConfig::default()
    })
    .unwrap();

    let valid = validator.validate_all(candidates).await;
    assert_eq!(valid.len(), 6);
    assert_eq!(in_flight.peak(), 2);
}
