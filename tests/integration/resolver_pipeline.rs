//! Integration tests for the frame resolution pipeline
//!
//! Tests cover:
//! - End-to-end GET with a proxied image
//! - Transaction payload short-circuit
//! - Terminal failures (fetch, classification, parsing)
//! - Image-stage degradation (probe rejection, render failure)
//! - Rendering fallback and index reuse

use super::test_utils::*;
use frameproxy::error::FrameError;
use frameproxy::{FrameMethod, FrameResult};
use httpmock::prelude::*;
use httpmock::Method::HEAD;
use serde_json::json;
use std::sync::Arc;

const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake image bytes";

fn interaction_payload() -> serde_json::Value {
    json!({"untrustedData": {"fid": 2, "url": "https://frames.example.com", "buttonIndex": 1}})
}

#[tokio::test]
async fn test_get_frame_with_image_end_to_end() {
    let server = MockServer::start_async().await;
    let img = image_url(&server, "/img/frame.png");
    let html = frame_with_image(&img);

    server
        .mock_async(|when, then| {
            when.method(GET).path("/frame");
            then.status(200)
                .header("content-type", "text/html")
                .body(html.clone());
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(HEAD).path("/img/frame.png");
            then.status(200).header("content-type", "image/png");
        })
        .await;
    let image_get = server
        .mock_async(|when, then| {
            when.method(GET).path("/img/frame.png");
            then.status(200)
                .header("content-type", "image/png")
                .body(PNG_BYTES);
        })
        .await;

    let test = TestProxy::start(&server);
    let target = frame_url(&server, "/frame");

    let first = test.proxy.resolve_queued(&target).await.unwrap();
    let FrameResult::FrameDocument {
        html: body,
        image_url: Some(first_url),
    } = first
    else {
        panic!("expected frame document with image, got {:?}", first);
    };
    assert_eq!(body, html);
    assert!(first_url.starts_with(&format!("{}/public/", BASE_URL)));
    assert!(first_url.ends_with(".png"));
    assert_eq!(std::fs::read(test.ephemeral_path(&first_url)).unwrap(), PNG_BYTES);

    // Same target again: fresh id, distinct file, identical bytes
    let second = test.proxy.resolve_queued(&target).await.unwrap();
    let FrameResult::FrameDocument {
        image_url: Some(second_url),
        ..
    } = second
    else {
        panic!("expected frame document with image, got {:?}", second);
    };
    assert_ne!(first_url, second_url);
    assert_eq!(std::fs::read(test.ephemeral_path(&second_url)).unwrap(), PNG_BYTES);
    image_get.assert_hits_async(2).await;

    // GET frames are also written to the index tier
    let index_entry = test
        .temp_dir
        .path()
        .join("index")
        .join(format!("{}.png", frameproxy::media::id::sanitize_source_url(&target)));
    assert_eq!(std::fs::read(index_entry).unwrap(), PNG_BYTES);
}

#[tokio::test]
async fn test_transaction_payload_skips_image_hosts() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/tx");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(transaction_json());
        })
        .await;

    let images = Arc::new(CountingImageSource::accepting("image/png", PNG_BYTES));
    let renderer = Arc::new(StaticRenderer::new(Some(PNG_BYTES)));
    let test = TestProxy::start_with(
        &server,
        |b| b.image_source(images.clone()).renderer(renderer.clone()),
        |_| {},
    );

    let result = test
        .proxy
        .resolve_sync(
            &frame_url(&server, "/tx"),
            FrameMethod::Post,
            Some(interaction_payload()),
        )
        .await;

    match result {
        FrameResult::TransactionPayload { data } => assert_eq!(data, transaction_json()),
        other => panic!("expected transaction payload, got {:?}", other),
    }
    assert_eq!(images.probes(), 0);
    assert_eq!(images.fetches(), 0);
    assert_eq!(renderer.calls(), 0);
}

#[tokio::test]
async fn test_post_sends_payload_and_returns_frame() {
    let server = MockServer::start_async().await;
    let img = image_url(&server, "/next.gif");
    let action = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/action")
                .json_body(interaction_payload());
            then.status(200).body(frame_with_image(&img));
        })
        .await;

    let images = Arc::new(CountingImageSource::accepting("image/gif", b"GIF89a"));
    let test = TestProxy::start_with(&server, |b| b.image_source(images.clone()), |_| {});

    let result = test
        .proxy
        .resolve_sync(
            &frame_url(&server, "/action"),
            FrameMethod::Post,
            Some(interaction_payload()),
        )
        .await;

    action.assert_async().await;
    let FrameResult::FrameDocument {
        image_url: Some(url),
        ..
    } = result
    else {
        panic!("expected frame document with image, got {:?}", result);
    };
    assert!(url.ends_with(".gif"));

    // POST frames are never indexed
    assert_eq!(
        std::fs::read_dir(test.temp_dir.path().join("index"))
            .unwrap()
            .count(),
        0
    );
}

#[tokio::test]
async fn test_oversized_probe_never_fetches() {
    let server = MockServer::start_async().await;
    let img = image_url(&server, "/huge.png");
    server
        .mock_async(|when, then| {
            when.method(GET).path("/frame");
            then.status(200).body(frame_with_image(&img));
        })
        .await;

    let images = Arc::new(CountingImageSource::rejecting("Image is too large"));
    let renderer = Arc::new(StaticRenderer::new(Some(PNG_BYTES)));
    let test = TestProxy::start_with(
        &server,
        |b| b.image_source(images.clone()).renderer(renderer.clone()),
        |_| {},
    );

    let result = test
        .proxy
        .resolve_queued(&frame_url(&server, "/frame"))
        .await
        .unwrap();

    assert!(matches!(
        result,
        FrameResult::FrameDocument {
            image_url: None,
            ..
        }
    ));
    assert_eq!(images.probes(), 1);
    assert_eq!(images.fetches(), 0);
    // A rejected candidate is not a missing image; the renderer is not consulted
    assert_eq!(renderer.calls(), 0);
}

#[tokio::test]
async fn test_oversized_image_over_http_degrades_to_no_image() {
    let server = MockServer::start_async().await;
    let img = image_url(&server, "/big.png");
    server
        .mock_async(|when, then| {
            when.method(GET).path("/frame");
            then.status(200).body(frame_with_image(&img));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(HEAD).path("/big.png");
            then.status(200)
                .header("content-type", "image/png")
                .header("content-length", "256");
        })
        .await;
    let image_get = server
        .mock_async(|when, then| {
            when.method(GET).path("/big.png");
            then.status(200)
                .header("content-type", "image/png")
                .body(vec![0u8; 256]);
        })
        .await;

    let test = TestProxy::start_with(&server, |b| b, |c| c.fetch.max_image_bytes = 64);
    let result = test
        .proxy
        .resolve_queued(&frame_url(&server, "/frame"))
        .await
        .unwrap();

    assert!(matches!(
        result,
        FrameResult::FrameDocument {
            image_url: None,
            ..
        }
    ));
    // Rejected at the probe, so the body is never requested
    image_get.assert_hits_async(0).await;
    assert_eq!(
        std::fs::read_dir(test.temp_dir.path().join("public"))
            .unwrap()
            .count(),
        0
    );
}

#[tokio::test]
async fn test_disallowed_image_type_degrades_to_no_image() {
    let server = MockServer::start_async().await;
    let img = image_url(&server, "/fake.png");
    server
        .mock_async(|when, then| {
            when.method(GET).path("/frame");
            then.status(200).body(frame_with_image(&img));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(HEAD).path("/fake.png");
            then.status(200).header("content-type", "text/html");
        })
        .await;
    let image_get = server
        .mock_async(|when, then| {
            when.method(GET).path("/fake.png");
            then.status(200).body("<html></html>");
        })
        .await;

    let test = TestProxy::start(&server);
    let result = test
        .proxy
        .resolve_queued(&frame_url(&server, "/frame"))
        .await
        .unwrap();

    assert!(matches!(
        result,
        FrameResult::FrameDocument {
            image_url: None,
            ..
        }
    ));
    image_get.assert_hits_async(0).await;
}

#[tokio::test]
async fn test_non_success_status_fails_job() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/down");
            then.status(500);
        })
        .await;

    let test = TestProxy::start(&server);
    let result = test
        .proxy
        .resolve_queued(&frame_url(&server, "/down"))
        .await
        .unwrap();

    assert!(matches!(
        result,
        FrameResult::Failure {
            reason: FrameError::RemoteFetch(_)
        }
    ));
}

#[tokio::test]
async fn test_unrecognized_json_fails_job() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/json");
            then.status(200).json_body(json!({"hello": "world"}));
        })
        .await;

    let test = TestProxy::start(&server);
    let result = test
        .proxy
        .resolve_queued(&frame_url(&server, "/json"))
        .await
        .unwrap();

    assert!(matches!(
        result,
        FrameResult::Failure {
            reason: FrameError::UnrecognizedContent(_)
        }
    ));
}

#[tokio::test]
async fn test_body_without_head_fails_job() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/text");
            then.status(200).body("plain text, not a frame");
        })
        .await;

    let test = TestProxy::start(&server);
    let result = test
        .proxy
        .resolve_queued(&frame_url(&server, "/text"))
        .await
        .unwrap();

    assert!(matches!(
        result,
        FrameResult::Failure {
            reason: FrameError::InvalidFrameContent(_)
        }
    ));
}

#[tokio::test]
async fn test_invalid_payload_rejected_before_fetch() {
    let server = MockServer::start_async().await;
    let action = server
        .mock_async(|when, then| {
            when.method(POST).path("/action");
            then.status(200).body(frame_html(""));
        })
        .await;

    let test = TestProxy::start(&server);
    let result = test
        .proxy
        .resolve_sync(
            &frame_url(&server, "/action"),
            FrameMethod::Post,
            Some(json!({"untrustedData": {"fid": 1}})),
        )
        .await;

    assert!(matches!(
        result,
        FrameResult::Failure {
            reason: FrameError::InvalidInput(_)
        }
    ));
    action.assert_hits_async(0).await;
}

#[tokio::test]
async fn test_get_without_image_uses_render_fallback() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/plain");
            then.status(200).body(frame_html("<title>no image</title>"));
        })
        .await;

    let renderer = Arc::new(StaticRenderer::new(Some(PNG_BYTES)));
    let test = TestProxy::start_with(&server, |b| b.renderer(renderer.clone()), |_| {});
    let target = frame_url(&server, "/plain");

    let result = test.proxy.resolve_queued(&target).await.unwrap();
    let FrameResult::FrameDocument {
        image_url: Some(url),
        ..
    } = result
    else {
        panic!("expected rendered image, got {:?}", result);
    };
    assert!(url.ends_with(".png"));
    assert_eq!(renderer.calls(), 1);
    assert_eq!(std::fs::read(test.ephemeral_path(&url)).unwrap(), PNG_BYTES);

    let indexed = test.proxy.cache().indexed_url(&target, "image/png").await;
    assert!(indexed.is_some());
    assert_eq!(
        std::fs::read(test.index_path(&indexed.unwrap())).unwrap(),
        PNG_BYTES
    );
}

#[tokio::test]
async fn test_render_failure_degrades_to_no_image() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/plain");
            then.status(200).body(frame_html(""));
        })
        .await;

    let renderer = Arc::new(StaticRenderer::new(None));
    let test = TestProxy::start_with(&server, |b| b.renderer(renderer.clone()), |_| {});

    let result = test
        .proxy
        .resolve_queued(&frame_url(&server, "/plain"))
        .await
        .unwrap();
    assert!(matches!(
        result,
        FrameResult::FrameDocument {
            image_url: None,
            ..
        }
    ));
    assert_eq!(renderer.calls(), 1);
}

#[tokio::test]
async fn test_post_without_image_skips_render() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/plain");
            then.status(200).body(frame_html(""));
        })
        .await;

    let renderer = Arc::new(StaticRenderer::new(Some(PNG_BYTES)));
    let test = TestProxy::start_with(&server, |b| b.renderer(renderer.clone()), |_| {});

    let result = test
        .proxy
        .resolve_sync(
            &frame_url(&server, "/plain"),
            FrameMethod::Post,
            Some(interaction_payload()),
        )
        .await;
    assert!(matches!(
        result,
        FrameResult::FrameDocument {
            image_url: None,
            ..
        }
    ));
    assert_eq!(renderer.calls(), 0);
}

#[tokio::test]
async fn test_reuse_index_skips_second_render() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/plain");
            then.status(200).body(frame_html(""));
        })
        .await;

    let renderer = Arc::new(StaticRenderer::new(Some(PNG_BYTES)));
    let test = TestProxy::start_with(
        &server,
        |b| b.renderer(renderer.clone()),
        |c| c.render.reuse_index = true,
    );
    let target = frame_url(&server, "/plain");

    let first = test.proxy.resolve_queued(&target).await.unwrap();
    let second = test.proxy.resolve_queued(&target).await.unwrap();

    assert_eq!(renderer.calls(), 1);
    let FrameResult::FrameDocument {
        image_url: Some(first_url),
        ..
    } = first
    else {
        panic!("expected rendered image, got {:?}", first);
    };
    let FrameResult::FrameDocument {
        image_url: Some(second_url),
        ..
    } = second
    else {
        panic!("expected reused image, got {:?}", second);
    };
    assert!(first_url.contains("/public/"));
    assert!(second_url.starts_with(&format!("{}/index/", BASE_URL)));
}
