//! Integration tests for queued resolution ordering

use super::test_utils::*;
use frameproxy::error::FrameError;
use frameproxy::{FrameMethod, FrameResult, Nonce};
use httpmock::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_jobs_complete_in_submission_order() {
    let server = MockServer::start_async().await;
    // Earlier jobs are slower; a concurrent worker would finish them last
    for (path, delay_ms) in [("/a", 300), ("/b", 150), ("/c", 0)] {
        server
            .mock_async(|when, then| {
                when.method(GET).path(path);
                then.status(200)
                    .delay(Duration::from_millis(delay_ms))
                    .body(frame_html(&format!("<title>{}</title>", path)));
            })
            .await;
    }

    let test = TestProxy::start(&server);
    let completed = Arc::new(Mutex::new(Vec::new()));
    let mut waiters = Vec::new();

    for label in ["a", "b", "c"] {
        let nonce = test
            .proxy
            .submit(&frame_url(&server, &format!("/{}", label)), FrameMethod::Get)
            .await
            .unwrap();
        let proxy = Arc::clone(&test.proxy);
        let completed = Arc::clone(&completed);
        waiters.push(tokio::spawn(async move {
            let result = proxy.await_result(nonce).await.unwrap();
            completed.lock().await.push(label);
            result
        }));
    }

    for waiter in waiters {
        let result = waiter.await.unwrap();
        assert!(matches!(result, FrameResult::FrameDocument { .. }));
    }

    assert_eq!(*completed.lock().await, vec!["a", "b", "c"]);

    let stats = test.proxy.queue_stats();
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn test_each_nonce_gets_its_own_result() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/ok");
            then.status(200).body(frame_html("<title>ok</title>"));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/broken");
            then.status(502);
        })
        .await;

    let test = TestProxy::start(&server);
    let ok = test
        .proxy
        .submit(&frame_url(&server, "/ok"), FrameMethod::Get)
        .await
        .unwrap();
    let broken = test
        .proxy
        .submit(&frame_url(&server, "/broken"), FrameMethod::Get)
        .await
        .unwrap();
    assert_ne!(ok, broken);

    // Awaiting out of order still pairs each nonce with its own job
    let broken_result = test.proxy.await_result(broken).await.unwrap();
    let ok_result = test.proxy.await_result(ok).await.unwrap();

    assert!(matches!(
        broken_result,
        FrameResult::Failure {
            reason: FrameError::RemoteFetch(_)
        }
    ));
    assert!(matches!(ok_result, FrameResult::FrameDocument { .. }));
}

#[tokio::test]
async fn test_unknown_nonce_is_rejected() {
    let server = MockServer::start_async().await;
    let test = TestProxy::start(&server);

    let result = test.proxy.await_result(Nonce::new()).await;
    assert!(matches!(result, Err(FrameError::UnknownJob(_))));
}

#[tokio::test]
async fn test_result_can_only_be_claimed_once() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/once");
            then.status(200).body(frame_html(""));
        })
        .await;

    let test = TestProxy::start(&server);
    let nonce = test
        .proxy
        .submit(&frame_url(&server, "/once"), FrameMethod::Get)
        .await
        .unwrap();

    assert!(test.proxy.await_result(nonce).await.is_ok());
    assert!(matches!(
        test.proxy.await_result(nonce).await,
        Err(FrameError::UnknownJob(_))
    ));
}
