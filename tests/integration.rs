//! End-to-end scenarios driving two [`Endpoint`]s over an in-memory duplex
//! pipe, exercising the full call/reply/one-way/timeout/close lifecycle.

use bytes::Bytes;
use muxrpc::{Endpoint, EndpointConfig, RpcError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn pair(config: EndpointConfig) -> ((Endpoint, tokio::task::JoinHandle<RpcError>), (Endpoint, tokio::task::JoinHandle<RpcError>)) {
    let (client_io, server_io) = tokio::io::duplex(256 * 1024);
    let (client, client_driver) = Endpoint::new(client_io, config.clone());
    let (server, server_driver) = Endpoint::new(server_io, config);
    let client_task = tokio::spawn(client_driver.run());
    let server_task = tokio::spawn(server_driver.run());
    ((client, client_task), (server, server_task))
}

#[tokio::test]
async fn call_with_registered_handler_echoes_args() {
    let ((client, _ct), (server, _st)) = pair(EndpointConfig::new());

    server
        .register_call(1, |_seq, args, replier| async move {
            let _ = replier.reply(args).await;
        })
        .unwrap();

    let reply = client.call(1, Bytes::from_static(&[0x01])).await.unwrap();
    assert_eq!(&reply[..], &[0x01]);
}

#[tokio::test]
async fn call_to_unregistered_pid_times_out() {
    let config = EndpointConfig::new().with_call_timeout(Duration::from_millis(100));
    let ((client, _ct), (_server, _st)) = pair(config);

    let result = client.call(99, Bytes::new()).await;
    assert!(matches!(result, Err(RpcError::Timeout)));
}

#[tokio::test]
async fn one_way_notification_is_delivered_without_a_reply() {
    let ((client, _ct), (server, _st)) = pair(EndpointConfig::new());

    let received = Arc::new(AtomicBool::new(false));
    let received_clone = received.clone();
    server
        .register_one_way(2, move |args| {
            let received = received_clone.clone();
            async move {
                assert_eq!(&args[..], &[0x02, 0x03]);
                received.store(true, Ordering::SeqCst);
            }
        })
        .unwrap();

    client.one_way(2, Bytes::from_static(&[0x02, 0x03])).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(received.load(Ordering::SeqCst));
}

#[tokio::test]
async fn concurrent_callers_receive_their_own_replies_without_cross_talk() {
    let ((client, _ct), (server, _st)) = pair(EndpointConfig::new());

    server
        .register_call(1, |_seq, args, replier| async move {
            let _ = replier.reply(args).await;
        })
        .unwrap();

    let client = Arc::new(client);
    let a = {
        let client = client.clone();
        tokio::spawn(async move { client.call(1, Bytes::from_static(b"alpha")).await.unwrap() })
    };
    let b = {
        let client = client.clone();
        tokio::spawn(async move { client.call(1, Bytes::from_static(b"bravo")).await.unwrap() })
    };

    let (reply_a, reply_b) = tokio::try_join!(a, b).unwrap();
    assert_eq!(&reply_a[..], b"alpha");
    assert_eq!(&reply_b[..], b"bravo");
}

#[tokio::test]
async fn slow_handler_past_client_timeout_yields_timeout_and_drops_late_reply() {
    let config = EndpointConfig::new().with_call_timeout(Duration::from_millis(100));
    let ((client, _ct), (server, _st)) = pair(config);

    server
        .register_call(3, |_seq, args, replier| async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            let _ = replier.reply(args).await;
        })
        .unwrap();

    let result = client.call(3, Bytes::from_static(b"slow")).await;
    assert!(matches!(result, Err(RpcError::Timeout)));

    // give the slow handler's late reply time to arrive and be dropped.
    tokio::time::sleep(Duration::from_millis(300)).await;
}

#[tokio::test]
async fn closing_the_endpoint_fails_outstanding_calls_and_new_ones() {
    let config = EndpointConfig::new().with_call_timeout(Duration::from_secs(5));
    let ((client, _ct), (_server, _st)) = pair(config);

    let client = Arc::new(client);
    let outstanding_count = 10;
    let mut handles = Vec::new();
    for i in 0..outstanding_count {
        let client = client.clone();
        handles.push(tokio::spawn(async move { client.call(999, Bytes::from(vec![i as u8])).await }));
    }

    // let the calls land in the pending table before closing.
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.close().await;

    let results = futures_join_all(handles).await;
    for result in results {
        assert!(matches!(result, Err(RpcError::EndpointClosed)));
    }

    let after_close = client.call(1, Bytes::new()).await;
    assert!(matches!(after_close, Err(RpcError::EndpointClosed)));
}

#[tokio::test]
async fn fresh_endpoint_rejects_calls_before_the_driver_runs() {
    let (client_io, _server_io) = tokio::io::duplex(1024);
    let (client, _driver) = Endpoint::new(client_io, EndpointConfig::new());

    let result = client.call(1, Bytes::new()).await;
    assert!(matches!(result, Err(RpcError::NotRunning)));
}

#[tokio::test]
async fn go_handle_observes_the_reply_without_blocking_at_call_time() {
    let ((client, _ct), (server, _st)) = pair(EndpointConfig::new());

    server
        .register_call(1, |_seq, args, replier| async move {
            let _ = replier.reply(args).await;
        })
        .unwrap();

    let handle = client.go(1, Bytes::from_static(b"deferred")).await.unwrap();
    let reply = handle.wait().await.unwrap();
    assert_eq!(&reply[..], b"deferred");
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let ((_client, _ct), (server, _st)) = pair(EndpointConfig::new());
    server.register_call(1, |_seq, _args, _replier| async {}).unwrap();
    let err = server.register_call(1, |_seq, _args, _replier| async {}).unwrap_err();
    assert!(matches!(err, RpcError::RegistrationConflict(1)));
}

#[tokio::test]
async fn default_one_way_handler_catches_unregistered_pids() {
    let ((client, _ct), (server, _st)) = pair(EndpointConfig::new());

    let hits = Arc::new(AtomicUsize::new(0));
    let hits_clone = hits.clone();
    server.set_one_way_default(move |_args| {
        let hits = hits_clone.clone();
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
        }
    });

    client.one_way(12345, Bytes::new()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

async fn futures_join_all(
    handles: Vec<tokio::task::JoinHandle<Result<Bytes, RpcError>>>,
) -> Vec<Result<Bytes, RpcError>> {
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}
