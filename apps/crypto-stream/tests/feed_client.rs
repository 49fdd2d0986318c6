//! Feed Client Integration Tests
//!
//! Runs the feed client against a local WebSocket server standing in for the
//! exchange, with the in-memory broker as the queue.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};
use tokio_util::sync::CancellationToken;

use common::{Broker, snapshot};
use crypto_stream::infrastructure::upbit::HeartbeatConfig;
use crypto_stream::{ConnectionSupervisor, FeedClient, FeedClientConfig, FeedState, RetryConfig};

const QUEUE: &str = "upbit_q1";

fn client_config(url: String) -> FeedClientConfig {
    FeedClientConfig {
        url,
        queue: QUEUE.to_string(),
        codes: vec!["KRW-BTC.1".to_string(), "KRW-ETH.1".to_string()],
        reconnect: RetryConfig::fixed(Duration::from_millis(100)),
        heartbeat: HeartbeatConfig::default(),
        connect_timeout: Duration::from_secs(2),
    }
}

async fn next_subscription(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("expected subscription, got {other:?}"),
        }
    }
}

async fn drain(ws: &mut WebSocketStream<TcpStream>) {
    while let Some(Ok(_)) = ws.next().await {}
}

#[tokio::test]
async fn test_frames_are_queued_and_subscription_resent_on_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let btc = snapshot("KRW-BTC", 1_700_000_000_123, "50000000", "50010000");
    let eth = snapshot("KRW-ETH", 1_700_000_000_456, "3000000", "3001000");

    let (sub_tx, mut sub_rx) = mpsc::unbounded_channel::<Value>();
    let (btc_frame, eth_frame) = (btc.clone(), eth.clone());
    let server = tokio::spawn(async move {
        // First session: two snapshots, a status and an error, then close.
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        sub_tx.send(next_subscription(&mut ws).await).unwrap();

        ws.send(Message::Binary(btc_frame.into_bytes().into()))
            .await
            .unwrap();
        ws.send(Message::Text(r#"{"status":"UP"}"#.into()))
            .await
            .unwrap();
        ws.send(Message::Text(
            r#"{"error":{"name":"INVALID_CODE","message":"unknown code"}}"#.into(),
        ))
        .await
        .unwrap();
        ws.send(Message::Text(eth_frame.into())).await.unwrap();
        ws.close(None).await.unwrap();
        drain(&mut ws).await;

        // Second session: only the subscription is expected.
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        sub_tx.send(next_subscription(&mut ws).await).unwrap();
        drain(&mut ws).await;
    });

    let broker = Broker::new();
    let cancel = CancellationToken::new();
    let client = FeedClient::new(
        client_config(format!("ws://{addr}")),
        broker.queue_connector(),
        ConnectionSupervisor::new(RetryConfig::fixed(Duration::from_millis(100)), cancel.clone()),
    );

    let driver = async {
        let first = sub_rx.recv().await.unwrap();
        let second = sub_rx.recv().await.unwrap();
        while broker.queued(QUEUE).len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        (first, second)
    };

    let (stats, (first, second)) = timeout(Duration::from_secs(10), async {
        tokio::join!(client.run(), driver)
    })
    .await
    .unwrap();

    for subscription in [&first, &second] {
        assert_eq!(subscription[1]["type"], "orderbook");
        assert_eq!(
            subscription[1]["codes"],
            serde_json::json!(["KRW-BTC.1", "KRW-ETH.1"])
        );
        assert_eq!(subscription[1]["isOnlyRealtime"], true);
        assert_eq!(subscription[2]["format"], "SIMPLE");
    }
    assert_ne!(first[0]["ticket"], second[0]["ticket"]);

    assert_eq!(broker.queued(QUEUE), vec![btc, eth]);
    assert_eq!(stats.frames, 4);
    assert_eq!(stats.pushed, 2);
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.reconnects, 1);
    assert_eq!(client.state(), FeedState::Disconnected);

    timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_run_returns_immediately_when_cancelled() {
    let broker = Broker::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let client = FeedClient::new(
        client_config("ws://127.0.0.1:9".to_string()),
        broker.queue_connector(),
        ConnectionSupervisor::new(RetryConfig::fixed(Duration::from_millis(100)), cancel),
    );

    let stats = timeout(Duration::from_secs(1), client.run()).await.unwrap();

    assert_eq!(stats.frames, 0);
    assert_eq!(broker.queue_connects(), 0);
    assert_eq!(client.state(), FeedState::Disconnected);
}

#[tokio::test]
async fn test_unreachable_feed_keeps_retrying_until_cancelled() {
    // Bind then drop to get a port nothing listens on.
    let addr = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();

    let broker = Broker::new();
    let cancel = CancellationToken::new();
    let client = FeedClient::new(
        client_config(format!("ws://{addr}")),
        broker.queue_connector(),
        ConnectionSupervisor::new(RetryConfig::fixed(Duration::from_millis(100)), cancel.clone()),
    );

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(350)).await;
        canceller.cancel();
    });

    let stats = timeout(Duration::from_secs(5), client.run()).await.unwrap();

    assert_eq!(stats.frames, 0);
    assert_eq!(stats.reconnects, 0);
    assert_eq!(broker.queue_connects(), 1);
    assert_eq!(client.state(), FeedState::Disconnected);
}

#[tokio::test]
async fn test_entry_dropped_while_queue_down_and_pushing_resumes_after_reacquire() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let a = snapshot("KRW-BTC", 1_700_000_000_001, "50000000", "50010000");
    let b = snapshot("KRW-BTC", 1_700_000_000_002, "50000100", "50010100");
    let c = snapshot("KRW-BTC", 1_700_000_000_003, "50000200", "50010200");

    let (go_tx, mut go_rx) = mpsc::unbounded_channel::<()>();
    let frames = [a.clone(), b, c.clone()];
    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        next_subscription(&mut ws).await;

        for (i, frame) in frames.into_iter().enumerate() {
            if i > 0 {
                go_rx.recv().await.unwrap();
            }
            ws.send(Message::Text(frame.into())).await.unwrap();
        }
        drain(&mut ws).await;
    });

    let broker = Broker::new();
    let cancel = CancellationToken::new();
    let client = FeedClient::new(
        client_config(format!("ws://{addr}")),
        broker.queue_connector(),
        ConnectionSupervisor::new(RetryConfig::fixed(Duration::from_millis(50)), cancel.clone()),
    );

    let driver = async {
        while broker.queued(QUEUE).is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        broker.set_queue_down(true);
        go_tx.send(()).unwrap();

        while broker.queue_connect_failures() < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        broker.set_queue_down(false);
        go_tx.send(()).unwrap();

        while broker.queued(QUEUE).len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
    };

    let (stats, ()) = timeout(Duration::from_secs(10), async {
        tokio::join!(client.run(), driver)
    })
    .await
    .unwrap();

    assert_eq!(broker.queued(QUEUE), vec![a, c]);
    assert_eq!(stats.frames, 3);
    assert_eq!(stats.pushed, 2);
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.reconnects, 0);
    assert_eq!(broker.queue_connects(), 2);

    timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
}

/// Accepts TCP connections and never answers the WebSocket upgrade.
async fn silent_server() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let accepts = Arc::new(AtomicUsize::new(0));
    let counter = accepts.clone();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((tcp, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            held.push(tcp);
        }
    });
    (url, accepts)
}

#[tokio::test]
async fn test_stalled_handshake_times_out_and_retries() {
    let (url, accepts) = silent_server().await;

    let broker = Broker::new();
    let cancel = CancellationToken::new();
    let mut config = client_config(url);
    config.connect_timeout = Duration::from_millis(200);
    let client = FeedClient::new(
        config,
        broker.queue_connector(),
        ConnectionSupervisor::new(RetryConfig::fixed(Duration::from_millis(100)), cancel.clone()),
    );

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    let stats = timeout(Duration::from_secs(5), client.run()).await.unwrap();

    assert!(accepts.load(Ordering::SeqCst) >= 2);
    assert_eq!(stats.frames, 0);
    assert_eq!(stats.reconnects, 0);
    assert_eq!(client.state(), FeedState::Disconnected);
}

#[tokio::test]
async fn test_cancel_interrupts_pending_handshake() {
    let (url, accepts) = silent_server().await;

    let broker = Broker::new();
    let cancel = CancellationToken::new();
    let mut config = client_config(url);
    config.connect_timeout = Duration::from_secs(60);
    let client = FeedClient::new(
        config,
        broker.queue_connector(),
        ConnectionSupervisor::new(RetryConfig::fixed(Duration::from_millis(100)), cancel.clone()),
    );

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        canceller.cancel();
    });

    let stats = timeout(Duration::from_secs(2), client.run()).await.unwrap();

    assert_eq!(accepts.load(Ordering::SeqCst), 1);
    assert_eq!(stats.frames, 0);
    assert_eq!(client.state(), FeedState::Disconnected);
}
