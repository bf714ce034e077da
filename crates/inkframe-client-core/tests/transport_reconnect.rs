//! Transport behavior against a local WebSocket server: connection flag
//! tracking, fixed-backoff recovery, terminal teardown, frame dispatch.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use futures_util::StreamExt;
use inkframe_client_core::api::ApiClient;
use inkframe_client_core::{
    ConnectionFlag, InboundMessage, MessageRouter, PromptStore, TransportClient, TransportConfig,
    TransportState,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

const BACKOFF: Duration = Duration::from_millis(100);

fn wiring() -> Result<(Arc<PromptStore>, Arc<MessageRouter>, Arc<ConnectionFlag>)> {
    let api = Arc::new(ApiClient::from_base_url("http://127.0.0.1:9")?);
    let prompts = Arc::new(PromptStore::new(api, 3));
    let router = Arc::new(MessageRouter::new(Arc::clone(&prompts)));
    let connection = Arc::new(ConnectionFlag::default());
    Ok((prompts, router, connection))
}

fn transport(
    addr: SocketAddr,
    router: Arc<MessageRouter>,
    connection: Arc<ConnectionFlag>,
) -> Result<Arc<TransportClient>> {
    let config = TransportConfig {
        url: format!("ws://{addr}/api/v1/ws"),
        reconnect_delay: BACKOFF,
        connect_timeout: Duration::from_secs(5),
    };
    Ok(Arc::new(TransportClient::new(config, router, connection)?))
}

/// Poll a predicate for up to two seconds.
async fn wait_until<F: Fn() -> bool>(predicate: F) -> bool {
    for _ in 0..200 {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn close_schedules_exactly_one_reconnect_and_flag_follows() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let accepts = Arc::new(AtomicUsize::new(0));

    let server_accepts = Arc::clone(&accepts);
    tokio::spawn(async move {
        // first connection is closed server-side right after the handshake
        if let Ok((stream, _)) = listener.accept().await {
            server_accepts.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                let _ = ws.close(None).await;
            }
        }
        // every later connection is held open
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            server_accepts.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                tokio::spawn(async move { while ws.next().await.is_some() {} });
            }
        }
    });

    let (_prompts, router, connection) = wiring()?;
    let client = transport(addr, router, Arc::clone(&connection))?;
    client.connect();

    assert!(wait_until(|| accepts.load(Ordering::SeqCst) == 1).await);
    // after the server-side close, one reconnect lands after the fixed delay
    assert!(
        wait_until(|| connection.is_connected() && accepts.load(Ordering::SeqCst) == 2).await,
        "expected reconnect to re-establish the connection"
    );
    assert_eq!(client.state(), TransportState::Connected);

    // no further reconnects while the second connection stays up
    tokio::time::sleep(BACKOFF * 3).await;
    assert_eq!(accepts.load(Ordering::SeqCst), 2);

    client.disconnect().await;
    Ok(())
}

#[tokio::test]
async fn connect_is_idempotent_while_connected() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let accepts = Arc::new(AtomicUsize::new(0));

    let server_accepts = Arc::clone(&accepts);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            server_accepts.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                tokio::spawn(async move { while ws.next().await.is_some() {} });
            }
        }
    });

    let (_prompts, router, connection) = wiring()?;
    let client = transport(addr, router, Arc::clone(&connection))?;
    client.connect();
    assert!(wait_until(|| connection.is_connected()).await);

    client.connect();
    client.connect();
    tokio::time::sleep(BACKOFF * 2).await;
    assert_eq!(accepts.load(Ordering::SeqCst), 1);

    client.disconnect().await;
    Ok(())
}

#[tokio::test]
async fn disconnect_is_terminal_and_suppresses_reconnects() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let accepts = Arc::new(AtomicUsize::new(0));

    let server_accepts = Arc::clone(&accepts);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            server_accepts.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                tokio::spawn(async move { while ws.next().await.is_some() {} });
            }
        }
    });

    let (_prompts, router, connection) = wiring()?;
    let client = transport(addr, router, Arc::clone(&connection))?;
    client.connect();
    assert!(wait_until(|| connection.is_connected()).await);

    client.disconnect().await;
    assert_eq!(client.state(), TransportState::Destroyed);
    assert!(!connection.is_connected());

    // no reconnect is ever scheduled again, and connect() stays a no-op
    client.connect();
    client.send(&serde_json::json!({"type": "ping"})).await;
    tokio::time::sleep(BACKOFF * 4).await;
    assert_eq!(accepts.load(Ordering::SeqCst), 1);
    assert_eq!(client.state(), TransportState::Destroyed);
    Ok(())
}

#[tokio::test]
async fn inbound_frames_dispatch_and_malformed_frames_are_dropped() -> Result<()> {
    use futures_util::SinkExt;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
            return;
        };
        let frames = [
            "not json at all",
            r#"{"type":"prompt_update","prompt":"sunset over hills"}"#,
            r#"{"type":"scheduler_update","data":{"enabled":true}}"#,
        ];
        for frame in frames {
            if ws.send(Message::Text(frame.to_string())).await.is_err() {
                return;
            }
        }
        while ws.next().await.is_some() {}
    });

    let (prompts, router, connection) = wiring()?;
    let kinds: Arc<std::sync::Mutex<Vec<String>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&kinds);
    router.register(Arc::new(move |message: &InboundMessage| {
        if let Ok(mut seen) = sink.lock() {
            seen.push(message.kind.clone());
        }
    }));

    let client = transport(addr, router, connection)?;
    client.connect();

    assert!(wait_until(|| prompts.prompt() == "sunset over hills").await);
    assert!(prompts.history().is_empty());
    assert!(
        wait_until(|| {
            kinds
                .lock()
                .map(|seen| *seen == ["prompt_update", "scheduler_update"])
                .unwrap_or(false)
        })
        .await,
        "listeners see recognized and unrecognized frames in delivery order"
    );

    client.disconnect().await;
    Ok(())
}

#[tokio::test]
async fn send_reaches_the_server_while_connected() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
            return;
        };
        while let Some(Ok(frame)) = ws.next().await {
            if let Message::Text(text) = frame {
                if frame_tx.send(text).is_err() {
                    return;
                }
            }
        }
    });

    let (_prompts, router, connection) = wiring()?;
    let client = transport(addr, router, Arc::clone(&connection))?;
    client.connect();
    assert!(wait_until(|| connection.is_connected()).await);

    client
        .send(&serde_json::json!({"type": "hello", "data": {"n": 1}}))
        .await;

    let received = tokio::time::timeout(Duration::from_secs(2), frame_rx.recv()).await?;
    let received = received.ok_or_else(|| anyhow::anyhow!("server saw no frame"))?;
    let value: serde_json::Value = serde_json::from_str(&received)?;
    assert_eq!(value["type"], "hello");
    assert_eq!(value["data"]["n"], 1);

    client.disconnect().await;
    Ok(())
}
