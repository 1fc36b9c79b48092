use chrono::Utc;
use neuropasso_broadcaster::{
    BroadcastHub, BroadcasterError, ConnectionRegistry, PushMessage, ViewerOptions, ViewerServer,
};
use neuropasso_telemetry::DeviceReading;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::TcpStream;
use tokio_test::assert_ok;

async fn start_server() -> (ViewerServer, BroadcastHub, std::net::SocketAddr) {
    let registry = ConnectionRegistry::new();
    let server = ViewerServer::new("127.0.0.1:0", registry.clone(), ViewerOptions::default());
    let addr = server.start().await.unwrap();
    (server, BroadcastHub::new(registry), addr)
}

async fn wait_for_viewers(server: &ViewerServer, expected: usize) {
    for _ in 0..100 {
        if server.viewer_count().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!(
        "expected {} viewers, still have {}",
        expected,
        server.viewer_count().await
    );
}

async fn read_message(reader: &mut BufReader<TcpStream>) -> PushMessage {
    let mut line = String::new();
    let n = tokio::time::timeout(Duration::from_secs(2), reader.read_line(&mut line))
        .await
        .expect("timed out waiting for update")
        .unwrap();
    assert!(n > 0, "viewer stream closed");
    serde_json::from_str(line.trim()).unwrap()
}

#[tokio::test]
async fn test_server_lifecycle() {
    let (server, _hub, addr) = start_server().await;
    assert_eq!(server.local_addr().await, Some(addr));

    assert!(matches!(server.start().await, Err(BroadcasterError::AlreadyRunning)));

    assert_ok!(server.stop().await);
    assert!(server.local_addr().await.is_none());
    assert!(matches!(server.stop().await, Err(BroadcasterError::NotStarted)));
}

#[tokio::test]
async fn test_broadcast_to_multiple_viewers() {
    let (server, hub, addr) = start_server().await;

    let mut viewer1 = BufReader::new(TcpStream::connect(addr).await.unwrap());
    let mut viewer2 = BufReader::new(TcpStream::connect(addr).await.unwrap());
    wait_for_viewers(&server, 2).await;

    let reading = DeviceReading::new("ESQ", 45.5, 120, 300, Utc::now());
    let report = hub.publish(&reading, reading.received_at()).await;
    assert_eq!(report.delivered, 2);

    for viewer in [&mut viewer1, &mut viewer2] {
        let PushMessage::Data { id, values, .. } = read_message(viewer).await;
        assert_eq!(id, "ESQ");
        assert_eq!(values.angle, 45.5);
        assert_eq!(values.emg, 120);
        assert_eq!(values.ecg, 300);
    }

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_late_viewer_gets_no_history() {
    let (server, hub, addr) = start_server().await;

    let early = DeviceReading::new("DIR", 1.0, 1, 1, Utc::now());
    hub.publish(&early, early.received_at()).await;

    let mut viewer = BufReader::new(TcpStream::connect(addr).await.unwrap());
    wait_for_viewers(&server, 1).await;

    let late = DeviceReading::new("DIR", 2.0, 2, 2, Utc::now());
    hub.publish(&late, late.received_at()).await;

    let PushMessage::Data { values, .. } = read_message(&mut viewer).await;
    assert_eq!(values.angle, 2.0);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_hung_up_viewer_is_unregistered() {
    let (server, hub, addr) = start_server().await;

    let leaving = TcpStream::connect(addr).await.unwrap();
    let mut staying = BufReader::new(TcpStream::connect(addr).await.unwrap());
    wait_for_viewers(&server, 2).await;

    drop(leaving);
    wait_for_viewers(&server, 1).await;

    let reading = DeviceReading::new("ESQ", 30.0, 100, 200, Utc::now());
    let report = hub.publish(&reading, reading.received_at()).await;
    assert_eq!(report.delivered, 1);

    let PushMessage::Data { id, .. } = read_message(&mut staying).await;
    assert_eq!(id, "ESQ");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_disconnects_viewers() {
    let (server, _hub, addr) = start_server().await;

    let mut viewer = TcpStream::connect(addr).await.unwrap();
    wait_for_viewers(&server, 1).await;

    server.stop().await.unwrap();
    assert_eq!(server.viewer_count().await, 0);

    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(Duration::from_secs(2), viewer.read(&mut buf))
        .await
        .expect("viewer was not disconnected")
        .unwrap_or(0);
    assert_eq!(n, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stalled_viewer_is_timed_out_and_pruned() {
    let registry = ConnectionRegistry::new();
    let options = ViewerOptions {
        queue_capacity: 8,
        write_timeout: Duration::from_millis(100),
        ..ViewerOptions::default()
    };
    let server = ViewerServer::new("127.0.0.1:0", registry.clone(), options);
    let addr = server.start().await.unwrap();
    let hub = BroadcastHub::new(registry);

    // Never reads, so its socket buffers eventually fill up
    let _stalled = TcpStream::connect(addr).await.unwrap();
    let mut healthy = BufReader::new(TcpStream::connect(addr).await.unwrap());
    wait_for_viewers(&server, 2).await;

    // Drain the healthy viewer until the right-leg update shows up
    let (found_tx, found_rx) = tokio::sync::oneshot::channel();
    let drain = tokio::spawn(async move {
        let mut line = String::new();
        loop {
            line.clear();
            match healthy.read_line(&mut line).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {
                    if let Ok(PushMessage::Data { id, values, .. }) = serde_json::from_str(line.trim()) {
                        if id == "DIR" {
                            let _ = found_tx.send(values.angle);
                            return;
                        }
                    }
                }
            }
        }
    });

    let flood = DeviceReading::new("ESQ", 1.0, 1, 1, Utc::now());
    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    let mut published = 0u64;
    while server.viewer_count().await > 1 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "stalled viewer still registered after {} updates",
            published
        );
        for _ in 0..64 {
            hub.publish(&flood, flood.received_at()).await;
            published += 1;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    // The healthy queue may still hold flood updates; retry until it takes one
    let marker = DeviceReading::new("DIR", 42.0, 2, 2, Utc::now());
    let mut delivered = false;
    for _ in 0..100 {
        let report = hub.publish(&marker, marker.received_at()).await;
        assert_eq!(report.attempted(), 1);
        if report.delivered == 1 {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(delivered, "healthy viewer queue never drained");

    let angle = tokio::time::timeout(Duration::from_secs(5), found_rx)
        .await
        .expect("healthy viewer stopped receiving")
        .unwrap();
    assert_eq!(angle, 42.0);

    drain.abort();
    server.stop().await.unwrap();
}
