// Capture session lifecycle against a fake socket and camera
//
// These tests drive the session's state machine directly: connect, stream,
// progress delivery, teardown ordering and every failure path.

mod common;

use common::{
    eventually, tiny_config, tiny_frame, within, DeviceProbe, EventLog, FakeConnector, FakeDevice,
};
use facereg_capture::encoder::{ChunkHeader, EncoderState};
use facereg_capture::transport::{ReadyState, SocketEvent};
use facereg_capture::FrameSink;
use facereg_capture::{CaptureError, CaptureSession, ConnectionState, RegistrationOutcome};
use parking_lot::Mutex;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

fn log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

fn streaming_session() -> (CaptureSession, Arc<FakeConnector>, Arc<DeviceProbe>, EventLog) {
    let log = log();
    let connector = FakeConnector::new(Arc::clone(&log));
    let (device, probe) = FakeDevice::new(Arc::clone(&log));
    let session = CaptureSession::new(tiny_config(), connector.clone(), device);
    (session, connector, probe, log)
}

fn recorder(session: &CaptureSession) -> Arc<Mutex<Vec<u64>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    session.on_progress(move |count| sink.lock().push(count));
    seen
}

#[tokio::test]
async fn test_connect_uses_session_endpoint() {
    let (session, connector, probe, _log) = streaming_session();

    within(session.connect("alice123")).await.unwrap();

    assert_eq!(
        *connector.endpoints.lock(),
        vec!["ws://localhost:5001/ws/face-register/alice123".to_string()]
    );
    assert_eq!(session.state(), ConnectionState::Streaming);
    assert_eq!(session.session_id().unwrap().as_str(), "alice123");
    assert!(probe.is_acquired());
    assert_eq!(connector.sink().ready_state(), ReadyState::Open);
    assert_eq!(session.encoder_state(), EncoderState::Recording);

    session.stop();
}

#[tokio::test]
async fn test_chunks_stream_while_socket_open() {
    let (session, connector, probe, _log) = streaming_session();
    within(session.connect("alice123")).await.unwrap();

    let profile = tiny_config().profile;
    assert!(probe.emit(tiny_frame(&profile, 42)));

    let sink = connector.sink();
    eventually("first chunk on the wire", || sink.sent_count() >= 1).await;

    let first = sink.sent.lock()[0].clone();
    let (header, frames) = ChunkHeader::parse(&first).unwrap();
    assert_eq!(header.index, 0);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].payload.iter().copied().max(), Some(42));

    // Empty intervals never reach the socket
    assert!(sink.sent.lock().iter().all(|chunk| !chunk.is_empty()));
    assert_eq!(session.stats().chunks_sent as usize, sink.sent_count());

    session.stop();
}

#[tokio::test]
async fn test_chunks_dropped_while_socket_not_open() {
    let (session, connector, probe, _log) = streaming_session();
    within(session.connect("alice123")).await.unwrap();

    let sink = connector.sink();
    let profile = tiny_config().profile;

    sink.force_state(ReadyState::Closing);
    probe.emit(tiny_frame(&profile, 1));
    eventually("a dropped chunk", || session.stats().chunks_dropped >= 1).await;
    assert_eq!(sink.send_calls.load(Ordering::SeqCst), 0);

    sink.force_state(ReadyState::Open);
    probe.emit(tiny_frame(&profile, 2));
    eventually("a sent chunk", || sink.sent_count() >= 1).await;

    let stats = session.stats();
    assert!(stats.chunks_dropped >= 1);
    assert_eq!(stats.chunks_sent, 1);

    session.stop();
}

#[tokio::test]
async fn test_progress_forwarded_in_order() {
    let (session, connector, _probe, _log) = streaming_session();
    let seen = recorder(&session);
    within(session.connect("alice123")).await.unwrap();

    connector.push_text(r#"{"type":"progress","count":7}"#).await;
    connector.push_text(r#"{"type":"unknown"}"#).await;
    connector.push_text("not json at all").await;
    connector.push_text(r#"{"type":"progress"}"#).await;
    connector.push_text(r#"{"type":"progress","count":8}"#).await;
    connector.push_text(r#"{"type":"complete","success":true}"#).await;

    eventually("registration verdict", || session.outcome().is_some()).await;

    assert_eq!(*seen.lock(), vec![7, 8]);
    assert_eq!(
        session.outcome(),
        Some(RegistrationOutcome::Complete { success: true })
    );
    assert_eq!(session.stats().last_progress, Some(8));
    // Protocol noise never changes the lifecycle
    assert_eq!(session.state(), ConnectionState::Streaming);

    session.stop();
}

#[tokio::test]
async fn test_non_progress_messages_never_invoke_callback() {
    let (session, connector, _probe, _log) = streaming_session();
    let seen = recorder(&session);
    within(session.connect("bob")).await.unwrap();

    connector.push_text(r#"{"type":"unknown"}"#).await;
    connector.push_text(r#"{"type":"error","message":"no face found"}"#).await;

    eventually("rejection verdict", || session.outcome().is_some()).await;

    assert!(seen.lock().is_empty());
    assert_eq!(
        session.outcome(),
        Some(RegistrationOutcome::Rejected {
            message: "no face found".to_string()
        })
    );

    session.stop();
}

#[tokio::test]
async fn test_every_progress_count_delivered_as_sent() {
    let (session, connector, _probe, _log) = streaming_session();
    let seen = recorder(&session);
    within(session.connect("carol")).await.unwrap();

    // Out-of-order counts are forwarded untouched
    for count in [5, 2, 9, 9] {
        connector
            .push_text(&format!(r#"{{"type":"progress","count":{}}}"#, count))
            .await;
    }

    eventually("four callbacks", || seen.lock().len() == 4).await;
    assert_eq!(*seen.lock(), vec![5, 2, 9, 9]);
    assert_eq!(session.stats().last_progress, Some(9));

    session.stop();
}

#[tokio::test]
async fn test_progress_callback_replaced_mid_stream() {
    let (session, connector, _probe, _log) = streaming_session();
    let first = recorder(&session);
    within(session.connect("dave")).await.unwrap();

    connector.push_text(r#"{"type":"progress","count":1}"#).await;
    eventually("first callback", || first.lock().len() == 1).await;

    let second = recorder(&session);
    connector.push_text(r#"{"type":"progress","count":2}"#).await;
    eventually("second callback", || second.lock().len() == 1).await;

    assert_eq!(*first.lock(), vec![1]);
    assert_eq!(*second.lock(), vec![2]);

    session.stop();
}

#[tokio::test]
async fn test_stop_releases_everything_in_order() {
    let (session, connector, probe, log) = streaming_session();
    within(session.connect("alice123")).await.unwrap();

    session.stop();

    assert_eq!(session.state(), ConnectionState::Closed);
    assert_eq!(session.encoder_state(), EncoderState::Inactive);
    assert!(!probe.is_acquired());
    assert_eq!(connector.sink().ready_state(), ReadyState::Closed);
    assert_eq!(*log.lock(), vec!["device released", "socket closed"]);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let (session, connector, probe, log) = streaming_session();
    within(session.connect("alice123")).await.unwrap();

    session.stop();
    let after_first = log.lock().clone();
    session.stop();

    assert_eq!(*log.lock(), after_first);
    assert_eq!(probe.release_calls.load(Ordering::SeqCst), 1);
    assert_eq!(connector.sink().close_calls.load(Ordering::SeqCst), 1);
    assert_eq!(session.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_duration_frozen_after_stop() {
    let (session, _connector, _probe, _log) = streaming_session();
    within(session.connect("alice123")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    session.stop();
    let stopped = session.stats();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let later = session.stats();

    assert!(stopped.ended_at.is_some());
    assert_eq!(later.ended_at, stopped.ended_at);
    assert_eq!(later.duration_secs, stopped.duration_secs);
    assert!(stopped.duration_secs >= 0.02);
}

#[tokio::test]
async fn test_stop_before_connect() {
    let (session, connector, probe, log) = streaming_session();

    session.stop();
    session.stop();

    assert_eq!(session.state(), ConnectionState::Closed);
    assert!(log.lock().is_empty());
    assert!(!probe.is_acquired());

    // Closed is terminal
    let err = within(session.connect("alice123")).await.unwrap_err();
    assert_eq!(err, CaptureError::Stopped);
    assert!(connector.endpoints.lock().is_empty());
}

#[tokio::test]
async fn test_stop_while_socket_connecting() {
    let log = log();
    let gate = Arc::new(Notify::new());
    let connector = FakeConnector::gated(Arc::clone(&gate), Arc::clone(&log));
    let (device, probe) = FakeDevice::new(Arc::clone(&log));
    let session = Arc::new(CaptureSession::new(tiny_config(), connector.clone(), device));

    let pending = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.connect("alice123").await })
    };

    within(connector.connect_started.notified()).await;
    assert_eq!(session.state(), ConnectionState::Connecting);

    session.stop();
    assert_eq!(session.state(), ConnectionState::Closed);

    gate.notify_one();
    let result = within(pending).await.unwrap();

    assert_eq!(result, Err(CaptureError::Stopped));
    assert_eq!(probe.acquire_calls.load(Ordering::SeqCst), 0);
    assert_eq!(connector.sink().ready_state(), ReadyState::Closed);
    assert_eq!(session.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_stop_while_device_acquiring() {
    let log = log();
    let gate = Arc::new(Notify::new());
    let connector = FakeConnector::new(Arc::clone(&log));
    let (device, probe) = FakeDevice::gated(Arc::clone(&gate), Arc::clone(&log));
    let session = Arc::new(CaptureSession::new(tiny_config(), connector.clone(), device));

    let pending = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.connect("alice123").await })
    };

    eventually("device acquisition", || {
        probe.acquire_calls.load(Ordering::SeqCst) == 1
    })
    .await;

    session.stop();
    gate.notify_one();
    let result = within(pending).await.unwrap();

    assert_eq!(result, Err(CaptureError::Stopped));
    // Acquired after stop, then released by the aborted connect
    assert!(!probe.is_acquired());
    assert_eq!(connector.sink().ready_state(), ReadyState::Closed);
    assert_eq!(session.encoder_state(), EncoderState::Inactive);
}

#[tokio::test]
async fn test_device_failure_closes_socket() {
    let log = log();
    let connector = FakeConnector::new(Arc::clone(&log));
    let (device, probe) = FakeDevice::failing("permission denied", Arc::clone(&log));
    let session = CaptureSession::new(tiny_config(), connector.clone(), device);
    let mut states = session.subscribe_state();

    let err = within(session.connect("alice123")).await.unwrap_err();

    match &err {
        CaptureError::Device(msg) => assert!(msg.contains("permission denied"), "{}", msg),
        other => panic!("expected device error, got {:?}", other),
    }
    assert!(matches!(session.state(), ConnectionState::Failed(_)));
    assert_eq!(connector.sink().ready_state(), ReadyState::Closed);
    assert_eq!(connector.sink().close_calls.load(Ordering::SeqCst), 1);
    assert!(!probe.is_acquired());

    // Streaming was never observed
    assert!(states.has_changed().unwrap());
    assert!(matches!(*states.borrow_and_update(), ConnectionState::Failed(_)));
}

#[tokio::test]
async fn test_transport_failure_rejects_connect() {
    let log = log();
    let connector = FakeConnector::failing("connection refused", Arc::clone(&log));
    let (device, probe) = FakeDevice::new(Arc::clone(&log));
    let session = CaptureSession::new(tiny_config(), connector, device);

    let err = within(session.connect("alice123")).await.unwrap_err();

    match err {
        CaptureError::Transport(msg) => assert!(msg.contains("connection refused"), "{}", msg),
        other => panic!("expected transport error, got {:?}", other),
    }
    assert!(matches!(session.state(), ConnectionState::Failed(_)));
    assert_eq!(probe.acquire_calls.load(Ordering::SeqCst), 0);

    // Failed is terminal; stop changes nothing
    session.stop();
    assert!(matches!(session.state(), ConnectionState::Failed(_)));
}

#[tokio::test]
async fn test_remote_close_tears_down_device() {
    let (session, connector, probe, _log) = streaming_session();
    within(session.connect("alice123")).await.unwrap();

    connector
        .push(SocketEvent::Closed {
            code: Some(1000),
            reason: String::new(),
        })
        .await;

    let mut states = session.subscribe_state();
    within(states.wait_for(|s| s.is_terminal())).await.unwrap();

    assert_eq!(session.state(), ConnectionState::Closed);
    eventually("device release", || !probe.is_acquired()).await;
    assert_eq!(session.encoder_state(), EncoderState::Inactive);
}

#[tokio::test]
async fn test_socket_error_mid_stream_fails_session() {
    let (session, connector, probe, _log) = streaming_session();
    within(session.connect("alice123")).await.unwrap();

    connector
        .push(SocketEvent::Error("connection reset".to_string()))
        .await;

    let mut states = session.subscribe_state();
    within(states.wait_for(|s| s.is_terminal())).await.unwrap();

    assert_eq!(
        session.state(),
        ConnectionState::Failed("connection reset".to_string())
    );
    eventually("device release", || !probe.is_acquired()).await;
    assert_eq!(connector.sink().ready_state(), ReadyState::Closed);
}

#[tokio::test]
async fn test_session_is_single_use() {
    let (session, _connector, _probe, _log) = streaming_session();
    within(session.connect("alice123")).await.unwrap();

    let err = within(session.connect("alice123")).await.unwrap_err();
    assert_eq!(err, CaptureError::AlreadyStarted);
    assert_eq!(session.state(), ConnectionState::Streaming);

    session.stop();
}

#[tokio::test]
async fn test_empty_session_id_rejected() {
    let (session, connector, _probe, _log) = streaming_session();

    let err = within(session.connect("")).await.unwrap_err();

    assert_eq!(err, CaptureError::InvalidSessionId);
    assert_eq!(session.state(), ConnectionState::Idle);
    assert!(connector.endpoints.lock().is_empty());
}

#[tokio::test]
async fn test_drop_stops_session() {
    let (session, connector, probe, _log) = streaming_session();
    within(session.connect("alice123")).await.unwrap();

    drop(session);

    assert!(!probe.is_acquired());
    assert_eq!(connector.sink().ready_state(), ReadyState::Closed);
}
