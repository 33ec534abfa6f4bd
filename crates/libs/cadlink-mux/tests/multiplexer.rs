use std::sync::Arc;
use std::time::Duration;

use cadlink_events::{EventCategory, EventOrigin, EventType};
use cadlink_mux::framing::FrameReader;
use cadlink_mux::{MuxConfig, MuxError, Multiplexer};
use serde_json::{json, Value};
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::net::TcpListener;

/// The remote end of an attached in-memory connection.
struct FakeRemote {
    frames: FrameReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl FakeRemote {
    async fn next_command(&mut self) -> Value {
        self.frames.next_frame().await.expect("command frame")
    }

    async fn send(&mut self, frame: Value) {
        self.send_raw(frame.to_string().as_bytes()).await;
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write to multiplexer");
        self.writer.flush().await.expect("flush");
    }

    async fn reply_ok(&mut self, command: &Value, result: Value) {
        self.send(json!({ "request_id": command["request_id"], "status": "ok", "result": result }))
            .await;
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

async fn attached(config: MuxConfig) -> (Arc<Multiplexer>, FakeRemote) {
    init_logging();
    let (local, remote) = tokio::io::duplex(64 * 1024);
    let mux = Arc::new(Multiplexer::new(config));
    mux.attach(local).await;
    let (read_half, writer) = tokio::io::split(remote);
    let frames = FrameReader::new(read_half, Duration::from_secs(5));
    (mux, FakeRemote { frames, writer })
}

fn spawn_command(
    mux: &Arc<Multiplexer>,
    command_type: &'static str,
    params: Value,
) -> tokio::task::JoinHandle<Result<Value, MuxError>> {
    let mux = Arc::clone(mux);
    tokio::spawn(async move { mux.send_command(command_type, params).await })
}

#[tokio::test]
async fn command_frame_carries_type_params_and_request_id() {
    let (mux, mut remote) = attached(MuxConfig::default()).await;
    let call = spawn_command(&mux, "create_layer", json!({ "name": "Walls" }));

    let command = remote.next_command().await;
    assert_eq!(command["type"], "create_layer");
    assert_eq!(command["params"], json!({ "name": "Walls" }));
    assert_eq!(command["request_id"].as_str().map(str::len), Some(32));

    remote.reply_ok(&command, json!({ "name": "Walls" })).await;
    assert_eq!(call.await.expect("join").expect("response"), json!({ "name": "Walls" }));
}

#[tokio::test]
async fn out_of_order_responses_reach_their_own_callers() {
    let (mux, mut remote) = attached(MuxConfig::default()).await;
    let first = spawn_command(&mux, "get_document_info", json!({}));
    let second = spawn_command(&mux, "get_selected_objects_info", json!({}));

    let a = remote.next_command().await;
    let b = remote.next_command().await;
    assert_ne!(a["request_id"], b["request_id"]);
    assert_eq!(mux.pending_count(), 2);

    remote.reply_ok(&b, json!({ "answered": b["type"] })).await;
    remote.reply_ok(&a, json!({ "answered": a["type"] })).await;

    let first = first.await.expect("join").expect("first response");
    let second = second.await.expect("join").expect("second response");
    assert_eq!(first, json!({ "answered": "get_document_info" }));
    assert_eq!(second, json!({ "answered": "get_selected_objects_info" }));
    assert_eq!(mux.pending_count(), 0);
    assert_eq!(mux.context_count(), 0);
}

#[tokio::test]
async fn missing_status_and_result_default_to_empty_object() {
    let (mux, mut remote) = attached(MuxConfig::default()).await;
    let call = spawn_command(&mux, "delete_object", json!({ "id": "abc" }));
    let command = remote.next_command().await;
    remote.send(json!({ "request_id": command["request_id"] })).await;
    assert_eq!(call.await.expect("join").expect("response"), json!({}));
}

#[tokio::test]
async fn remote_error_status_surfaces_remote_message() {
    let (mux, mut remote) = attached(MuxConfig::default()).await;
    let call = spawn_command(&mux, "delete_layer", json!({ "name": "Missing" }));
    let command = remote.next_command().await;
    remote
        .send(json!({
            "request_id": command["request_id"],
            "status": "error",
            "message": "Layer not found",
        }))
        .await;

    let err = call.await.expect("join").expect_err("remote error");
    assert_eq!(err, MuxError::remote("Layer not found"));
    assert!(mux.is_connected().await);
}

#[tokio::test]
async fn timeout_leaves_no_residue_and_late_response_is_dropped() {
    let (mux, mut remote) = attached(MuxConfig::default()).await;

    let err = {
        let mux = Arc::clone(&mux);
        let call = tokio::spawn(async move {
            mux.send_command_with_timeout("create_object", json!({}), Duration::from_millis(100))
                .await
        });
        let command = remote.next_command().await;
        let err = call.await.expect("join").expect_err("timeout");
        remote.reply_ok(&command, json!({ "late": true })).await;
        err
    };
    assert!(matches!(err, MuxError::Timeout { ref command_type, .. } if command_type == "create_object"));
    assert_eq!(mux.pending_count(), 0);
    assert_eq!(mux.context_count(), 0);

    let call = spawn_command(&mux, "get_document_info", json!({}));
    let command = remote.next_command().await;
    remote.reply_ok(&command, json!({ "objects": 3 })).await;
    assert_eq!(call.await.expect("join").expect("response"), json!({ "objects": 3 }));
}

#[tokio::test]
async fn unknown_request_id_and_stray_frames_are_ignored() {
    let (mux, mut remote) = attached(MuxConfig::default()).await;
    let call = spawn_command(&mux, "select_objects", json!({ "ids": ["a"] }));
    let command = remote.next_command().await;

    remote.send(json!({ "request_id": "not-ours", "status": "ok", "result": {} })).await;
    remote.send(json!({ "greeting": "hello" })).await;
    remote.reply_ok(&command, json!({ "selected": 1 })).await;

    assert_eq!(call.await.expect("join").expect("response"), json!({ "selected": 1 }));
    assert!(mux.is_connected().await);
}

#[tokio::test]
async fn event_during_outstanding_command_is_command_triggered() {
    let (mux, mut remote) = attached(MuxConfig::default()).await;
    let mut events = mux.subscribe();
    let call = spawn_command(&mux, "create_layer", json!({ "name": "Walls" }));
    let command = remote.next_command().await;

    remote
        .send(json!({
            "type": "event",
            "event_type": "layer",
            "action": "added",
            "layer_name": "Walls",
        }))
        .await;
    remote.reply_ok(&command, json!({})).await;
    call.await.expect("join").expect("response");

    let event = events.recv().await.expect("event");
    assert_eq!(event.event_type(), &EventType::Standard(EventCategory::Layer));
    assert_eq!(event.full_event_type(), "layer.added");
    assert_eq!(event.data().get("layer_name"), Some(&json!("Walls")));
    assert_eq!(
        event.origin(),
        Some(&EventOrigin::Command {
            request_id: command["request_id"].as_str().unwrap_or_default().to_string(),
            command_type: "create_layer".into(),
        })
    );

    remote.send(json!({ "type": "event", "event_type": "selection", "action": "changed" })).await;
    let event = events.recv().await.expect("second event");
    assert_eq!(event.origin(), Some(&EventOrigin::User));
}

#[tokio::test]
async fn event_after_attribution_window_is_user_triggered() {
    let config = MuxConfig::default().with_attribution_window(Duration::from_millis(150));
    let (mux, mut remote) = attached(config).await;
    let mut events = mux.subscribe();
    let _call = spawn_command(&mux, "execute_rhinoscript_python_code", json!({ "code": "x" }));
    let _command = remote.next_command().await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    remote.send(json!({ "type": "event", "event_type": "geometry", "action": "added" })).await;

    let event = events.recv().await.expect("event");
    assert_eq!(event.origin(), Some(&EventOrigin::User));
    assert_eq!(mux.context_count(), 0);
    assert_eq!(mux.pending_count(), 1);
}

#[tokio::test]
async fn events_are_delivered_in_arrival_order() {
    let (mux, mut remote) = attached(MuxConfig::default()).await;
    let mut events = mux.subscribe();
    for seq in 0..5 {
        remote
            .send(json!({ "type": "event", "event_type": "rhino.mesh_created", "seq": seq }))
            .await;
    }
    for seq in 0..5 {
        let event = events.recv().await.expect("event");
        assert!(event.event_type().is_custom());
        assert_eq!(event.data().get("seq"), Some(&json!(seq)));
    }
}

#[tokio::test]
async fn malformed_event_frame_is_dropped_without_closing() {
    let (mux, mut remote) = attached(MuxConfig::default()).await;
    let mut events = mux.subscribe();
    remote.send(json!({ "type": "event", "action": "added" })).await;
    remote.send(json!({ "type": "event", "event_type": "view", "action": "changed" })).await;

    let event = events.recv().await.expect("event");
    assert_eq!(event.full_event_type(), "view.changed");
    assert!(mux.is_connected().await);
}

#[tokio::test]
async fn disconnect_fails_every_outstanding_request() {
    let (mux, mut remote) = attached(MuxConfig::default()).await;
    let first = spawn_command(&mux, "modify_object", json!({}));
    let second = spawn_command(&mux, "modify_objects", json!({}));
    remote.next_command().await;
    remote.next_command().await;
    assert_eq!(mux.pending_count(), 2);

    mux.disconnect().await;

    for call in [first, second] {
        let err = call.await.expect("join").expect_err("disconnected");
        assert_eq!(err.kind(), "connection");
    }
    assert_eq!(mux.pending_count(), 0);
    assert_eq!(mux.context_count(), 0);
    assert!(!mux.is_connected().await);
}

#[tokio::test]
async fn peer_close_fails_outstanding_request_with_connection_error() {
    let (mux, mut remote) = attached(MuxConfig::default()).await;
    let call = spawn_command(&mux, "get_object_info", json!({ "id": "x" }));
    remote.next_command().await;
    drop(remote);

    let err = call.await.expect("join").expect_err("peer closed");
    assert_eq!(err.kind(), "connection");
    assert!(!mux.is_connected().await);
    assert_eq!(mux.pending_count(), 0);
}

#[tokio::test]
async fn desynchronised_stream_fails_requests_with_protocol_error() {
    let (mux, mut remote) = attached(MuxConfig::default()).await;
    let call = spawn_command(&mux, "create_objects", json!({}));
    remote.next_command().await;
    remote.send_raw(b"{\"request_id\": ]").await;

    let err = call.await.expect("join").expect_err("desync");
    assert_eq!(err.kind(), "protocol");
    assert!(!mux.is_connected().await);
}

#[tokio::test]
async fn connect_failure_leaves_multiplexer_disconnected() {
    init_logging();
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        listener.local_addr().expect("addr").port()
    };
    let mux = Multiplexer::new(MuxConfig::new("127.0.0.1", port));

    let err = mux.send_command("get_document_info", json!({})).await.expect_err("refused");
    assert_eq!(err.kind(), "connection");
    assert!(!mux.is_connected().await);
    assert_eq!(mux.pending_count(), 0);
    assert_eq!(mux.context_count(), 0);
}

#[tokio::test]
async fn reconnects_lazily_after_remote_restart() {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let mux = Arc::new(Multiplexer::new(MuxConfig::new("127.0.0.1", port)));

    let server = tokio::spawn(async move {
        for generation in 0..2 {
            let (stream, _) = listener.accept().await.expect("accept");
            let (read_half, mut writer) = tokio::io::split(stream);
            let mut frames = FrameReader::new(read_half, Duration::from_secs(5));
            let command = frames.next_frame().await.expect("command");
            let reply = json!({
                "request_id": command["request_id"],
                "status": "ok",
                "result": { "generation": generation },
            });
            writer.write_all(reply.to_string().as_bytes()).await.expect("reply");
            writer.flush().await.expect("flush");
        }
    });

    let first = mux.send_command("get_document_info", json!({})).await.expect("first");
    assert_eq!(first, json!({ "generation": 0 }));

    while mux.is_connected().await {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let second = mux.send_command("get_document_info", json!({})).await.expect("second");
    assert_eq!(second, json!({ "generation": 1 }));
    server.await.expect("server");
}
