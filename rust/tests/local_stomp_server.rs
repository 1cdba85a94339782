// End-to-end over a real websocket: a minimal local STOMP endpoint accepts
// the handshake, acks CONNECT, and pushes a group message that deliberately
// omits the group id, the way the production broker does on topic fan-out.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use qinglian_core::{AppAction, AppReconciler, AppUpdate, ConnectionState, FfiApp};
use tempfile::tempdir;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

fn wait_until(what: &str, timeout: Duration, mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!("{what}: condition not met within {timeout:?}");
}

struct TestReconciler {
    updates: Arc<Mutex<Vec<AppUpdate>>>,
}

impl AppReconciler for TestReconciler {
    fn reconcile(&self, update: AppUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

fn header_value<'a>(frame: &'a str, name: &str) -> Option<&'a str> {
    frame
        .lines()
        .skip(1)
        .take_while(|line| !line.is_empty())
        .find_map(|line| line.strip_prefix(&format!("{name}:")))
}

async fn run_stomp_endpoint(listener: TcpListener) {
    let (tcp, _addr) = listener.accept().await.expect("accept");
    let ws = tokio_tungstenite::accept_async(tcp).await.expect("upgrade");
    let (mut sink, mut stream) = ws.split();

    while let Some(Ok(msg)) = stream.next().await {
        let Message::Text(text) = msg else { continue };
        let text = text.as_str().trim_end_matches('\0');
        if text.trim().is_empty() {
            // client heartbeat
            continue;
        }

        if text.starts_with("CONNECT") {
            assert_eq!(
                header_value(text, "Authorization"),
                Some("Bearer test-token")
            );
            let connected = "CONNECTED\nversion:1.2\nheart-beat:10000,10000\n\n\0";
            sink.send(Message::text(connected)).await.expect("send");
        } else if text.starts_with("SUBSCRIBE") {
            let destination = header_value(text, "destination").expect("destination").to_string();
            let id = header_value(text, "id").expect("id").to_string();
            if destination == "/topic/group.15" {
                // No groupId in the payload; the client must derive it from
                // the topic it arrived on.
                let body = serde_json::json!({
                    "id": 501,
                    "senderId": "bob",
                    "senderName": "Bob",
                    "content": "from the wire",
                    "sentAt": "2026-01-01T00:00:00",
                    "isRead": false,
                })
                .to_string();
                let frame = format!(
                    "MESSAGE\ndestination:{destination}\nsubscription:{id}\nmessage-id:1\n\n{body}\0"
                );
                sink.send(Message::text(frame)).await.expect("send");
            }
        }
    }
}

#[test]
fn connects_and_receives_group_push_over_a_real_socket() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let listener = rt
        .block_on(TcpListener::bind("127.0.0.1:0"))
        .expect("bind");
    let port = listener.local_addr().unwrap().port();
    rt.spawn(run_stomp_endpoint(listener));

    let dir = tempdir().unwrap();
    let config = serde_json::json!({
        "disable_network": false,
        "ws_url": format!("ws://127.0.0.1:{port}"),
        // Unroutable on purpose; REST side effects fail fast and are logged.
        "api_url": "http://127.0.0.1:9/api",
    });
    std::fs::write(
        dir.path().join("qinglian_config.json"),
        serde_json::to_vec(&config).unwrap(),
    )
    .unwrap();

    let app = FfiApp::new(dir.path().to_str().unwrap().to_string());
    let updates = Arc::new(Mutex::new(vec![]));
    app.listen_for_updates(Box::new(TestReconciler {
        updates: updates.clone(),
    }));

    app.dispatch(AppAction::Connect {
        token: "test-token".into(),
    });
    wait_until("connected", Duration::from_secs(10), || {
        app.state().connection == ConnectionState::Connected
    });

    app.dispatch(AppAction::JoinGroup { group_id: 15 });
    wait_until("group message", Duration::from_secs(10), || {
        updates.lock().unwrap().iter().any(|u| {
            matches!(
                u,
                AppUpdate::MessageReceived { message, .. }
                    if message.id == 501 && message.group_id == Some(15)
            )
        })
    });
    assert_eq!(app.state().subscribed_groups, vec![15]);

    app.dispatch(AppAction::Disconnect);
    wait_until("disconnected", Duration::from_secs(10), || {
        app.state().connection == ConnectionState::Disconnected
    });
}
