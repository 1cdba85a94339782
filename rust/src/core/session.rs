// Transport session lifecycle + networking side effects. One STOMP-over-
// websocket connection per session; the socket task owns the stream and talks
// to the actor exclusively through internal events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

use crate::error::TransportError;
use crate::state::{ConnectionState, ConversationKey};
use crate::updates::{CoreMsg, InternalEvent};

use super::api::ApiClient;
use super::stomp::{self, Frame};
use super::AppCore;

pub(super) enum TransportCmd {
    Frame(Frame),
    Shutdown,
}

pub(super) struct Transport {
    out_tx: flume::Sender<TransportCmd>,
    alive: Arc<AtomicBool>,
}

pub(super) struct Session {
    pub(super) api: ApiClient,
    pub(super) transport: Option<Transport>,
}

impl AppCore {
    pub(super) fn start_session(&mut self, token: String) {
        // Re-entry while a connection attempt or live connection exists is a
        // no-op; the caller disconnects first to rotate tokens.
        if matches!(
            self.state.connection,
            ConnectionState::Connected | ConnectionState::Connecting
        ) {
            tracing::debug!("connect ignored; transport already active");
            return;
        }

        self.stop_session();

        let api = ApiClient::new(self.api_url(), token.clone());
        let mut transport = None;

        if self.network_enabled() {
            let (out_tx, out_rx) = flume::unbounded::<TransportCmd>();
            let alive = Arc::new(AtomicBool::new(true));
            let ws_url = self.ws_url();
            let heartbeat_ms = self.heartbeat_ms();
            let tx = self.core_sender.clone();
            let task_alive = alive.clone();

            tracing::info!(%ws_url, heartbeat_ms, "starting transport");
            self.runtime.spawn(async move {
                run_transport(ws_url, token, heartbeat_ms, out_rx, task_alive, tx).await;
            });

            transport = Some(Transport { out_tx, alive });
        }

        self.session = Some(Session { api, transport });
        self.set_connection(ConnectionState::Connecting);
    }

    pub(super) fn stop_session(&mut self) {
        if let Some(sess) = self.session.take() {
            if let Some(transport) = sess.transport {
                transport.alive.store(false, Ordering::SeqCst);
                let _ = transport.out_tx.send(TransportCmd::Shutdown);
            }
        }
        // Disconnection invalidates every subscription atomically; a fresh
        // session starts with empty dedup windows too.
        if !self.registry.is_empty() {
            tracing::debug!("invalidating live subscriptions");
        }
        self.registry.clear();
        self.dedup.clear();
        self.last_seen.clear();
    }

    pub(super) fn send_frame(&self, frame: Frame) {
        let Some(transport) = self.session.as_ref().and_then(|s| s.transport.as_ref()) else {
            tracing::debug!(command = %frame.command, "no transport; frame dropped");
            return;
        };
        let _ = transport.out_tx.send(TransportCmd::Frame(frame));
    }

    /// Runs once per connection, immediately upon `Connected`.
    pub(super) fn establish_private_inbox(&mut self) {
        if let Some(handle) = self.registry.join_inbox() {
            tracing::info!(destination = %handle.destination, "subscribing private inbox");
            self.send_frame(stomp::subscribe_frame(&handle.id, &handle.destination));
        }
    }

    pub(super) fn fetch_session_info(&self) {
        if !self.network_enabled() {
            return;
        }
        let Some(sess) = self.session.as_ref() else {
            return;
        };
        let api = sess.api.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            match api.get_user_info().await {
                Ok(info) => {
                    if let Some(user_id) = info.user_id.or(info.username) {
                        let _ = tx.send(CoreMsg::Internal(Box::new(
                            InternalEvent::SessionInfoFetched { user_id },
                        )));
                    }
                }
                Err(e) => tracing::warn!(%e, "user info fetch failed"),
            }
        });
    }

    pub(super) fn fetch_friends(&self) {
        if !self.network_enabled() {
            return;
        }
        let Some(sess) = self.session.as_ref() else {
            return;
        };
        let api = sess.api.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            match api.get_friends().await {
                Ok(friends) => {
                    let names = friends
                        .into_iter()
                        .map(|f| {
                            let name = f.display_name();
                            (f.user_id, name)
                        })
                        .collect();
                    let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::FriendsFetched {
                        names,
                    })));
                }
                Err(e) => tracing::warn!(%e, "friend list fetch failed"),
            }
        });
    }

    pub(super) fn send_message_via_rest(&self, to: ConversationKey, content: String) {
        if !self.network_enabled() {
            return;
        }
        let Some(sess) = self.session.as_ref() else {
            return;
        };
        let api = sess.api.clone();
        let tx = self.core_sender.clone();
        let (receiver_id, group_id) = match &to {
            ConversationKey::Direct { peer_id } => (Some(peer_id.clone()), None),
            ConversationKey::Group { group_id } => (None, Some(*group_id)),
        };
        self.runtime.spawn(async move {
            match api.send_message(receiver_id, group_id, content).await {
                Ok(mut message) => {
                    // The send response can omit the group id the same way
                    // push frames do; normalize from the target conversation.
                    if let (Some(gid), None) = (group_id, message.group_id) {
                        message.group_id = Some(gid);
                        message.receiver_id = None;
                    }
                    let _ = tx.send(CoreMsg::Internal(Box::new(
                        InternalEvent::SendEchoReceived { message },
                    )));
                }
                Err(e) => {
                    let _ = tx.send(CoreMsg::Internal(Box::new(
                        InternalEvent::SendMessageFailed {
                            error: e.to_string(),
                        },
                    )));
                }
            }
        });
    }

    pub(super) fn mark_read_via_rest(&self, key: ConversationKey) {
        if !self.network_enabled() {
            return;
        }
        let Some(sess) = self.session.as_ref() else {
            return;
        };
        let api = sess.api.clone();
        let tx = self.core_sender.clone();
        let last_msg_id = self.last_seen.get(&key).copied().unwrap_or(0);
        self.runtime.spawn(async move {
            let result = match &key {
                ConversationKey::Direct { peer_id } => api.mark_read(peer_id).await,
                ConversationKey::Group { group_id } => {
                    api.mark_group_read(*group_id, last_msg_id).await
                }
            };
            match result {
                Ok(()) => {
                    // Resync the unread baseline now that server truth moved.
                    let _ = tx.send(CoreMsg::Action(crate::AppAction::RefreshUnreadCount));
                }
                Err(e) => tracing::warn!(%e, "mark-as-read failed"),
            }
        });
    }
}

fn build_request(
    ws_url: &str,
    token: &str,
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, TransportError> {
    let mut request = ws_url
        .into_client_request()
        .map_err(|e| TransportError::Handshake(e.to_string()))?;
    let value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| TransportError::Handshake(e.to_string()))?;
    request.headers_mut().insert(AUTHORIZATION, value);
    Ok(request)
}

/// Forward an event to the actor unless the session was torn down; events
/// from a dead transport must not disturb a successor session.
fn emit(alive: &AtomicBool, tx: &flume::Sender<CoreMsg>, event: InternalEvent) {
    if alive.load(Ordering::SeqCst) {
        let _ = tx.send(CoreMsg::Internal(Box::new(event)));
    }
}

async fn run_transport(
    ws_url: String,
    token: String,
    heartbeat_ms: u64,
    out_rx: flume::Receiver<TransportCmd>,
    alive: Arc<AtomicBool>,
    tx: flume::Sender<CoreMsg>,
) {
    let request = match build_request(&ws_url, &token) {
        Ok(r) => r,
        Err(e) => {
            emit(
                &alive,
                &tx,
                InternalEvent::TransportFailed {
                    reason: e.to_string(),
                },
            );
            return;
        }
    };

    let ws = match connect_async(request).await {
        Ok((ws, _response)) => ws,
        Err(e) => {
            emit(
                &alive,
                &tx,
                InternalEvent::TransportFailed {
                    reason: TransportError::Handshake(e.to_string()).to_string(),
                },
            );
            return;
        }
    };

    let (mut sink, mut stream) = ws.split();
    if sink
        .send(Message::text(
            stomp::connect_frame(&token, heartbeat_ms).encode(),
        ))
        .await
        .is_err()
    {
        emit(
            &alive,
            &tx,
            InternalEvent::TransportFailed {
                reason: TransportError::Io("CONNECT send failed".into()).to_string(),
            },
        );
        return;
    }

    let heartbeat = Duration::from_millis(heartbeat_ms);
    // Two missed intervals count as silent connection death.
    let idle_limit = heartbeat * 2;
    let mut ticker = tokio::time::interval(heartbeat);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_incoming = tokio::time::Instant::now();

    loop {
        tokio::select! {
            cmd = out_rx.recv_async() => match cmd {
                Ok(TransportCmd::Frame(frame)) => {
                    if sink.send(Message::text(frame.encode())).await.is_err() {
                        emit(&alive, &tx, InternalEvent::TransportFailed {
                            reason: TransportError::Io("frame send failed".into()).to_string(),
                        });
                        break;
                    }
                }
                Ok(TransportCmd::Shutdown) | Err(_) => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                if last_incoming.elapsed() > idle_limit {
                    emit(&alive, &tx, InternalEvent::TransportFailed {
                        reason: TransportError::HeartbeatTimeout(idle_limit.as_millis() as u64)
                            .to_string(),
                    });
                    break;
                }
                if sink.send(Message::text(stomp::HEARTBEAT)).await.is_err() {
                    emit(&alive, &tx, InternalEvent::TransportFailed {
                        reason: TransportError::Io("heartbeat send failed".into()).to_string(),
                    });
                    break;
                }
            },
            incoming = stream.next() => {
                last_incoming = tokio::time::Instant::now();
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if handle_server_text(text.as_str(), &alive, &tx) {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        emit(&alive, &tx, InternalEvent::TransportClosed);
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ping/pong handled by tungstenite; binary ignored.
                    }
                    Some(Err(e)) => {
                        emit(&alive, &tx, InternalEvent::TransportFailed {
                            reason: TransportError::Io(e.to_string()).to_string(),
                        });
                        break;
                    }
                }
            },
        }
    }
}

/// Dispatch one server frame. Returns true when the connection is done for.
fn handle_server_text(text: &str, alive: &AtomicBool, tx: &flume::Sender<CoreMsg>) -> bool {
    let frame = match Frame::parse(text) {
        Ok(Some(frame)) => frame,
        Ok(None) => return false, // heartbeat
        Err(e) => {
            tracing::warn!(%e, "dropping malformed frame");
            return false;
        }
    };

    match frame.command.as_str() {
        "CONNECTED" => {
            emit(alive, tx, InternalEvent::TransportOpened);
            false
        }
        "MESSAGE" => {
            let Some(destination) = frame.header_value("destination") else {
                tracing::warn!("MESSAGE frame without destination dropped");
                return false;
            };
            emit(
                alive,
                tx,
                InternalEvent::FrameReceived {
                    destination: destination.to_string(),
                    payload: frame.body.clone(),
                },
            );
            false
        }
        "ERROR" => {
            let reason = frame
                .header_value("message")
                .map(str::to_string)
                .unwrap_or_else(|| frame.body.clone());
            // An ERROR scoped to one subscription only kills that
            // subscription; anything else is fatal for the connection.
            if let Some(subscription_id) = frame.header_value("subscription") {
                emit(
                    alive,
                    tx,
                    InternalEvent::SubscribeRejected {
                        subscription_id: subscription_id.to_string(),
                        reason,
                    },
                );
                false
            } else {
                emit(
                    alive,
                    tx,
                    InternalEvent::TransportFailed {
                        reason: TransportError::Rejected(reason).to_string(),
                    },
                );
                true
            }
        }
        "RECEIPT" => false,
        other => {
            tracing::debug!(command = other, "ignoring server frame");
            false
        }
    }
}
