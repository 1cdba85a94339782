mod api;
mod config;
mod decode;
mod dedup;
mod notify;
mod presence;
mod session;
mod stomp;
mod subscriptions;
mod unread;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use flume::Sender;
use tokio::sync::broadcast;

use crate::actions::AppAction;
use crate::state::{AppState, ChatMessage, ConnectionState, ConversationKey};
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};
use crate::NotificationSink;

use dedup::DedupLedger;
use presence::PresenceStore;
use subscriptions::SubscriptionRegistry;

/// Bounded fan-out; a consumer that lags loses the oldest buffered events
/// rather than stalling delivery to everyone else.
const BROADCAST_CAPACITY: usize = 32;

pub struct AppCore {
    pub state: AppState,
    rev: u64,

    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,

    config: config::AppConfig,
    runtime: tokio::runtime::Runtime,

    session: Option<session::Session>,
    registry: SubscriptionRegistry,

    // Shared with the broadcast consumer tasks.
    message_tx: broadcast::Sender<ChatMessage>,
    dedup: Arc<DedupLedger>,
    presence: Arc<PresenceStore>,
    friend_names: Arc<Mutex<HashMap<String, String>>>,
    local_user: Arc<RwLock<Option<String>>>,
    notification_sink: Arc<RwLock<Option<Arc<dyn NotificationSink>>>>,

    // Newest accepted message id per conversation, for group mark-as-read.
    last_seen: HashMap<ConversationKey, i64>,
}

impl AppCore {
    pub fn new(
        update_sender: Sender<AppUpdate>,
        core_sender: Sender<CoreMsg>,
        data_dir: String,
        shared_state: Arc<RwLock<AppState>>,
        notification_sink: Arc<RwLock<Option<Arc<dyn NotificationSink>>>>,
    ) -> Self {
        let config = config::load_app_config(&data_dir);
        let state = AppState::empty();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()
            .expect("tokio runtime");

        let (message_tx, _) = broadcast::channel(BROADCAST_CAPACITY);

        let this = Self {
            state,
            rev: 0,
            update_sender,
            core_sender,
            shared_state,
            config,
            runtime,
            session: None,
            registry: SubscriptionRegistry::default(),
            message_tx,
            dedup: Arc::new(DedupLedger::default()),
            presence: Arc::new(PresenceStore::default()),
            friend_names: Arc::new(Mutex::new(HashMap::new())),
            local_user: Arc::new(RwLock::new(None)),
            notification_sink,
            last_seen: HashMap::new(),
        };

        // Long-lived broadcast consumers: UI forwarding, notification
        // decisions, unread counting. They attach before anything can be
        // published, and observe no history.
        this.start_ui_forwarder();
        this.start_notification_dispatcher();
        this.start_unread_counter();

        // Ensure FfiApp.state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    fn set_connection(&mut self, connection: ConnectionState) {
        if self.state.connection == connection {
            return;
        }
        self.state.connection = connection.clone();
        self.state.subscribed_groups = self.registry.active_groups();
        let rev = self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self
            .update_sender
            .send(AppUpdate::ConnectionChanged { rev, connection });
    }

    fn emit_unread(&mut self) {
        let count = self.state.unread_count;
        let rev = self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self
            .update_sender
            .send(AppUpdate::UnreadCountChanged { rev, count });
    }

    fn emit_message(&mut self, message: ChatMessage) {
        let rev = self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self
            .update_sender
            .send(AppUpdate::MessageReceived { rev, message });
    }

    fn emit_toast(&mut self) {
        let toast = self.state.toast.clone();
        let rev = self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self
            .update_sender
            .send(AppUpdate::ToastChanged { rev, toast });
    }

    fn toast(&mut self, msg: impl Into<String>) {
        // Kept in state until the UI explicitly clears it, so a snapshot
        // resync still shows it.
        self.state.toast = Some(msg.into());
        self.emit_toast();
    }

    fn local_user_id(&self) -> Option<String> {
        match self.local_user.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    fn set_local_user(&self, user_id: Option<String>) {
        match self.local_user.write() {
            Ok(mut g) => *g = user_id,
            Err(poison) => *poison.into_inner() = user_id,
        }
    }

    /// UI consumer of the delivery broadcast: forwards each message back to
    /// the actor so it reaches the platform with a proper revision number.
    fn start_ui_forwarder(&self) {
        let mut rx = self.message_tx.subscribe();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(message) => {
                        let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::MessageForUi {
                            message,
                        })));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "ui forwarder lagged; events dropped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Single acceptance point for both delivery paths. The dedup ledger
    /// guarantees exactly one of push and echo publishes a given id.
    fn accept_and_publish(&mut self, message: ChatMessage) {
        let my_id = self.local_user_id();
        let Some(key) = message.conversation_key_for(my_id.as_deref()) else {
            tracing::warn!(message_id = message.id, "message without conversation dropped");
            return;
        };
        if !self.dedup.should_accept(&key, message.id) {
            tracing::debug!(message_id = message.id, "duplicate delivery suppressed");
            return;
        }

        let seen = self.last_seen.entry(key).or_insert(message.id);
        if *seen < message.id {
            *seen = message.id;
        }

        // Lossy under pressure by design; send only fails with no receivers
        // and the built-in consumers live as long as the actor.
        let _ = self.message_tx.send(message);
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(ref action) => {
                // Never log `?action` directly: Connect carries the token.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action.clone());
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
        }
    }

    fn handle_action(&mut self, action: AppAction) {
        match action {
            AppAction::Connect { token } => {
                let token = token.trim().to_string();
                if token.is_empty() {
                    self.toast("Cannot connect without a session token");
                    return;
                }
                self.start_session(token);
            }
            AppAction::Disconnect => {
                self.stop_session();
                self.set_connection(ConnectionState::Disconnected);
            }
            AppAction::JoinGroup { group_id } => {
                if self.state.connection != ConnectionState::Connected {
                    tracing::debug!(group_id, "join ignored; not connected");
                    return;
                }
                let Some(handle) = self.registry.join_group(group_id) else {
                    tracing::debug!(group_id, "already subscribed");
                    return;
                };
                tracing::info!(group_id, destination = %handle.destination, "joining group topic");
                self.send_frame(stomp::subscribe_frame(&handle.id, &handle.destination));
                self.state.subscribed_groups = self.registry.active_groups();
                self.emit_state();
            }
            AppAction::LeaveGroup { group_id } => {
                let Some(handle) = self.registry.leave_group(group_id) else {
                    return;
                };
                tracing::info!(group_id, "leaving group topic");
                self.send_frame(stomp::unsubscribe_frame(&handle.id));
                self.state.subscribed_groups = self.registry.active_groups();
                self.emit_state();
            }
            AppAction::SendMessage { to, content } => {
                if content.trim().is_empty() {
                    return;
                }
                if self.session.is_none() {
                    self.toast("Not connected; message not sent");
                    return;
                }
                self.send_message_via_rest(to, content);
            }
            AppAction::MarkConversationRead { key } => {
                self.mark_read_via_rest(key);
            }
            AppAction::SetForeground { foreground } => {
                self.presence.set_foreground(foreground);
                self.state.is_foreground = foreground;
                self.emit_state();
            }
            AppAction::SetActiveConversation { key } => {
                self.presence.set_active_conversation(key.clone());
                self.state.active_conversation = key;
                self.emit_state();
            }
            AppAction::SetAtConversationList { at_list } => {
                self.presence.set_at_conversation_list(at_list);
                self.state.at_conversation_list = at_list;
                self.emit_state();
            }
            AppAction::RefreshUnreadCount => {
                self.fetch_unread_baseline();
            }
            AppAction::ClearToast => {
                if self.state.toast.is_some() {
                    self.state.toast = None;
                    self.emit_toast();
                }
            }
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::TransportOpened => {
                tracing::info!("transport connected");
                self.set_connection(ConnectionState::Connected);
                self.establish_private_inbox();
                self.fetch_session_info();
                self.fetch_friends();
                self.fetch_unread_baseline();
            }
            InternalEvent::TransportClosed => {
                tracing::info!("transport closed");
                self.registry.clear();
                if let Some(sess) = self.session.as_mut() {
                    sess.transport = None;
                }
                self.set_connection(ConnectionState::Disconnected);
            }
            InternalEvent::TransportFailed { reason } => {
                tracing::error!(%reason, "transport failed");
                self.registry.clear();
                if let Some(sess) = self.session.as_mut() {
                    sess.transport = None;
                }
                self.set_connection(ConnectionState::Failed { reason });
            }
            InternalEvent::FrameReceived {
                destination,
                payload,
            } => match decode::decode_message(&destination, &payload) {
                Ok(message) => self.accept_and_publish(message),
                Err(e) => {
                    // Malformed frames are dropped; the pipeline continues.
                    tracing::warn!(%e, %destination, "frame dropped");
                }
            },
            InternalEvent::SubscribeRejected {
                subscription_id,
                reason,
            } => {
                let err = crate::error::SubscriptionError {
                    subscription_id,
                    reason,
                };
                tracing::warn!(%err, "subscription rejected");
                self.registry.remove_by_id(&err.subscription_id);
                self.state.subscribed_groups = self.registry.active_groups();
                self.emit_state();
            }
            InternalEvent::SendEchoReceived { message } => {
                self.accept_and_publish(message);
            }
            InternalEvent::SendMessageFailed { error } => {
                tracing::warn!(%error, "send failed");
                self.toast(format!("Send failed: {error}"));
            }
            InternalEvent::FriendsFetched { names } => {
                tracing::info!(count = names.len(), "friend name cache loaded");
                let mut cache = match self.friend_names.lock() {
                    Ok(g) => g,
                    Err(poison) => poison.into_inner(),
                };
                cache.extend(names);
            }
            InternalEvent::SessionInfoFetched { user_id } => {
                tracing::info!(%user_id, "session user resolved");
                self.set_local_user(Some(user_id));
            }
            InternalEvent::UnreadCountFetched { count } => {
                if self.state.unread_count != count {
                    self.state.unread_count = count;
                    self.emit_unread();
                }
            }
            InternalEvent::UnreadIncrement => {
                self.state.unread_count += 1;
                self.emit_unread();
            }
            InternalEvent::MessageForUi { message } => {
                self.emit_message(message);
            }
        }
    }
}
