mod actions;
mod core;
mod error;
mod logging;
mod state;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

pub use actions::AppAction;
pub use error::*;
pub use state::*;
pub use updates::*;

uniffi::setup_scaffolding!();

#[uniffi::export(callback_interface)]
pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

/// Platform-side hook for posting OS notifications. Returns false when the
/// platform declined to show it (missing permission, channel disabled).
#[uniffi::export(callback_interface)]
pub trait NotificationSink: Send + Sync + 'static {
    fn notify(&self, title: String, body: String) -> bool;
}

type SharedNotificationSink = Arc<RwLock<Option<Arc<dyn NotificationSink>>>>;

#[derive(uniffi::Object)]
pub struct FfiApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
    notification_sink: SharedNotificationSink,
}

#[uniffi::export]
impl FfiApp {
    #[uniffi::constructor]
    pub fn new(data_dir: String) -> Arc<Self> {
        logging::init_logging(&data_dir);
        tracing::info!(data_dir = %data_dir, "FfiApp::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));
        let notification_sink: SharedNotificationSink = Arc::new(RwLock::new(None));

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        let sink_for_core = notification_sink.clone();
        thread::spawn(move || {
            let mut core = crate::core::AppCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                shared_for_core,
                sink_for_core,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
            notification_sink,
        })
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }

    pub fn set_notification_sink(&self, sink: Box<dyn NotificationSink>) {
        let sink: Arc<dyn NotificationSink> = Arc::from(sink);
        match self.notification_sink.write() {
            Ok(mut slot) => {
                *slot = Some(sink);
            }
            Err(poison) => {
                *poison.into_inner() = Some(sink);
            }
        }
    }
}

impl FfiApp {
    pub fn inject_transport_opened_for_tests(&self) {
        let _ = self
            .core_tx
            .send(CoreMsg::Internal(Box::new(InternalEvent::TransportOpened)));
    }

    pub fn inject_transport_closed_for_tests(&self) {
        let _ = self
            .core_tx
            .send(CoreMsg::Internal(Box::new(InternalEvent::TransportClosed)));
    }

    pub fn inject_transport_failed_for_tests(&self, reason: String) {
        let _ = self.core_tx.send(CoreMsg::Internal(Box::new(
            InternalEvent::TransportFailed { reason },
        )));
    }

    pub fn inject_subscribe_rejected_for_tests(&self, subscription_id: String, reason: String) {
        let _ = self.core_tx.send(CoreMsg::Internal(Box::new(
            InternalEvent::SubscribeRejected {
                subscription_id,
                reason,
            },
        )));
    }

    pub fn inject_frame_for_tests(&self, destination: String, payload: String) {
        let _ = self
            .core_tx
            .send(CoreMsg::Internal(Box::new(InternalEvent::FrameReceived {
                destination,
                payload,
            })));
    }

    pub fn inject_echo_for_tests(&self, message: ChatMessage) {
        let _ = self.core_tx.send(CoreMsg::Internal(Box::new(
            InternalEvent::SendEchoReceived { message },
        )));
    }

    pub fn inject_session_user_for_tests(&self, user_id: String) {
        let _ = self.core_tx.send(CoreMsg::Internal(Box::new(
            InternalEvent::SessionInfoFetched { user_id },
        )));
    }

    pub fn inject_friends_for_tests(&self, names: Vec<(String, String)>) {
        let _ = self
            .core_tx
            .send(CoreMsg::Internal(Box::new(InternalEvent::FriendsFetched {
                names,
            })));
    }

    pub fn inject_unread_count_for_tests(&self, count: i64) {
        let _ = self.core_tx.send(CoreMsg::Internal(Box::new(
            InternalEvent::UnreadCountFetched { count },
        )));
    }
}
