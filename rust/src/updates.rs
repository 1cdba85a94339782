use crate::state::{AppState, ChatMessage, ConnectionState};
use crate::AppAction;

#[derive(uniffi::Enum, Clone, Debug)]
pub enum AppUpdate {
    FullState(AppState),
    ConnectionChanged {
        rev: u64,
        connection: ConnectionState,
    },
    MessageReceived {
        rev: u64,
        message: ChatMessage,
    },
    UnreadCountChanged {
        rev: u64,
        count: i64,
    },
    ToastChanged {
        rev: u64,
        toast: Option<String>,
    },
}

impl AppUpdate {
    pub fn rev(&self) -> u64 {
        match self {
            AppUpdate::FullState(s) => s.rev,
            AppUpdate::ConnectionChanged { rev, .. } => *rev,
            AppUpdate::MessageReceived { rev, .. } => *rev,
            AppUpdate::UnreadCountChanged { rev, .. } => *rev,
            AppUpdate::ToastChanged { rev, .. } => *rev,
        }
    }
}

#[derive(Debug)]
pub enum CoreMsg {
    Action(AppAction),
    Internal(Box<InternalEvent>),
}

#[derive(Debug)]
pub enum InternalEvent {
    // Transport lifecycle (emitted by the websocket task)
    TransportOpened,
    TransportClosed,
    TransportFailed {
        reason: String,
    },

    // Raw push frame: STOMP destination plus the JSON body.
    FrameReceived {
        destination: String,
        payload: String,
    },
    SubscribeRejected {
        subscription_id: String,
        reason: String,
    },

    // REST results
    SendEchoReceived {
        message: ChatMessage,
    },
    SendMessageFailed {
        error: String,
    },
    FriendsFetched {
        // (user_id, display name)
        names: Vec<(String, String)>,
    },
    SessionInfoFetched {
        user_id: String,
    },
    UnreadCountFetched {
        count: i64,
    },

    // Broadcast consumers reporting back to the actor
    UnreadIncrement,
    MessageForUi {
        message: ChatMessage,
    },
}
