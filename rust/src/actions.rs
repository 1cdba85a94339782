use crate::state::ConversationKey;

#[derive(uniffi::Enum, Debug, Clone)]
pub enum AppAction {
    // Connection lifecycle
    Connect { token: String },
    Disconnect,

    // Conversation subscriptions
    JoinGroup { group_id: i64 },
    LeaveGroup { group_id: i64 },

    // Messaging
    SendMessage { to: ConversationKey, content: String },
    MarkConversationRead { key: ConversationKey },

    // Presence (UI lifecycle)
    SetForeground { foreground: bool },
    SetActiveConversation { key: Option<ConversationKey> },
    SetAtConversationList { at_list: bool },

    // Unread counter
    RefreshUnreadCount,

    // UI
    ClearToast,
}

impl AppAction {
    /// Log-safe action tag (never includes the bearer token or message text).
    pub fn tag(&self) -> &'static str {
        match self {
            AppAction::Connect { .. } => "Connect",
            AppAction::Disconnect => "Disconnect",
            AppAction::JoinGroup { .. } => "JoinGroup",
            AppAction::LeaveGroup { .. } => "LeaveGroup",
            AppAction::SendMessage { .. } => "SendMessage",
            AppAction::MarkConversationRead { .. } => "MarkConversationRead",
            AppAction::SetForeground { .. } => "SetForeground",
            AppAction::SetActiveConversation { .. } => "SetActiveConversation",
            AppAction::SetAtConversationList { .. } => "SetAtConversationList",
            AppAction::RefreshUnreadCount => "RefreshUnreadCount",
            AppAction::ClearToast => "ClearToast",
        }
    }
}
