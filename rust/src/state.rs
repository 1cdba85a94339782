/// Identifies the conversation a message belongs to: a direct chat keyed by
/// the peer's user id, or a group chat keyed by the group id. Exactly one
/// applies per message.
#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConversationKey {
    Direct { peer_id: String },
    Group { group_id: i64 },
}

#[derive(uniffi::Enum, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed { reason: String },
}

/// Canonical message value produced by the frame decoder and by the REST send
/// echo. `receiver_id` and `group_id` are mutually exclusive; group frames
/// arrive without `group_id` on the wire and get it injected from the topic.
#[derive(uniffi::Record, Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: i64,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub receiver_id: Option<String>,
    pub group_id: Option<i64>,
    pub content: String,
    pub sent_at: String,
    pub is_read: bool,
}

impl ChatMessage {
    /// Canonical conversation matching rule: payload-derived. A set `group_id`
    /// wins; otherwise the peer is the sender for inbound messages and the
    /// receiver for messages we authored ourselves (send echoes).
    ///
    /// Returns `None` for a self-authored message with no receiver, which
    /// violates the one-conversation-per-message invariant and is dropped.
    pub fn conversation_key_for(&self, my_user_id: Option<&str>) -> Option<ConversationKey> {
        if let Some(group_id) = self.group_id {
            return Some(ConversationKey::Group { group_id });
        }
        match my_user_id {
            Some(me) if me == self.sender_id => self
                .receiver_id
                .clone()
                .map(|peer_id| ConversationKey::Direct { peer_id }),
            _ => Some(ConversationKey::Direct {
                peer_id: self.sender_id.clone(),
            }),
        }
    }
}

#[derive(uniffi::Record, Clone, Debug)]
pub struct AppState {
    pub rev: u64,
    pub connection: ConnectionState,
    pub unread_count: i64,
    pub is_foreground: bool,
    pub active_conversation: Option<ConversationKey>,
    pub at_conversation_list: bool,
    pub subscribed_groups: Vec<i64>,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            connection: ConnectionState::Disconnected,
            unread_count: 0,
            is_foreground: false,
            active_conversation: None,
            at_conversation_list: false,
            subscribed_groups: vec![],
            toast: None,
        }
    }
}
