// Notification decisions. One long-lived broadcast consumer applies the
// suppression rule against the presence store and resolves a display title
// from the friend-name cache before crossing the platform callback boundary.

use tokio::sync::broadcast::error::RecvError;

use crate::state::{ChatMessage, ConversationKey};

use super::presence::PresenceState;
use super::AppCore;

const FALLBACK_TITLE: &str = "New message";

/// Suppress when the user is already looking at the relevant content: app in
/// foreground and either this conversation is open or the conversation list
/// is showing. A backgrounded app always notifies.
pub(super) fn should_suppress(presence: &PresenceState, key: &ConversationKey) -> bool {
    presence.is_foreground
        && (presence.active_conversation.as_ref() == Some(key) || presence.at_conversation_list)
}

/// Title preference: cached friend name, then the sender name embedded in
/// the payload, then a generic label.
pub(super) fn resolve_title(
    names: &std::collections::HashMap<String, String>,
    message: &ChatMessage,
) -> String {
    if let Some(name) = names.get(&message.sender_id) {
        return name.clone();
    }
    match message.sender_name.as_deref() {
        Some(name) if !name.trim().is_empty() => name.to_string(),
        _ => FALLBACK_TITLE.to_string(),
    }
}

impl AppCore {
    /// The only component that crosses the OS "show notification" boundary.
    pub(super) fn start_notification_dispatcher(&self) {
        let mut rx = self.message_tx.subscribe();
        let presence = self.presence.clone();
        let friend_names = self.friend_names.clone();
        let local_user = self.local_user.clone();
        let sink_slot = self.notification_sink.clone();

        self.runtime.spawn(async move {
            loop {
                let message = match rx.recv().await {
                    Ok(m) => m,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "notification dispatcher lagged; events dropped");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                let me = match local_user.read() {
                    Ok(g) => g.clone(),
                    Err(poison) => poison.into_inner().clone(),
                };
                if me.as_deref() == Some(message.sender_id.as_str()) {
                    continue;
                }
                let Some(key) = message.conversation_key_for(me.as_deref()) else {
                    continue;
                };

                if should_suppress(&presence.snapshot(), &key) {
                    tracing::debug!(message_id = message.id, "notification suppressed");
                    continue;
                }

                let title = {
                    let names = match friend_names.lock() {
                        Ok(g) => g,
                        Err(poison) => poison.into_inner(),
                    };
                    resolve_title(&names, &message)
                };

                let sink = match sink_slot.read() {
                    Ok(g) => g.clone(),
                    Err(poison) => poison.into_inner().clone(),
                };
                let Some(sink) = sink else {
                    tracing::debug!("no notification sink registered");
                    continue;
                };

                // A false return means the OS denied delivery (e.g. missing
                // permission); the message is missed, never fatal.
                if !sink.notify(title, message.content.clone()) {
                    tracing::debug!(message_id = message.id, "notification delivery declined");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn presence(
        foreground: bool,
        active: Option<ConversationKey>,
        at_list: bool,
    ) -> PresenceState {
        PresenceState {
            is_foreground: foreground,
            active_conversation: active,
            at_conversation_list: at_list,
        }
    }

    fn direct(peer: &str) -> ConversationKey {
        ConversationKey::Direct {
            peer_id: peer.to_string(),
        }
    }

    #[test]
    fn foreground_with_conversation_open_suppresses() {
        let p = presence(true, Some(direct("alice")), false);
        assert!(should_suppress(&p, &direct("alice")));
        assert!(!should_suppress(&p, &direct("bob")));
    }

    #[test]
    fn foreground_at_conversation_list_suppresses_everything() {
        let p = presence(true, None, true);
        assert!(should_suppress(&p, &direct("alice")));
        assert!(should_suppress(&p, &ConversationKey::Group { group_id: 3 }));
    }

    #[test]
    fn background_overrides_active_conversation() {
        let p = presence(false, Some(direct("alice")), true);
        assert!(!should_suppress(&p, &direct("alice")));
    }

    #[test]
    fn title_resolution_order() {
        let mut names = HashMap::new();
        names.insert("u1".to_string(), "Xiao Li".to_string());

        let mut msg = ChatMessage {
            id: 1,
            sender_id: "u1".to_string(),
            sender_name: Some("li_wire".to_string()),
            receiver_id: Some("me".to_string()),
            group_id: None,
            content: "hi".to_string(),
            sent_at: String::new(),
            is_read: false,
        };
        assert_eq!(resolve_title(&names, &msg), "Xiao Li");

        msg.sender_id = "u2".to_string();
        assert_eq!(resolve_title(&names, &msg), "li_wire");

        msg.sender_name = None;
        assert_eq!(resolve_title(&names, &msg), FALLBACK_TITLE);

        msg.sender_name = Some("   ".to_string());
        assert_eq!(resolve_title(&names, &msg), FALLBACK_TITLE);
    }
}
