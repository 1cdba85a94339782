// Process-wide presence flags, mutated by UI lifecycle actions on the actor
// and read by the notification dispatcher on its own task. One mutex, held
// only for the read or mutate, never across I/O.

use std::sync::Mutex;

use crate::state::ConversationKey;

#[derive(Clone, Debug, Default)]
pub(super) struct PresenceState {
    pub(super) is_foreground: bool,
    pub(super) active_conversation: Option<ConversationKey>,
    pub(super) at_conversation_list: bool,
}

#[derive(Default)]
pub(super) struct PresenceStore {
    inner: Mutex<PresenceState>,
}

impl PresenceStore {
    fn with<R>(&self, f: impl FnOnce(&mut PresenceState) -> R) -> R {
        let mut guard = match self.inner.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        f(&mut guard)
    }

    pub(super) fn set_foreground(&self, foreground: bool) {
        self.with(|p| p.is_foreground = foreground);
    }

    pub(super) fn set_active_conversation(&self, key: Option<ConversationKey>) {
        self.with(|p| p.active_conversation = key);
    }

    pub(super) fn set_at_conversation_list(&self, at_list: bool) {
        self.with(|p| p.at_conversation_list = at_list);
    }

    pub(super) fn snapshot(&self) -> PresenceState {
        self.with(|p| p.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutations_are_visible_in_the_next_snapshot() {
        let store = PresenceStore::default();
        assert!(!store.snapshot().is_foreground);

        store.set_foreground(true);
        store.set_at_conversation_list(true);
        store.set_active_conversation(Some(ConversationKey::Group { group_id: 9 }));

        let snap = store.snapshot();
        assert!(snap.is_foreground);
        assert!(snap.at_conversation_list);
        assert_eq!(
            snap.active_conversation,
            Some(ConversationKey::Group { group_id: 9 })
        );

        store.set_active_conversation(None);
        assert_eq!(store.snapshot().active_conversation, None);
    }
}
