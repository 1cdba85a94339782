// Two delivery paths can hand the actor the same message: the HTTP send
// response (optimistic echo) and the push channel. The ledger keeps a bounded
// window of recently seen ids per conversation so exactly one path wins.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use crate::state::ConversationKey;

const WINDOW_CAP: usize = 64;

#[derive(Default)]
struct Window {
    seen: HashSet<i64>,
    order: VecDeque<i64>,
}

impl Window {
    fn record(&mut self, id: i64) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > WINDOW_CAP {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }
}

#[derive(Default)]
pub(super) struct DedupLedger {
    windows: Mutex<HashMap<ConversationKey, Window>>,
}

impl DedupLedger {
    /// Returns true and records the id on first sight within the window;
    /// false on any subsequent sight.
    pub(super) fn should_accept(&self, key: &ConversationKey, message_id: i64) -> bool {
        let mut windows = match self.windows.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        windows.entry(key.clone()).or_default().record(message_id)
    }

    pub(super) fn clear(&self) {
        let mut windows = match self.windows.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        windows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct(peer: &str) -> ConversationKey {
        ConversationKey::Direct {
            peer_id: peer.to_string(),
        }
    }

    #[test]
    fn first_sight_accepts_second_rejects() {
        let ledger = DedupLedger::default();
        let key = direct("bob");
        assert!(ledger.should_accept(&key, 42));
        assert!(!ledger.should_accept(&key, 42));
        assert!(!ledger.should_accept(&key, 42));
    }

    #[test]
    fn windows_are_scoped_per_conversation() {
        let ledger = DedupLedger::default();
        assert!(ledger.should_accept(&direct("bob"), 42));
        assert!(ledger.should_accept(&direct("carol"), 42));
        assert!(ledger.should_accept(&ConversationKey::Group { group_id: 42 }, 42));
    }

    #[test]
    fn oldest_entry_is_evicted_at_capacity() {
        let ledger = DedupLedger::default();
        let key = direct("bob");
        for id in 0..=WINDOW_CAP as i64 {
            assert!(ledger.should_accept(&key, id));
        }
        // id 0 fell out of the window and would be accepted again.
        assert!(ledger.should_accept(&key, 0));
        // A recent id is still tracked.
        assert!(!ledger.should_accept(&key, WINDOW_CAP as i64));
    }

    #[test]
    fn exactly_one_of_two_paths_wins_regardless_of_order() {
        for echo_first in [true, false] {
            let ledger = DedupLedger::default();
            let key = direct("bob");
            let (first, second) = if echo_first {
                ("echo", "push")
            } else {
                ("push", "echo")
            };
            let mut accepted = vec![];
            if ledger.should_accept(&key, 7) {
                accepted.push(first);
            }
            if ledger.should_accept(&key, 7) {
                accepted.push(second);
            }
            assert_eq!(accepted.len(), 1, "exactly one path must win");
            assert_eq!(accepted[0], first);
        }
    }
}
