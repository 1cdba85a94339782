// Tracks which STOMP subscriptions are live: the once-per-connection private
// inbox plus one entry per joined group. Entries own their subscription id;
// cancelling through the registry is the only way to stop delivery.

use std::collections::HashMap;

use super::stomp;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct SubscriptionHandle {
    pub(super) id: String,
    pub(super) destination: String,
}

#[derive(Default)]
pub(super) struct SubscriptionRegistry {
    inbox: Option<SubscriptionHandle>,
    groups: HashMap<i64, SubscriptionHandle>,
    next_id: u64,
}

impl SubscriptionRegistry {
    fn next_handle(&mut self, destination: String) -> SubscriptionHandle {
        let id = format!("sub-{}", self.next_id);
        self.next_id += 1;
        SubscriptionHandle { id, destination }
    }

    /// Establish the private inbox subscription. Returns the new handle, or
    /// `None` if one is already live.
    pub(super) fn join_inbox(&mut self) -> Option<SubscriptionHandle> {
        if self.inbox.is_some() {
            return None;
        }
        let handle = self.next_handle(stomp::PRIVATE_INBOX.to_string());
        self.inbox = Some(handle.clone());
        Some(handle)
    }

    /// Record a group subscription. Joining an already-subscribed group is a
    /// no-op and returns `None`.
    pub(super) fn join_group(&mut self, group_id: i64) -> Option<SubscriptionHandle> {
        if self.groups.contains_key(&group_id) {
            return None;
        }
        let handle = self.next_handle(stomp::group_topic(group_id));
        self.groups.insert(group_id, handle.clone());
        Some(handle)
    }

    /// Remove a group subscription, returning the handle to cancel on the
    /// wire. Leaving an unsubscribed group is a no-op.
    pub(super) fn leave_group(&mut self, group_id: i64) -> Option<SubscriptionHandle> {
        self.groups.remove(&group_id)
    }

    /// Drop a rejected or cancelled entry by subscription id.
    pub(super) fn remove_by_id(&mut self, subscription_id: &str) {
        if self.inbox.as_ref().map(|h| h.id.as_str()) == Some(subscription_id) {
            self.inbox = None;
            return;
        }
        self.groups.retain(|_, h| h.id != subscription_id);
    }

    /// Invalidate everything. Called when the transport drops: no partial
    /// state where some groups remain subscribed while the socket is down.
    pub(super) fn clear(&mut self) {
        self.inbox = None;
        self.groups.clear();
    }

    pub(super) fn active_groups(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.groups.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub(super) fn is_empty(&self) -> bool {
        self.inbox.is_none() && self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joining_twice_is_a_noop() {
        let mut reg = SubscriptionRegistry::default();
        assert!(reg.join_group(15).is_some());
        assert!(reg.join_group(15).is_none());
        assert_eq!(reg.active_groups(), vec![15]);
    }

    #[test]
    fn join_leave_sequences_track_the_net_set() {
        let mut reg = SubscriptionRegistry::default();
        reg.join_group(1);
        reg.join_group(2);
        reg.join_group(1);
        assert!(reg.leave_group(1).is_some());
        assert!(reg.leave_group(1).is_none());
        reg.join_group(3);
        assert_eq!(reg.active_groups(), vec![2, 3]);
    }

    #[test]
    fn inbox_is_established_once() {
        let mut reg = SubscriptionRegistry::default();
        assert!(reg.join_inbox().is_some());
        assert!(reg.join_inbox().is_none());
    }

    #[test]
    fn clear_invalidates_everything() {
        let mut reg = SubscriptionRegistry::default();
        reg.join_inbox();
        reg.join_group(1);
        reg.join_group(2);
        reg.clear();
        assert!(reg.is_empty());
        // A fresh connect starts from an empty set and can re-join.
        assert!(reg.join_inbox().is_some());
        assert!(reg.join_group(1).is_some());
    }

    #[test]
    fn remove_by_id_targets_the_right_entry() {
        let mut reg = SubscriptionRegistry::default();
        let inbox = reg.join_inbox().unwrap();
        let g15 = reg.join_group(15).unwrap();
        reg.remove_by_id(&g15.id);
        assert_eq!(reg.active_groups(), Vec::<i64>::new());
        reg.remove_by_id(&inbox.id);
        assert!(reg.is_empty());
    }

    #[test]
    fn handles_get_distinct_ids_and_destinations() {
        let mut reg = SubscriptionRegistry::default();
        let a = reg.join_group(7).unwrap();
        let b = reg.join_group(8).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.destination, "/topic/group.7");
        assert_eq!(b.destination, "/topic/group.8");
    }
}
