// Unread counter reconciliation: an authoritative REST baseline, a live
// +1 per broadcast message not authored by the local user, and an explicit
// resync to correct drift after a screen marks messages as read.

use tokio::sync::broadcast::error::RecvError;

use crate::updates::{CoreMsg, InternalEvent};

use super::AppCore;

impl AppCore {
    /// Live increment path: consumes the delivery broadcast and reports each
    /// non-self message back to the actor as a single increment.
    pub(super) fn start_unread_counter(&self) {
        let mut rx = self.message_tx.subscribe();
        let local_user = self.local_user.clone();
        let tx = self.core_sender.clone();

        self.runtime.spawn(async move {
            loop {
                let message = match rx.recv().await {
                    Ok(m) => m,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "unread counter lagged; count may drift low");
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

                // Every pushed message is assumed unread; resync() corrects
                // the approximation against server truth.
                let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::UnreadIncrement)));
            }
        });
    }

    /// Baseline fetch: replaces the local counter with the server's count.
    pub(super) fn fetch_unread_baseline(&self) {
        if !self.network_enabled() {
            return;
        }
        let Some(sess) = self.session.as_ref() else {
            return;
        };
        let api = sess.api.clone();
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            match api.get_unread_count().await {
                Ok(count) => {
                    let _ = tx.send(CoreMsg::Internal(Box::new(
                        InternalEvent::UnreadCountFetched { count },
                    )));
                }
                Err(e) => {
                    tracing::warn!(%e, "unread baseline fetch failed");
                }
            }
        });
    }
}
