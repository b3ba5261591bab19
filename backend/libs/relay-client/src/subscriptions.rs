/// Subscription table: event kind -> callbacks
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use relay_protocol::{EventKind, ServerMessage};

/// Callback invoked with every notification of the kind it is registered for
pub type Callback = Arc<dyn Fn(&ServerMessage) + Send + Sync>;

/// Identifies one registration, for [`SubscriptionManager::cancel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    callback: Callback,
}

fn same_callback(a: &Callback, b: &Callback) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

#[derive(Clone, Default)]
pub struct SubscriptionManager {
    table: Arc<DashMap<EventKind, Vec<Subscriber>>>,
    next_id: Arc<AtomicU64>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `callback` to the set for `kind`.
    ///
    /// Callbacks for a kind are kept in registration order. Registering the
    /// same callback (the same `Arc`) twice keeps a single entry and returns
    /// the id of the first registration.
    pub fn subscribe(&self, kind: EventKind, callback: Callback) -> SubscriptionId {
        let mut subscribers = self.table.entry(kind).or_default();

        if let Some(existing) = subscribers
            .iter()
            .find(|s| same_callback(&s.callback, &callback))
        {
            return existing.id;
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        subscribers.push(Subscriber { id, callback });
        id
    }

    /// Remove every callback registered for `kind`, including ones other
    /// components registered. Returns how many were removed.
    pub fn unsubscribe(&self, kind: EventKind) -> usize {
        self.table
            .remove(&kind)
            .map(|(_, subscribers)| subscribers.len())
            .unwrap_or(0)
    }

    /// Remove only the registration `id`; other callbacks for the same kind stay
    pub fn cancel(&self, id: SubscriptionId) -> bool {
        let mut removed = false;
        for mut entry in self.table.iter_mut() {
            let before = entry.len();
            entry.retain(|s| s.id != id);
            removed |= entry.len() != before;
        }
        self.table.retain(|_, subscribers| !subscribers.is_empty());
        removed
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.table.get(&kind).map(|s| s.len()).unwrap_or(0)
    }

    /// Invoke, in registration order, every callback registered for the
    /// message's kind. Control messages are never dispatched. Returns the
    /// number of callbacks invoked.
    pub fn dispatch(&self, message: &ServerMessage) -> usize {
        let kind = message.kind();
        if !kind.is_notification() {
            return 0;
        }

        // Clone out so callbacks may (un)subscribe without deadlocking the shard.
        let callbacks: Vec<Callback> = self
            .table
            .get(&kind)
            .map(|subscribers| subscribers.iter().map(|s| s.callback.clone()).collect())
            .unwrap_or_default();

        for callback in &callbacks {
            callback(message);
        }
        callbacks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_protocol::ReferralLevel;
    use relay_protocol::UserId;
    use std::sync::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Callback {
        let log = log.clone();
        Arc::new(move |_msg: &ServerMessage| log.lock().unwrap().push(name))
    }

    #[test]
    fn test_two_callbacks_invoked_once_in_order() {
        let manager = SubscriptionManager::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        manager.subscribe(EventKind::EarningUpdate, recorder(&log, "widget"));
        manager.subscribe(EventKind::EarningUpdate, recorder(&log, "analytics"));

        let invoked = manager.dispatch(&ServerMessage::earning_update(125.0, "Purchase by X"));

        assert_eq!(invoked, 2);
        assert_eq!(*log.lock().unwrap(), vec!["widget", "analytics"]);
    }

    #[test]
    fn test_dispatch_only_matching_kind() {
        let manager = SubscriptionManager::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        manager.subscribe(EventKind::ReferralJoined, recorder(&log, "joined"));
        manager.dispatch(&ServerMessage::earning_update(1.0, "x"));
        assert!(log.lock().unwrap().is_empty());

        manager.dispatch(&ServerMessage::referral_joined("Ravi", ReferralLevel::Direct));
        assert_eq!(*log.lock().unwrap(), vec!["joined"]);
    }

    #[test]
    fn test_control_messages_not_dispatched() {
        let manager = SubscriptionManager::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for kind in EventKind::NOTIFICATIONS {
            manager.subscribe(kind, recorder(&log, "any"));
        }

        assert_eq!(manager.dispatch(&ServerMessage::connected(UserId::new("userA").unwrap())), 0);
        assert_eq!(manager.dispatch(&ServerMessage::heartbeat_response()), 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_same_callback_twice_then_unsubscribe_once() {
        let manager = SubscriptionManager::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let callback = recorder(&log, "widget");

        let first = manager.subscribe(EventKind::PurchaseCompleted, callback.clone());
        let second = manager.subscribe(EventKind::PurchaseCompleted, callback);
        assert_eq!(first, second);
        assert_eq!(manager.subscriber_count(EventKind::PurchaseCompleted), 1);

        let message =
            ServerMessage::purchase_completed("Meera", 2000.0, 100.0, ReferralLevel::Direct);
        assert_eq!(manager.dispatch(&message), 1);

        assert_eq!(manager.unsubscribe(EventKind::PurchaseCompleted), 1);
        assert_eq!(manager.dispatch(&message), 0);
        assert_eq!(*log.lock().unwrap(), vec!["widget"]);
    }

    #[test]
    fn test_unsubscribe_removes_all_callbacks_of_kind() {
        let manager = SubscriptionManager::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        manager.subscribe(EventKind::EarningUpdate, recorder(&log, "widget"));
        manager.subscribe(EventKind::EarningUpdate, recorder(&log, "analytics"));
        manager.subscribe(EventKind::ReferralJoined, recorder(&log, "joined"));

        assert_eq!(manager.unsubscribe(EventKind::EarningUpdate), 2);
        assert_eq!(manager.unsubscribe(EventKind::EarningUpdate), 0);
        assert_eq!(manager.subscriber_count(EventKind::ReferralJoined), 1);
    }

    #[test]
    fn test_cancel_removes_only_one_registration() {
        let manager = SubscriptionManager::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let widget = manager.subscribe(EventKind::EarningUpdate, recorder(&log, "widget"));
        manager.subscribe(EventKind::EarningUpdate, recorder(&log, "analytics"));

        assert!(manager.cancel(widget));
        assert!(!manager.cancel(widget));

        manager.dispatch(&ServerMessage::earning_update(1.0, "x"));
        assert_eq!(*log.lock().unwrap(), vec!["analytics"]);
    }

    #[test]
    fn test_callback_may_unsubscribe_during_dispatch() {
        let manager = SubscriptionManager::new();
        let inner = manager.clone();
        let callback: Callback = Arc::new(move |_msg: &ServerMessage| {
            inner.unsubscribe(EventKind::EarningUpdate);
        });

        manager.subscribe(EventKind::EarningUpdate, callback);
        assert_eq!(manager.dispatch(&ServerMessage::earning_update(1.0, "x")), 1);
        assert_eq!(manager.subscriber_count(EventKind::EarningUpdate), 0);
    }
}
