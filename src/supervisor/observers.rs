//! State-change observers.
//!
//! Observers run synchronously on the transitioning task. A panicking observer is caught and
//! logged; the remaining observers still run.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::ProcessState;

type Callback = Arc<dyn Fn(ProcessState) + Send + Sync>;

/// Handle returned by subscribe, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

#[derive(Default)]
pub(crate) struct ObserverList {
    next_id: AtomicU64,
    entries: Mutex<Vec<(Subscription, Callback)>>,
}

impl ObserverList {
    pub(crate) fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(ProcessState) + Send + Sync + 'static,
    {
        let subscription = Subscription(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((subscription, Arc::new(callback)));
        subscription
    }

    pub(crate) fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(s, _)| *s != subscription);
        entries.len() != before
    }

    pub(crate) fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Invoke every observer with `state`.
    ///
    /// Runs on a snapshot so callbacks may subscribe or unsubscribe.
    pub(crate) fn notify(&self, state: ProcessState) {
        let snapshot: Vec<Callback> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        for callback in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(state))).is_err() {
                log::warn!("State observer panicked on transition to {}", state);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(list: &ObserverList) -> (Subscription, Arc<Mutex<Vec<ProcessState>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = list.subscribe(move |state| sink.lock().unwrap().push(state));
        (subscription, seen)
    }

    #[test]
    fn test_notify_in_subscription_order() {
        let list = ObserverList::default();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let order = Arc::clone(&order);
            list.subscribe(move |_| order.lock().unwrap().push(tag));
        }
        list.notify(ProcessState::Running);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_panicking_observer_isolated() {
        let list = ObserverList::default();
        list.subscribe(|_| panic!("observer failure"));
        let (_, seen) = recorder(&list);

        list.notify(ProcessState::Starting);
        list.notify(ProcessState::Error);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ProcessState::Starting, ProcessState::Error]
        );
    }

    #[test]
    fn test_unsubscribe() {
        let list = ObserverList::default();
        let (subscription, seen) = recorder(&list);
        list.notify(ProcessState::Running);
        assert!(list.unsubscribe(subscription));
        assert!(!list.unsubscribe(subscription));
        list.notify(ProcessState::Stopped);
        assert_eq!(*seen.lock().unwrap(), vec![ProcessState::Running]);
    }

    #[test]
    fn test_clear() {
        let list = ObserverList::default();
        let (_, first) = recorder(&list);
        let (second_subscription, second) = recorder(&list);
        list.clear();
        list.notify(ProcessState::Running);
        assert!(first.lock().unwrap().is_empty());
        assert!(second.lock().unwrap().is_empty());
        assert!(!list.unsubscribe(second_subscription));
    }
}
