//! Ordered event channels with explicit subscription handles

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

type Callback<T> = Box<dyn FnMut(&T)>;

/// Broadcast channel. Subscribers run in registration order; a subscriber that
/// panics is logged and skipped without stopping the rest of the dispatch.
pub struct EventChannel<T: ?Sized> {
    name: &'static str,
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Callback<T>)>,
}

impl<T: ?Sized> EventChannel<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: 0,
            subscribers: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, callback: impl FnMut(&T) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Returns `false` when the handle was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        self.subscribers.len() != before
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Delivers `event` to every subscriber and returns how many returned
    /// normally.
    pub fn emit(&mut self, event: &T) -> usize {
        let mut delivered = 0;
        for (id, callback) in &mut self.subscribers {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    error!(
                        channel = self.name,
                        subscription = id.0,
                        reason = panic_message(payload.as_ref()),
                        "subscriber_failed"
                    );
                }
            }
        }
        delivered
    }
}

impl<T: ?Sized> Default for EventChannel<T> {
    fn default() -> Self {
        Self::new("unnamed")
    }
}

impl<T: ?Sized> fmt::Debug for EventChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("name", &self.name)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
