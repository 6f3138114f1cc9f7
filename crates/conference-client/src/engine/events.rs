//! Typed event channel between an engine and its listeners.
//!
//! An engine owns one [`EventChannel`] per event family and publishes into
//! it. Each listener holds a [`Subscription`]; cancelling its
//! [`SubscriptionHandle`] (or dropping the subscription) unsubscribes it.
//! Delivery is FIFO per subscription and never coalesced, so the channels are
//! unbounded: an engine event must not be dropped for backpressure.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Subscriber<E> {
    sender: mpsc::UnboundedSender<E>,
    token: CancellationToken,
}

/// Publisher side of a typed event stream.
pub struct EventChannel<E> {
    subscribers: Vec<Subscriber<E>>,
}

impl<E> Default for EventChannel<E> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }
}

impl<E: Clone> EventChannel<E> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new listener.
    pub fn subscribe(&mut self) -> Subscription<E> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        self.subscribers.push(Subscriber {
            sender,
            token: token.clone(),
        });
        Subscription {
            receiver,
            handle: SubscriptionHandle { token },
        }
    }

    /// Deliver `event` to every live subscriber, pruning cancelled ones.
    ///
    /// Returns the number of subscribers the event was delivered to.
    pub fn publish(&mut self, event: E) -> usize {
        self.subscribers
            .retain(|s| !s.token.is_cancelled() && !s.sender.is_closed());

        let mut delivered = 0;
        for subscriber in &self.subscribers {
            if subscriber.sender.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&mut self) -> usize {
        self.subscribers
            .retain(|s| !s.token.is_cancelled() && !s.sender.is_closed());
        self.subscribers.len()
    }
}

/// Cancellation handle for a [`Subscription`].
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    token: CancellationToken,
}

impl SubscriptionHandle {
    /// Stop delivery. Events already queued are discarded.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Listener side of a typed event stream.
pub struct Subscription<E> {
    receiver: mpsc::UnboundedReceiver<E>,
    handle: SubscriptionHandle,
}

impl<E> Subscription<E> {
    /// Wait for the next event.
    ///
    /// Returns `None` once the subscription is cancelled or the engine has
    /// dropped its channel.
    pub async fn recv(&mut self) -> Option<E> {
        if self.handle.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            () = self.handle.token.cancelled() => None,
            event = self.receiver.recv() => event,
        }
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<E> {
        if self.handle.is_cancelled() {
            return None;
        }
        self.receiver.try_recv().ok()
    }

    #[must_use]
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle.clone()
    }

    pub fn unsubscribe(&self) {
        self.handle.cancel();
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.handle.is_cancelled()
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_delivered_in_order() {
        let mut channel = EventChannel::new();
        let mut sub = channel.subscribe();

        channel.publish(1);
        channel.publish(2);
        channel.publish(3);

        assert_eq!(sub.recv().await, Some(1));
        assert_eq!(sub.recv().await, Some(2));
        assert_eq!(sub.recv().await, Some(3));
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_event() {
        let mut channel = EventChannel::new();
        let mut first = channel.subscribe();
        let mut second = channel.subscribe();

        assert_eq!(channel.publish("joined"), 2);
        assert_eq!(first.recv().await, Some("joined"));
        assert_eq!(second.recv().await, Some("joined"));
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let mut channel = EventChannel::new();
        let mut sub = channel.subscribe();
        let handle = sub.handle();

        handle.cancel();
        assert_eq!(channel.publish(7), 0);
        assert_eq!(channel.subscriber_count(), 0);
        assert_eq!(sub.recv().await, None);
        assert!(!sub.is_active());
    }

    #[test]
    fn test_drop_unsubscribes() {
        let mut channel: EventChannel<u8> = EventChannel::new();
        let sub = channel.subscribe();
        assert_eq!(channel.subscriber_count(), 1);

        drop(sub);
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[test]
    fn test_try_recv_returns_queued_event() {
        let mut channel = EventChannel::new();
        let mut sub = channel.subscribe();
        assert_eq!(sub.try_recv(), None);

        channel.publish('a');
        assert_eq!(sub.try_recv(), Some('a'));
    }
}
