//! Typed event bus
//!
//! Per-subscriber bounded queues with a drop-with-marker overflow policy:
//! a slow subscriber loses events, never blocks the driver, and receives an
//! `EventsDropped` marker with the count once it catches up.

use tokio::sync::mpsc;
use tracing::debug;

use ralph_core::EngineEvent;

struct Subscriber {
    id: String,
    tx: mpsc::Sender<EngineEvent>,
    dropped: u64,
}

pub struct EventBus {
    capacity: usize,
    subs: Vec<Subscriber>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subs: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, id: impl Into<String>) -> mpsc::Receiver<EngineEvent> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subs.push(Subscriber {
            id: id.into(),
            tx,
            dropped: 0,
        });
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subs.len()
    }

    /// Non-blocking fan-out. Disconnected subscribers are pruned.
    pub fn publish(&mut self, event: &EngineEvent) {
        self.subs.retain_mut(|sub| {
            // Owe this subscriber a marker from an earlier overflow?
            if sub.dropped > 0 {
                match sub.tx.try_send(EngineEvent::EventsDropped { count: sub.dropped }) {
                    Ok(()) => sub.dropped = 0,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        // Still behind; this event is lost too.
                        sub.dropped += 1;
                        return true;
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => return false,
                }
            }
            match sub.tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    if sub.dropped == 0 {
                        debug!("subscriber '{}' is lagging, dropping events", sub.id);
                    }
                    sub.dropped += 1;
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ralph_core::EngineState;

    fn state_event() -> EngineEvent {
        EngineEvent::StateChanged {
            from: EngineState::Ready,
            to: EngineState::Selecting,
        }
    }

    #[tokio::test]
    async fn events_arrive_in_order() {
        let mut bus = EventBus::new(16);
        let mut rx = bus.subscribe("test");
        for i in 0..3u64 {
            bus.publish(&EngineEvent::RateLimitCountdown { remaining_secs: i });
        }
        for i in 0..3u64 {
            match rx.recv().await.unwrap() {
                EngineEvent::RateLimitCountdown { remaining_secs } => {
                    assert_eq!(remaining_secs, i)
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn slow_subscriber_gets_marker_not_blockage() {
        let mut bus = EventBus::new(2);
        let mut rx = bus.subscribe("slow");

        for _ in 0..5 {
            bus.publish(&state_event());
        }
        // Queue held 2; 3 were dropped. Drain the queue, then publish again
        // to trigger the marker delivery.
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        bus.publish(&state_event());

        match rx.try_recv().unwrap() {
            EngineEvent::EventsDropped { count } => assert_eq!(count, 3),
            other => panic!("expected marker, got {other:?}"),
        }
        assert!(matches!(
            rx.try_recv().unwrap(),
            EngineEvent::StateChanged { .. }
        ));
    }

    #[tokio::test]
    async fn closed_subscriber_is_pruned() {
        let mut bus = EventBus::new(4);
        let rx = bus.subscribe("gone");
        drop(rx);
        bus.publish(&state_event());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let mut bus = EventBus::new(4);
        let mut a = bus.subscribe("a");
        let mut b = bus.subscribe("b");
        bus.publish(&state_event());
        assert!(a.recv().await.is_some());
        assert!(b.recv().await.is_some());
    }
}
