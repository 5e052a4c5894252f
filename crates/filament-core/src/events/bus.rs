use tokio::sync::broadcast;
use tracing::trace;

use super::types::TerminalEvent;

/// Broadcast fan-out from the core to its observers.
///
/// Sends never block and never fail the sender: with no subscribers the
/// event is simply dropped. No locks are held while sending.
#[derive(Clone)]
pub struct EventBus {
    event_tx: broadcast::Sender<TerminalEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self { event_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TerminalEvent> {
        self.event_tx.subscribe()
    }

    pub fn send(&self, event: TerminalEvent) {
        trace!(?event, "terminal event");
        let _ = self.event_tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filament_common::types::Size;

    #[tokio::test]
    async fn broadcast_reaches_all_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.send(TerminalEvent::Resized(Size::new(80, 24)));

        assert!(matches!(rx1.recv().await, Ok(TerminalEvent::Resized(_))));
        assert!(matches!(rx2.recv().await, Ok(TerminalEvent::Resized(_))));
    }

    #[test]
    fn send_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.send(TerminalEvent::Bell);
    }
}
