/// In-process broadcast of ban signals to open event streams
use super::BanSignal;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct SignalHub {
    tx: broadcast::Sender<BanSignal>,
}

impl SignalHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BanSignal> {
        self.tx.subscribe()
    }

    /// Publish to every current subscriber; returns how many received it.
    /// Having no subscribers is not an error.
    pub fn publish(&self, signal: BanSignal) -> usize {
        self.tx.send(signal).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::SignalStatus;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let hub = SignalHub::new(8);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        let delivered = hub.publish(BanSignal::new("user_1", SignalStatus::Banned, None));
        assert_eq!(delivered, 2);

        assert_eq!(a.recv().await.unwrap().user_id, "user_1");
        assert_eq!(b.recv().await.unwrap().status, SignalStatus::Banned);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let hub = SignalHub::new(8);
        assert_eq!(hub.publish(BanSignal::new("user_1", SignalStatus::Active, None)), 0);
        assert_eq!(hub.subscriber_count(), 0);
    }
}
