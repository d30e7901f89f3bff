use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::error::Result;
use crate::signal::ChainSignal;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Named broadcast channels.
///
/// Receivers that fall more than the channel capacity behind lose the oldest
/// messages (`RecvError::Lagged`).
pub struct NotificationPublisher {
    channels: DashMap<String, broadcast::Sender<String>>,
    capacity: usize,
}

impl NotificationPublisher {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Listen on `channel`, creating it on first use.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Send `message` to everyone currently listening on `channel`.
    ///
    /// Returns the number of receivers reached; 0 means the message was
    /// dropped.
    pub fn publish(&self, channel: &str, message: &str) -> usize {
        let reached = match self.channels.get(channel) {
            Some(tx) => tx.send(message.to_string()).unwrap_or(0),
            None => 0,
        };
        if reached == 0 {
            // Forget channels whose listeners have all gone.
            self.channels
                .remove_if(channel, |_, tx| tx.receiver_count() == 0);
        }
        trace!(channel, reached, "published");
        reached
    }

    pub fn notify_chain_start(&self, chain_id: i64, worker_channel: &str) -> Result<usize> {
        self.send_signal(&ChainSignal::start(chain_id), worker_channel)
    }

    pub fn notify_chain_stop(&self, chain_id: i64, worker_channel: &str) -> Result<usize> {
        self.send_signal(&ChainSignal::stop(chain_id), worker_channel)
    }

    fn send_signal(&self, signal: &ChainSignal, worker_channel: &str) -> Result<usize> {
        let reached = self.publish(worker_channel, &signal.to_json()?);
        debug!(
            chain_id = signal.chain_id,
            command = %signal.command,
            worker_channel,
            reached,
            "chain signal sent"
        );
        Ok(reached)
    }
}

impl Default for NotificationPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalCommand;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    #[tokio::test]
    async fn start_signal_reaches_the_worker_channel() {
        let publisher = NotificationPublisher::new();
        let mut worker = publisher.subscribe("etl-1");
        let mut other = publisher.subscribe("etl-2");

        assert_eq!(publisher.notify_chain_start(42, "etl-1").unwrap(), 1);

        let signal = ChainSignal::parse(&worker.recv().await.unwrap()).unwrap();
        assert_eq!(signal.chain_id, 42);
        assert_eq!(signal.command, SignalCommand::Start);
        assert!(matches!(other.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn every_listener_gets_a_copy() {
        let publisher = NotificationPublisher::new();
        let mut a = publisher.subscribe("w");
        let mut b = publisher.subscribe("w");
        assert_eq!(publisher.notify_chain_stop(7, "w").unwrap(), 2);
        assert_eq!(a.recv().await.unwrap(), b.recv().await.unwrap());
    }

    #[test]
    fn nobody_listening_drops_the_message() {
        let publisher = NotificationPublisher::new();
        assert_eq!(publisher.publish("void", "hello"), 0);

        let rx = publisher.subscribe("void");
        drop(rx);
        assert_eq!(publisher.publish("void", "hello"), 0);
        assert!(publisher.channels.is_empty());

        // A late subscriber does not see earlier messages.
        let mut late = publisher.subscribe("void");
        assert!(matches!(late.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn slow_listener_lags() {
        let publisher = NotificationPublisher::with_capacity(2);
        let mut rx = publisher.subscribe("w");
        for i in 0..4 {
            publisher.publish("w", &i.to_string());
        }
        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(2))));
        assert_eq!(rx.recv().await.unwrap(), "2");
    }
}
