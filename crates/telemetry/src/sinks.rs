//! Stock telemetry sinks.

use membound_core::{StatsSnapshot, TelemetrySink};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Discards every snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn publish(&self, _snapshot: &StatsSnapshot) {}
}

/// Emits each snapshot as a structured `debug!` event.
#[derive(Debug, Clone)]
pub struct TracingSink {
    session: String,
}

impl TracingSink {
    pub fn new(session: impl Into<String>) -> Self {
        Self {
            session: session.into(),
        }
    }
}

impl TelemetrySink for TracingSink {
    fn publish(&self, s: &StatsSnapshot) {
        tracing::debug!(
            session = %self.session,
            tokens_seen = s.tokens_seen,
            tokens_retained = s.tokens_retained,
            evictions = s.evictions,
            compressions = s.compressions,
            compression_ratio = s.compression_ratio,
            policy_calls = s.policy_calls,
            policy_fallbacks = s.policy_fallbacks,
            policy_latency_us = ?s.policy_latency_us,
            "context stats"
        );
    }
}

/// Broadcasts snapshots to any number of live subscribers.
///
/// Subscribers that lag behind lose the oldest snapshots; with no
/// subscribers at all the snapshot is dropped.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<StatsSnapshot>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatsSnapshot> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(256)
    }
}

impl TelemetrySink for BroadcastSink {
    fn publish(&self, snapshot: &StatsSnapshot) {
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(snapshot.clone());
    }
}

/// Forwards each snapshot to several sinks in order.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl TelemetrySink for FanoutSink {
    fn publish(&self, snapshot: &StatsSnapshot) {
        for sink in &self.sinks {
            sink.publish(snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MetricsCollector;

    fn snapshot(seen: u64, retained: u64) -> StatsSnapshot {
        StatsSnapshot {
            tokens_seen: seen,
            tokens_retained: retained,
            evictions: 0,
            compressions: 0,
            compression_ratio: retained as f64 / seen as f64,
            policy_calls: 0,
            policy_fallbacks: 0,
            policy_latency_us: None,
        }
    }

    #[tokio::test]
    async fn broadcast_delivers_to_subscribers() {
        let sink = BroadcastSink::new(8);
        let mut rx = sink.subscribe();
        assert_eq!(sink.subscriber_count(), 1);

        sink.publish(&snapshot(10, 10));
        sink.publish(&snapshot(20, 15));

        assert_eq!(rx.recv().await.unwrap().tokens_seen, 10);
        assert_eq!(rx.recv().await.unwrap().tokens_retained, 15);
    }

    #[test]
    fn broadcast_without_subscribers_does_not_fail() {
        let sink = BroadcastSink::default();
        sink.publish(&snapshot(1, 1));
        assert_eq!(sink.subscriber_count(), 0);
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let first = Arc::new(MetricsCollector::new(10));
        let second = Arc::new(MetricsCollector::new(10));
        let fanout = FanoutSink::new()
            .with(first.clone())
            .with(Arc::new(NoopSink))
            .with(second.clone());
        assert_eq!(fanout.len(), 3);

        fanout.publish(&snapshot(4, 4));

        assert_eq!(first.summary().total_turns, 1);
        assert_eq!(second.summary().total_turns, 1);
    }

    #[test]
    fn tracing_sink_accepts_snapshots() {
        TracingSink::new("s-1").publish(&snapshot(8, 6));
    }
}
