//! Telemetry sinks for membound context buffers.
//!
//! Every mutating buffer operation pushes a [`StatsSnapshot`] into a
//! [`TelemetrySink`]. This crate provides the stock sinks: a no-op, a
//! `tracing` logger, a broadcast fan-out for live subscribers, and a
//! rolling-window [`MetricsCollector`] that aggregates recent turns.

pub mod collector;
pub mod sinks;

pub use collector::{MetricsCollector, MetricsSummary, TurnSample};
pub use membound_core::{StatsSnapshot, TelemetrySink};
pub use sinks::{BroadcastSink, FanoutSink, NoopSink, TracingSink};
