//! Metric event types published by the link and the feature engine.

use serde::{Deserialize, Serialize};

use crate::link::LinkState;

/// Diagnostic error codes surfaced via telemetry metrics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticError {
    /// A received line failed to parse
    MalformedFrame,
    /// Read or write failure on the transport
    Transport,
    /// The reader gave up after too many consecutive failures
    ReaderFailStop,
}

/// Metric events covering link health, buffer occupancy and engine latency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    LinkState {
        state: LinkState,
        port: Option<String>,
        timestamp_ms: u64,
    },
    PacketLoss {
        packets_received: u64,
        packets_lost: u64,
        loss_rate: f64,
    },
    BufferOccupancy {
        channel: String,
        percent: f32,
    },
    ProcessingLatency {
        avg_ms: f32,
        max_ms: f32,
        sample_count: usize,
    },
    Error {
        code: DiagnosticError,
        context: String,
    },
}
