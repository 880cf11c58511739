// Sensory Pipeline - Serial acoustic telemetry acquisition
// Serial link -> bounded buffers -> capped-rate feature engine -> consumer

// Module declarations
pub mod analysis;
pub mod buffer;
pub mod codec;
pub mod config;
pub mod control;
pub mod error;
pub mod link;
pub mod pipeline;
pub mod telemetry;
pub mod worker;

// Re-exports for convenience
pub use analysis::{FeatureSnapshot, FrequencyBands};
pub use buffer::BoundedBuffer;
pub use codec::{format_frame, parse, AnalysisCommand, ControlFrame, RawTelemetry, VisualCommand};
pub use config::AppConfig;
pub use error::{ErrorCode, FrameParseError, LinkError, PipelineError};
pub use link::{LinkState, LinkStatistics, PortDescriptor, SerialLink};
pub use pipeline::{Pipeline, PipelineStatistics};
pub use telemetry::{MetricEvent, TelemetryHub};
