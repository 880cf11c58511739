// Error types for the sensory pipeline
//
// This module defines the error taxonomy for the serial link, the frame codec
// and the pipeline boundary, providing structured error handling with numeric
// codes suitable for logs and diagnostics output.
//
// Propagation policy:
// - LinkError: surfaced to the caller of connect()/start()
// - FrameParseError: recovered inside the reader thread, counted as a lost packet
// - Transport hiccups: retried by the reader, escalated to LinkError::Transport
//   and a Disconnected state only after the consecutive-failure ceiling

mod frame;
mod link;
mod pipeline;

pub use frame::{FrameParseError, FrameParseErrorCodes};
pub use link::{log_link_error, LinkError, LinkErrorCodes};
pub use pipeline::{log_pipeline_error, PipelineError, PipelineErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error reporting across
/// the library, the CLI and the telemetry hub.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
