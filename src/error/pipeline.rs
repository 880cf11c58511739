// Pipeline error types and constants

use crate::error::{ErrorCode, LinkError};
use log::error;
use std::fmt;

/// Pipeline error code constants
///
/// Error code range: 5001-5003
pub struct PipelineErrorCodes {}

impl PipelineErrorCodes {
    /// start() called while the pipeline is running
    pub const ALREADY_RUNNING: i32 = 5001;

    /// Link establishment failed; wraps the link error
    pub const LINK: i32 = 5002;

    /// Engine thread could not be spawned
    pub const THREAD_SPAWN: i32 = 5003;
}

/// Log a pipeline error with structured context
pub fn log_pipeline_error(err: &PipelineError, context: &str) {
    error!(
        "Pipeline error in {}: code={}, component=Pipeline, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors surfaced by the consumer-facing pipeline boundary
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Pipeline is already running
    AlreadyRunning,

    /// Link could not be established; the pipeline did not start
    Link(LinkError),

    /// Feature engine thread could not be spawned
    ThreadSpawn { reason: String },
}

impl ErrorCode for PipelineError {
    fn code(&self) -> i32 {
        match self {
            PipelineError::AlreadyRunning => PipelineErrorCodes::ALREADY_RUNNING,
            PipelineError::Link(_) => PipelineErrorCodes::LINK,
            PipelineError::ThreadSpawn { .. } => PipelineErrorCodes::THREAD_SPAWN,
        }
    }

    fn message(&self) -> String {
        match self {
            PipelineError::AlreadyRunning => {
                "Pipeline already running. Call stop() first.".to_string()
            }
            PipelineError::Link(inner) => {
                format!("Link setup failed ({}): {}", inner.code(), inner.message())
            }
            PipelineError::ThreadSpawn { reason } => {
                format!("Failed to spawn feature engine thread: {}", reason)
            }
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PipelineError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Link(inner) => Some(inner),
            _ => None,
        }
    }
}

impl From<LinkError> for PipelineError {
    fn from(err: LinkError) -> Self {
        PipelineError::Link(err)
    }
}
