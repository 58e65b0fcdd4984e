//! Structured run logging.

use tracing::{error, info, warn, Span};

use beatreel_models::RunId;

/// Logs lifecycle events of one operation with its run ID attached.
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: String,
    operation: String,
}

impl RunLogger {
    pub fn new(run_id: &RunId, operation: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            operation = %self.operation,
            "Run started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            operation = %self.operation,
            "Run progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            run_id = %self.run_id,
            operation = %self.operation,
            "Run warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            run_id = %self.run_id,
            operation = %self.operation,
            "Run error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            run_id = %self.run_id,
            operation = %self.operation,
            "Run completed: {}", message
        );
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span to enter for the duration of the operation.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "run",
            run_id = %self.run_id,
            operation = %self.operation
        )
    }
}
