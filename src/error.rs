//! Pump Link Error Types
//!
//! Core error taxonomy for the pump control library, plus the validation-error
//! sink used for out-of-range attribute writes. Validation failures are never
//! fatal: the offending write is discarded and a `ValidationError` record is
//! forwarded to the controller-owned sink.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

/// Result type for pumplink operations
pub type Result<T> = std::result::Result<T, PumpLinkError>;

/// Pump link errors
#[derive(Debug, Error, Clone)]
pub enum PumpLinkError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Gateway (wire request) errors
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Pump not found
    #[error("Pump not found: {0}")]
    PumpNotFound(u16),

    /// Channel not found
    #[error("Channel not found: {0}")]
    ChannelNotFound(u16),

    /// Pump actor no longer running
    #[error("Pump {0} task stopped")]
    PumpStopped(u16),

    /// IO errors
    #[error("IO error: {0}")]
    Io(String),

    /// Invalid data
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for PumpLinkError {
    fn from(err: std::io::Error) -> Self {
        PumpLinkError::Io(err.to_string())
    }
}

impl From<serde_yaml::Error> for PumpLinkError {
    fn from(err: serde_yaml::Error) -> Self {
        PumpLinkError::Config(format!("YAML: {}", err))
    }
}

// Helper methods for creating errors
impl PumpLinkError {
    pub fn config(msg: impl Into<String>) -> Self {
        PumpLinkError::Config(msg.into())
    }

    pub fn gateway(msg: impl Into<String>) -> Self {
        PumpLinkError::Gateway(msg.into())
    }

    pub fn invalid_data(msg: impl Into<String>) -> Self {
        PumpLinkError::InvalidData(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        PumpLinkError::Internal(msg.into())
    }
}

// ============================================================================
// Validation Errors
// ============================================================================

/// Attribute that failed range validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatedField {
    ActiveNozzleId,
    PhysicalAddress,
    ChannelId,
    Status,
    PricePerLiter,
}

impl std::fmt::Display for ValidatedField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidatedField::ActiveNozzleId => write!(f, "ActiveNozzleId"),
            ValidatedField::PhysicalAddress => write!(f, "PhysicalAddress"),
            ValidatedField::ChannelId => write!(f, "ChannelId"),
            ValidatedField::Status => write!(f, "Status"),
            ValidatedField::PricePerLiter => write!(f, "PricePerLiter"),
        }
    }
}

/// Rejected out-of-range attribute write
///
/// The prior value is always retained; this record is diagnostic only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub pump_id: u16,
    /// Set when the rejected write targeted a specific nozzle
    pub nozzle_id: Option<u8>,
    pub field: ValidatedField,
    pub rejected: i64,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.nozzle_id {
            Some(nozzle) => write!(
                f,
                "Pump[{}] Nozzle[{}] {} is out of range, rejected value = {}",
                self.pump_id, nozzle, self.field, self.rejected
            ),
            None => write!(
                f,
                "Pump[{}] {} is out of range, rejected value = {}",
                self.pump_id, self.field, self.rejected
            ),
        }
    }
}

/// Process-wide sink for validation errors, owned by the controller
///
/// Cheap to clone; every pump holds one. Reports are fire-and-forget: if the
/// controller dropped the receiving end the record is only logged.
#[derive(Debug, Clone)]
pub struct ErrorSink {
    tx: mpsc::UnboundedSender<ValidationError>,
}

impl ErrorSink {
    /// Create a sink and the receiver the controller drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ValidationError>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Report a rejected write
    pub fn report(&self, error: ValidationError) {
        warn!(%error, "rejected attribute write");
        let _ = self.tx.send(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError {
            pump_id: 3,
            nozzle_id: None,
            field: ValidatedField::ChannelId,
            rejected: 99,
        };
        assert_eq!(
            err.to_string(),
            "Pump[3] ChannelId is out of range, rejected value = 99"
        );

        let err = ValidationError {
            pump_id: 1,
            nozzle_id: Some(2),
            field: ValidatedField::PricePerLiter,
            rejected: -1,
        };
        assert!(err.to_string().contains("Nozzle[2]"));
    }

    #[test]
    fn test_sink_delivers_reports() {
        let (sink, mut rx) = ErrorSink::channel();
        sink.report(ValidationError {
            pump_id: 7,
            nozzle_id: None,
            field: ValidatedField::Status,
            rejected: 200,
        });
        let received = rx.try_recv().expect("report should be queued");
        assert_eq!(received.pump_id, 7);
        assert_eq!(received.field, ValidatedField::Status);
    }

    #[test]
    fn test_sink_survives_dropped_receiver() {
        let (sink, rx) = ErrorSink::channel();
        drop(rx);
        // Must not panic or error out
        sink.report(ValidationError {
            pump_id: 1,
            nozzle_id: None,
            field: ValidatedField::PhysicalAddress,
            rejected: -5,
        });
    }
}
