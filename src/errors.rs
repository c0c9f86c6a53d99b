//! Typed error hierarchy for the transfer add-on.
//!
//! Three top-level enums cover the three subsystems:
//! - `SettingsError` — settings store and resolver lookups
//! - `TransferError` — failures inside one transfer run
//! - `StartError` — trigger-time rejections before a run is spawned

use thiserror::Error;

/// Errors from the settings store and the request-scoped resolver.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("No setting at '{path}'")]
    MissingKey { path: String },

    #[error("Setting '{path}' is not a {expected}")]
    WrongType {
        path: String,
        expected: &'static str,
    },
}

/// Failures inside a single transfer run.
///
/// `Cancelled` and `ProtocolFatal` are expected operational outcomes and are
/// logged at info severity; everything else is logged at error severity.
/// None of the variants escape the run's background task.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The in-flight copy was interrupted by the user.
    #[error("Aborting transfer")]
    Cancelled,

    /// The transport exhausted its internal retry budget.
    #[error("Too many retries")]
    ProtocolFatal,

    /// The device or its serial link reported a failure.
    #[error("Device error: {0}")]
    Device(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TransferError {
    /// Whether this failure is an expected operational outcome rather than
    /// a programming or device defect.
    pub fn is_expected(&self) -> bool {
        matches!(self, TransferError::Cancelled | TransferError::ProtocolFatal)
    }
}

/// Rejections raised synchronously by `start_transfer`, before any
/// background work begins.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("A transfer is already in flight")]
    TransferInFlight,

    #[error("Printer has not announced the binary transfer capability")]
    CapabilityMissing,

    #[error("File extension '{extension}' is not accepted for transfer")]
    ExtensionNotAccepted { extension: String },

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_error_missing_key_carries_path() {
        let err = SettingsError::MissingKey {
            path: "comm_timeout_ms".to_string(),
        };
        match &err {
            SettingsError::MissingKey { path } => assert_eq!(path, "comm_timeout_ms"),
            _ => panic!("Expected MissingKey variant"),
        }
        assert!(err.to_string().contains("comm_timeout_ms"));
    }

    #[test]
    fn cancelled_classification_text() {
        assert_eq!(TransferError::Cancelled.to_string(), "Aborting transfer");
    }

    #[test]
    fn protocol_fatal_classification_text() {
        assert_eq!(TransferError::ProtocolFatal.to_string(), "Too many retries");
    }

    #[test]
    fn unclassified_uses_own_description() {
        let err = TransferError::Device("checksum mismatch on block 7".to_string());
        assert!(err.to_string().contains("checksum mismatch on block 7"));
    }

    #[test]
    fn expected_outcomes_are_flagged() {
        assert!(TransferError::Cancelled.is_expected());
        assert!(TransferError::ProtocolFatal.is_expected());
        assert!(!TransferError::Device("x".into()).is_expected());
        assert!(!TransferError::Other(anyhow::anyhow!("boom")).is_expected());
    }

    #[test]
    fn transfer_error_converts_from_settings_error() {
        let inner = SettingsError::MissingKey {
            path: "reconnect".to_string(),
        };
        let err: TransferError = inner.into();
        assert!(matches!(err, TransferError::Settings(_)));
    }

    #[test]
    fn start_error_extension_carries_extension() {
        let err = StartError::ExtensionNotAccepted {
            extension: "gco".to_string(),
        };
        assert!(err.to_string().contains("gco"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&SettingsError::MissingKey { path: "x".into() });
        assert_std_error(&TransferError::Cancelled);
        assert_std_error(&StartError::TransferInFlight);
    }
}
