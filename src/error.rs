//! # Error Types for the Covenant Toolkit
//!
//! One error enum covers script construction, Taproot commitment, witness
//! assembly, partial transaction handling and the node boundary.

use thiserror::Error;

/// Main error type for all covenant operations
#[derive(Debug, Error)]
pub enum CovenantError {
    /// Malformed script or ASM input
    #[error("Script construction failed: {message}")]
    ScriptConstruction { message: String },

    /// Output script is not a valid witness program, or an address does not decode
    #[error("Address encoding failed: {message}")]
    AddressEncoding { message: String },

    /// Requested leaf hash does not appear in the hash tree
    #[error("Leaf {leaf_hash} not found in hash tree")]
    PathNotFound { leaf_hash: String },

    /// Declared input/output counts disagree with the supplied sequences
    #[error(
        "Arity mismatch: declared {declared_inputs} inputs and {declared_outputs} outputs, \
         got {inputs} inputs and {outputs} outputs"
    )]
    ArityMismatch {
        declared_inputs: usize,
        declared_outputs: usize,
        inputs: usize,
        outputs: usize,
    },

    /// Input roles are not in covenant-first order
    #[error("Input role violation: {message}")]
    InputRole { message: String },

    /// Input index beyond the transaction's inputs
    #[error("Input index {index} out of range for {inputs} inputs")]
    InputIndex { index: usize, inputs: usize },

    /// Finalization requested for an input without a partial signature
    #[error("Input {index} has no partial signature to finalize")]
    MissingSignature { index: usize },

    /// Extraction requested while an input lacks its final witness
    #[error("Input {index} is not finalized")]
    NotFinalized { index: usize },

    /// Partial transaction operations invoked out of order
    #[error("Invalid partial transaction state transition from {current} to {requested}")]
    InvalidStateTransition { current: String, requested: String },

    /// Cryptographic operation failures
    #[error("Cryptographic operation failed: {message}")]
    Cryptography { message: String },

    /// Bad hex, identifiers or key material
    #[error("Invalid encoding: {message}")]
    InvalidEncoding { message: String },

    /// Sighash requested for a prevout or flag this signer does not handle
    #[error("Unsupported sighash: {message}")]
    UnsupportedSighash { message: String },

    /// Witness does not satisfy the covenant for the candidate outputs
    #[error("Covenant check failed: {message}")]
    CovenantViolation { message: String },

    /// Node RPC failures, carrying the node's error payload
    #[error("RPC communication failed: {source}")]
    Rpc {
        #[from]
        source: bitcoincore_rpc::Error,
    },

    /// Node refused the raw transaction (mempool or consensus rejection)
    #[error("Broadcast rejected by node (code {code}): {message}")]
    BroadcastRejected { code: i32, message: String },

    /// Node answered with something the client cannot interpret
    #[error("Unexpected node response: {message}")]
    UnexpectedResponse { message: String },

    /// Flow ran out of time before reaching `stage`
    #[error("Deadline exceeded before {stage}")]
    DeadlineExceeded { stage: String },

    /// Configuration errors while loading keys or network parameters
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// JSON serialization/deserialization errors
    #[error("JSON processing error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

/// Result type alias for covenant operations
pub type CovenantResult<T> = Result<T, CovenantError>;

impl CovenantError {
    /// Create a script construction error with a message
    pub fn script(message: impl Into<String>) -> Self {
        Self::ScriptConstruction {
            message: message.into(),
        }
    }

    /// Create an address encoding error with a message
    pub fn address(message: impl Into<String>) -> Self {
        Self::AddressEncoding {
            message: message.into(),
        }
    }

    /// Create a cryptography error with a message
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Cryptography {
            message: message.into(),
        }
    }

    /// Create an encoding error with a message
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::InvalidEncoding {
            message: message.into(),
        }
    }

    /// Create a covenant violation error with a message
    pub fn violation(message: impl Into<String>) -> Self {
        Self::CovenantViolation {
            message: message.into(),
        }
    }

    /// Create a configuration error with a message
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid state transition error
    pub fn transition(current: impl ToString, requested: impl ToString) -> Self {
        Self::InvalidStateTransition {
            current: current.to_string(),
            requested: requested.to_string(),
        }
    }

    /// Errors raised by the node rather than by local construction.
    pub fn is_node_error(&self) -> bool {
        matches!(
            self,
            CovenantError::Rpc { .. }
                | CovenantError::BroadcastRejected { .. }
                | CovenantError::UnexpectedResponse { .. }
        )
    }

    /// Check if restarting the whole spend sequence could succeed.
    ///
    /// Local construction errors are deterministic and never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CovenantError::Rpc { .. }
                | CovenantError::BroadcastRejected { .. }
                | CovenantError::DeadlineExceeded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let script_err = CovenantError::script("unknown opcode OP_FOO");
        assert!(matches!(script_err, CovenantError::ScriptConstruction { .. }));
        assert!(script_err.to_string().contains("OP_FOO"));

        let crypto_err = CovenantError::crypto("tweak out of range");
        assert!(matches!(crypto_err, CovenantError::Cryptography { .. }));
        assert!(!crypto_err.is_retryable());
    }

    #[test]
    fn test_error_classification() {
        let rejected = CovenantError::BroadcastRejected {
            code: -26,
            message: "non-mandatory-script-verify-flag".to_string(),
        };
        assert!(rejected.is_retryable());
        assert!(rejected.is_node_error());
        assert!(rejected.to_string().contains("-26"));

        let arity = CovenantError::ArityMismatch {
            declared_inputs: 2,
            declared_outputs: 2,
            inputs: 1,
            outputs: 2,
        };
        assert!(!arity.is_retryable());
        assert!(!arity.is_node_error());

        let not_finalized = CovenantError::NotFinalized { index: 1 };
        assert_eq!(not_finalized.to_string(), "Input 1 is not finalized");
    }

    #[test]
    fn test_deadline_is_local_and_retryable() {
        let err = CovenantError::DeadlineExceeded {
            stage: "broadcast".to_string(),
        };
        assert_eq!(err.to_string(), "Deadline exceeded before broadcast");
        assert!(err.is_retryable());
        assert!(!err.is_node_error());
    }

    #[test]
    fn test_transition_error_formats_states() {
        let err = CovenantError::transition("Built", "Signed");
        assert_eq!(
            err.to_string(),
            "Invalid partial transaction state transition from Built to Signed"
        );
    }
}
