//! Typed error taxonomy for the relay engine
//!
//! Every fallible engine operation returns one of these classes so the
//! orchestrator can decide between backoff-retry, fallback, skip, and
//! terminal failure without string-matching at the decision site.

use alloy::primitives::B256;
use std::fmt;
use thiserror::Error;

/// Errors the relay engine distinguishes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// Transient transport/RPC failure; retried with backoff, never fatal
    /// to a direction loop.
    #[error("connectivity: {0}")]
    Connectivity(String),

    /// A single log could not be decoded; it is skipped and scanning
    /// continues with the rest of the batch.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// Gas estimation failed; the submitter falls back to the configured
    /// default gas limit.
    #[error("gas estimation: {0}")]
    Estimation(String),

    /// The ledger rejected or reverted a submission.
    #[error("submission ({kind}): {message}")]
    Submission {
        kind: SubmissionKind,
        message: String,
    },

    /// Inclusion wait timed out. The outcome is ambiguous: the transaction
    /// may still land, so inclusion must be re-checked before any retry.
    #[error("confirmation timed out for {tx_hash}")]
    ConfirmationTimeout { tx_hash: B256 },

    /// Relay state store failure.
    #[error("store: {0}")]
    Store(String),
}

/// Subclasses of submission-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionKind {
    /// The nonce was already used or is ahead of the account state;
    /// re-reserve after a chain sync and retry.
    NonceConflict,
    /// Gas price below the node's floor; bounded retry.
    Underpriced,
    /// Execution reverted; bounded retry, then terminal failure.
    Reverted,
    /// Anything the node reported that fits no narrower class.
    Other,
}

impl fmt::Display for SubmissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubmissionKind::NonceConflict => "nonce conflict",
            SubmissionKind::Underpriced => "underpriced",
            SubmissionKind::Reverted => "reverted",
            SubmissionKind::Other => "other",
        };
        write!(f, "{}", s)
    }
}

impl RelayError {
    /// Transient failures worth a plain backoff-retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, RelayError::Connectivity(_))
    }

    /// Failures the orchestrator may retry (with a fresh nonce reservation)
    /// within its bounded attempt budget.
    pub fn is_retriable(&self) -> bool {
        match self {
            RelayError::Connectivity(_) => true,
            RelayError::Submission { kind, .. } => matches!(
                kind,
                SubmissionKind::NonceConflict
                    | SubmissionKind::Underpriced
                    | SubmissionKind::Reverted
                    | SubmissionKind::Other
            ),
            _ => false,
        }
    }

    /// Label used for error metrics.
    pub fn class(&self) -> &'static str {
        match self {
            RelayError::Connectivity(_) => "connectivity",
            RelayError::MalformedEvent(_) => "malformed_event",
            RelayError::Estimation(_) => "estimation",
            RelayError::Submission { kind, .. } => match kind {
                SubmissionKind::NonceConflict => "nonce_conflict",
                SubmissionKind::Underpriced => "underpriced",
                SubmissionKind::Reverted => "reverted",
                SubmissionKind::Other => "submission",
            },
            RelayError::ConfirmationTimeout { .. } => "confirmation_timeout",
            RelayError::Store(_) => "store",
        }
    }
}

/// Classify a raw RPC error message into the taxonomy.
///
/// Node implementations disagree on error codes, so classification works on
/// the message text. Unrecognized messages land in `Submission::Other`,
/// which stays inside the bounded retry budget.
pub fn classify_rpc_error(message: &str) -> RelayError {
    let lower = message.to_lowercase();

    if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection")
        || lower.contains("network")
        || lower.contains("rate limit")
        || lower.contains("too many requests")
        || lower.contains("503")
        || lower.contains("502")
        || lower.contains("temporarily unavailable")
    {
        return RelayError::Connectivity(message.to_string());
    }

    if lower.contains("underpriced")
        || lower.contains("replacement transaction")
        || lower.contains("gas price too low")
        || lower.contains("max fee per gas less than")
    {
        return RelayError::Submission {
            kind: SubmissionKind::Underpriced,
            message: message.to_string(),
        };
    }

    if lower.contains("nonce too low")
        || lower.contains("nonce too high")
        || lower.contains("invalid nonce")
        || lower.contains("already known")
    {
        return RelayError::Submission {
            kind: SubmissionKind::NonceConflict,
            message: message.to_string(),
        };
    }

    if lower.contains("reverted")
        || lower.contains("execution reverted")
        || lower.contains("out of gas")
        || lower.contains("insufficient funds")
    {
        return RelayError::Submission {
            kind: SubmissionKind::Reverted,
            message: message.to_string(),
        };
    }

    RelayError::Submission {
        kind: SubmissionKind::Other,
        message: message.to_string(),
    }
}
