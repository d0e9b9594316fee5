use odbridge_core::DiagnosticRecord;
use std::fmt::Display;

pub(crate) type EchoResult<T> = std::result::Result<T, DiagnosticRecord>;

/// A diagnostic record as the echo driver reports it.
pub(crate) fn diag(state: &str, message: impl Display) -> DiagnosticRecord {
    DiagnosticRecord::new(state, 0, format!("[odbridge][Echo]{}", message))
}
