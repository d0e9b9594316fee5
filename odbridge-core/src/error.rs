use crate::{DiagnosticRecord, SqlReturn};
use std::sync::PoisonError;

pub use ::anyhow::Context;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;

/// Category of a bridge failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ErrorKind {
    /// The driver manager rejected the connection string or the credentials.
    #[error("connection error")]
    Connection,
    #[error("timeout error")]
    Timeout,
    #[error("prepare error")]
    Prepare,
    #[error("syntax error")]
    Syntax,
    #[error("bind error")]
    Bind,
    #[error("type mismatch error")]
    TypeMismatch,
    #[error("execution error")]
    Execution,
    #[error("transaction error")]
    Transaction,
    #[error("unsupported type error")]
    UnsupportedType,
    /// Use of a closed or invalidated handle.
    #[error("state error")]
    State,
    #[error("native library load error")]
    NativeLibraryLoad,
}

impl ErrorKind {
    /// Error of this kind raised by the bridge itself, without a native call involved.
    pub fn error(self, message: impl Into<String>) -> Error {
        BridgeError::new(self, message).into()
    }

    /// Kind of the [`BridgeError`] behind `error`, looking through the context
    /// added on the way up.
    pub fn of(error: &Error) -> Option<ErrorKind> {
        error.downcast_ref::<BridgeError>().map(BridgeError::kind)
    }
}

/// Failure of the bridge or of a native call.
///
/// Native failures keep the status code returned by the call and every
/// diagnostic record the native library reported, with the text untouched.
/// The first non-warning record is the primary one, the others are available
/// through [`BridgeError::chained`].
///
/// The operations wrap it into an [`Error`] carrying the operation context,
/// get it back with `error.downcast_ref::<BridgeError>()`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}{}: {message}", sqlstate_tag(.primary))]
pub struct BridgeError {
    kind: ErrorKind,
    status: Option<SqlReturn>,
    message: String,
    primary: Option<DiagnosticRecord>,
    chained: Vec<DiagnosticRecord>,
}

fn sqlstate_tag(primary: &Option<DiagnosticRecord>) -> String {
    primary
        .as_ref()
        .map(|v| format!(" [{}]", v.state))
        .unwrap_or_default()
}

impl BridgeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            primary: None,
            chained: Vec::new(),
        }
    }

    /// Error built from a failed native call and the diagnostic records it left.
    pub fn native(
        kind: ErrorKind,
        status: SqlReturn,
        primary: Option<DiagnosticRecord>,
        chained: Vec<DiagnosticRecord>,
    ) -> Self {
        let message = match &primary {
            Some(record) => record.message.clone(),
            None => format!("Native call returned {} without diagnostic records", status),
        };
        Self {
            kind,
            status: Some(status),
            message,
            primary,
            chained,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Status returned by the native call, `None` for errors raised by the bridge.
    pub fn status(&self) -> Option<SqlReturn> {
        self.status
    }

    /// The primary message, verbatim as reported by the native library.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn primary(&self) -> Option<&DiagnosticRecord> {
        self.primary.as_ref()
    }

    /// Other records of the same native call, usually warnings.
    pub fn chained(&self) -> &[DiagnosticRecord] {
        &self.chained
    }

    /// Primary record first, then the chained ones.
    pub fn diagnostics(&self) -> impl Iterator<Item = &DiagnosticRecord> {
        self.primary.iter().chain(self.chained.iter())
    }

    pub fn sqlstate(&self) -> Option<&str> {
        self.primary.as_ref().map(|v| v.state.as_str())
    }

    pub fn native_error(&self) -> Option<i32> {
        self.primary.as_ref().map(|v| v.native_error)
    }
}

impl<T> From<PoisonError<T>> for BridgeError {
    fn from(value: PoisonError<T>) -> Self {
        BridgeError::new(
            ErrorKind::State,
            format!("A handle lock was poisoned by a panicking thread: {}", value),
        )
    }
}
