use crate::{BridgeError, ErrorKind, HandleKind, Native, Outcome, RawHandle, Result};
use std::fmt::{self, Display};

/// Status code of a native call, same values as ODBC's `SQLRETURN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlReturn {
    Success,
    SuccessWithInfo,
    NoData,
    NeedData,
    StillExecuting,
    Error,
    InvalidHandle,
}

impl SqlReturn {
    pub const fn code(self) -> i16 {
        match self {
            SqlReturn::Success => 0,
            SqlReturn::SuccessWithInfo => 1,
            SqlReturn::StillExecuting => 2,
            SqlReturn::NeedData => 99,
            SqlReturn::NoData => 100,
            SqlReturn::Error => -1,
            SqlReturn::InvalidHandle => -2,
        }
    }

    /// Unknown codes are reported as [`SqlReturn::Error`].
    pub const fn from_code(code: i16) -> Self {
        match code {
            0 => SqlReturn::Success,
            1 => SqlReturn::SuccessWithInfo,
            2 => SqlReturn::StillExecuting,
            99 => SqlReturn::NeedData,
            100 => SqlReturn::NoData,
            -2 => SqlReturn::InvalidHandle,
            _ => SqlReturn::Error,
        }
    }

    pub const fn is_success(self) -> bool {
        matches!(self, SqlReturn::Success | SqlReturn::SuccessWithInfo)
    }
}

impl Display for SqlReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SqlReturn::Success => "SQL_SUCCESS",
            SqlReturn::SuccessWithInfo => "SQL_SUCCESS_WITH_INFO",
            SqlReturn::NoData => "SQL_NO_DATA",
            SqlReturn::NeedData => "SQL_NEED_DATA",
            SqlReturn::StillExecuting => "SQL_STILL_EXECUTING",
            SqlReturn::Error => "SQL_ERROR",
            SqlReturn::InvalidHandle => "SQL_INVALID_HANDLE",
        };
        write!(f, "{} ({})", name, self.code())
    }
}

/// One diagnostic record left by a native call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRecord {
    /// Five characters SQLSTATE.
    pub state: String,
    /// Error code specific to the data source.
    pub native_error: i32,
    /// Message text, verbatim.
    pub message: String,
    /// Component that raised the record, taken from the last bracketed prefix
    /// of the message (`[unixODBC][Driver Manager]...` gives `Driver Manager`).
    pub subsystem: String,
}

impl DiagnosticRecord {
    pub fn new(state: impl Into<String>, native_error: i32, message: impl Into<String>) -> Self {
        let message = message.into();
        let subsystem = subsystem_of(&message).to_string();
        Self {
            state: state.into(),
            native_error,
            message,
            subsystem,
        }
    }

    /// SQLSTATE class `01` is a warning.
    pub fn is_warning(&self) -> bool {
        self.state.starts_with("01")
    }

    /// First two characters of the SQLSTATE.
    pub fn class(&self) -> &str {
        self.state.get(..2).unwrap_or(&self.state)
    }
}

impl Display for DiagnosticRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ({}) {}", self.state, self.native_error, self.message)
    }
}

fn subsystem_of(message: &str) -> &str {
    let mut rest = message;
    let mut last = "";
    while let Some(tail) = rest.strip_prefix('[') {
        let Some(end) = tail.find(']') else {
            break;
        };
        last = &tail[..end];
        rest = &tail[end + 1..];
    }
    last
}

/// Builds the error for a failed native call.
///
/// `kind` is the category implied by the operation; SQLSTATEs that identify a
/// more specific condition override it.
pub fn translate(
    kind: ErrorKind,
    status: SqlReturn,
    records: Vec<DiagnosticRecord>,
) -> BridgeError {
    let mut records = records;
    let primary = records
        .iter()
        .position(|v| !v.is_warning())
        .or(if records.is_empty() { None } else { Some(0) })
        .map(|i| records.remove(i));
    let kind = match &primary {
        Some(record) => refine(kind, record),
        None => kind,
    };
    BridgeError::native(kind, status, primary, records)
}

fn refine(kind: ErrorKind, record: &DiagnosticRecord) -> ErrorKind {
    let state = record.state.as_str();
    match state {
        "HYT00" | "HYT01" => ErrorKind::Timeout,
        "42000" | "37000" if kind == ErrorKind::Prepare => ErrorKind::Syntax,
        "07006" | "22018" => ErrorKind::TypeMismatch,
        _ if record.class() == "08" => ErrorKind::Connection,
        _ => kind,
    }
}

/// Turns the outcome of a native call into a bridge result.
///
/// `Ok(None)` means `SQL_NO_DATA`. Diagnostics of `SQL_SUCCESS_WITH_INFO` are
/// logged as warnings, failures fetch every diagnostic record of `handle`.
pub(crate) fn complete<N: Native + ?Sized, T>(
    native: &N,
    outcome: Outcome<T>,
    kind: ErrorKind,
    handle_kind: HandleKind,
    handle: RawHandle,
) -> Result<Option<T>> {
    match outcome {
        Outcome::Success(v) => Ok(Some(v)),
        Outcome::SuccessWithInfo(v) => {
            for record in native.diagnostics(handle_kind, handle) {
                log::warn!("{} {}: {}", handle_kind, handle, record);
            }
            Ok(Some(v))
        }
        Outcome::NoData => Ok(None),
        Outcome::Failure(status) => {
            let records = if status == SqlReturn::InvalidHandle {
                Vec::new()
            } else {
                native.diagnostics(handle_kind, handle)
            };
            Err(translate(kind, status, records).into())
        }
    }
}

/// Like [`complete`], but `SQL_NO_DATA` is unexpected and reported as an error.
pub(crate) fn require<N: Native + ?Sized, T>(
    native: &N,
    outcome: Outcome<T>,
    kind: ErrorKind,
    handle_kind: HandleKind,
    handle: RawHandle,
) -> Result<T> {
    complete(native, outcome, kind, handle_kind, handle)?
        .ok_or_else(|| BridgeError::native(kind, SqlReturn::NoData, None, Vec::new()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn subsystem_is_last_bracket() {
        let record = DiagnosticRecord::new(
            "IM002",
            0,
            "[unixODBC][Driver Manager]Data source name not found",
        );
        assert_eq!(record.subsystem, "Driver Manager");
        assert_eq!(
            record.message,
            "[unixODBC][Driver Manager]Data source name not found"
        );
        assert_eq!(DiagnosticRecord::new("HY000", 1, "plain").subsystem, "");
        assert_eq!(DiagnosticRecord::new("HY000", 1, "[open").subsystem, "");
    }

    #[test]
    fn primary_skips_warnings() {
        let error = translate(
            ErrorKind::Execution,
            SqlReturn::Error,
            vec![
                DiagnosticRecord::new("01000", 0, "[Echo][Engine]general warning"),
                DiagnosticRecord::new("23000", 19, "[Echo][Engine]constraint failed"),
                DiagnosticRecord::new("01004", 0, "[Echo][Engine]string data truncated"),
            ],
        );
        assert_eq!(error.kind(), ErrorKind::Execution);
        assert_eq!(error.sqlstate(), Some("23000"));
        assert_eq!(error.native_error(), Some(19));
        assert_eq!(error.message(), "[Echo][Engine]constraint failed");
        assert_eq!(error.chained().len(), 2);
        assert_eq!(error.chained()[0].state, "01000");
        assert_eq!(error.chained()[1].state, "01004");
        assert_eq!(error.status(), Some(SqlReturn::Error));
    }

    #[test]
    fn only_warnings_keep_the_first() {
        let error = translate(
            ErrorKind::Execution,
            SqlReturn::Error,
            vec![
                DiagnosticRecord::new("01000", 0, "first"),
                DiagnosticRecord::new("01001", 0, "second"),
            ],
        );
        assert_eq!(error.sqlstate(), Some("01000"));
        assert_eq!(error.chained().len(), 1);
    }

    #[test]
    fn no_records() {
        let error = translate(ErrorKind::Execution, SqlReturn::InvalidHandle, Vec::new());
        assert!(error.primary().is_none());
        assert!(error.message().contains("SQL_INVALID_HANDLE"));
    }

    #[test]
    fn refined_kinds() {
        let kind_of = |kind, state: &str| {
            translate(
                kind,
                SqlReturn::Error,
                vec![DiagnosticRecord::new(state, 0, "message")],
            )
            .kind()
        };
        assert_eq!(kind_of(ErrorKind::Execution, "HYT00"), ErrorKind::Timeout);
        assert_eq!(kind_of(ErrorKind::Connection, "HYT00"), ErrorKind::Timeout);
        assert_eq!(kind_of(ErrorKind::Prepare, "42000"), ErrorKind::Syntax);
        assert_eq!(kind_of(ErrorKind::Prepare, "42S02"), ErrorKind::Prepare);
        assert_eq!(kind_of(ErrorKind::Execution, "42000"), ErrorKind::Execution);
        assert_eq!(kind_of(ErrorKind::Bind, "07006"), ErrorKind::TypeMismatch);
        assert_eq!(kind_of(ErrorKind::Execution, "22018"), ErrorKind::TypeMismatch);
        assert_eq!(kind_of(ErrorKind::Execution, "08S01"), ErrorKind::Connection);
        assert_eq!(kind_of(ErrorKind::Transaction, "40001"), ErrorKind::Transaction);
    }

    #[test]
    fn display() {
        let error = translate(
            ErrorKind::Execution,
            SqlReturn::Error,
            vec![
                DiagnosticRecord::new("01000", 0, "warning text"),
                DiagnosticRecord::new("HY000", 7, "native text"),
            ],
        );
        assert_eq!(format!("{}", error), "execution error [HY000]: native text");
        let error = Error::from(error).context("While executing statement 0x2");
        assert_eq!(
            format!("{:#}", error),
            "While executing statement 0x2: execution error [HY000]: native text"
        );
        assert_eq!(ErrorKind::of(&error), Some(ErrorKind::Execution));
        let inner = error
            .downcast_ref::<BridgeError>()
            .expect("The context keeps the native error");
        assert_eq!(inner.chained()[0].message, "warning text");
    }

    #[test]
    fn sql_return_codes() {
        for status in [
            SqlReturn::Success,
            SqlReturn::SuccessWithInfo,
            SqlReturn::NoData,
            SqlReturn::NeedData,
            SqlReturn::StillExecuting,
            SqlReturn::Error,
            SqlReturn::InvalidHandle,
        ] {
            assert_eq!(SqlReturn::from_code(status.code()), status);
        }
        assert_eq!(SqlReturn::from_code(-77), SqlReturn::Error);
    }
}
