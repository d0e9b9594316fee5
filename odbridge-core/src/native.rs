use crate::{
    CType, ColumnDescription, DataType, DiagnosticRecord, NativeBuffer, ParameterDescription,
    SqlReturn,
};
use std::{
    fmt::{self, Display},
    time::Duration,
};

/// Opaque pointer sized token identifying a resource owned by the native library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawHandle(pub usize);

impl RawHandle {
    pub const NULL: RawHandle = RawHandle(0);

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Environment,
    Connection,
    Statement,
}

impl Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HandleKind::Environment => "environment",
            HandleKind::Connection => "connection",
            HandleKind::Statement => "statement",
        })
    }
}

/// Entry points a native library can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    Connect,
    Disconnect,
    SetConnectionAttribute,
    ConnectionAttribute,
    EndTransaction,
    AllocStatement,
    FreeStatement,
    Prepare,
    ExecDirect,
    NumParams,
    DescribeParam,
    BindParameter,
    Execute,
    NumResultCols,
    RowCount,
    DescribeCol,
    Fetch,
    FetchScroll,
    GetData,
    CloseCursor,
    Cancel,
    Diagnostics,
    Drivers,
    DataSources,
}

impl EntryPoint {
    pub const ALL: [EntryPoint; 24] = [
        EntryPoint::Connect,
        EntryPoint::Disconnect,
        EntryPoint::SetConnectionAttribute,
        EntryPoint::ConnectionAttribute,
        EntryPoint::EndTransaction,
        EntryPoint::AllocStatement,
        EntryPoint::FreeStatement,
        EntryPoint::Prepare,
        EntryPoint::ExecDirect,
        EntryPoint::NumParams,
        EntryPoint::DescribeParam,
        EntryPoint::BindParameter,
        EntryPoint::Execute,
        EntryPoint::NumResultCols,
        EntryPoint::RowCount,
        EntryPoint::DescribeCol,
        EntryPoint::Fetch,
        EntryPoint::FetchScroll,
        EntryPoint::GetData,
        EntryPoint::CloseCursor,
        EntryPoint::Cancel,
        EntryPoint::Diagnostics,
        EntryPoint::Drivers,
        EntryPoint::DataSources,
    ];

    /// The bridge works without these.
    pub const fn is_optional(self) -> bool {
        matches!(
            self,
            EntryPoint::Cancel
                | EntryPoint::DescribeParam
                | EntryPoint::FetchScroll
                | EntryPoint::Drivers
                | EntryPoint::DataSources
        )
    }

    /// Name of the ODBC function behind the entry point.
    pub const fn symbol(self) -> &'static str {
        match self {
            EntryPoint::Connect => "SQLDriverConnect",
            EntryPoint::Disconnect => "SQLDisconnect",
            EntryPoint::SetConnectionAttribute => "SQLSetConnectAttr",
            EntryPoint::ConnectionAttribute => "SQLGetConnectAttr",
            EntryPoint::EndTransaction => "SQLEndTran",
            EntryPoint::AllocStatement => "SQLAllocHandle",
            EntryPoint::FreeStatement => "SQLFreeHandle",
            EntryPoint::Prepare => "SQLPrepare",
            EntryPoint::ExecDirect => "SQLExecDirect",
            EntryPoint::NumParams => "SQLNumParams",
            EntryPoint::DescribeParam => "SQLDescribeParam",
            EntryPoint::BindParameter => "SQLBindParameter",
            EntryPoint::Execute => "SQLExecute",
            EntryPoint::NumResultCols => "SQLNumResultCols",
            EntryPoint::RowCount => "SQLRowCount",
            EntryPoint::DescribeCol => "SQLDescribeCol",
            EntryPoint::Fetch => "SQLFetch",
            EntryPoint::FetchScroll => "SQLFetchScroll",
            EntryPoint::GetData => "SQLGetData",
            EntryPoint::CloseCursor => "SQLCloseCursor",
            EntryPoint::Cancel => "SQLCancel",
            EntryPoint::Diagnostics => "SQLGetDiagRec",
            EntryPoint::Drivers => "SQLDrivers",
            EntryPoint::DataSources => "SQLDataSources",
        }
    }
}

impl Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Result of a native call.
///
/// Failures carry only the status, the diagnostic records are fetched separately
/// through [`Native::diagnostics`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    SuccessWithInfo(T),
    NoData,
    Failure(SqlReturn),
}

impl<T> Outcome<T> {
    /// Builds the outcome from a native status, calling `value` only on success.
    pub fn from_status(status: SqlReturn, value: impl FnOnce() -> T) -> Self {
        match status {
            SqlReturn::Success => Outcome::Success(value()),
            SqlReturn::SuccessWithInfo => Outcome::SuccessWithInfo(value()),
            SqlReturn::NoData => Outcome::NoData,
            v => Outcome::Failure(v),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(v) => Outcome::Success(f(v)),
            Outcome::SuccessWithInfo(v) => Outcome::SuccessWithInfo(f(v)),
            Outcome::NoData => Outcome::NoData,
            Outcome::Failure(v) => Outcome::Failure(v),
        }
    }

    /// Chains another native call after a successful one, keeping the warning flag.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Outcome<U>) -> Outcome<U> {
        match self {
            Outcome::Success(v) => f(v),
            Outcome::SuccessWithInfo(v) => match f(v) {
                Outcome::Success(v) => Outcome::SuccessWithInfo(v),
                other => other,
            },
            Outcome::NoData => Outcome::NoData,
            Outcome::Failure(v) => Outcome::Failure(v),
        }
    }

    pub fn status(&self) -> SqlReturn {
        match self {
            Outcome::Success(..) => SqlReturn::Success,
            Outcome::SuccessWithInfo(..) => SqlReturn::SuccessWithInfo,
            Outcome::NoData => SqlReturn::NoData,
            Outcome::Failure(v) => *v,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status().is_success()
    }
}

/// Transaction isolation levels, the values are the ODBC bitmask constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IsolationLevel {
    ReadUncommitted = 1,
    ReadCommitted = 2,
    RepeatableRead = 4,
    Serializable = 8,
}

impl IsolationLevel {
    pub const fn code(self) -> u32 {
        self as u32
    }

    pub const fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => IsolationLevel::ReadUncommitted,
            2 => IsolationLevel::ReadCommitted,
            4 => IsolationLevel::RepeatableRead,
            8 => IsolationLevel::Serializable,
            _ => return None,
        })
    }
}

impl Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAttribute {
    AutoCommit(bool),
    Isolation(IsolationLevel),
    CurrentCatalog(String),
    /// Read only, `true` when the native library detected the session is lost.
    ConnectionDead(bool),
}

impl ConnectionAttribute {
    pub fn kind(&self) -> AttributeKind {
        match self {
            ConnectionAttribute::AutoCommit(..) => AttributeKind::AutoCommit,
            ConnectionAttribute::Isolation(..) => AttributeKind::Isolation,
            ConnectionAttribute::CurrentCatalog(..) => AttributeKind::CurrentCatalog,
            ConnectionAttribute::ConnectionDead(..) => AttributeKind::ConnectionDead,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    AutoCommit,
    Isolation,
    CurrentCatalog,
    ConnectionDead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementAttribute {
    /// `None` disables the timeout.
    QueryTimeout(Option<Duration>),
    Scrollable(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Commit,
    Rollback,
}

impl Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Completion::Commit => "commit",
            Completion::Rollback => "rollback",
        })
    }
}

/// Installed driver as listed by the driver manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverInfo {
    pub name: String,
    /// `key=value` pairs.
    pub attributes: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSourceInfo {
    pub name: String,
    pub driver: String,
}

/// The entry points of a native ODBC library.
///
/// Every method maps to one native function and reports its status through
/// [`Outcome`]. Implementations never interpret failures, diagnostic records
/// are read afterwards through [`Native::diagnostics`] on the same handle.
///
/// The bridge never enters the same handle from two threads at once, except
/// for [`Native::cancel`], which may arrive from another thread while
/// [`Native::execute`] or [`Native::exec_direct`] is blocking on the same
/// statement, also from a connection that is closing. Other calls on a
/// connection handle never overlap calls on its statements.
///
/// Text crosses this trait as UTF-8: SQL, connection strings, diagnostics,
/// names and [`CType::Char`] buffers. Implementations talking to a library
/// with another encoding transcode at their side of the boundary and report
/// text they cannot decode as a failure.
pub trait Native: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Whether the library exports `entry`.
    fn supports(&self, _entry: EntryPoint) -> bool {
        true
    }

    fn alloc_connection(&self) -> Outcome<RawHandle>;
    /// Opens the session with a complete connection string, `login_timeout`
    /// is applied before connecting.
    fn connect(
        &self,
        connection: RawHandle,
        connection_string: &str,
        login_timeout: Option<Duration>,
    ) -> Outcome<()>;
    fn disconnect(&self, connection: RawHandle) -> Outcome<()>;
    fn free_connection(&self, connection: RawHandle) -> Outcome<()>;
    fn set_connection_attribute(
        &self,
        connection: RawHandle,
        attribute: &ConnectionAttribute,
    ) -> Outcome<()>;
    fn connection_attribute(
        &self,
        connection: RawHandle,
        kind: AttributeKind,
    ) -> Outcome<ConnectionAttribute>;
    fn end_transaction(&self, connection: RawHandle, completion: Completion) -> Outcome<()>;

    fn alloc_statement(&self, connection: RawHandle) -> Outcome<RawHandle>;
    fn free_statement(&self, statement: RawHandle) -> Outcome<()>;
    fn prepare(&self, statement: RawHandle, sql: &str) -> Outcome<()>;
    fn exec_direct(&self, statement: RawHandle, sql: &str) -> Outcome<()>;
    fn num_params(&self, statement: RawHandle) -> Outcome<u16>;
    /// `ordinal` starts from 1.
    fn describe_param(&self, statement: RawHandle, ordinal: u16) -> Outcome<ParameterDescription>;
    /// The library takes ownership of `buffer` and keeps it alive until the
    /// parameter is rebound, reset or the statement is freed.
    fn bind_parameter(
        &self,
        statement: RawHandle,
        ordinal: u16,
        declared: &DataType,
        buffer: NativeBuffer,
    ) -> Outcome<()>;
    fn reset_parameters(&self, statement: RawHandle) -> Outcome<()>;
    fn set_statement_attribute(
        &self,
        statement: RawHandle,
        attribute: &StatementAttribute,
    ) -> Outcome<()>;
    /// `Outcome::NoData` is a successful execution affecting no rows.
    fn execute(&self, statement: RawHandle) -> Outcome<()>;
    fn num_result_cols(&self, statement: RawHandle) -> Outcome<u16>;
    /// Negative when the library cannot tell.
    fn row_count(&self, statement: RawHandle) -> Outcome<i64>;
    /// `column` starts from 1.
    fn describe_col(&self, statement: RawHandle, column: u16) -> Outcome<ColumnDescription>;
    /// Whether the open cursor supports relative fetches.
    fn scrollable(&self, statement: RawHandle) -> Outcome<bool>;
    /// `Outcome::NoData` when the result set is exhausted.
    fn fetch(&self, statement: RawHandle) -> Outcome<()>;
    fn fetch_scroll(&self, statement: RawHandle, offset: i64) -> Outcome<()>;
    /// Reads the whole value of `column` in the current row, converted to
    /// `c_type`. Variable length values are read `chunk` bytes at a time.
    fn get_data(
        &self,
        statement: RawHandle,
        column: u16,
        c_type: CType,
        chunk: usize,
    ) -> Outcome<NativeBuffer>;
    fn close_cursor(&self, statement: RawHandle) -> Outcome<()>;
    fn cancel(&self, statement: RawHandle) -> Outcome<()>;

    /// All the diagnostic records left by the last call on `handle`.
    fn diagnostics(&self, kind: HandleKind, handle: RawHandle) -> Vec<DiagnosticRecord>;

    fn drivers(&self) -> Outcome<Vec<DriverInfo>>;
    fn data_sources(&self) -> Outcome<Vec<DataSourceInfo>>;
}
