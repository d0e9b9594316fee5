use crate::{
    diagnostics,
    environment::{self, State},
    wide,
};
use odbc_sys as sys;
use odbridge_core::{
    AttributeKind, CType, ColumnDescription, Completion, ConnectionAttribute, DataSourceInfo,
    DataType, DiagnosticRecord, DriverInfo, HandleKind, IsolationLevel, Native, NativeBuffer,
    Nullability, Outcome, ParameterDescription, RawHandle, Result, SqlReturn, StatementAttribute,
};
use std::{
    collections::{BTreeMap, HashMap},
    ptr,
    sync::{Mutex, PoisonError, RwLockReadGuard},
    time::Duration,
};

/// `SQL_CURSOR_FORWARD_ONLY`
const CURSOR_FORWARD_ONLY: usize = 0;
/// `SQL_CURSOR_STATIC`
const CURSOR_STATIC: usize = 3;
/// `SQL_CD_TRUE`
const CONNECTION_DEAD: u32 = 1;
/// `SQL_NO_TOTAL`
const NO_TOTAL: sys::Len = -4;
/// Invalid character value for cast specification.
const INVALID_CHARACTER: &str = "22018";

/// The system ODBC driver manager.
///
/// All handles live in the process wide environment, allocated the first
/// time an `OdbcNative` is created and released by [`crate::shutdown`].
///
/// Text goes through the wide entry points and `SQL_C_WCHAR` buffers,
/// transcoded from and to the UTF-8 the bridge uses.
pub struct OdbcNative {
    /// Buffers bound to the parameters of each statement. The driver reads
    /// them at execution, their addresses must not change until rebound.
    parameters: Mutex<HashMap<RawHandle, BTreeMap<u16, Box<NativeBuffer>>>>,
    /// Records of failures raised on this side of the driver manager, handed
    /// out by the next [`Native::diagnostics`] on the same handle.
    pending: Mutex<HashMap<RawHandle, DiagnosticRecord>>,
}

impl OdbcNative {
    pub fn new() -> Result<Self> {
        let environment = environment::environment()?;
        environment.handle().map_err(|e| {
            log::error!("{:#}", e);
            e
        })?;
        Ok(Self {
            parameters: Default::default(),
            pending: Default::default(),
        })
    }

    /// Fails the call on `handle` with a record of its own.
    fn fail<T>(&self, handle: RawHandle, state: &str, message: String) -> Outcome<T> {
        log::error!("{}", message);
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle, DiagnosticRecord::new(state, 0, message));
        Outcome::Failure(SqlReturn::Error)
    }

    fn parameters(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<RawHandle, BTreeMap<u16, Box<NativeBuffer>>>> {
        self.parameters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn status(rc: sys::SqlReturn) -> SqlReturn {
    SqlReturn::from_code(rc.0)
}

fn outcome<T>(rc: sys::SqlReturn, value: impl FnOnce() -> T) -> Outcome<T> {
    Outcome::from_status(status(rc), value)
}

fn dbc(raw: RawHandle) -> sys::HDbc {
    raw.0 as sys::HDbc
}

fn stmt(raw: RawHandle) -> sys::HStmt {
    raw.0 as sys::HStmt
}

/// The environment handle with the guard keeping it alive.
fn env() -> Option<(RwLockReadGuard<'static, State>, sys::HEnv)> {
    let result = environment::environment().and_then(|guard| {
        let handle = guard.handle()?;
        Ok((guard, handle))
    });
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            log::error!("{:#}", e);
            None
        }
    }
}

fn c_data_type(c_type: CType) -> sys::CDataType {
    match c_type {
        CType::Bit => sys::CDataType::Bit,
        CType::STinyInt => sys::CDataType::STinyInt,
        CType::SShort => sys::CDataType::SShort,
        CType::SLong => sys::CDataType::SLong,
        CType::SBigInt => sys::CDataType::SBigInt,
        CType::Float => sys::CDataType::Float,
        CType::Double => sys::CDataType::Double,
        CType::Char => sys::CDataType::WChar,
        CType::Binary => sys::CDataType::Binary,
        CType::Date => sys::CDataType::TypeDate,
        CType::Time => sys::CDataType::TypeTime,
        CType::Timestamp => sys::CDataType::TypeTimestamp,
        CType::Guid => sys::CDataType::Guid,
    }
}

fn seconds(timeout: Option<Duration>) -> usize {
    timeout
        .map(|v| v.as_secs() as usize + (v.subsec_nanos() > 0) as usize)
        .unwrap_or(0)
}

/// Text until the reported length in characters, the buffer is grown and
/// `read` called again when it was too small.
fn read_text(
    capacity: usize,
    what: &str,
    mut read: impl FnMut(&mut [u16], &mut sys::SmallInt) -> sys::SqlReturn,
) -> Outcome<String> {
    let mut buffer = vec![0u16; capacity];
    loop {
        let mut length: sys::SmallInt = 0;
        let rc = read(&mut buffer, &mut length);
        let length = length.max(0) as usize;
        if status(rc) == SqlReturn::SuccessWithInfo
            && length >= buffer.len()
            && buffer.len() < sys::SmallInt::MAX as usize
        {
            buffer.resize(length + 1, 0);
            continue;
        }
        return outcome(rc, || {
            wide::decode_reported(&buffer[..length.min(buffer.len())], what)
        });
    }
}

/// Parses the `key=value\0key=value\0\0` list returned by `SQLDriversW`.
fn driver_attributes(units: &[u16]) -> Vec<(String, String)> {
    units
        .split(|v| *v == 0)
        .filter(|v| !v.is_empty())
        .map(|v| {
            let pair = wide::decode_reported(v, "driver attribute");
            match pair.split_once('=') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (pair, String::new()),
            }
        })
        .collect()
}

impl Native for OdbcNative {
    fn name(&self) -> &str {
        "ODBC"
    }

    fn alloc_connection(&self) -> Outcome<RawHandle> {
        let Some((_guard, henv)) = env() else {
            return Outcome::Failure(SqlReturn::InvalidHandle);
        };
        let mut handle: sys::Handle = ptr::null_mut();
        let rc = unsafe { sys::SQLAllocHandle(sys::HandleType::Dbc, henv as sys::Handle, &mut handle) };
        outcome(rc, || RawHandle(handle as usize))
    }

    fn connect(
        &self,
        connection: RawHandle,
        connection_string: &str,
        login_timeout: Option<Duration>,
    ) -> Outcome<()> {
        let prepared = match login_timeout {
            Some(timeout) => outcome(
                unsafe {
                    sys::SQLSetConnectAttr(
                        dbc(connection),
                        sys::ConnectionAttribute::LoginTimeout,
                        seconds(Some(timeout)) as sys::Pointer,
                        0,
                    )
                },
                || (),
            ),
            None => Outcome::Success(()),
        };
        let text = wide::encode(connection_string);
        let Ok(length) = sys::SmallInt::try_from(text.len()) else {
            return self.fail(
                connection,
                "HY090",
                format!(
                    "The connection string is {} characters long, more than ODBC accepts",
                    text.len()
                ),
            );
        };
        prepared.and_then(|_| {
            outcome(
                unsafe {
                    sys::SQLDriverConnectW(
                        dbc(connection),
                        ptr::null_mut(),
                        text.as_ptr(),
                        length,
                        ptr::null_mut(),
                        0,
                        ptr::null_mut(),
                        sys::DriverConnectOption::NoPrompt,
                    )
                },
                || (),
            )
        })
    }

    fn disconnect(&self, connection: RawHandle) -> Outcome<()> {
        outcome(unsafe { sys::SQLDisconnect(dbc(connection)) }, || ())
    }

    fn free_connection(&self, connection: RawHandle) -> Outcome<()> {
        outcome(
            unsafe { sys::SQLFreeHandle(sys::HandleType::Dbc, dbc(connection) as sys::Handle) },
            || (),
        )
    }

    fn set_connection_attribute(
        &self,
        connection: RawHandle,
        attribute: &ConnectionAttribute,
    ) -> Outcome<()> {
        let hdbc = dbc(connection);
        let rc = unsafe {
            match attribute {
                ConnectionAttribute::AutoCommit(v) => sys::SQLSetConnectAttrW(
                    hdbc,
                    sys::ConnectionAttribute::AutoCommit,
                    *v as usize as sys::Pointer,
                    0,
                ),
                ConnectionAttribute::Isolation(v) => sys::SQLSetConnectAttrW(
                    hdbc,
                    sys::ConnectionAttribute::TxnIsolation,
                    v.code() as usize as sys::Pointer,
                    0,
                ),
                ConnectionAttribute::CurrentCatalog(v) => {
                    let catalog = wide::encode(v);
                    // Bytes, not characters
                    sys::SQLSetConnectAttrW(
                        hdbc,
                        sys::ConnectionAttribute::CurrentCatalog,
                        catalog.as_ptr() as sys::Pointer,
                        (catalog.len() * 2) as sys::Integer,
                    )
                }
                ConnectionAttribute::ConnectionDead(v) => sys::SQLSetConnectAttrW(
                    hdbc,
                    sys::ConnectionAttribute::ConnectionDead,
                    *v as usize as sys::Pointer,
                    0,
                ),
            }
        };
        outcome(rc, || ())
    }

    fn connection_attribute(
        &self,
        connection: RawHandle,
        kind: AttributeKind,
    ) -> Outcome<ConnectionAttribute> {
        let hdbc = dbc(connection);
        let number = |attribute: sys::ConnectionAttribute| {
            let mut value: u32 = 0;
            let rc = unsafe {
                sys::SQLGetConnectAttrW(
                    hdbc,
                    attribute,
                    &mut value as *mut u32 as sys::Pointer,
                    0,
                    ptr::null_mut(),
                )
            };
            outcome(rc, || value)
        };
        match kind {
            AttributeKind::AutoCommit => {
                number(sys::ConnectionAttribute::AutoCommit).map(|v| ConnectionAttribute::AutoCommit(v != 0))
            }
            AttributeKind::Isolation => number(sys::ConnectionAttribute::TxnIsolation).map(|v| {
                ConnectionAttribute::Isolation(IsolationLevel::from_code(v).unwrap_or_else(|| {
                    log::warn!(
                        "Connection {} reported the unknown isolation level {:#x}, assuming read committed",
                        connection,
                        v
                    );
                    IsolationLevel::ReadCommitted
                }))
            }),
            AttributeKind::CurrentCatalog => {
                let mut buffer = vec![0u16; 256];
                loop {
                    // Bytes, not characters
                    let mut length: sys::Integer = 0;
                    let rc = unsafe {
                        sys::SQLGetConnectAttrW(
                            hdbc,
                            sys::ConnectionAttribute::CurrentCatalog,
                            buffer.as_mut_ptr() as sys::Pointer,
                            (buffer.len() * 2) as sys::Integer,
                            &mut length,
                        )
                    };
                    let units = length.max(0) as usize / 2;
                    if status(rc) == SqlReturn::SuccessWithInfo && units >= buffer.len() {
                        buffer.resize(units + 1, 0);
                        continue;
                    }
                    break outcome(rc, || {
                        ConnectionAttribute::CurrentCatalog(wide::decode_reported(
                            &buffer[..units.min(buffer.len())],
                            "catalog",
                        ))
                    });
                }
            }
            AttributeKind::ConnectionDead => number(sys::ConnectionAttribute::ConnectionDead)
                .map(|v| ConnectionAttribute::ConnectionDead(v == CONNECTION_DEAD)),
        }
    }

    fn end_transaction(&self, connection: RawHandle, completion: Completion) -> Outcome<()> {
        let completion = match completion {
            Completion::Commit => sys::CompletionType::Commit,
            Completion::Rollback => sys::CompletionType::Rollback,
        };
        outcome(
            unsafe {
                sys::SQLEndTran(
                    sys::HandleType::Dbc,
                    dbc(connection) as sys::Handle,
                    completion,
                )
            },
            || (),
        )
    }

    fn alloc_statement(&self, connection: RawHandle) -> Outcome<RawHandle> {
        let mut handle: sys::Handle = ptr::null_mut();
        let rc = unsafe {
            sys::SQLAllocHandle(
                sys::HandleType::Stmt,
                dbc(connection) as sys::Handle,
                &mut handle,
            )
        };
        outcome(rc, || RawHandle(handle as usize))
    }

    fn free_statement(&self, statement: RawHandle) -> Outcome<()> {
        let rc =
            unsafe { sys::SQLFreeHandle(sys::HandleType::Stmt, stmt(statement) as sys::Handle) };
        if status(rc).is_success() {
            self.parameters().remove(&statement);
        }
        outcome(rc, || ())
    }

    fn prepare(&self, statement: RawHandle, sql: &str) -> Outcome<()> {
        let text = wide::encode(sql);
        outcome(
            unsafe { sys::SQLPrepareW(stmt(statement), text.as_ptr(), text.len() as sys::Integer) },
            || (),
        )
    }

    fn exec_direct(&self, statement: RawHandle, sql: &str) -> Outcome<()> {
        let text = wide::encode(sql);
        outcome(
            unsafe {
                sys::SQLExecDirectW(stmt(statement), text.as_ptr(), text.len() as sys::Integer)
            },
            || (),
        )
    }

    fn num_params(&self, statement: RawHandle) -> Outcome<u16> {
        let mut count: sys::SmallInt = 0;
        let rc = unsafe { sys::SQLNumParams(stmt(statement), &mut count) };
        outcome(rc, || count.max(0) as u16)
    }

    fn describe_param(&self, statement: RawHandle, ordinal: u16) -> Outcome<ParameterDescription> {
        let mut data_type = sys::SqlDataType(0);
        let mut size: sys::ULen = 0;
        let mut digits: sys::SmallInt = 0;
        let mut nullable = sys::Nullability(2);
        let rc = unsafe {
            sys::SQLDescribeParam(
                stmt(statement),
                ordinal,
                &mut data_type,
                &mut size,
                &mut digits,
                &mut nullable,
            )
        };
        outcome(rc, || ParameterDescription {
            data_type: DataType::from_native(data_type.0, size, digits),
            nullable: Nullability::from_native(nullable.0),
        })
    }

    fn bind_parameter(
        &self,
        statement: RawHandle,
        ordinal: u16,
        declared: &DataType,
        buffer: NativeBuffer,
    ) -> Outcome<()> {
        let buffer = if buffer.c_type == CType::Char && !buffer.is_null() {
            match wide::to_wide_bytes(buffer.bytes()) {
                Ok(v) => NativeBuffer::new(CType::Char, v),
                Err(e) => {
                    return self.fail(
                        statement,
                        INVALID_CHARACTER,
                        format!("Parameter {} cannot be bound, {}", ordinal, e),
                    );
                }
            }
        } else {
            buffer
        };
        let mut buffer = Box::new(buffer);
        let (code, size, digits) = declared.to_native();
        let size = match (size, buffer.c_type) {
            (0, CType::Char) => (buffer.data.len() / 2).max(1),
            (0, _) => buffer.data.len().max(1),
            _ => size,
        };
        let rc = unsafe {
            sys::SQLBindParameter(
                stmt(statement),
                ordinal,
                sys::ParamType::Input,
                c_data_type(buffer.c_type),
                sys::SqlDataType(code),
                size,
                digits,
                buffer.data.as_mut_ptr() as sys::Pointer,
                buffer.data.len() as sys::Len,
                &mut buffer.indicator as *mut isize as *mut sys::Len,
            )
        };
        if status(rc).is_success() {
            self.parameters()
                .entry(statement)
                .or_default()
                .insert(ordinal, buffer);
        }
        outcome(rc, || ())
    }

    fn reset_parameters(&self, statement: RawHandle) -> Outcome<()> {
        let rc = unsafe { sys::SQLFreeStmt(stmt(statement), sys::FreeStmtOption::ResetParams) };
        if status(rc).is_success() {
            self.parameters().remove(&statement);
        }
        outcome(rc, || ())
    }

    fn set_statement_attribute(
        &self,
        statement: RawHandle,
        attribute: &StatementAttribute,
    ) -> Outcome<()> {
        let hstmt = stmt(statement);
        match *attribute {
            StatementAttribute::QueryTimeout(timeout) => outcome(
                unsafe {
                    sys::SQLSetStmtAttr(
                        hstmt,
                        sys::StatementAttribute::QueryTimeout,
                        seconds(timeout) as sys::Pointer,
                        0,
                    )
                },
                || (),
            ),
            StatementAttribute::Scrollable(scrollable) => {
                let wanted = if scrollable {
                    CURSOR_STATIC
                } else {
                    CURSOR_FORWARD_ONLY
                };
                // The cursor type of a prepared statement cannot change, skip the call when already right
                let current = self.cursor_type(statement);
                if current == Outcome::Success(wanted) {
                    return Outcome::Success(());
                }
                outcome(
                    unsafe {
                        sys::SQLSetStmtAttr(
                            hstmt,
                            sys::StatementAttribute::CursorType,
                            wanted as sys::Pointer,
                            0,
                        )
                    },
                    || (),
                )
            }
        }
    }

    fn execute(&self, statement: RawHandle) -> Outcome<()> {
        outcome(unsafe { sys::SQLExecute(stmt(statement)) }, || ())
    }

    fn num_result_cols(&self, statement: RawHandle) -> Outcome<u16> {
        let mut count: sys::SmallInt = 0;
        let rc = unsafe { sys::SQLNumResultCols(stmt(statement), &mut count) };
        outcome(rc, || count.max(0) as u16)
    }

    fn row_count(&self, statement: RawHandle) -> Outcome<i64> {
        let mut count: sys::Len = 0;
        let rc = unsafe { sys::SQLRowCount(stmt(statement), &mut count) };
        outcome(rc, || count as i64)
    }

    fn describe_col(&self, statement: RawHandle, column: u16) -> Outcome<ColumnDescription> {
        let mut data_type = sys::SqlDataType(0);
        let mut size: sys::ULen = 0;
        let mut digits: sys::SmallInt = 0;
        let mut nullable = sys::Nullability(2);
        let name = read_text(256, "column name", |buffer, length| unsafe {
            sys::SQLDescribeColW(
                stmt(statement),
                column,
                buffer.as_mut_ptr(),
                buffer.len().min(sys::SmallInt::MAX as usize) as sys::SmallInt,
                length,
                &mut data_type,
                &mut size,
                &mut digits,
                &mut nullable,
            )
        });
        name.map(|name| {
            ColumnDescription::new(
                name,
                DataType::from_native(data_type.0, size, digits),
                Nullability::from_native(nullable.0),
            )
        })
    }

    fn scrollable(&self, statement: RawHandle) -> Outcome<bool> {
        self.cursor_type(statement)
            .map(|v| v != CURSOR_FORWARD_ONLY)
    }

    fn fetch(&self, statement: RawHandle) -> Outcome<()> {
        outcome(unsafe { sys::SQLFetch(stmt(statement)) }, || ())
    }

    fn fetch_scroll(&self, statement: RawHandle, offset: i64) -> Outcome<()> {
        outcome(
            unsafe {
                sys::SQLFetchScroll(
                    stmt(statement),
                    sys::FetchOrientation::Relative,
                    offset as sys::Len,
                )
            },
            || (),
        )
    }

    fn get_data(
        &self,
        statement: RawHandle,
        column: u16,
        c_type: CType,
        chunk: usize,
    ) -> Outcome<NativeBuffer> {
        let hstmt = stmt(statement);
        let target = c_data_type(c_type);
        if let Some(size) = c_type.fixed_size() {
            let mut data = vec![0u8; size];
            let mut indicator: sys::Len = 0;
            let rc = unsafe {
                sys::SQLGetData(
                    hstmt,
                    column,
                    target,
                    data.as_mut_ptr() as sys::Pointer,
                    size as sys::Len,
                    &mut indicator,
                )
            };
            return outcome(rc, || {
                if indicator == NativeBuffer::NULL_DATA as sys::Len {
                    NativeBuffer::null(c_type)
                } else {
                    NativeBuffer::new(c_type, data)
                }
            });
        }
        // Text is null terminated by the driver, binary is not. Wide text
        // pieces hold whole units.
        let text = c_type == CType::Char;
        let (terminator, chunk) = match text {
            true => (wide::TERMINATOR, chunk.max(2).next_multiple_of(2)),
            false => (0, chunk.max(1)),
        };
        let mut piece = vec![0u8; chunk + terminator];
        let mut data = Vec::new();
        let mut first = true;
        loop {
            let mut indicator: sys::Len = 0;
            let rc = unsafe {
                sys::SQLGetData(
                    hstmt,
                    column,
                    target,
                    piece.as_mut_ptr() as sys::Pointer,
                    piece.len() as sys::Len,
                    &mut indicator,
                )
            };
            match status(rc) {
                v @ (SqlReturn::Success | SqlReturn::SuccessWithInfo) => {
                    if indicator == NativeBuffer::NULL_DATA as sys::Len {
                        return Outcome::Success(NativeBuffer::null(c_type));
                    }
                    let available = piece.len() - terminator;
                    let truncated = indicator == NO_TOTAL || indicator as usize > available;
                    let written = if truncated {
                        available
                    } else {
                        indicator as usize
                    };
                    data.extend_from_slice(&piece[..written]);
                    if !truncated {
                        let buffer = match self.text_column(statement, column, c_type, data) {
                            Ok(v) => v,
                            Err(failure) => return failure,
                        };
                        return match v {
                            SqlReturn::SuccessWithInfo => Outcome::SuccessWithInfo(buffer),
                            _ => Outcome::Success(buffer),
                        };
                    }
                }
                SqlReturn::NoData if !first => {
                    return match self.text_column(statement, column, c_type, data) {
                        Ok(v) => Outcome::Success(v),
                        Err(failure) => failure,
                    };
                }
                v => return Outcome::from_status(v, || NativeBuffer::null(c_type)),
            }
            first = false;
        }
    }

    fn close_cursor(&self, statement: RawHandle) -> Outcome<()> {
        outcome(unsafe { sys::SQLCloseCursor(stmt(statement)) }, || ())
    }

    fn cancel(&self, statement: RawHandle) -> Outcome<()> {
        outcome(unsafe { sys::SQLCancel(stmt(statement)) }, || ())
    }

    fn diagnostics(&self, kind: HandleKind, handle: RawHandle) -> Vec<DiagnosticRecord> {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle);
        let records = match kind {
            HandleKind::Environment => match env() {
                Some((_guard, henv)) => diagnostics::read(sys::HandleType::Env, henv as sys::Handle),
                None => Vec::new(),
            },
            HandleKind::Connection => {
                diagnostics::read(sys::HandleType::Dbc, dbc(handle) as sys::Handle)
            }
            HandleKind::Statement => {
                diagnostics::read(sys::HandleType::Stmt, stmt(handle) as sys::Handle)
            }
        };
        pending.into_iter().chain(records).collect()
    }

    fn drivers(&self) -> Outcome<Vec<DriverInfo>> {
        let Some((_guard, henv)) = env() else {
            return Outcome::Failure(SqlReturn::InvalidHandle);
        };
        let mut drivers = Vec::new();
        let mut direction = sys::FetchOrientation::First;
        loop {
            let mut description = [0u16; 512];
            let mut attributes = [0u16; 4096];
            let mut description_length: sys::SmallInt = 0;
            let mut attributes_length: sys::SmallInt = 0;
            let rc = unsafe {
                sys::SQLDriversW(
                    henv,
                    direction,
                    description.as_mut_ptr(),
                    description.len() as sys::SmallInt,
                    &mut description_length,
                    attributes.as_mut_ptr(),
                    attributes.len() as sys::SmallInt,
                    &mut attributes_length,
                )
            };
            match status(rc) {
                SqlReturn::Success | SqlReturn::SuccessWithInfo => {}
                SqlReturn::NoData if drivers.is_empty() => return Outcome::NoData,
                SqlReturn::NoData => return Outcome::Success(drivers),
                v => return Outcome::Failure(v),
            }
            let name_end = (description_length.max(0) as usize).min(description.len() - 1);
            let attributes_end = (attributes_length.max(0) as usize).min(attributes.len());
            drivers.push(DriverInfo {
                name: wide::decode_reported(&description[..name_end], "driver name"),
                attributes: driver_attributes(&attributes[..attributes_end]),
            });
            direction = sys::FetchOrientation::Next;
        }
    }

    fn data_sources(&self) -> Outcome<Vec<DataSourceInfo>> {
        let Some((_guard, henv)) = env() else {
            return Outcome::Failure(SqlReturn::InvalidHandle);
        };
        let mut sources = Vec::new();
        let mut direction = sys::FetchOrientation::First;
        loop {
            let mut name = [0u16; 256];
            let mut driver = [0u16; 512];
            let mut name_length: sys::SmallInt = 0;
            let mut driver_length: sys::SmallInt = 0;
            let rc = unsafe {
                sys::SQLDataSourcesW(
                    henv,
                    direction,
                    name.as_mut_ptr(),
                    name.len() as sys::SmallInt,
                    &mut name_length,
                    driver.as_mut_ptr(),
                    driver.len() as sys::SmallInt,
                    &mut driver_length,
                )
            };
            match status(rc) {
                SqlReturn::Success | SqlReturn::SuccessWithInfo => {}
                SqlReturn::NoData if sources.is_empty() => return Outcome::NoData,
                SqlReturn::NoData => return Outcome::Success(sources),
                v => return Outcome::Failure(v),
            }
            let name_end = (name_length.max(0) as usize).min(name.len() - 1);
            let driver_end = (driver_length.max(0) as usize).min(driver.len() - 1);
            sources.push(DataSourceInfo {
                name: wide::decode_reported(&name[..name_end], "data source name"),
                driver: wide::decode_reported(&driver[..driver_end], "driver name"),
            });
            direction = sys::FetchOrientation::Next;
        }
    }
}

impl OdbcNative {
    /// Turns the wide bytes read from a text column into UTF-8, other
    /// buffers pass through.
    fn text_column(
        &self,
        statement: RawHandle,
        column: u16,
        c_type: CType,
        data: Vec<u8>,
    ) -> std::result::Result<NativeBuffer, Outcome<NativeBuffer>> {
        if c_type != CType::Char {
            return Ok(NativeBuffer::new(c_type, data));
        }
        wide::from_wide_bytes(&data)
            .map(|v| NativeBuffer::new(CType::Char, v))
            .map_err(|e| {
                self.fail(
                    statement,
                    INVALID_CHARACTER,
                    format!("Column {} returned {}", column, e),
                )
            })
    }

    fn cursor_type(&self, statement: RawHandle) -> Outcome<usize> {
        let mut value: sys::ULen = 0;
        let rc = unsafe {
            sys::SQLGetStmtAttr(
                stmt(statement),
                sys::StatementAttribute::CursorType,
                &mut value as *mut sys::ULen as sys::Pointer,
                0,
                ptr::null_mut(),
            )
        };
        outcome(rc, || value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_round_up_to_seconds() {
        assert_eq!(seconds(None), 0);
        assert_eq!(seconds(Some(Duration::from_secs(3))), 3);
        assert_eq!(seconds(Some(Duration::from_millis(1500))), 2);
        assert_eq!(seconds(Some(Duration::from_millis(1))), 1);
    }

    #[test]
    fn driver_attribute_list() {
        let attributes = driver_attributes(&wide::encode(
            "Driver=libsqlite3odbc.so\0Setup=\0UsageCount=1\0\0",
        ));
        assert_eq!(
            attributes,
            [
                ("Driver".to_string(), "libsqlite3odbc.so".to_string()),
                ("Setup".to_string(), String::new()),
                ("UsageCount".to_string(), "1".to_string()),
            ]
        );
        assert!(driver_attributes(&[0]).is_empty());
    }

    #[test]
    fn c_types() {
        assert_eq!(c_data_type(CType::SBigInt), sys::CDataType::SBigInt);
        assert_eq!(c_data_type(CType::Timestamp), sys::CDataType::TypeTimestamp);
        assert_eq!(c_data_type(CType::Char), sys::CDataType::WChar);
    }

    #[test]
    fn undecodable_text_is_a_failure() {
        let native = OdbcNative {
            parameters: Default::default(),
            pending: Default::default(),
        };
        let statement = RawHandle(0x10);
        let lone_surrogate = 0xD800u16.to_ne_bytes().to_vec();
        let failure = native
            .text_column(statement, 2, CType::Char, lone_surrogate)
            .expect_err("A lone surrogate is not text");
        assert_eq!(failure, Outcome::Failure(SqlReturn::Error));
        let record = native
            .pending
            .lock()
            .unwrap()
            .remove(&statement)
            .expect("The failure leaves a record");
        assert_eq!(record.state, INVALID_CHARACTER);
        assert!(record.message.contains("Column 2"));

        let text = "Grüße".encode_utf16().flat_map(u16::to_ne_bytes).collect();
        let buffer = native
            .text_column(statement, 1, CType::Char, text)
            .expect("Valid text");
        assert_eq!(buffer.bytes(), "Grüße".as_bytes());
        let binary = native
            .text_column(statement, 1, CType::Binary, vec![0xD8, 0])
            .expect("Binary passes through");
        assert_eq!(binary.bytes(), [0xD8, 0]);
    }
}
