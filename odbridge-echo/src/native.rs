use crate::{
    convert, diag,
    sql::{self, Command, Parsed},
    state::{ConnectionEntry, Fault, Reply, State, StatementEntry},
    store::{self, Bound},
};
use odbridge_core::{
    AttributeKind, CType, ColumnDescription, Completion, ConnectionAttribute, DataSourceInfo,
    DataType, DiagnosticRecord, DriverInfo, EntryPoint, HandleKind, Native, NativeBuffer, Outcome,
    ParameterDescription, RawHandle, SqlReturn, StatementAttribute, parse_connection_string,
};
use std::{
    collections::HashSet,
    sync::{
        Condvar, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

/// Name accepted in the `DRIVER` attribute of a connection string.
pub const DRIVER_NAME: &str = "Echo";

/// Handles currently allocated in an [`EchoNative`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Resources {
    pub connections: usize,
    pub statements: usize,
}

/// A [`Native`] library backed by an in-memory store.
///
/// It behaves like a driver manager with a single driver: handles, status
/// codes and diagnostic records follow ODBC, so the whole bridge can be
/// exercised without any system library. Connection strings must name either
/// `DRIVER=Echo` or one of the configured data sources, `DATABASE` selects a
/// named store (`main` by default) shared by every connection to it, and
/// `SERVER=unreachable` fails with a login timeout.
///
/// The accepted SQL is a small dialect, see the crate documentation.
pub struct EchoNative {
    name: String,
    scrollable: bool,
    describe_parameters: bool,
    missing: HashSet<EntryPoint>,
    credentials: Option<(String, String)>,
    data_sources: Vec<DataSourceInfo>,
    next_handle: AtomicUsize,
    state: Mutex<State>,
    wake: Condvar,
}

impl Default for EchoNative {
    fn default() -> Self {
        Self::new()
    }
}

impl EchoNative {
    pub fn new() -> Self {
        Self {
            name: "echo".into(),
            scrollable: true,
            describe_parameters: true,
            missing: HashSet::new(),
            credentials: None,
            data_sources: vec![DataSourceInfo {
                name: "echo".into(),
                driver: DRIVER_NAME.into(),
            }],
            next_handle: AtomicUsize::new(0x1000),
            state: Mutex::new(State::default()),
            wake: Condvar::new(),
        }
    }

    /// Whether cursors can be opened scrollable, when `false` asking for one
    /// succeeds with a warning and a forward only cursor.
    pub fn with_scrollable_cursors(mut self, scrollable: bool) -> Self {
        self.scrollable = scrollable;
        self
    }

    /// When `false` describing a parameter fails with `HYC00`.
    pub fn with_parameter_description(mut self, describe: bool) -> Self {
        self.describe_parameters = describe;
        self
    }

    /// Requires `UID` and `PWD` in the connection string.
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((user.into(), password.into()));
        self
    }

    pub fn with_data_source(mut self, name: impl Into<String>) -> Self {
        self.data_sources.push(DataSourceInfo {
            name: name.into(),
            driver: DRIVER_NAME.into(),
        });
        self
    }

    pub fn without_data_sources(mut self) -> Self {
        self.data_sources.clear();
        self
    }

    /// Hides `entry`, as a library that does not export it.
    pub fn without(mut self, entry: EntryPoint) -> Self {
        self.missing.insert(entry);
        self
    }

    pub fn resources(&self) -> Resources {
        let state = self.state();
        Resources {
            connections: state.connections.len(),
            statements: state.statements.len(),
        }
    }

    /// Drops every open session as a network failure would, later calls on
    /// them fail with `08S01`.
    pub fn sever_connections(&self) {
        let mut state = self.state();
        for connection in state.connections.values_mut().filter(|v| v.connected) {
            connection.dead = true;
        }
        log::debug!("Severed {} echo connections", state.connections.len());
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn allocate(&self) -> RawHandle {
        RawHandle(self.next_handle.fetch_add(0x10, Ordering::Relaxed))
    }

    fn call<T>(
        &self,
        entry: EntryPoint,
        kind: HandleKind,
        handle: RawHandle,
        f: impl FnOnce(&mut State, &mut Vec<DiagnosticRecord>) -> Reply<T>,
    ) -> Outcome<T> {
        let mut state = self.state();
        let mut warnings = Vec::new();
        let reply = if self.missing.contains(&entry) {
            Err(not_exported(entry).into())
        } else {
            f(&mut *state, &mut warnings)
        };
        finish(&mut *state, kind, handle, warnings, reply)
    }

    /// Checks the statement can run and marks it executing.
    fn start(
        &self,
        state: &mut State,
        entry: EntryPoint,
        statement: RawHandle,
        sql: Option<&str>,
    ) -> Result<Parsed, Fault> {
        if self.missing.contains(&entry) {
            return Err(not_exported(entry).into());
        }
        let current = state.statement(statement)?;
        if current.result.is_some() {
            return Err(diag("24000", "Invalid cursor state, a cursor is still open").into());
        }
        let parsed = match sql {
            Some(sql) => {
                let connection = current.connection;
                let parsed = sql::parse(sql)?;
                store::check(state.database(connection)?, &parsed.command)?;
                parsed
            }
            None => current
                .prepared
                .clone()
                .ok_or_else(|| diag("HY010", "Function sequence error, nothing is prepared"))?,
        };
        let current = state.statement(statement)?;
        current.executing = true;
        current.cancelled = false;
        Ok(parsed)
    }

    fn run_statement(
        &self,
        entry: EntryPoint,
        statement: RawHandle,
        sql: Option<&str>,
    ) -> Outcome<()> {
        let mut state = self.state();
        let mut warnings = Vec::new();
        let reply = match self.start(&mut *state, entry, statement, sql) {
            Ok(parsed) => {
                let reply = match &parsed.command {
                    Command::Wait { seconds } => {
                        let (guard, reply) = self.wait(state, statement, *seconds);
                        state = guard;
                        reply
                    }
                    _ => state.run(statement, &parsed, &mut warnings),
                };
                if let Some(current) = state.statements.get_mut(&statement) {
                    current.executing = false;
                    current.cancelled = false;
                }
                reply
            }
            Err(e) => Err(e),
        };
        finish(&mut *state, HandleKind::Statement, statement, warnings, reply)
    }

    /// Blocks for `seconds`, forever when `None`, releasing the lock while
    /// waiting. Ends early when cancelled or when the query timeout expires.
    fn wait<'a>(
        &self,
        mut state: MutexGuard<'a, State>,
        statement: RawHandle,
        seconds: Option<f64>,
    ) -> (MutexGuard<'a, State>, Reply<()>) {
        let timeout = state.statements.get(&statement).and_then(|v| v.timeout);
        let limit = seconds.and_then(|v| Duration::try_from_secs_f64(v.max(0.0)).ok());
        let started = Instant::now();
        loop {
            if state
                .statements
                .get(&statement)
                .is_none_or(|v| v.cancelled)
            {
                log::debug!("Echo statement {} was cancelled", statement);
                return (state, Err(diag("HY008", "Operation canceled").into()));
            }
            let elapsed = started.elapsed();
            if timeout.is_some_and(|v| elapsed >= v) {
                return (state, Err(diag("HYT00", "Timeout expired").into()));
            }
            if limit.is_some_and(|v| elapsed >= v) {
                if let Some(current) = state.statements.get_mut(&statement) {
                    current.result = None;
                    current.affected = 0;
                }
                return (state, Ok(None));
            }
            state = match [timeout, limit].into_iter().flatten().min() {
                Some(until) => self
                    .wake
                    .wait_timeout(state, until - elapsed)
                    .map(|(guard, _)| guard)
                    .unwrap_or_else(|e| e.into_inner().0),
                None => self
                    .wake
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }
}

fn not_exported(entry: EntryPoint) -> DiagnosticRecord {
    diag(
        "IM001",
        format!("Driver does not support this function, {}", entry),
    )
}

fn no_cursor() -> DiagnosticRecord {
    diag("24000", "Invalid cursor state, no cursor is open")
}

fn invalid_index(index: u16) -> DiagnosticRecord {
    diag("07009", format!("Invalid descriptor index {}", index))
}

/// Stores the records left by the call and turns the reply into an outcome.
fn finish<T>(
    state: &mut State,
    kind: HandleKind,
    handle: RawHandle,
    warnings: Vec<DiagnosticRecord>,
    reply: Reply<T>,
) -> Outcome<T> {
    let mut records = warnings;
    let outcome = match reply {
        Ok(Some(v)) if records.is_empty() => Outcome::Success(v),
        Ok(Some(v)) => Outcome::SuccessWithInfo(v),
        Ok(None) => Outcome::NoData,
        Err(Fault::Diagnostic(record)) => {
            records.push(record);
            Outcome::Failure(SqlReturn::Error)
        }
        Err(Fault::InvalidHandle) => {
            records.clear();
            Outcome::Failure(SqlReturn::InvalidHandle)
        }
    };
    if records.is_empty() {
        state.diagnostics.remove(&(kind, handle));
    } else {
        state.diagnostics.insert((kind, handle), records);
    }
    outcome
}

impl Native for EchoNative {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, entry: EntryPoint) -> bool {
        !self.missing.contains(&entry)
    }

    fn alloc_connection(&self) -> Outcome<RawHandle> {
        self.call(
            EntryPoint::AllocStatement,
            HandleKind::Environment,
            RawHandle::NULL,
            |state, _| {
                let handle = self.allocate();
                state.connections.insert(handle, ConnectionEntry::default());
                Ok(Some(handle))
            },
        )
    }

    fn connect(
        &self,
        connection: RawHandle,
        connection_string: &str,
        login_timeout: Option<Duration>,
    ) -> Outcome<()> {
        self.call(
            EntryPoint::Connect,
            HandleKind::Connection,
            connection,
            |state, _| {
                let attributes = parse_connection_string(connection_string);
                let get = |key: &str| {
                    attributes
                        .iter()
                        .rev()
                        .find(|(k, _)| k.eq_ignore_ascii_case(key))
                        .map(|(_, v)| v.as_str())
                };
                let entry = state.connection(connection)?;
                if entry.connected {
                    return Err(diag("08002", "Connection name in use").into());
                }
                if get("SERVER").is_some_and(|v| v.eq_ignore_ascii_case("unreachable")) {
                    return Err(diag(
                        "HYT00",
                        format!(
                            "Login timeout expired after {:?}",
                            login_timeout.unwrap_or_default()
                        ),
                    )
                    .into());
                }
                let known = match (get("DSN"), get("DRIVER")) {
                    (Some(dsn), _) => self
                        .data_sources
                        .iter()
                        .any(|v| v.name.eq_ignore_ascii_case(dsn)),
                    (None, Some(driver)) => driver.eq_ignore_ascii_case(DRIVER_NAME),
                    (None, None) => false,
                };
                if !known {
                    return Err(diag(
                        "IM002",
                        "Data source name not found and no default driver specified",
                    )
                    .into());
                }
                if let Some((user, password)) = &self.credentials
                    && (get("UID") != Some(user.as_str()) || get("PWD") != Some(password.as_str()))
                {
                    return Err(diag(
                        "28000",
                        format!(
                            "Invalid authorization specification, login failed for user `{}`",
                            get("UID").unwrap_or_default()
                        ),
                    )
                    .into());
                }
                entry.database = get("DATABASE").unwrap_or("main").to_string();
                entry.connected = true;
                entry.dead = false;
                log::trace!("Echo connection {} uses database {}", connection, entry.database);
                Ok(Some(()))
            },
        )
    }

    fn disconnect(&self, connection: RawHandle) -> Outcome<()> {
        self.call(
            EntryPoint::Disconnect,
            HandleKind::Connection,
            connection,
            |state, warnings| {
                let entry = state.connection(connection)?;
                if !entry.connected {
                    return Err(diag("08003", "Connection not open").into());
                }
                entry.connected = false;
                let snapshot = entry.snapshot.take();
                let name = entry.database.clone();
                if let Some(snapshot) = snapshot {
                    let database = state.databases.entry(name).or_default();
                    if *database != snapshot {
                        *database = snapshot;
                        warnings.push(diag(
                            "01000",
                            "The open transaction was rolled back by the disconnect",
                        ));
                    }
                }
                let children = state
                    .statements
                    .iter()
                    .filter(|(_, v)| v.connection == connection)
                    .map(|(k, _)| *k)
                    .collect::<Vec<_>>();
                for statement in children {
                    state.free_statement(statement);
                }
                Ok(Some(()))
            },
        )
    }

    fn free_connection(&self, connection: RawHandle) -> Outcome<()> {
        self.call(
            EntryPoint::FreeStatement,
            HandleKind::Connection,
            connection,
            |state, _| {
                let connected = state.connections.get(&connection).map(|v| v.connected);
                match connected {
                    None => Err(Fault::InvalidHandle),
                    Some(true) => Err(diag(
                        "HY010",
                        "Function sequence error, the connection is still open",
                    )
                    .into()),
                    Some(false) => {
                        state.connections.remove(&connection);
                        Ok(Some(()))
                    }
                }
            },
        )
    }

    fn set_connection_attribute(
        &self,
        connection: RawHandle,
        attribute: &ConnectionAttribute,
    ) -> Outcome<()> {
        self.call(
            EntryPoint::SetConnectionAttribute,
            HandleKind::Connection,
            connection,
            |state, _| {
                let entry = state.session(connection)?;
                match attribute {
                    ConnectionAttribute::AutoCommit(auto_commit) => {
                        if *auto_commit == entry.auto_commit {
                            return Ok(Some(()));
                        }
                        entry.auto_commit = *auto_commit;
                        if *auto_commit {
                            entry.snapshot = None;
                        } else {
                            let name = entry.database.clone();
                            let snapshot = state.databases.entry(name).or_default().clone();
                            state.connection(connection)?.snapshot = Some(snapshot);
                        }
                    }
                    ConnectionAttribute::Isolation(isolation) => entry.isolation = *isolation,
                    ConnectionAttribute::CurrentCatalog(catalog) => {
                        if entry.snapshot.is_some() {
                            return Err(diag(
                                "25000",
                                "Invalid transaction state, the catalog cannot change inside a transaction",
                            )
                            .into());
                        }
                        entry.database = catalog.clone();
                    }
                    ConnectionAttribute::ConnectionDead(..) => {
                        return Err(diag(
                            "HY092",
                            "Invalid attribute identifier, the attribute is read only",
                        )
                        .into());
                    }
                }
                Ok(Some(()))
            },
        )
    }

    fn connection_attribute(
        &self,
        connection: RawHandle,
        kind: AttributeKind,
    ) -> Outcome<ConnectionAttribute> {
        self.call(
            EntryPoint::ConnectionAttribute,
            HandleKind::Connection,
            connection,
            |state, _| {
                if kind == AttributeKind::ConnectionDead {
                    let entry = state.connection(connection)?;
                    return Ok(Some(ConnectionAttribute::ConnectionDead(
                        entry.dead || !entry.connected,
                    )));
                }
                let entry = state.session(connection)?;
                Ok(Some(match kind {
                    AttributeKind::AutoCommit => ConnectionAttribute::AutoCommit(entry.auto_commit),
                    AttributeKind::Isolation => ConnectionAttribute::Isolation(entry.isolation),
                    AttributeKind::CurrentCatalog => {
                        ConnectionAttribute::CurrentCatalog(entry.database.clone())
                    }
                    AttributeKind::ConnectionDead => ConnectionAttribute::ConnectionDead(false),
                }))
            },
        )
    }

    fn end_transaction(&self, connection: RawHandle, completion: Completion) -> Outcome<()> {
        self.call(
            EntryPoint::EndTransaction,
            HandleKind::Connection,
            connection,
            |state, _| {
                let entry = state.session(connection)?;
                let Some(snapshot) = entry.snapshot.take() else {
                    return Ok(Some(()));
                };
                let name = entry.database.clone();
                let database = state.databases.entry(name).or_default();
                if completion == Completion::Rollback {
                    *database = snapshot;
                }
                let current = database.clone();
                state.connection(connection)?.snapshot = Some(current);
                Ok(Some(()))
            },
        )
    }

    fn alloc_statement(&self, connection: RawHandle) -> Outcome<RawHandle> {
        self.call(
            EntryPoint::AllocStatement,
            HandleKind::Connection,
            connection,
            |state, _| {
                state.session(connection)?;
                let handle = self.allocate();
                state
                    .statements
                    .insert(handle, StatementEntry::new(connection));
                Ok(Some(handle))
            },
        )
    }

    fn free_statement(&self, statement: RawHandle) -> Outcome<()> {
        self.call(
            EntryPoint::FreeStatement,
            HandleKind::Statement,
            statement,
            |state, _| {
                if state.free_statement(statement) {
                    Ok(Some(()))
                } else {
                    Err(Fault::InvalidHandle)
                }
            },
        )
    }

    fn prepare(&self, statement: RawHandle, sql: &str) -> Outcome<()> {
        self.call(
            EntryPoint::Prepare,
            HandleKind::Statement,
            statement,
            |state, _| {
                let connection = state.statement(statement)?.connection;
                let parsed = sql::parse(sql)?;
                store::check(state.database(connection)?, &parsed.command)?;
                let entry = state.statement(statement)?;
                entry.prepared = Some(parsed);
                entry.parameters.clear();
                entry.result = None;
                Ok(Some(()))
            },
        )
    }

    fn exec_direct(&self, statement: RawHandle, sql: &str) -> Outcome<()> {
        self.run_statement(EntryPoint::ExecDirect, statement, Some(sql))
    }

    fn num_params(&self, statement: RawHandle) -> Outcome<u16> {
        self.call(
            EntryPoint::NumParams,
            HandleKind::Statement,
            statement,
            |state, _| {
                let entry = state.statement(statement)?;
                let parsed = entry
                    .prepared
                    .as_ref()
                    .ok_or_else(|| diag("HY010", "Function sequence error, nothing is prepared"))?;
                Ok(Some(parsed.parameters))
            },
        )
    }

    fn describe_param(&self, statement: RawHandle, ordinal: u16) -> Outcome<ParameterDescription> {
        self.call(
            EntryPoint::DescribeParam,
            HandleKind::Statement,
            statement,
            |state, _| {
                if !self.describe_parameters {
                    return Err(diag("HYC00", "Optional feature not implemented").into());
                }
                let entry = state.statement(statement)?;
                let parsed = entry
                    .prepared
                    .clone()
                    .ok_or_else(|| diag("HY010", "Function sequence error, nothing is prepared"))?;
                if ordinal == 0 || ordinal > parsed.parameters {
                    return Err(invalid_index(ordinal).into());
                }
                let connection = entry.connection;
                let description = store::describe_parameter(
                    state.database(connection)?,
                    &parsed.command,
                    ordinal,
                )?;
                Ok(Some(description))
            },
        )
    }

    fn bind_parameter(
        &self,
        statement: RawHandle,
        ordinal: u16,
        declared: &DataType,
        buffer: NativeBuffer,
    ) -> Outcome<()> {
        self.call(
            EntryPoint::BindParameter,
            HandleKind::Statement,
            statement,
            |state, _| {
                let entry = state.statement(statement)?;
                let count = entry.prepared.as_ref().map_or(0, |v| v.parameters);
                if ordinal == 0 || ordinal > count {
                    return Err(invalid_index(ordinal).into());
                }
                entry.parameters.remove(&ordinal);
                store::check_length(declared, &buffer)?;
                entry.parameters.insert(
                    ordinal,
                    Bound {
                        declared: *declared,
                        buffer,
                    },
                );
                Ok(Some(()))
            },
        )
    }

    fn reset_parameters(&self, statement: RawHandle) -> Outcome<()> {
        self.call(
            EntryPoint::BindParameter,
            HandleKind::Statement,
            statement,
            |state, _| {
                state.statement(statement)?.parameters.clear();
                Ok(Some(()))
            },
        )
    }

    fn set_statement_attribute(
        &self,
        statement: RawHandle,
        attribute: &StatementAttribute,
    ) -> Outcome<()> {
        self.call(
            EntryPoint::Execute,
            HandleKind::Statement,
            statement,
            |state, warnings| {
                let entry = state.statement(statement)?;
                match *attribute {
                    StatementAttribute::QueryTimeout(timeout) => {
                        entry.timeout = timeout.filter(|v| !v.is_zero());
                    }
                    StatementAttribute::Scrollable(true) if !self.scrollable => {
                        warnings.push(diag(
                            "01S02",
                            "Option value changed, only forward only cursors are available",
                        ));
                        entry.scrollable = false;
                    }
                    StatementAttribute::Scrollable(scrollable) => entry.scrollable = scrollable,
                }
                Ok(Some(()))
            },
        )
    }

    fn execute(&self, statement: RawHandle) -> Outcome<()> {
        self.run_statement(EntryPoint::Execute, statement, None)
    }

    fn num_result_cols(&self, statement: RawHandle) -> Outcome<u16> {
        self.call(
            EntryPoint::NumResultCols,
            HandleKind::Statement,
            statement,
            |state, _| {
                let entry = state.statement(statement)?;
                Ok(Some(
                    entry.result.as_ref().map_or(0, |v| v.columns.len() as u16),
                ))
            },
        )
    }

    fn row_count(&self, statement: RawHandle) -> Outcome<i64> {
        self.call(
            EntryPoint::RowCount,
            HandleKind::Statement,
            statement,
            |state, _| Ok(Some(state.statement(statement)?.affected)),
        )
    }

    fn describe_col(&self, statement: RawHandle, column: u16) -> Outcome<ColumnDescription> {
        self.call(
            EntryPoint::DescribeCol,
            HandleKind::Statement,
            statement,
            |state, _| {
                let entry = state.statement(statement)?;
                let result = entry.result.as_ref().ok_or_else(|| {
                    diag("07005", "Prepared statement not a cursor-specification")
                })?;
                let description = usize::from(column)
                    .checked_sub(1)
                    .and_then(|i| result.columns.get(i))
                    .ok_or_else(|| invalid_index(column))?;
                Ok(Some(description.clone()))
            },
        )
    }

    fn scrollable(&self, statement: RawHandle) -> Outcome<bool> {
        self.call(
            EntryPoint::FetchScroll,
            HandleKind::Statement,
            statement,
            |state, _| {
                let entry = state.statement(statement)?;
                let result = entry.result.as_ref().ok_or_else(no_cursor)?;
                Ok(Some(result.scrollable))
            },
        )
    }

    fn fetch(&self, statement: RawHandle) -> Outcome<()> {
        self.call(
            EntryPoint::Fetch,
            HandleKind::Statement,
            statement,
            |state, _| {
                let entry = state.statement(statement)?;
                let result = entry.result.as_mut().ok_or_else(no_cursor)?;
                Ok(result.advance(1).then_some(()))
            },
        )
    }

    fn fetch_scroll(&self, statement: RawHandle, offset: i64) -> Outcome<()> {
        self.call(
            EntryPoint::FetchScroll,
            HandleKind::Statement,
            statement,
            |state, _| {
                let entry = state.statement(statement)?;
                let result = entry.result.as_mut().ok_or_else(no_cursor)?;
                if !result.scrollable {
                    return Err(diag(
                        "HY106",
                        "Fetch type out of range, the cursor is forward only",
                    )
                    .into());
                }
                Ok(result.advance(offset).then_some(()))
            },
        )
    }

    fn get_data(
        &self,
        statement: RawHandle,
        column: u16,
        c_type: CType,
        _chunk: usize,
    ) -> Outcome<NativeBuffer> {
        self.call(
            EntryPoint::GetData,
            HandleKind::Statement,
            statement,
            |state, _| {
                let entry = state.statement(statement)?;
                let result = entry.result.as_ref().ok_or_else(no_cursor)?;
                let row = result.current()?;
                let cell = usize::from(column)
                    .checked_sub(1)
                    .and_then(|i| row.get(i))
                    .ok_or_else(|| invalid_index(column))?;
                Ok(Some(convert(cell, c_type)?))
            },
        )
    }

    fn close_cursor(&self, statement: RawHandle) -> Outcome<()> {
        self.call(
            EntryPoint::CloseCursor,
            HandleKind::Statement,
            statement,
            |state, _| {
                let entry = state.statement(statement)?;
                match entry.result.take() {
                    Some(..) => Ok(Some(())),
                    None => Err(no_cursor().into()),
                }
            },
        )
    }

    fn cancel(&self, statement: RawHandle) -> Outcome<()> {
        self.call(
            EntryPoint::Cancel,
            HandleKind::Statement,
            statement,
            |state, _| {
                let entry = state
                    .statements
                    .get_mut(&statement)
                    .ok_or(Fault::InvalidHandle)?;
                if entry.executing {
                    entry.cancelled = true;
                    self.wake.notify_all();
                }
                Ok(Some(()))
            },
        )
    }

    fn diagnostics(&self, kind: HandleKind, handle: RawHandle) -> Vec<DiagnosticRecord> {
        self.state()
            .diagnostics
            .get(&(kind, handle))
            .cloned()
            .unwrap_or_default()
    }

    fn drivers(&self) -> Outcome<Vec<DriverInfo>> {
        self.call(
            EntryPoint::Drivers,
            HandleKind::Environment,
            RawHandle::NULL,
            |_, _| {
                Ok(Some(vec![DriverInfo {
                    name: DRIVER_NAME.into(),
                    attributes: vec![
                        ("APILevel".into(), "1".into()),
                        ("FileUsage".into(), "0".into()),
                    ],
                }]))
            },
        )
    }

    fn data_sources(&self) -> Outcome<Vec<DataSourceInfo>> {
        self.call(
            EntryPoint::DataSources,
            HandleKind::Environment,
            RawHandle::NULL,
            |_, _| {
                if self.data_sources.is_empty() {
                    return Ok(None);
                }
                Ok(Some(self.data_sources.clone()))
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(native: &EchoNative) -> (RawHandle, RawHandle) {
        let Outcome::Success(connection) = native.alloc_connection() else {
            panic!("Could not allocate a connection");
        };
        assert!(native.connect(connection, "DRIVER={Echo}", None).is_success());
        let Outcome::Success(statement) = native.alloc_statement(connection) else {
            panic!("Could not allocate a statement");
        };
        (connection, statement)
    }

    #[test]
    fn failure_leaves_records() {
        let native = EchoNative::new();
        let (_, statement) = open(&native);
        let outcome = native.exec_direct(statement, "RAISE '42S02' 'No such table'");
        assert_eq!(outcome, Outcome::Failure(SqlReturn::Error));
        let records = native.diagnostics(HandleKind::Statement, statement);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].state, "01000");
        assert_eq!(records[1].state, "42S02");
        assert!(native.exec_direct(statement, "SELECT 1").is_success());
        assert!(native.diagnostics(HandleKind::Statement, statement).is_empty());
    }

    #[test]
    fn unknown_handles() {
        let native = EchoNative::new();
        assert_eq!(
            native.fetch(RawHandle(0x42)),
            Outcome::Failure(SqlReturn::InvalidHandle)
        );
        assert!(native.diagnostics(HandleKind::Statement, RawHandle(0x42)).is_empty());
    }

    #[test]
    fn cursor_state() {
        let native = EchoNative::new();
        let (_, statement) = open(&native);
        assert!(native.exec_direct(statement, "SELECT 1 AS a, 'x' AS b").is_success());
        assert_eq!(native.num_result_cols(statement), Outcome::Success(2));
        assert_eq!(
            native.exec_direct(statement, "SELECT 2"),
            Outcome::Failure(SqlReturn::Error)
        );
        assert_eq!(native.fetch(statement), Outcome::Success(()));
        let Outcome::Success(value) = native.get_data(statement, 2, CType::Char, 16) else {
            panic!("Could not read the second column");
        };
        assert_eq!(value.bytes(), b"x");
        assert_eq!(native.fetch(statement), Outcome::NoData);
        assert!(native.close_cursor(statement).is_success());
        assert_eq!(
            native.close_cursor(statement),
            Outcome::Failure(SqlReturn::Error)
        );
    }

    #[test]
    fn forward_only_driver_warns() {
        let native = EchoNative::new().with_scrollable_cursors(false);
        let (_, statement) = open(&native);
        let outcome =
            native.set_statement_attribute(statement, &StatementAttribute::Scrollable(true));
        assert_eq!(outcome, Outcome::SuccessWithInfo(()));
        assert!(native.exec_direct(statement, "SELECT 1").is_success());
        assert_eq!(native.scrollable(statement), Outcome::Success(false));
    }

    #[test]
    fn disconnect_frees_statements() {
        let native = EchoNative::new();
        let (connection, _) = open(&native);
        assert_eq!(
            native.free_connection(connection),
            Outcome::Failure(SqlReturn::Error)
        );
        assert!(native.disconnect(connection).is_success());
        assert!(native.free_connection(connection).is_success());
        assert_eq!(native.resources(), Resources::default());
    }
}
