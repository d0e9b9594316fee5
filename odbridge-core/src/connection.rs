use crate::{
    AttributeKind, BridgeError, Completion, Config, ConnectionAttribute, EntryPoint, ErrorKind,
    HandleKind, IsolationLevel, Native, ParameterDescription, QueryResult, RawHandle, Result,
    Statement, StatementInner, Transaction,
    diagnostics::{complete, require},
    handle::{HandleCell, HandleState},
    truncate_long,
};
use std::{
    sync::{
        Arc, Mutex, PoisonError, RwLock, TryLockError, Weak,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

/// An open session with a data source.
///
/// Every operation takes the connection lock: connection level calls take it
/// exclusively, statement and cursor calls share it. Closing cancels the
/// executions in flight on derived statements and waits for the other calls,
/// then invalidates all of them before the native handle is released.
///
/// Dropping the connection closes it.
pub struct Connection<N: Native> {
    pub(crate) inner: Arc<ConnectionInner<N>>,
}

pub(crate) struct ConnectionInner<N: Native> {
    pub(crate) native: Arc<N>,
    pub(crate) config: Config,
    pub(crate) handle: HandleCell,
    pub(crate) state: RwLock<ConnectionState>,
    /// Set once closing starts, new executions are refused from then on.
    pub(crate) closing: Arc<AtomicBool>,
    pub(crate) statements: Mutex<Vec<Weak<StatementInner<N>>>>,
}

pub(crate) struct ConnectionState {
    pub(crate) auto_commit: bool,
}

impl<N: Native> std::fmt::Debug for Connection<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("native", &self.inner.native.name())
            .field("handle", &self.inner.handle)
            .finish()
    }
}

impl<N: Native> Connection<N> {
    pub(crate) fn new(native: Arc<N>, config: Config, raw: RawHandle) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                native,
                config,
                handle: HandleCell::new(HandleKind::Connection, raw),
                state: RwLock::new(ConnectionState { auto_commit: true }),
                closing: Arc::new(AtomicBool::new(false)),
                statements: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// `false` after [`Connection::close`].
    pub fn is_open(&self) -> bool {
        self.inner.handle.is_open()
    }

    /// Runs `f` holding the connection lock exclusively.
    fn exclusive<T>(
        &self,
        context: impl FnOnce(RawHandle) -> String,
        f: impl FnOnce(&N, RawHandle, &mut ConnectionState) -> Result<T>,
    ) -> Result<T> {
        let result = (|| {
            let mut state = self.inner.state.write().map_err(BridgeError::from)?;
            let raw = self.inner.handle.get()?;
            f(self.inner.native.as_ref(), raw, &mut *state).map_err(|e| e.context(context(raw)))
        })();
        if let Err(e) = &result {
            log::error!("{:#}", e);
        }
        result
    }

    fn set_attribute(&self, attribute: ConnectionAttribute, kind: ErrorKind) -> Result<()> {
        self.exclusive(
            |raw| format!("While setting {:?} on connection {}", attribute, raw),
            |native, raw, _| {
                complete(
                    native,
                    native.set_connection_attribute(raw, &attribute),
                    kind,
                    HandleKind::Connection,
                    raw,
                )
                .map(|_| ())
            },
        )
    }

    fn attribute(&self, kind: AttributeKind) -> Result<ConnectionAttribute> {
        self.exclusive(
            |raw| format!("While reading {:?} of connection {}", kind, raw),
            |native, raw, _| {
                let value = require(
                    native,
                    native.connection_attribute(raw, kind),
                    ErrorKind::Execution,
                    HandleKind::Connection,
                    raw,
                )?;
                if value.kind() != kind {
                    return Err(ErrorKind::Execution.error(format!(
                        "The native library returned {:?} when asked {:?}",
                        value, kind
                    )));
                }
                Ok(value)
            },
        )
    }

    pub fn set_auto_commit(&self, auto_commit: bool) -> Result<()> {
        self.exclusive(
            |raw| format!("While setting autocommit {} on connection {}", auto_commit, raw),
            |native, raw, state| {
                complete(
                    native,
                    native.set_connection_attribute(
                        raw,
                        &ConnectionAttribute::AutoCommit(auto_commit),
                    ),
                    ErrorKind::Transaction,
                    HandleKind::Connection,
                    raw,
                )?;
                state.auto_commit = auto_commit;
                Ok(())
            },
        )
    }

    pub fn auto_commit(&self) -> Result<bool> {
        let state = self.inner.state.read().map_err(BridgeError::from)?;
        self.inner.handle.get()?;
        Ok(state.auto_commit)
    }

    /// Starts a transaction by switching autocommit off until the returned
    /// guard is committed or rolled back.
    pub fn begin(&self) -> Result<Transaction<'_, N>> {
        let restore = self.auto_commit()?;
        if restore {
            self.set_auto_commit(false)?;
        }
        Ok(Transaction::new(self, restore))
    }

    fn end_transaction(&self, completion: Completion) -> Result<()> {
        self.exclusive(
            |raw| format!("While trying to {} on connection {}", completion, raw),
            |native, raw, _| {
                complete(
                    native,
                    native.end_transaction(raw, completion),
                    ErrorKind::Transaction,
                    HandleKind::Connection,
                    raw,
                )
                .map(|_| ())
            },
        )
    }

    pub fn commit(&self) -> Result<()> {
        self.end_transaction(Completion::Commit)
    }

    pub fn rollback(&self) -> Result<()> {
        self.end_transaction(Completion::Rollback)
    }

    pub fn set_isolation(&self, isolation: IsolationLevel) -> Result<()> {
        self.set_attribute(
            ConnectionAttribute::Isolation(isolation),
            ErrorKind::Transaction,
        )
    }

    pub fn isolation(&self) -> Result<IsolationLevel> {
        match self.attribute(AttributeKind::Isolation)? {
            ConnectionAttribute::Isolation(v) => Ok(v),
            _ => Err(ErrorKind::State.error("Unexpected attribute")),
        }
    }

    /// Changes the current catalog (database) of the session.
    pub fn set_catalog(&self, catalog: &str) -> Result<()> {
        self.set_attribute(
            ConnectionAttribute::CurrentCatalog(catalog.to_string()),
            ErrorKind::Execution,
        )
    }

    pub fn catalog(&self) -> Result<String> {
        match self.attribute(AttributeKind::CurrentCatalog)? {
            ConnectionAttribute::CurrentCatalog(v) => Ok(v),
            _ => Err(ErrorKind::State.error("Unexpected attribute")),
        }
    }

    /// Asks the native library whether the session is still alive. A closed
    /// connection is not connected.
    pub fn is_connected(&self) -> Result<bool> {
        if !self.is_open() {
            return Ok(false);
        }
        match self.attribute(AttributeKind::ConnectionDead)? {
            ConnectionAttribute::ConnectionDead(dead) => Ok(!dead),
            _ => Err(ErrorKind::State.error("Unexpected attribute")),
        }
    }

    /// Prepares `sql`, passed to the native library unmodified.
    pub fn prepare(&self, sql: &str) -> Result<Statement<N>> {
        let describe = self.inner.config.describe_parameters;
        self.exclusive(
            |raw| {
                format!(
                    "While preparing on connection {} the query:\n{}",
                    raw,
                    truncate_long!(sql)
                )
            },
            |native, raw, _| {
                let statement = self.alloc_statement(native, raw, sql)?;
                let handle = statement.handle.get()?;
                let prepared = (|| {
                    complete(
                        native,
                        native.prepare(handle, sql),
                        ErrorKind::Prepare,
                        HandleKind::Statement,
                        handle,
                    )?;
                    let count = require(
                        native,
                        native.num_params(handle),
                        ErrorKind::Prepare,
                        HandleKind::Statement,
                        handle,
                    )?;
                    let describe = describe && native.supports(EntryPoint::DescribeParam);
                    Ok((1..=count)
                        .map(|i| {
                            if !describe {
                                return ParameterDescription::UNKNOWN;
                            }
                            match native.describe_param(handle, i) {
                                crate::Outcome::Success(v)
                                | crate::Outcome::SuccessWithInfo(v) => v,
                                _ => {
                                    log::debug!(
                                        "Parameter {} of statement {} cannot be described",
                                        i,
                                        handle
                                    );
                                    ParameterDescription::UNKNOWN
                                }
                            }
                        })
                        .collect::<Vec<_>>())
                })();
                match prepared {
                    Ok(parameters) => {
                        statement.state.lock().map_err(BridgeError::from)?.parameters = parameters;
                        Ok(Statement { inner: statement })
                    }
                    Err(e) => {
                        statement.release(HandleState::Closed);
                        Err(e)
                    }
                }
            },
        )
    }

    /// Executes `sql` without parameters. A result set gets a cursor that
    /// owns its statement.
    pub fn execute_direct(&self, sql: &str) -> Result<QueryResult<N>> {
        self.exclusive(
            |raw| {
                format!(
                    "While executing on connection {} the query:\n{}",
                    raw,
                    truncate_long!(sql)
                )
            },
            |native, raw, _| {
                let statement = self.alloc_statement(native, raw, sql)?;
                let handle = statement.handle.get()?;
                let result = (|| {
                    let mut state = statement.state.lock().map_err(BridgeError::from)?;
                    statement.apply_attributes(handle, &state)?;
                    let executed = statement.run_execution(|| {
                        complete(
                            native,
                            native.exec_direct(handle, sql),
                            ErrorKind::Execution,
                            HandleKind::Statement,
                            handle,
                        )
                    })?;
                    statement.collect(handle, &mut *state, executed.is_some(), true)
                })();
                match result {
                    Ok(QueryResult::Rows(cursor)) => Ok(QueryResult::Rows(cursor)),
                    other => {
                        statement.release(HandleState::Closed);
                        other
                    }
                }
            },
        )
    }

    fn alloc_statement(
        &self,
        native: &N,
        raw: RawHandle,
        sql: &str,
    ) -> Result<Arc<StatementInner<N>>> {
        let handle = require(
            native,
            native.alloc_statement(raw),
            ErrorKind::Execution,
            HandleKind::Connection,
            raw,
        )?;
        log::trace!("Allocated statement {} on connection {}", handle, raw);
        let statement = Arc::new(StatementInner::new(
            self.inner.native.clone(),
            self.inner.config.clone(),
            Arc::downgrade(&self.inner),
            self.inner.closing.clone(),
            handle,
            sql.into(),
        ));
        let mut statements = self.statements();
        statements.retain(|v| v.strong_count() > 0);
        statements.push(Arc::downgrade(&statement));
        Ok(statement)
    }

    fn statements(&self) -> std::sync::MutexGuard<'_, Vec<Weak<StatementInner<N>>>> {
        self.inner
            .statements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancels the derived statements blocked in a native execution.
    fn cancel_executions(&self) {
        let executing = self
            .statements()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|v| v.executing.load(Ordering::SeqCst))
            .collect::<Vec<_>>();
        for statement in executing {
            if let Err(e) = statement.cancel() {
                log::warn!("Could not cancel a statement of the closing connection: {:#}", e);
            }
        }
    }

    /// Takes the connection lock exclusively, cancelling the executions that
    /// keep it shared until it is granted.
    fn lock_for_close(&self) -> Result<std::sync::RwLockWriteGuard<'_, ConnectionState>> {
        let cancel = self.inner.native.supports(EntryPoint::Cancel);
        loop {
            match self.inner.state.try_write() {
                Ok(v) => return Ok(v),
                Err(TryLockError::Poisoned(e)) => return Err(BridgeError::from(e).into()),
                Err(TryLockError::WouldBlock) => {
                    if cancel {
                        self.cancel_executions();
                    }
                    thread::sleep(Duration::from_millis(5));
                }
            }
        }
    }

    /// Invalidates every statement and cursor derived from this connection,
    /// then disconnects. Closing again does nothing.
    pub fn close(&self) -> Result<()> {
        if !self.inner.handle.is_open() {
            return Ok(());
        }
        self.inner.closing.store(true, Ordering::SeqCst);
        let result = (|| {
            let state = self.lock_for_close()?;
            let Some(raw) = self.inner.handle.release(HandleState::Closed) else {
                return Ok(());
            };
            let native = self.inner.native.as_ref();
            let statements = std::mem::take(&mut *self.statements());
            for statement in statements.iter().filter_map(Weak::upgrade) {
                statement.release(HandleState::Invalidated);
            }
            if !state.auto_commit {
                if let Err(e) = complete(
                    native,
                    native.end_transaction(raw, Completion::Rollback),
                    ErrorKind::Transaction,
                    HandleKind::Connection,
                    raw,
                ) {
                    log::warn!("Could not roll back while closing connection {}: {:#}", raw, e);
                } else {
                    log::warn!("Rolled back the open transaction of connection {}", raw);
                }
            }
            let disconnected = complete(
                native,
                native.disconnect(raw),
                ErrorKind::Connection,
                HandleKind::Connection,
                raw,
            )
            .map(|_| ())
            .map_err(|e| e.context(format!("While disconnecting connection {}", raw)));
            let freed = native.free_connection(raw);
            if !freed.is_success() {
                log::warn!(
                    "Could not free the connection handle {}: {}",
                    raw,
                    freed.status()
                );
            }
            log::debug!("Closed connection {}", raw);
            disconnected
        })();
        if let Err(e) = &result {
            log::error!("{:#}", e);
        }
        result
    }
}

impl<N: Native> Drop for Connection<N> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
