use crate::{
    BridgeError, ColumnDescription, Config, ConnectionInner, Cursor, CursorParent, DataType,
    EntryPoint, ErrorKind, HandleKind, Native, Outcome, ParameterDescription, QueryResult, RawHandle, Result,
    RowsAffected, StatementAttribute, Value,
    diagnostics::{complete, require},
    handle::{HandleCell, HandleState},
    marshal, truncate_long,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        Arc, Mutex, PoisonError, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

/// A prepared statement.
///
/// Parameters are 1-based. Each successful [`Statement::execute`] invalidates
/// the cursor returned by the previous one. Closing the connection invalidates
/// the statement: every later call fails with a state error.
///
/// Dropping the statement closes it.
pub struct Statement<N: Native> {
    pub(crate) inner: Arc<StatementInner<N>>,
}

pub(crate) struct StatementInner<N: Native> {
    pub(crate) native: Arc<N>,
    pub(crate) config: Config,
    pub(crate) connection: Weak<ConnectionInner<N>>,
    pub(crate) handle: HandleCell,
    pub(crate) sql: Arc<str>,
    /// Incremented by every execution and by close, a cursor is valid only
    /// while the epoch it was created in is current.
    pub(crate) epoch: AtomicU64,
    pub(crate) state: Mutex<StatementState>,
    /// Held around freeing and cancelling, the only native calls that do
    /// not go through the connection lock.
    pub(crate) releasing: Mutex<()>,
    /// True while a native execution is in progress.
    pub(crate) executing: AtomicBool,
    /// Shared with the connection, set when it starts closing.
    pub(crate) closing: Arc<AtomicBool>,
}

pub(crate) struct StatementState {
    pub(crate) parameters: Vec<ParameterDescription>,
    pub(crate) bound: BTreeMap<u16, Value>,
    /// Ordinals whose native bind failed, they must be bound again before executing.
    pub(crate) broken: BTreeSet<u16>,
    pub(crate) scrollable: bool,
    pub(crate) query_timeout: Option<Duration>,
    pub(crate) cursor_open: bool,
}

impl<N: Native> StatementInner<N> {
    pub(crate) fn new(
        native: Arc<N>,
        config: Config,
        connection: Weak<ConnectionInner<N>>,
        closing: Arc<AtomicBool>,
        raw: RawHandle,
        sql: Arc<str>,
    ) -> Self {
        let state = StatementState {
            parameters: Vec::new(),
            bound: BTreeMap::new(),
            broken: BTreeSet::new(),
            scrollable: config.scrollable,
            query_timeout: config.query_timeout,
            cursor_open: false,
        };
        Self {
            native,
            config,
            connection,
            handle: HandleCell::new(HandleKind::Statement, raw),
            sql,
            epoch: AtomicU64::new(0),
            state: Mutex::new(state),
            releasing: Mutex::new(()),
            executing: AtomicBool::new(false),
            closing,
        }
    }

    /// Runs `f` sharing the connection lock and holding the statement lock.
    pub(crate) fn with_state<T>(
        &self,
        f: impl FnOnce(&N, RawHandle, &mut StatementState) -> Result<T>,
    ) -> Result<T> {
        self.handle.get()?;
        let connection = self.connection.upgrade().ok_or_else(|| {
            ErrorKind::State.error("The statement was invalidated because its connection was closed")
        })?;
        let _connection = connection.state.read().map_err(BridgeError::from)?;
        let mut state = self.state.lock().map_err(BridgeError::from)?;
        let raw = self.handle.get()?;
        f(self.native.as_ref(), raw, &mut *state)
    }

    pub(crate) fn with_state_logged<T>(
        &self,
        context: impl FnOnce() -> String,
        f: impl FnOnce(&N, RawHandle, &mut StatementState) -> Result<T>,
    ) -> Result<T> {
        let result = self.with_state(f).map_err(|e| e.context(context()));
        if let Err(e) = &result {
            log::error!("{:#}", e);
        }
        result
    }

    pub(crate) fn apply_attributes(&self, raw: RawHandle, state: &StatementState) -> Result<()> {
        let native = self.native.as_ref();
        for attribute in [
            StatementAttribute::QueryTimeout(state.query_timeout),
            StatementAttribute::Scrollable(state.scrollable),
        ] {
            complete(
                native,
                native.set_statement_attribute(raw, &attribute),
                ErrorKind::Execution,
                HandleKind::Statement,
                raw,
            )?;
        }
        Ok(())
    }

    /// Runs the native execution `f`, refused once the connection is closing.
    pub(crate) fn run_execution<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.executing.store(true, Ordering::SeqCst);
        let result = if self.closing.load(Ordering::SeqCst) {
            Err(ErrorKind::State.error("The connection is closing"))
        } else {
            f()
        };
        self.executing.store(false, Ordering::SeqCst);
        result
    }

    /// Cancels the native execution in progress, if any. Takes neither the
    /// connection lock nor the statement lock, both are held by the execution.
    pub(crate) fn cancel(&self) -> Result<()> {
        let native = self.native.as_ref();
        if !native.supports(EntryPoint::Cancel) {
            return Err(ErrorKind::State.error(format!(
                "Cancellation is not supported by the native library {}",
                native.name()
            )));
        }
        let _releasing = self.releasing.lock().unwrap_or_else(PoisonError::into_inner);
        let raw = self.handle.get()?;
        complete(
            native,
            native.cancel(raw),
            ErrorKind::Execution,
            HandleKind::Statement,
            raw,
        )
        .map(|_| ())
    }

    /// Classifies a completed execution into affected rows or a cursor.
    /// `has_result` is false when the native library returned no data.
    pub(crate) fn collect(
        self: &Arc<Self>,
        raw: RawHandle,
        state: &mut StatementState,
        has_result: bool,
        owned: bool,
    ) -> Result<QueryResult<N>> {
        let native = self.native.as_ref();
        if !has_result {
            return Ok(QueryResult::Affected(RowsAffected::NONE));
        }
        let count = step(native, raw, native.num_result_cols(raw), "counting the result columns")?;
        if count == 0 {
            let rows = step(native, raw, native.row_count(raw), "counting the affected rows")?;
            return Ok(QueryResult::Affected(RowsAffected::from_native(rows)));
        }
        state.cursor_open = true;
        let opened = (|| {
            let columns = (1..=count)
                .map(|i| {
                    step(native, raw, native.describe_col(raw, i), "describing the result columns")
                })
                .collect::<Result<Vec<ColumnDescription>>>()?;
            let scrollable = if state.scrollable {
                let scrollable = native.supports(EntryPoint::FetchScroll)
                    && step(native, raw, native.scrollable(raw), "checking the cursor type")?;
                if !scrollable {
                    return Err(ErrorKind::Execution.error(
                        "A scrollable cursor was requested but the native library opened a forward only one",
                    ));
                }
                true
            } else {
                false
            };
            Ok((columns, scrollable))
        })();
        let (columns, scrollable) = match opened {
            Ok(v) => v,
            Err(e) => {
                self.close_cursor(raw, state);
                return Err(e);
            }
        };
        let parent = if owned {
            CursorParent::Owned(self.clone())
        } else {
            CursorParent::Statement(Arc::downgrade(self))
        };
        let epoch = self.epoch.load(Ordering::Acquire);
        log::trace!(
            "Opened cursor on statement {} with {} columns",
            raw,
            columns.len()
        );
        Ok(QueryResult::Rows(Cursor::new(
            parent, epoch, columns, scrollable,
        )))
    }

    pub(crate) fn close_cursor(&self, raw: RawHandle, state: &mut StatementState) {
        if !state.cursor_open {
            return;
        }
        state.cursor_open = false;
        let native = self.native.as_ref();
        if let Err(e) = complete(
            native,
            native.close_cursor(raw),
            ErrorKind::Execution,
            HandleKind::Statement,
            raw,
        ) {
            log::warn!("Could not close the cursor of statement {}: {:#}", raw, e);
        }
    }

    /// Releases the native statement. Callers hold the connection lock
    /// exclusively or the statement lock.
    pub(crate) fn release(&self, state: HandleState) {
        let _releasing = self.releasing.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(raw) = self.handle.release(state) else {
            return;
        };
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let freed = self.native.free_statement(raw);
        if !freed.is_success() {
            log::warn!("Could not free the statement handle {}: {}", raw, freed.status());
        }
        log::trace!("Freed statement {}", raw);
    }

    pub(crate) fn close(&self) -> Result<()> {
        if !self.handle.is_open() {
            return Ok(());
        }
        let connection = self.connection.upgrade();
        let _connection = match &connection {
            Some(v) => Some(v.state.read().map_err(BridgeError::from)?),
            None => None,
        };
        let mut state = self.state.lock().map_err(BridgeError::from)?;
        if let Ok(raw) = self.handle.get() {
            self.close_cursor(raw, &mut state);
        }
        self.release(HandleState::Closed);
        Ok(())
    }
}

fn step<N: Native, T>(native: &N, raw: RawHandle, outcome: Outcome<T>, what: &str) -> Result<T> {
    require(native, outcome, ErrorKind::Execution, HandleKind::Statement, raw)
        .map_err(|e| e.context(format!("While {}", what)))
}

impl<N: Native> std::fmt::Debug for Statement<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.inner.sql)
            .field("handle", &self.inner.handle)
            .finish()
    }
}

impl<N: Native> Statement<N> {
    /// The SQL text, as passed to the native library.
    pub fn sql(&self) -> &str {
        &self.inner.sql
    }

    pub fn is_open(&self) -> bool {
        self.inner.handle.is_open()
    }

    fn context(&self, action: &str) -> impl FnOnce() -> String + use<N> {
        let sql = self.inner.sql.clone();
        let action = action.to_string();
        move || format!("While {} the statement:\n{}", action, truncate_long!(sql))
    }

    pub fn parameter_count(&self) -> Result<u16> {
        self.inner
            .with_state(|_, _, state| Ok(state.parameters.len() as u16))
    }

    /// Declared parameter types, [`DataType::Unknown`] where the native
    /// library could not describe them.
    pub fn parameters(&self) -> Result<Vec<ParameterDescription>> {
        self.inner
            .with_state(|_, _, state| Ok(state.parameters.clone()))
    }

    /// The value currently bound to `ordinal`.
    pub fn bound(&self, ordinal: u16) -> Result<Option<Value>> {
        self.inner
            .with_state(|_, _, state| Ok(state.bound.get(&ordinal).cloned()))
    }

    /// Binds `value` to the parameter `ordinal`, starting from 1.
    ///
    /// A value whose type is not compatible with the declared type of the
    /// parameter is rejected without touching the native side, the previous
    /// binding stays. When the native library rejects the buffer the
    /// statement cannot be executed until the parameter is bound again.
    pub fn bind(&self, ordinal: u16, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.inner.with_state_logged(
            self.context(&format!("binding parameter {} of", ordinal)),
            |native, raw, state| {
                let count = state.parameters.len();
                if ordinal == 0 || ordinal as usize > count {
                    return Err(ErrorKind::Bind.error(format!(
                        "Parameter ordinal {} is out of range, the statement has {} parameters",
                        ordinal, count
                    )));
                }
                let declared = state.parameters[ordinal as usize - 1].data_type;
                let buffer = marshal::to_native(&value, &declared)?;
                let declared = if declared == DataType::Unknown {
                    DataType::for_value(&value)
                } else {
                    declared
                };
                match complete(
                    native,
                    native.bind_parameter(raw, ordinal, &declared, buffer),
                    ErrorKind::Bind,
                    HandleKind::Statement,
                    raw,
                ) {
                    Ok(..) => {
                        state.broken.remove(&ordinal);
                        state.bound.insert(ordinal, value);
                        Ok(())
                    }
                    Err(e) => {
                        state.broken.insert(ordinal);
                        state.bound.remove(&ordinal);
                        Err(e)
                    }
                }
            },
        )
    }

    /// Binds the values in order, from ordinal 1. Stops at the first failure.
    pub fn bind_all<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> Result<()> {
        for (i, value) in values.into_iter().enumerate() {
            let ordinal = u16::try_from(i + 1)
                .map_err(|_| ErrorKind::Bind.error("Too many values to bind"))?;
            self.bind(ordinal, value)?;
        }
        Ok(())
    }

    /// Removes every binding.
    pub fn clear_bindings(&self) -> Result<()> {
        self.inner.with_state_logged(self.context("clearing the bindings of"), |native, raw, state| {
            complete(
                native,
                native.reset_parameters(raw),
                ErrorKind::Bind,
                HandleKind::Statement,
                raw,
            )?;
            state.bound.clear();
            state.broken.clear();
            Ok(())
        })
    }

    /// Requests a scrollable cursor from the next execution.
    pub fn set_scrollable(&self, scrollable: bool) -> Result<()> {
        self.inner.with_state(|_, _, state| {
            state.scrollable = scrollable;
            Ok(())
        })
    }

    /// Timeout passed to the native library, `None` waits indefinitely.
    pub fn set_query_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.with_state(|_, _, state| {
            state.query_timeout = timeout;
            Ok(())
        })
    }

    /// Executes the statement with the current bindings.
    ///
    /// The native library decides whether the statement produces rows. Any
    /// cursor returned by a previous execution is closed first.
    pub fn execute(&self) -> Result<QueryResult<N>> {
        let inner = &self.inner;
        inner.with_state_logged(self.context("executing"), |native, raw, state| {
            if let Some(ordinal) = state.broken.first() {
                return Err(ErrorKind::Bind.error(format!(
                    "The statement is unusable until parameter {} is bound again",
                    ordinal
                )));
            }
            if let Some(ordinal) =
                (1..=state.parameters.len() as u16).find(|v| !state.bound.contains_key(v))
            {
                return Err(ErrorKind::Bind.error(format!("Parameter {} is not bound", ordinal)));
            }
            inner.close_cursor(raw, state);
            inner.epoch.fetch_add(1, Ordering::AcqRel);
            inner.apply_attributes(raw, state)?;
            let executed = inner.run_execution(|| {
                complete(
                    native,
                    native.execute(raw),
                    ErrorKind::Execution,
                    HandleKind::Statement,
                    raw,
                )
            })?;
            inner.collect(raw, state, executed.is_some(), false)
        })
    }

    /// Asks the native library to cancel the execution in progress on
    /// another thread. Never waits for the execution nor for a connection
    /// that is closing.
    ///
    /// Fails with a state error when the native library has no cancellation
    /// entry point.
    pub fn cancel(&self) -> Result<()> {
        let result = self
            .inner
            .cancel()
            .map_err(|e| e.context((self.context("cancelling"))()));
        if let Err(e) = &result {
            log::error!("{:#}", e);
        }
        result
    }

    /// Closes the cursor, if any, and releases the native statement. Closing
    /// again does nothing.
    pub fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

impl<N: Native> Drop for Statement<N> {
    fn drop(&mut self) {
        if let Err(e) = self.inner.close() {
            log::error!("{:#}", e);
        }
    }
}
