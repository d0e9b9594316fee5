use crate::{
    ColumnDescription, ErrorKind, HandleKind, Native, RawHandle, Result, Row,
    StatementInner, StatementState,
    diagnostics::{complete, require},
    marshal,
};
use std::sync::{Arc, Weak, atomic::Ordering};

pub(crate) enum CursorParent<N: Native> {
    /// Result of a prepared statement, which outlives the cursor.
    Statement(Weak<StatementInner<N>>),
    /// Result of a direct execution, the statement is released with the cursor.
    Owned(Arc<StatementInner<N>>),
}

/// An open result set, read one row at a time.
///
/// A cursor is not restartable: once exhausted or closed it stays so, reading
/// the rows again means executing the statement again, which also invalidates
/// this cursor. Relative positioning is available only when the cursor was
/// opened scrollable.
///
/// Dropping the cursor closes it.
pub struct Cursor<N: Native> {
    parent: CursorParent<N>,
    epoch: u64,
    columns: Arc<[ColumnDescription]>,
    labels: Arc<[String]>,
    scrollable: bool,
    fetched: u64,
    exhausted: bool,
    closed: bool,
    failed: bool,
}

impl<N: Native> std::fmt::Debug for Cursor<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("columns", &self.columns)
            .field("scrollable", &self.scrollable)
            .field("fetched", &self.fetched)
            .field("exhausted", &self.exhausted)
            .field("closed", &self.closed)
            .finish()
    }
}

impl<N: Native> Cursor<N> {
    pub(crate) fn new(
        parent: CursorParent<N>,
        epoch: u64,
        columns: Vec<ColumnDescription>,
        scrollable: bool,
    ) -> Self {
        let labels = columns.iter().map(|v| v.name.clone()).collect();
        Self {
            parent,
            epoch,
            columns: columns.into(),
            labels,
            scrollable,
            fetched: 0,
            exhausted: false,
            closed: false,
            failed: false,
        }
    }

    /// Column metadata, the same for the whole life of the cursor.
    pub fn columns(&self) -> &[ColumnDescription] {
        &self.columns
    }

    pub fn labels(&self) -> &Arc<[String]> {
        &self.labels
    }

    /// Index of the first column named `name`, case insensitive.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.labels.iter().position(|v| v.eq_ignore_ascii_case(name))
    }

    pub fn is_scrollable(&self) -> bool {
        self.scrollable
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of successful fetches so far.
    pub fn fetched(&self) -> u64 {
        self.fetched
    }

    fn statement(&self) -> Result<Arc<StatementInner<N>>> {
        if self.closed {
            return Err(ErrorKind::State.error("The cursor is closed"));
        }
        match &self.parent {
            CursorParent::Statement(v) => v
                .upgrade()
                .ok_or_else(|| ErrorKind::State.error("The statement of the cursor is closed")),
            CursorParent::Owned(v) => Ok(v.clone()),
        }
    }

    fn with_state<T>(
        &mut self,
        f: impl FnOnce(&mut Self, &N, RawHandle, &mut StatementState) -> Result<T>,
    ) -> Result<T> {
        let statement = self.statement()?;
        let epoch = self.epoch;
        let result = statement.with_state(|native, raw, state| {
            if statement.epoch.load(Ordering::Acquire) != epoch || !state.cursor_open {
                return Err(ErrorKind::State.error(
                    "The cursor was invalidated by a later execution of its statement",
                ));
            }
            f(self, native, raw, state)
        });
        result.map_err(|e| {
            let error = e.context(format!(
                "While reading the result of the query:\n{}",
                crate::truncate_long!(statement.sql)
            ));
            log::error!("{:#}", error);
            error
        })
    }

    fn read_row(&self, native: &N, raw: RawHandle, chunk: usize) -> Result<Row> {
        let values = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let c_type = marshal::c_type_for(&column.data_type)
                    .map_err(|e| e.context(format!("While reading column `{}`", column.name)))?;
                let buffer = require(
                    native,
                    native.get_data(raw, i as u16 + 1, c_type, chunk),
                    ErrorKind::Execution,
                    HandleKind::Statement,
                    raw,
                )?;
                marshal::from_native(&buffer, column)
            })
            .collect::<Result<Box<[_]>>>()?;
        Ok(Row::new(self.labels.clone(), values))
    }

    /// The next row, `None` once the rows are exhausted.
    pub fn fetch_next(&mut self) -> Result<Option<Row>> {
        if self.closed {
            return Err(ErrorKind::State.error("The cursor is closed"));
        }
        if self.exhausted {
            return Ok(None);
        }
        let chunk = self.statement()?.config.text_chunk;
        self.with_state(|cursor, native, raw, state| {
            let fetched = complete(
                native,
                native.fetch(raw),
                ErrorKind::Execution,
                HandleKind::Statement,
                raw,
            )?;
            if fetched.is_none() {
                cursor.exhausted = true;
                if let CursorParent::Statement(..) = cursor.parent {
                    state.cursor_open = false;
                    complete(
                        native,
                        native.close_cursor(raw),
                        ErrorKind::Execution,
                        HandleKind::Statement,
                        raw,
                    )?;
                }
                return Ok(None);
            }
            cursor.fetched += 1;
            cursor.read_row(native, raw, chunk).map(Some)
        })
    }

    /// Moves `offset` rows from the current one and reads it. `None` when the
    /// position falls outside the result set.
    ///
    /// Only for scrollable cursors, a forward only cursor fails with a state error.
    pub fn fetch_relative(&mut self, offset: i64) -> Result<Option<Row>> {
        if self.closed {
            return Err(ErrorKind::State.error("The cursor is closed"));
        }
        if !self.scrollable {
            let error =
                ErrorKind::State.error("The cursor is forward only, relative fetch is not available");
            log::error!("{:#}", error);
            return Err(error);
        }
        if self.exhausted {
            return Ok(None);
        }
        let chunk = self.statement()?.config.text_chunk;
        self.with_state(|cursor, native, raw, _| {
            let fetched = complete(
                native,
                native.fetch_scroll(raw, offset),
                ErrorKind::Execution,
                HandleKind::Statement,
                raw,
            )?;
            if fetched.is_none() {
                return Ok(None);
            }
            cursor.fetched += 1;
            cursor.read_row(native, raw, chunk).map(Some)
        })
    }

    /// Releases the result set, unread rows are discarded. Closing again does nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match &self.parent {
            CursorParent::Owned(statement) => statement.close(),
            CursorParent::Statement(statement) => {
                let Some(statement) = statement.upgrade() else {
                    return Ok(());
                };
                if !statement.handle.is_open() {
                    return Ok(());
                }
                let epoch = self.epoch;
                match statement.with_state(|_, raw, state| {
                    if statement.epoch.load(Ordering::Acquire) == epoch {
                        statement.close_cursor(raw, state);
                    }
                    Ok(())
                }) {
                    Err(e) if ErrorKind::of(&e) == Some(ErrorKind::State) => Ok(()),
                    other => other,
                }
            }
        }
    }
}

impl<N: Native> Iterator for Cursor<N> {
    type Item = Result<Row>;

    /// Stops after the rows are exhausted or after the first error.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.fetch_next() {
            Ok(v) => v.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

impl<N: Native> Drop for Cursor<N> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("{:#}", e);
        }
    }
}
