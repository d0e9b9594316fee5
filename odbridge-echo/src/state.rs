use crate::{
    EchoResult, diag,
    sql::{Command, Parsed},
    store::{self, Bound, Database, Execution},
};
use odbridge_core::{
    ColumnDescription, DiagnosticRecord, HandleKind, IsolationLevel, NativeBuffer, RawHandle,
};
use std::{
    collections::{BTreeMap, HashMap},
    time::Duration,
};

pub(crate) enum Fault {
    InvalidHandle,
    Diagnostic(DiagnosticRecord),
}

impl From<DiagnosticRecord> for Fault {
    fn from(value: DiagnosticRecord) -> Self {
        Fault::Diagnostic(value)
    }
}

/// `Ok(None)` is `SQL_NO_DATA`.
pub(crate) type Reply<T> = Result<Option<T>, Fault>;

pub(crate) struct ConnectionEntry {
    pub(crate) connected: bool,
    pub(crate) database: String,
    pub(crate) auto_commit: bool,
    pub(crate) isolation: IsolationLevel,
    /// Content of the database when the transaction started, restored on rollback.
    pub(crate) snapshot: Option<Database>,
    pub(crate) dead: bool,
}

impl Default for ConnectionEntry {
    fn default() -> Self {
        Self {
            connected: false,
            database: "main".into(),
            auto_commit: true,
            isolation: IsolationLevel::ReadCommitted,
            snapshot: None,
            dead: false,
        }
    }
}

pub(crate) struct ResultSet {
    pub(crate) columns: Vec<ColumnDescription>,
    pub(crate) rows: Vec<Vec<NativeBuffer>>,
    /// -1 before the first row, `rows.len()` after the last one.
    pub(crate) position: i64,
    pub(crate) scrollable: bool,
}

impl ResultSet {
    pub(crate) fn current(&self) -> EchoResult<&[NativeBuffer]> {
        usize::try_from(self.position)
            .ok()
            .and_then(|i| self.rows.get(i))
            .map(Vec::as_slice)
            .ok_or_else(|| diag("24000", "Invalid cursor state, there is no current row"))
    }

    /// Moves by `offset` rows, `false` when the new position has no row.
    pub(crate) fn advance(&mut self, offset: i64) -> bool {
        let len = self.rows.len() as i64;
        self.position = self.position.saturating_add(offset).clamp(-1, len);
        (0..len).contains(&self.position)
    }
}

pub(crate) struct StatementEntry {
    pub(crate) connection: RawHandle,
    pub(crate) prepared: Option<Parsed>,
    pub(crate) parameters: BTreeMap<u16, Bound>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) scrollable: bool,
    pub(crate) result: Option<ResultSet>,
    pub(crate) affected: i64,
    pub(crate) executing: bool,
    pub(crate) cancelled: bool,
}

impl StatementEntry {
    pub(crate) fn new(connection: RawHandle) -> Self {
        Self {
            connection,
            prepared: None,
            parameters: BTreeMap::new(),
            timeout: None,
            scrollable: false,
            result: None,
            affected: -1,
            executing: false,
            cancelled: false,
        }
    }
}

#[derive(Default)]
pub(crate) struct State {
    /// Named databases, shared by every connection.
    pub(crate) databases: HashMap<String, Database>,
    pub(crate) connections: HashMap<RawHandle, ConnectionEntry>,
    pub(crate) statements: HashMap<RawHandle, StatementEntry>,
    /// Records left by the last call on each handle.
    pub(crate) diagnostics: HashMap<(HandleKind, RawHandle), Vec<DiagnosticRecord>>,
}

impl State {
    pub(crate) fn connection(&mut self, handle: RawHandle) -> Result<&mut ConnectionEntry, Fault> {
        self.connections
            .get_mut(&handle)
            .ok_or(Fault::InvalidHandle)
    }

    /// The connection, which must be connected and alive.
    pub(crate) fn session(&mut self, handle: RawHandle) -> Result<&mut ConnectionEntry, Fault> {
        let entry = self.connection(handle)?;
        if !entry.connected {
            return Err(diag("08003", "Connection not open").into());
        }
        if entry.dead {
            return Err(diag("08S01", "Communication link failure").into());
        }
        Ok(entry)
    }

    /// The statement, whose connection must be usable.
    pub(crate) fn statement(&mut self, handle: RawHandle) -> Result<&mut StatementEntry, Fault> {
        let connection = self
            .statements
            .get(&handle)
            .ok_or(Fault::InvalidHandle)?
            .connection;
        self.session(connection)?;
        self.statements
            .get_mut(&handle)
            .ok_or(Fault::InvalidHandle)
    }

    pub(crate) fn database(&mut self, connection: RawHandle) -> Result<&mut Database, Fault> {
        let name = self.session(connection)?.database.clone();
        Ok(self.databases.entry(name).or_default())
    }

    pub(crate) fn free_statement(&mut self, handle: RawHandle) -> bool {
        self.diagnostics.remove(&(HandleKind::Statement, handle));
        self.statements.remove(&handle).is_some()
    }

    /// Runs a parsed statement with the parameters bound to `handle`.
    pub(crate) fn run(
        &mut self,
        handle: RawHandle,
        parsed: &Parsed,
        warnings: &mut Vec<DiagnosticRecord>,
    ) -> Reply<()> {
        let entry = self.statement(handle)?;
        if let Some(ordinal) = (1..=parsed.parameters).find(|v| !entry.parameters.contains_key(v))
        {
            return Err(diag(
                "07002",
                format!("COUNT field incorrect, parameter {} is not bound", ordinal),
            )
            .into());
        }
        let parameters = entry.parameters.clone();
        let connection = entry.connection;
        let scrollable = entry.scrollable;
        let executed = store::run(
            self.database(connection)?,
            &parsed.command,
            &parameters,
            warnings,
        );
        let entry = self.statement(handle)?;
        entry.result = None;
        entry.affected = -1;
        match executed? {
            Execution::Rows { columns, rows } => {
                entry.affected = rows.len() as i64;
                entry.result = Some(ResultSet {
                    columns,
                    rows,
                    position: -1,
                    scrollable,
                });
                Ok(Some(()))
            }
            Execution::Affected(count) => {
                // Schema changes do not count rows
                let schema = matches!(
                    parsed.command,
                    Command::CreateTable { .. } | Command::DropTable { .. }
                );
                entry.affected = if schema { -1 } else { count as i64 };
                let searched = matches!(
                    parsed.command,
                    Command::Update { .. } | Command::Delete { .. }
                );
                Ok(if count == 0 && searched {
                    None
                } else {
                    Some(())
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_set_positions() {
        let row = |v: u8| vec![NativeBuffer::new(odbridge_core::CType::Bit, vec![v])];
        let mut result = ResultSet {
            columns: Vec::new(),
            rows: vec![row(0), row(1)],
            position: -1,
            scrollable: true,
        };
        assert!(result.current().is_err());
        assert!(result.advance(2));
        assert_eq!(result.current().unwrap()[0].bytes(), [1]);
        assert!(!result.advance(1));
        assert_eq!(result.position, 2);
        assert!(result.advance(-2));
        assert!(!result.advance(-5));
        assert_eq!(result.position, -1);
    }
}
