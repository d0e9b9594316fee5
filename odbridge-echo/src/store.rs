use crate::{
    EchoResult, convert, diag,
    sql::{Command, Expr, Filter, Literal, SelectItem},
};
use odbridge_core::{
    CType, ColumnDescription, DataType, DiagnosticRecord, NativeBuffer, Nullability,
    ParameterDescription, marshal,
};
use std::collections::{BTreeMap, btree_map::Entry};

/// A value bound to a parameter marker.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Bound {
    pub(crate) declared: DataType,
    pub(crate) buffer: NativeBuffer,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Database {
    /// Keyed by lowercase name.
    tables: BTreeMap<String, Table>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Table {
    name: String,
    columns: Vec<ColumnDescription>,
    /// Cells are stored in the C type of their column.
    rows: Vec<Vec<NativeBuffer>>,
}

#[derive(Debug)]
pub(crate) enum Execution {
    Rows {
        columns: Vec<ColumnDescription>,
        rows: Vec<Vec<NativeBuffer>>,
    },
    Affected(u64),
}

impl Database {
    fn table(&self, name: &str) -> EchoResult<&Table> {
        self.tables
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| missing_table(name))
    }

    fn table_mut(&mut self, name: &str) -> EchoResult<&mut Table> {
        self.tables
            .get_mut(&name.to_ascii_lowercase())
            .ok_or_else(|| missing_table(name))
    }
}

fn missing_table(name: &str) -> DiagnosticRecord {
    diag(
        "42S02",
        format!("Base table or view not found, `{}` does not exist", name),
    )
}

impl Table {
    fn column(&self, name: &str) -> EchoResult<usize> {
        self.columns
            .iter()
            .position(|v| v.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                diag(
                    "42S22",
                    format!("Column `{}` not found in `{}`", name, self.name),
                )
            })
    }

    fn targets(&self, columns: Option<&[String]>) -> EchoResult<Vec<usize>> {
        match columns {
            Some(columns) => columns.iter().map(|v| self.column(v)).collect(),
            None => Ok((0..self.columns.len()).collect()),
        }
    }
}

fn storage_type(column: &ColumnDescription) -> Option<CType> {
    marshal::c_type_for(&column.data_type).ok()
}

/// Rejects text and binary values longer than the declared length.
pub(crate) fn check_length(data_type: &DataType, buffer: &NativeBuffer) -> EchoResult<()> {
    let limit = match *data_type {
        DataType::Char { length }
        | DataType::Varchar { length }
        | DataType::WChar { length }
        | DataType::WVarchar { length }
        | DataType::Binary { length }
        | DataType::Varbinary { length } => length,
        _ => 0,
    };
    if limit == 0 || buffer.is_null() {
        return Ok(());
    }
    let bytes = buffer.bytes();
    let len = match buffer.c_type {
        CType::Char => std::str::from_utf8(bytes)
            .map(|v| v.chars().count())
            .unwrap_or(bytes.len()),
        _ => bytes.len(),
    };
    if len > limit {
        return Err(diag(
            "22001",
            format!(
                "String data, right truncated, {} exceeds the length {} of {}",
                len, limit, data_type
            ),
        ));
    }
    Ok(())
}

fn store(column: &ColumnDescription, buffer: NativeBuffer) -> EchoResult<NativeBuffer> {
    if buffer.is_null() && !column.nullable.could_be_null() {
        return Err(diag(
            "23000",
            format!(
                "Integrity constraint violation, column `{}` cannot be NULL",
                column.name
            ),
        ));
    }
    let Some(target) = storage_type(column) else {
        return Ok(buffer);
    };
    let value = convert(&buffer, target)?;
    check_length(&column.data_type, &value)?;
    Ok(value)
}

fn decimal_type(text: &str) -> DataType {
    let digits = text.trim_start_matches('-');
    let scale = digits.split_once('.').map(|(_, v)| v.len()).unwrap_or(0);
    let precision = digits.chars().filter(char::is_ascii_digit).count();
    DataType::Decimal {
        precision: precision.clamp(1, 38) as u8,
        scale: scale.min(38) as u8,
    }
}

fn evaluate(expr: &Expr, parameters: &BTreeMap<u16, Bound>) -> EchoResult<Bound> {
    let (declared, buffer) = match expr {
        Expr::Parameter(ordinal) => {
            return parameters.get(ordinal).cloned().ok_or_else(|| {
                diag(
                    "07002",
                    format!("COUNT field incorrect, parameter {} is not bound", ordinal),
                )
            });
        }
        Expr::Literal(Literal::Null) => (
            DataType::Varchar { length: 0 },
            NativeBuffer::null(CType::Char),
        ),
        Expr::Literal(Literal::Boolean(v)) => {
            (DataType::Bit, NativeBuffer::new(CType::Bit, vec![*v as u8]))
        }
        Expr::Literal(Literal::Integer(v)) => (
            DataType::BigInt,
            NativeBuffer::new(CType::SBigInt, v.to_ne_bytes().to_vec()),
        ),
        Expr::Literal(Literal::Number(v)) => (
            decimal_type(v),
            NativeBuffer::new(CType::Char, v.clone().into_bytes()),
        ),
        Expr::Literal(Literal::Text(v)) => (
            DataType::Varchar {
                length: v.chars().count().max(1),
            },
            NativeBuffer::new(CType::Char, v.clone().into_bytes()),
        ),
        Expr::Column(name) => {
            return Err(diag(
                "42S22",
                format!("Column `{}` cannot be used without a table", name),
            ));
        }
    };
    Ok(Bound { declared, buffer })
}

struct Matcher {
    column: usize,
    value: NativeBuffer,
}

impl Matcher {
    fn new(
        table: &Table,
        filter: Option<&Filter>,
        parameters: &BTreeMap<u16, Bound>,
    ) -> EchoResult<Option<Self>> {
        let Some(filter) = filter else {
            return Ok(None);
        };
        let column = table.column(&filter.column)?;
        let value = evaluate(&filter.value, parameters)?.buffer;
        let value = match storage_type(&table.columns[column]) {
            Some(target) => convert(&value, target)?,
            None => value,
        };
        Ok(Some(Self { column, value }))
    }

    fn matches(this: &Option<Self>, row: &[NativeBuffer]) -> bool {
        let Some(this) = this else {
            return true;
        };
        let cell = &row[this.column];
        !cell.is_null() && !this.value.is_null() && cell.bytes() == this.value.bytes()
    }
}

fn label(item: &SelectItem, index: usize) -> String {
    match (&item.alias, &item.expr) {
        (Some(alias), _) => alias.clone(),
        (None, Expr::Column(name)) => name.clone(),
        (None, _) => format!("expr{}", index + 1),
    }
}

enum Source {
    Column(usize),
    Constant(NativeBuffer),
}

/// Fails when the statement names tables or columns that do not exist.
pub(crate) fn check(database: &Database, command: &Command) -> EchoResult<()> {
    match command {
        Command::Insert { table, columns, .. } => {
            database.table(table)?.targets(columns.as_deref())?;
        }
        Command::Select {
            items,
            table: Some(table),
            filter,
        } => {
            let table = database.table(table)?;
            for item in items.iter().flatten() {
                if let Expr::Column(name) = &item.expr {
                    table.column(name)?;
                }
            }
            if let Some(filter) = filter {
                table.column(&filter.column)?;
            }
        }
        Command::Update {
            table,
            assignments,
            filter,
        } => {
            let table = database.table(table)?;
            for (name, _) in assignments {
                table.column(name)?;
            }
            if let Some(filter) = filter {
                table.column(&filter.column)?;
            }
        }
        Command::Delete { table, filter } => {
            let table = database.table(table)?;
            if let Some(filter) = filter {
                table.column(&filter.column)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn describe(column: &ColumnDescription) -> ParameterDescription {
    ParameterDescription {
        data_type: column.data_type,
        nullable: column.nullable,
    }
}

/// The declared type of a parameter marker, taken from the column it is
/// compared with or assigned to. Markers in a select list are unknown.
pub(crate) fn describe_parameter(
    database: &Database,
    command: &Command,
    ordinal: u16,
) -> EchoResult<ParameterDescription> {
    let marker = Expr::Parameter(ordinal);
    let filter_column = |table: &Table, filter: &Option<Filter>| -> EchoResult<Option<usize>> {
        match filter {
            Some(filter) if filter.value == marker => table.column(&filter.column).map(Some),
            _ => Ok(None),
        }
    };
    match command {
        Command::Insert {
            table,
            columns,
            rows,
        } => {
            let table = database.table(table)?;
            let targets = table.targets(columns.as_deref())?;
            for row in rows {
                if let Some(&index) = row
                    .iter()
                    .position(|v| *v == marker)
                    .and_then(|i| targets.get(i))
                {
                    return Ok(describe(&table.columns[index]));
                }
            }
        }
        Command::Update {
            table,
            assignments,
            filter,
        } => {
            let table = database.table(table)?;
            if let Some((name, _)) = assignments.iter().find(|(_, v)| *v == marker) {
                return Ok(describe(&table.columns[table.column(name)?]));
            }
            if let Some(index) = filter_column(table, filter)? {
                return Ok(describe(&table.columns[index]));
            }
        }
        Command::Select {
            table: Some(table),
            filter,
            ..
        }
        | Command::Delete { table, filter } => {
            let table = database.table(table)?;
            if let Some(index) = filter_column(table, filter)? {
                return Ok(describe(&table.columns[index]));
            }
        }
        _ => {}
    }
    Ok(ParameterDescription::UNKNOWN)
}

/// Runs a data statement. `WAIT` is handled by the caller.
pub(crate) fn run(
    database: &mut Database,
    command: &Command,
    parameters: &BTreeMap<u16, Bound>,
    warnings: &mut Vec<DiagnosticRecord>,
) -> EchoResult<Execution> {
    match command {
        Command::CreateTable {
            table,
            if_not_exists,
            columns,
        } => {
            for (i, column) in columns.iter().enumerate() {
                if columns[..i]
                    .iter()
                    .any(|v| v.name.eq_ignore_ascii_case(&column.name))
                {
                    return Err(diag(
                        "42S21",
                        format!("Column `{}` already exists in `{}`", column.name, table),
                    ));
                }
            }
            match database.tables.entry(table.to_ascii_lowercase()) {
                Entry::Occupied(..) if *if_not_exists => {}
                Entry::Occupied(..) => {
                    return Err(diag(
                        "42S01",
                        format!("Base table or view already exists, `{}`", table),
                    ));
                }
                Entry::Vacant(entry) => {
                    entry.insert(Table {
                        name: table.clone(),
                        columns: columns.clone(),
                        rows: Vec::new(),
                    });
                }
            }
            Ok(Execution::Affected(0))
        }
        Command::DropTable { table, if_exists } => {
            if database
                .tables
                .remove(&table.to_ascii_lowercase())
                .is_none()
                && !*if_exists
            {
                return Err(missing_table(table));
            }
            Ok(Execution::Affected(0))
        }
        Command::Insert {
            table,
            columns,
            rows,
        } => {
            let table = database.table_mut(table)?;
            let targets = table.targets(columns.as_deref())?;
            let mut inserted = Vec::with_capacity(rows.len());
            for row in rows {
                if row.len() != targets.len() {
                    return Err(diag(
                        "21S01",
                        format!(
                            "Insert value list does not match column list, {} values for {} columns",
                            row.len(),
                            targets.len()
                        ),
                    ));
                }
                let mut cells = table
                    .columns
                    .iter()
                    .map(|v| NativeBuffer::null(storage_type(v).unwrap_or(CType::Char)))
                    .collect::<Vec<_>>();
                for (expr, &index) in row.iter().zip(&targets) {
                    let value = evaluate(expr, parameters)?;
                    cells[index] = store(&table.columns[index], value.buffer)?;
                }
                for (column, cell) in table.columns.iter().zip(&cells) {
                    if cell.is_null() {
                        store(column, cell.clone())?;
                    }
                }
                inserted.push(cells);
            }
            let count = inserted.len() as u64;
            table.rows.extend(inserted);
            Ok(Execution::Affected(count))
        }
        Command::Select {
            items,
            table: None,
            ..
        } => {
            let mut columns = Vec::new();
            let mut row = Vec::new();
            for (i, item) in items.iter().flatten().enumerate() {
                let value = evaluate(&item.expr, parameters)?;
                columns.push(ColumnDescription::new(
                    label(item, i),
                    value.declared,
                    Nullability::Nullable,
                ));
                row.push(value.buffer);
            }
            Ok(Execution::Rows {
                columns,
                rows: vec![row],
            })
        }
        Command::Select {
            items,
            table: Some(table),
            filter,
        } => {
            let table = database.table(table)?;
            let matcher = Matcher::new(table, filter.as_ref(), parameters)?;
            let (columns, sources) = match items {
                None => (
                    table.columns.clone(),
                    (0..table.columns.len()).map(Source::Column).collect(),
                ),
                Some(items) => {
                    let mut columns = Vec::with_capacity(items.len());
                    let mut sources = Vec::with_capacity(items.len());
                    for (i, item) in items.iter().enumerate() {
                        match &item.expr {
                            Expr::Column(name) => {
                                let index = table.column(name)?;
                                let mut column = table.columns[index].clone();
                                column.name = label(item, i);
                                columns.push(column);
                                sources.push(Source::Column(index));
                            }
                            expr => {
                                let value = evaluate(expr, parameters)?;
                                columns.push(ColumnDescription::new(
                                    label(item, i),
                                    value.declared,
                                    Nullability::Nullable,
                                ));
                                sources.push(Source::Constant(value.buffer));
                            }
                        }
                    }
                    (columns, sources)
                }
            };
            let rows = table
                .rows
                .iter()
                .filter(|row| Matcher::matches(&matcher, row))
                .map(|row| {
                    sources
                        .iter()
                        .map(|v| match v {
                            Source::Column(i) => row[*i].clone(),
                            Source::Constant(v) => v.clone(),
                        })
                        .collect()
                })
                .collect();
            Ok(Execution::Rows { columns, rows })
        }
        Command::Update {
            table,
            assignments,
            filter,
        } => {
            let table = database.table_mut(table)?;
            let matcher = Matcher::new(table, filter.as_ref(), parameters)?;
            let assignments = assignments
                .iter()
                .map(|(name, expr)| {
                    let index = table.column(name)?;
                    let value = evaluate(expr, parameters)?;
                    Ok((index, store(&table.columns[index], value.buffer)?))
                })
                .collect::<EchoResult<Vec<_>>>()?;
            let mut count = 0;
            for row in table
                .rows
                .iter_mut()
                .filter(|row| Matcher::matches(&matcher, row))
            {
                for (index, value) in &assignments {
                    row[*index] = value.clone();
                }
                count += 1;
            }
            Ok(Execution::Affected(count))
        }
        Command::Delete { table, filter } => {
            let table = database.table_mut(table)?;
            let matcher = Matcher::new(table, filter.as_ref(), parameters)?;
            let before = table.rows.len();
            table.rows.retain(|row| !Matcher::matches(&matcher, row));
            Ok(Execution::Affected((before - table.rows.len()) as u64))
        }
        Command::Raise { state, message } => {
            warnings.push(diag("01000", "Raising the requested error"));
            Err(diag(state, message))
        }
        Command::Warn { message } => {
            warnings.push(diag("01000", message));
            Ok(Execution::Affected(0))
        }
        Command::Wait { .. } => Ok(Execution::Affected(0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parse;

    fn execute(database: &mut Database, sql: &str, values: &[NativeBuffer]) -> EchoResult<Execution> {
        let parameters = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                (
                    i as u16 + 1,
                    Bound {
                        declared: DataType::Unknown,
                        buffer: v.clone(),
                    },
                )
            })
            .collect();
        let parsed = parse(sql)?;
        check(database, &parsed.command)?;
        run(database, &parsed.command, &parameters, &mut Vec::new())
    }

    fn int(v: i64) -> NativeBuffer {
        NativeBuffer::new(CType::SBigInt, v.to_ne_bytes().to_vec())
    }

    #[test]
    fn insert_select_delete() {
        let mut database = Database::default();
        execute(&mut database, "CREATE TABLE t (a INTEGER, b VARCHAR(3))", &[]).unwrap();
        let Execution::Affected(2) = execute(
            &mut database,
            "INSERT INTO t VALUES (?, 'one'), (2, ?)",
            &[int(1), NativeBuffer::null(CType::Char)],
        )
        .unwrap() else {
            panic!("Expected two inserted rows");
        };
        let Execution::Rows { columns, rows } =
            execute(&mut database, "SELECT b FROM t WHERE a = ?", &[int(1)]).unwrap()
        else {
            panic!("Expected rows");
        };
        assert_eq!(columns[0].name, "b");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0].bytes(), b"one");
        let Execution::Affected(1) = execute(&mut database, "DELETE FROM t WHERE a = 2", &[]).unwrap()
        else {
            panic!("Expected one deleted row");
        };
    }

    #[test]
    fn constraints() {
        let mut database = Database::default();
        execute(&mut database, "CREATE TABLE t (a SMALLINT NOT NULL, b VARCHAR(3))", &[]).unwrap();
        let error = execute(&mut database, "INSERT INTO t (b) VALUES ('x')", &[]).unwrap_err();
        assert_eq!(error.state, "23000");
        let error = execute(&mut database, "INSERT INTO t VALUES (1, 'long')", &[]).unwrap_err();
        assert_eq!(error.state, "22001");
        let error = execute(&mut database, "INSERT INTO t VALUES (70000, 'x')", &[]).unwrap_err();
        assert_eq!(error.state, "22003");
        let error = execute(&mut database, "INSERT INTO t VALUES (1)", &[]).unwrap_err();
        assert_eq!(error.state, "21S01");
        let error = execute(&mut database, "CREATE TABLE T (a INT)", &[]).unwrap_err();
        assert_eq!(error.state, "42S01");
        let error = execute(&mut database, "SELECT c FROM t", &[]).unwrap_err();
        assert_eq!(error.state, "42S22");
        let error = execute(&mut database, "SELECT * FROM missing", &[]).unwrap_err();
        assert_eq!(error.state, "42S02");
    }

    #[test]
    fn parameters_take_the_column_type() {
        let mut database = Database::default();
        execute(&mut database, "CREATE TABLE t (a BIGINT, b VARBINARY(8))", &[]).unwrap();
        let parsed = parse("UPDATE t SET b = ? WHERE a = ?").unwrap();
        let first = describe_parameter(&database, &parsed.command, 1).unwrap();
        assert_eq!(first.data_type, DataType::Varbinary { length: 8 });
        let second = describe_parameter(&database, &parsed.command, 2).unwrap();
        assert_eq!(second.data_type, DataType::BigInt);
        let parsed = parse("SELECT ? AS x").unwrap();
        let unknown = describe_parameter(&database, &parsed.command, 1).unwrap();
        assert_eq!(unknown, ParameterDescription::UNKNOWN);
    }
}
