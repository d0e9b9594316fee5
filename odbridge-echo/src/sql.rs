//! The small SQL dialect understood by the echo driver.
//!
//! Statements: `CREATE TABLE [IF NOT EXISTS]`, `DROP TABLE [IF EXISTS]`,
//! `INSERT INTO .. VALUES`, `SELECT .. [FROM ..] [WHERE col = ..]`,
//! `UPDATE .. SET .. [WHERE col = ..]`, `DELETE FROM .. [WHERE col = ..]`.
//! Three more drive the tests of the bridge: `WAIT [seconds]` blocks until
//! cancelled or timed out, `RAISE 'state' 'message'` fails with the given
//! SQLSTATE and `WARN 'message'` succeeds with a warning.

use crate::{EchoResult, diag};
use odbridge_core::{ColumnDescription, DataType, DiagnosticRecord, Nullability};
use std::fmt::{self, Display};

/// Native code of the types the driver stores but cannot convert.
pub(crate) const UNSUPPORTED_TYPE: i16 = -151;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    /// Exact numeric text, like `12.50`.
    Number(String),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Column(String),
    Literal(Literal),
    /// Ordinal of a `?` marker, starting from 1.
    Parameter(u16),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Filter {
    pub(crate) column: String,
    pub(crate) value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SelectItem {
    pub(crate) expr: Expr,
    pub(crate) alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Command {
    CreateTable {
        table: String,
        if_not_exists: bool,
        columns: Vec<ColumnDescription>,
    },
    DropTable {
        table: String,
        if_exists: bool,
    },
    Insert {
        table: String,
        columns: Option<Vec<String>>,
        rows: Vec<Vec<Expr>>,
    },
    Select {
        /// `None` is `*`.
        items: Option<Vec<SelectItem>>,
        table: Option<String>,
        filter: Option<Filter>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Expr)>,
        filter: Option<Filter>,
    },
    Delete {
        table: String,
        filter: Option<Filter>,
    },
    Wait {
        seconds: Option<f64>,
    },
    Raise {
        state: String,
        message: String,
    },
    Warn {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Parsed {
    pub(crate) command: Command,
    pub(crate) parameters: u16,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Text(String),
    Number(String),
    Symbol(char),
    Parameter,
}

impl Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(v) | Token::Number(v) => write!(f, "`{}`", v),
            Token::Quoted(v) => write!(f, "`\"{}\"`", v),
            Token::Text(v) => write!(f, "`'{}'`", v),
            Token::Symbol(v) => write!(f, "`{}`", v),
            Token::Parameter => f.write_str("`?`"),
        }
    }
}

fn syntax(message: impl Display) -> DiagnosticRecord {
    diag("42000", format!("Syntax error or access violation, {}", message))
}

fn tokenize(sql: &str) -> EchoResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = sql.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            _ if c.is_whitespace() => {
                chars.next();
            }
            '\'' | '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some(v) if v == c && chars.peek() == Some(&c) => {
                            chars.next();
                            text.push(c);
                        }
                        Some(v) if v == c => break,
                        Some(v) => text.push(v),
                        None => return Err(syntax("unterminated quoted text")),
                    }
                }
                tokens.push(if c == '\'' {
                    Token::Text(text)
                } else {
                    Token::Quoted(text)
                });
            }
            '?' => {
                chars.next();
                tokens.push(Token::Parameter);
            }
            '(' | ')' | ',' | '=' | '*' | ';' => {
                chars.next();
                tokens.push(Token::Symbol(c));
            }
            '-' | '.' | '0'..='9' => {
                chars.next();
                if c == '-' && chars.peek() == Some(&'-') {
                    while chars.next_if(|v| *v != '\n').is_some() {}
                    continue;
                }
                let mut number = c.to_string();
                while let Some(v) = chars.next_if(|v| v.is_ascii_digit() || *v == '.') {
                    number.push(v);
                }
                if number.parse::<f64>().is_err() {
                    return Err(syntax(format!("invalid number `{}`", number)));
                }
                tokens.push(Token::Number(number));
            }
            _ if c.is_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(v) = chars.next_if(|v| v.is_alphanumeric() || *v == '_') {
                    word.push(v);
                }
                tokens.push(Token::Word(word));
            }
            _ => return Err(syntax(format!("unexpected character `{}`", c))),
        }
    }
    Ok(tokens)
}

/// Parses one statement, numbering its parameter markers.
pub(crate) fn parse(sql: &str) -> EchoResult<Parsed> {
    let mut parser = Parser {
        tokens: tokenize(sql)?,
        position: 0,
        parameters: 0,
    };
    let command = parser.command()?;
    while parser.symbol(';') {}
    if parser.peek().is_some() {
        return Err(parser.unexpected());
    }
    Ok(Parsed {
        command,
        parameters: parser.parameters,
    })
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    parameters: u16,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn unexpected(&self) -> DiagnosticRecord {
        match self.peek() {
            Some(token) => syntax(format!("unexpected {}", token)),
            None => syntax("unexpected end of statement"),
        }
    }

    fn keyword(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some(Token::Word(v)) if v.eq_ignore_ascii_case(keyword) => {
                self.position += 1;
                true
            }
            _ => false,
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> EchoResult<()> {
        if self.keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn symbol(&mut self, symbol: char) -> bool {
        if self.peek() == Some(&Token::Symbol(symbol)) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, symbol: char) -> EchoResult<()> {
        if self.symbol(symbol) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn identifier(&mut self) -> EchoResult<String> {
        match self.peek() {
            Some(Token::Word(v)) | Some(Token::Quoted(v)) => {
                let v = v.clone();
                self.position += 1;
                Ok(v)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn text(&mut self) -> EchoResult<String> {
        match self.peek() {
            Some(Token::Text(v)) => {
                let v = v.clone();
                self.position += 1;
                Ok(v)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn number(&mut self) -> EchoResult<Option<String>> {
        match self.peek() {
            Some(Token::Number(v)) => {
                let v = v.clone();
                self.position += 1;
                Ok(Some(v))
            }
            _ => Ok(None),
        }
    }

    fn expr(&mut self) -> EchoResult<Expr> {
        let expr = match self.peek() {
            Some(Token::Parameter) => {
                self.parameters += 1;
                Expr::Parameter(self.parameters)
            }
            Some(Token::Text(v)) => Expr::Literal(Literal::Text(v.clone())),
            Some(Token::Number(v)) => Expr::Literal(match v.parse::<i64>() {
                Ok(v) => Literal::Integer(v),
                Err(..) => Literal::Number(v.clone()),
            }),
            Some(Token::Word(v)) if v.eq_ignore_ascii_case("NULL") => Expr::Literal(Literal::Null),
            Some(Token::Word(v)) if v.eq_ignore_ascii_case("TRUE") => {
                Expr::Literal(Literal::Boolean(true))
            }
            Some(Token::Word(v)) if v.eq_ignore_ascii_case("FALSE") => {
                Expr::Literal(Literal::Boolean(false))
            }
            Some(Token::Word(v)) | Some(Token::Quoted(v)) => Expr::Column(v.clone()),
            _ => return Err(self.unexpected()),
        };
        self.position += 1;
        Ok(expr)
    }

    fn filter(&mut self) -> EchoResult<Option<Filter>> {
        if !self.keyword("WHERE") {
            return Ok(None);
        }
        let column = self.identifier()?;
        self.expect_symbol('=')?;
        let value = self.expr()?;
        Ok(Some(Filter { column, value }))
    }

    fn command(&mut self) -> EchoResult<Command> {
        if self.keyword("CREATE") {
            self.expect_keyword("TABLE")?;
            return self.create_table();
        }
        if self.keyword("DROP") {
            self.expect_keyword("TABLE")?;
            let if_exists = self.keyword("IF");
            if if_exists {
                self.expect_keyword("EXISTS")?;
            }
            let table = self.identifier()?;
            return Ok(Command::DropTable { table, if_exists });
        }
        if self.keyword("INSERT") {
            self.expect_keyword("INTO")?;
            return self.insert();
        }
        if self.keyword("SELECT") {
            return self.select();
        }
        if self.keyword("UPDATE") {
            return self.update();
        }
        if self.keyword("DELETE") {
            self.expect_keyword("FROM")?;
            let table = self.identifier()?;
            let filter = self.filter()?;
            return Ok(Command::Delete { table, filter });
        }
        if self.keyword("WAIT") {
            let seconds = self.number()?.and_then(|v| v.parse::<f64>().ok());
            return Ok(Command::Wait { seconds });
        }
        if self.keyword("RAISE") {
            let state = self.text()?;
            if state.len() != 5 {
                return Err(syntax(format!("`{}` is not a SQLSTATE", state)));
            }
            let message = self.text()?;
            return Ok(Command::Raise { state, message });
        }
        if self.keyword("WARN") {
            let message = self.text()?;
            return Ok(Command::Warn { message });
        }
        Err(self.unexpected())
    }

    fn create_table(&mut self) -> EchoResult<Command> {
        let if_not_exists = self.keyword("IF");
        if if_not_exists {
            self.expect_keyword("NOT")?;
            self.expect_keyword("EXISTS")?;
        }
        let table = self.identifier()?;
        self.expect_symbol('(')?;
        let mut columns = Vec::new();
        loop {
            let name = self.identifier()?;
            let data_type = self.data_type()?;
            let mut nullable = Nullability::Nullable;
            loop {
                if self.keyword("NOT") {
                    self.expect_keyword("NULL")?;
                    nullable = Nullability::NoNulls;
                } else if self.keyword("PRIMARY") {
                    self.expect_keyword("KEY")?;
                    nullable = Nullability::NoNulls;
                } else if !self.keyword("NULL") {
                    break;
                }
            }
            columns.push(ColumnDescription::new(name, data_type, nullable));
            if !self.symbol(',') {
                break;
            }
        }
        self.expect_symbol(')')?;
        Ok(Command::CreateTable {
            table,
            if_not_exists,
            columns,
        })
    }

    fn type_arguments(&mut self) -> EchoResult<Vec<usize>> {
        let mut arguments = Vec::new();
        if !self.symbol('(') {
            return Ok(arguments);
        }
        loop {
            let argument = self
                .number()?
                .and_then(|v| v.parse::<usize>().ok())
                .ok_or_else(|| self.unexpected())?;
            arguments.push(argument);
            if !self.symbol(',') {
                break;
            }
        }
        self.expect_symbol(')')?;
        Ok(arguments)
    }

    fn data_type(&mut self) -> EchoResult<DataType> {
        let name = self.identifier()?.to_ascii_uppercase();
        if name == "DOUBLE" {
            self.keyword("PRECISION");
        }
        let arguments = self.type_arguments()?;
        let with_time_zone = self.keyword("WITH");
        if with_time_zone {
            self.expect_keyword("TIME")?;
            self.expect_keyword("ZONE")?;
        }
        let first = arguments.first().copied();
        let narrow = |v: usize| v.min(u8::MAX as usize) as u8;
        let precision = |default: usize| narrow(first.unwrap_or(default));
        Ok(match name.as_str() {
            "BIT" | "BOOL" | "BOOLEAN" => DataType::Bit,
            "TINYINT" => DataType::TinyInt,
            "SMALLINT" => DataType::SmallInt,
            "INT" | "INTEGER" => DataType::Integer,
            "BIGINT" => DataType::BigInt,
            "REAL" => DataType::Real,
            "FLOAT" => DataType::Float {
                precision: first.unwrap_or(53),
            },
            "DOUBLE" => DataType::Double,
            "DECIMAL" => DataType::Decimal {
                precision: precision(18),
                scale: narrow(arguments.get(1).copied().unwrap_or(0)),
            },
            "NUMERIC" => DataType::Numeric {
                precision: precision(18),
                scale: narrow(arguments.get(1).copied().unwrap_or(0)),
            },
            "CHAR" | "CHARACTER" => DataType::Char {
                length: first.unwrap_or(1),
            },
            "VARCHAR" => DataType::Varchar {
                length: first.unwrap_or(255),
            },
            "TEXT" | "CLOB" => DataType::LongVarchar {
                length: first.unwrap_or(0),
            },
            "NCHAR" => DataType::WChar {
                length: first.unwrap_or(1),
            },
            "NVARCHAR" => DataType::WVarchar {
                length: first.unwrap_or(255),
            },
            "BINARY" => DataType::Binary {
                length: first.unwrap_or(1),
            },
            "VARBINARY" => DataType::Varbinary {
                length: first.unwrap_or(255),
            },
            "BLOB" | "BYTEA" => DataType::LongVarbinary {
                length: first.unwrap_or(0),
            },
            "DATE" => DataType::Date,
            "TIME" => DataType::Time {
                precision: precision(0),
            },
            "TIMESTAMP" | "DATETIME" if with_time_zone => DataType::TimestampWithTimezone {
                precision: precision(6),
            },
            "TIMESTAMP" | "DATETIME" => DataType::Timestamp {
                precision: precision(6),
            },
            "TIMESTAMPTZ" => DataType::TimestampWithTimezone {
                precision: precision(6),
            },
            "UUID" | "GUID" | "UNIQUEIDENTIFIER" => DataType::Guid,
            _ => DataType::Other {
                code: UNSUPPORTED_TYPE,
                size: first.unwrap_or(0),
                digits: 0,
            },
        })
    }

    fn insert(&mut self) -> EchoResult<Command> {
        let table = self.identifier()?;
        let columns = if self.symbol('(') {
            let mut columns = vec![self.identifier()?];
            while self.symbol(',') {
                columns.push(self.identifier()?);
            }
            self.expect_symbol(')')?;
            Some(columns)
        } else {
            None
        };
        self.expect_keyword("VALUES")?;
        let mut rows = Vec::new();
        loop {
            self.expect_symbol('(')?;
            let mut row = vec![self.expr()?];
            while self.symbol(',') {
                row.push(self.expr()?);
            }
            self.expect_symbol(')')?;
            rows.push(row);
            if !self.symbol(',') {
                break;
            }
        }
        Ok(Command::Insert {
            table,
            columns,
            rows,
        })
    }

    fn select(&mut self) -> EchoResult<Command> {
        let items = if self.symbol('*') {
            None
        } else {
            let mut items = Vec::new();
            loop {
                let expr = self.expr()?;
                let alias = if self.keyword("AS") {
                    Some(self.identifier()?)
                } else {
                    None
                };
                items.push(SelectItem { expr, alias });
                if !self.symbol(',') {
                    break;
                }
            }
            Some(items)
        };
        let table = if self.keyword("FROM") {
            Some(self.identifier()?)
        } else {
            None
        };
        if items.is_none() && table.is_none() {
            return Err(syntax("`SELECT *` requires a table"));
        }
        let filter = self.filter()?;
        if filter.is_some() && table.is_none() {
            return Err(syntax("`WHERE` requires a table"));
        }
        Ok(Command::Select {
            items,
            table,
            filter,
        })
    }

    fn update(&mut self) -> EchoResult<Command> {
        let table = self.identifier()?;
        self.expect_keyword("SET")?;
        let mut assignments = Vec::new();
        loop {
            let column = self.identifier()?;
            self.expect_symbol('=')?;
            assignments.push((column, self.expr()?));
            if !self.symbol(',') {
                break;
            }
        }
        let filter = self.filter()?;
        Ok(Command::Update {
            table,
            assignments,
            filter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn create_table() {
        let parsed = parse(indoc! {r#"
            CREATE TABLE IF NOT EXISTS trades (
                id BIGINT PRIMARY KEY,
                price DECIMAL(10, 2) NOT NULL,
                "note" VARCHAR(40),
                at TIMESTAMP(3) WITH TIME ZONE,
                shape GEOMETRY
            );
        "#})
        .expect("Could not parse");
        let Command::CreateTable {
            table,
            if_not_exists,
            columns,
        } = parsed.command
        else {
            panic!("Unexpected command");
        };
        assert_eq!(table, "trades");
        assert!(if_not_exists);
        assert_eq!(columns.len(), 5);
        assert_eq!(columns[0].nullable, Nullability::NoNulls);
        assert_eq!(
            columns[1].data_type,
            DataType::Decimal {
                precision: 10,
                scale: 2
            }
        );
        assert_eq!(columns[2].name, "note");
        assert_eq!(
            columns[3].data_type,
            DataType::TimestampWithTimezone { precision: 3 }
        );
        assert!(matches!(
            columns[4].data_type,
            DataType::Other {
                code: UNSUPPORTED_TYPE,
                ..
            }
        ));
    }

    #[test]
    fn parameters_are_numbered() {
        let parsed = parse("INSERT INTO t (a, b) VALUES (?, 'it''s'), (NULL, ?)").unwrap();
        assert_eq!(parsed.parameters, 2);
        let Command::Insert { rows, .. } = parsed.command else {
            panic!("Unexpected command");
        };
        assert_eq!(rows[0][0], Expr::Parameter(1));
        assert_eq!(rows[0][1], Expr::Literal(Literal::Text("it's".into())));
        assert_eq!(rows[1][0], Expr::Literal(Literal::Null));
        assert_eq!(rows[1][1], Expr::Parameter(2));
    }

    #[test]
    fn select_forms() {
        let parsed = parse("select ? as x, 12.50, -3").unwrap();
        let Command::Select {
            items: Some(items),
            table: None,
            filter: None,
        } = parsed.command
        else {
            panic!("Unexpected command");
        };
        assert_eq!(items[0].alias.as_deref(), Some("x"));
        assert_eq!(items[1].expr, Expr::Literal(Literal::Number("12.50".into())));
        assert_eq!(items[2].expr, Expr::Literal(Literal::Integer(-3)));
        let parsed = parse("SELECT * FROM t WHERE id = ? -- trailing comment").unwrap();
        assert_eq!(parsed.parameters, 1);
    }

    #[test]
    fn syntax_errors() {
        for sql in [
            "SELEC 1",
            "SELECT * WHERE a = 1",
            "INSERT INTO t VALUES (1",
            "RAISE 'HY' 'short'",
            "SELECT 'open",
            "DELETE FROM t WHERE a = 1 extra",
        ] {
            let error = parse(sql).expect_err(sql);
            assert_eq!(error.state, "42000", "{}", sql);
        }
    }
}
