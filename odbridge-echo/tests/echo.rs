#[cfg(test)]
mod tests {
    use indoc::indoc;
    use odbridge_core::{Config, Credentials, DataType, EntryPoint, ErrorKind, Library, Value};
    use odbridge_echo::{EchoNative, Resources};
    use odbridge_tests::{
        bridge_error, close_while_executing, count_rows, execute_tests, init_logs, run, silent_logs,
    };
    use rust_decimal::Decimal;
    use std::{sync::Arc, thread, time::Duration};

    fn library(native: EchoNative) -> Library<EchoNative> {
        Library::new(native, Config::default()).expect("Could not load the echo library")
    }

    fn database(name: &str) -> String {
        format!("DRIVER={{Echo}};DATABASE={}", name)
    }

    #[tokio::test]
    async fn echo() {
        init_logs();
        let library = Arc::new(library(EchoNative::new()));
        execute_tests(library.clone(), &database("suite")).await;
        assert_eq!(library.native().resources(), Resources::default());
    }

    #[tokio::test]
    async fn nothing_leaks() {
        init_logs();
        let library = library(EchoNative::new());
        {
            let connection = library
                .connect(&database("leaks"), None, None)
                .expect("Could not connect");
            run(&connection, "CREATE TABLE t (n INTEGER)");
            run(&connection, "INSERT INTO t (n) VALUES (1), (2)");
            let statement = connection
                .prepare("SELECT n FROM t")
                .expect("Could not prepare");
            let mut cursor = statement
                .execute()
                .expect("Could not execute")
                .into_cursor()
                .expect("Expected a result set");
            let _direct = run(&connection, "SELECT n FROM t")
                .into_cursor()
                .expect("Expected a result set");
            cursor.fetch_next().expect("Could not fetch");
            assert_eq!(
                library.native().resources(),
                Resources {
                    connections: 1,
                    statements: 2,
                }
            );
        }
        assert_eq!(library.native().resources(), Resources::default());
    }

    #[tokio::test]
    async fn cancel_waiting_statement() {
        init_logs();
        let library = library(EchoNative::new());
        let connection = library
            .connect(&database("cancel"), None, None)
            .expect("Could not connect");
        let statement = Arc::new(connection.prepare("WAIT").expect("Could not prepare"));
        let task = {
            let statement = statement.clone();
            tokio::task::spawn_blocking(move || statement.execute().map(|v| v.rows_affected()))
        };
        while !task.is_finished() {
            statement.cancel().expect("Could not cancel");
            thread::sleep(Duration::from_millis(5));
        }
        let error = task
            .await
            .expect("The execution panicked")
            .expect_err("The wait must be cancelled");
        assert_eq!(ErrorKind::of(&error), Some(ErrorKind::Execution));
        assert_eq!(bridge_error(&error).sqlstate(), Some("HY008"));

        // The statement is still usable
        let waited = connection.prepare("WAIT 0.01").expect("Could not prepare");
        assert_eq!(
            waited.execute().expect("Could not wait").rows_affected(),
            Some(0)
        );
    }

    #[tokio::test]
    async fn close_cancels_execution() {
        init_logs();
        let library = library(EchoNative::new());
        close_while_executing(&library, &database("close_cancels"), "WAIT").await;
        assert_eq!(library.native().resources(), Resources::default());
    }

    #[tokio::test]
    async fn cancel_after_close() {
        init_logs();
        let library = library(EchoNative::new());
        let connection = library
            .connect(&database("cancel_after_close"), None, None)
            .expect("Could not connect");
        let statement = connection.prepare("WAIT").expect("Could not prepare");
        connection.close().expect("Could not close");
        silent_logs! {
            let error = statement.cancel().expect_err("The statement was invalidated");
            assert_eq!(ErrorKind::of(&error), Some(ErrorKind::State));
            let error = statement.execute().expect_err("The statement was invalidated");
            assert_eq!(ErrorKind::of(&error), Some(ErrorKind::State));
        }
    }

    #[tokio::test]
    async fn schema_changes_count_no_rows() {
        init_logs();
        let library = library(EchoNative::new());
        let connection = library
            .connect(&database("schema_rows"), None, None)
            .expect("Could not connect");
        assert_eq!(run(&connection, "CREATE TABLE t (n INTEGER)").rows_affected(), None);
        assert_eq!(
            run(&connection, "INSERT INTO t (n) VALUES (1), (2)").rows_affected(),
            Some(2)
        );
        assert_eq!(run(&connection, "DROP TABLE t").rows_affected(), None);
    }

    #[tokio::test]
    async fn query_timeout() {
        init_logs();
        let library = Library::new(
            EchoNative::new(),
            Config::default().with_query_timeout(Some(Duration::from_millis(30))),
        )
        .expect("Could not load the echo library");
        let connection = library
            .connect(&database("timeout"), None, None)
            .expect("Could not connect");
        silent_logs! {
            let error = connection
                .execute_direct("WAIT 10")
                .expect_err("The wait must time out");
            assert_eq!(ErrorKind::of(&error), Some(ErrorKind::Timeout));
            assert_eq!(bridge_error(&error).sqlstate(), Some("HYT00"));
        }
        let statement = connection.prepare("WAIT 0.05").expect("Could not prepare");
        statement
            .set_query_timeout(Some(Duration::from_millis(10)))
            .expect("Could not set the timeout");
        silent_logs! {
            let error = statement.execute().expect_err("The wait must time out");
            assert_eq!(ErrorKind::of(&error), Some(ErrorKind::Timeout));
        }
        statement
            .set_query_timeout(None)
            .expect("Could not clear the timeout");
        statement
            .execute()
            .expect("Without a timeout the wait completes");
    }

    #[tokio::test]
    async fn scrollable_refused() {
        init_logs();
        let library = Library::new(
            EchoNative::new().with_scrollable_cursors(false),
            Config::default().with_scrollable(true),
        )
        .expect("Could not load the echo library");
        let connection = library
            .connect(&database("forward"), None, None)
            .expect("Could not connect");
        silent_logs! {
            let error = connection
                .execute_direct("SELECT 1 AS one")
                .expect_err("A forward only cursor must be refused");
            assert_eq!(ErrorKind::of(&error), Some(ErrorKind::Execution));
        }
        let statement = connection
            .prepare("SELECT 1 AS one")
            .expect("Could not prepare");
        statement
            .set_scrollable(false)
            .expect("Could not request a forward only cursor");
        let row = statement
            .execute()
            .expect("Could not execute")
            .into_cursor()
            .expect("Expected a result set")
            .next()
            .expect("Expected a row")
            .expect("Could not fetch");
        assert_eq!(row.get_by_name("one"), Some(&Value::Int64(Some(1))));
        assert_eq!(library.native().resources().statements, 1);
    }

    #[tokio::test]
    async fn syntax_errors() {
        init_logs();
        let library = library(EchoNative::new());
        let connection = library
            .connect(&database("syntax"), None, None)
            .expect("Could not connect");
        silent_logs! {
            let error = connection
                .prepare("SELEC 1")
                .expect_err("The statement is not valid");
            assert_eq!(ErrorKind::of(&error), Some(ErrorKind::Syntax));
            assert_eq!(bridge_error(&error).sqlstate(), Some("42000"));
            let primary = bridge_error(&error).primary().expect("Expected a diagnostic record");
            assert_eq!(primary.subsystem, "Echo");
            assert!(format!("{:#}", error).contains("SELEC 1"));
            let error = connection
                .prepare("SELECT missing FROM nowhere")
                .expect_err("The table does not exist");
            assert_eq!(ErrorKind::of(&error), Some(ErrorKind::Prepare));
            assert_eq!(bridge_error(&error).sqlstate(), Some("42S02"));
        }
        assert_eq!(library.native().resources().statements, 0);
    }

    #[tokio::test]
    async fn connection_failures() {
        init_logs();
        let library = library(EchoNative::new().with_credentials("scott", "tiger"));
        silent_logs! {
            let error = library
                .connect(&database("auth"), None, None)
                .expect_err("Credentials are required");
            assert_eq!(ErrorKind::of(&error), Some(ErrorKind::Connection));
            assert_eq!(bridge_error(&error).sqlstate(), Some("28000"));
            let error = library
                .connect(&database("auth"), Some(&Credentials::new("scott", "lion")), None)
                .expect_err("The password is wrong");
            assert_eq!(bridge_error(&error).sqlstate(), Some("28000"));
            assert!(!format!("{:#}", error).contains("lion"));
            let error = library
                .connect("DSN=nowhere", None, None)
                .expect_err("The data source does not exist");
            assert_eq!(ErrorKind::of(&error), Some(ErrorKind::Connection));
            assert_eq!(bridge_error(&error).sqlstate(), Some("IM002"));
            let error = library
                .connect(
                    "DRIVER={Echo};SERVER=unreachable",
                    None,
                    Some(Duration::from_secs(1)),
                )
                .expect_err("The server cannot be reached");
            assert_eq!(ErrorKind::of(&error), Some(ErrorKind::Timeout));
        }
        let connection = library
            .connect(
                "DSN=echo;DATABASE=auth",
                Some(&Credentials::new("scott", "tiger")),
                None,
            )
            .expect("Could not connect with the right credentials");
        assert!(connection.is_connected().expect("Could not check"));
        drop(connection);
        assert_eq!(library.native().resources(), Resources::default());
    }

    #[tokio::test]
    async fn unsupported_type() {
        init_logs();
        let library = library(EchoNative::new());
        let connection = library
            .connect(&database("unsupported"), None, None)
            .expect("Could not connect");
        run(&connection, "CREATE TABLE shapes (id INTEGER, shape GEOMETRY)");
        run(
            &connection,
            "INSERT INTO shapes (id, shape) VALUES (1, 'POINT(1 2)')",
        );
        let insert = connection
            .prepare("INSERT INTO shapes (id, shape) VALUES (?, ?)")
            .expect("Could not prepare");
        silent_logs! {
            let error = insert
                .bind(2, "POINT(3 4)")
                .expect_err("The parameter type is not supported");
            assert_eq!(ErrorKind::of(&error), Some(ErrorKind::UnsupportedType));
        }
        insert.bind(2, Value::Null).expect("NULL binds to any type");
        let mut cursor = run(&connection, "SELECT id, shape FROM shapes")
            .into_cursor()
            .expect("Expected a result set");
        silent_logs! {
            let error = cursor
                .fetch_next()
                .expect_err("The column type is not supported");
            assert_eq!(ErrorKind::of(&error), Some(ErrorKind::UnsupportedType));
        }
        let row = run(&connection, "SELECT id FROM shapes")
            .into_cursor()
            .expect("Expected a result set")
            .next()
            .expect("Expected a row")
            .expect("The supported column can be read");
        assert_eq!(row.get(0), Some(&Value::Int32(Some(1))));
    }

    #[tokio::test]
    async fn native_bind_failure() {
        init_logs();
        let library = library(EchoNative::new());
        let connection = library
            .connect(&database("bind"), None, None)
            .expect("Could not connect");
        run(&connection, "CREATE TABLE codes (code VARCHAR(3))");
        let insert = connection
            .prepare("INSERT INTO codes (code) VALUES (?)")
            .expect("Could not prepare");
        silent_logs! {
            let error = insert.bind(1, "toolong").expect_err("The value is too long");
            assert_eq!(ErrorKind::of(&error), Some(ErrorKind::Bind));
            assert_eq!(bridge_error(&error).sqlstate(), Some("22001"));
            let error = insert
                .execute()
                .expect_err("The statement is unusable until bound again");
            assert_eq!(ErrorKind::of(&error), Some(ErrorKind::Bind));
        }
        insert.bind(1, "ok").expect("Could not bind again");
        insert.execute().expect("Could not insert");
        assert_eq!(count_rows(&connection, "codes"), 1);
    }

    #[tokio::test]
    async fn optional_entry_points() {
        init_logs();
        let library = library(
            EchoNative::new()
                .without(EntryPoint::Cancel)
                .without(EntryPoint::Drivers),
        );
        let connection = library
            .connect(&database("optional"), None, None)
            .expect("Could not connect");
        let statement = connection.prepare("WAIT 0").expect("Could not prepare");
        silent_logs! {
            let error = statement.cancel().expect_err("Cancel is not available");
            assert_eq!(ErrorKind::of(&error), Some(ErrorKind::State));
            let error = library.drivers().expect_err("Drivers are not available");
            assert_eq!(ErrorKind::of(&error), Some(ErrorKind::State));
        }
        let sources = library.data_sources().expect("Could not list the data sources");
        assert_eq!(sources.len(), 1);
    }

    #[tokio::test]
    async fn required_entry_points() {
        init_logs();
        silent_logs! {
            let error = Library::new(EchoNative::new().without(EntryPoint::Fetch), Config::default())
                .err()
                .expect("Fetch is required");
            assert_eq!(ErrorKind::of(&error), Some(ErrorKind::NativeLibraryLoad));
            assert!(bridge_error(&error).message().contains("SQLFetch"));
        }
    }

    #[tokio::test]
    async fn diagnostics_chain() {
        init_logs();
        let library = library(EchoNative::new());
        let connection = library
            .connect(&database("diagnostics"), None, None)
            .expect("Could not connect");
        silent_logs! {
            let error = connection
                .execute_direct("RAISE 'HY000' 'Broken on purpose'")
                .expect_err("The statement raises");
            assert_eq!(ErrorKind::of(&error), Some(ErrorKind::Execution));
            assert_eq!(bridge_error(&error).sqlstate(), Some("HY000"));
            let primary = bridge_error(&error).primary().expect("Expected the primary record");
            assert!(primary.message.ends_with("Broken on purpose"));
            assert_eq!(bridge_error(&error).chained().len(), 1);
            assert_eq!(bridge_error(&error).chained()[0].state, "01000");
            assert_eq!(bridge_error(&error).diagnostics().count(), 2);
        }
        let result = connection
            .execute_direct("WARN 'Only a warning'")
            .expect("A warning is not an error");
        assert_eq!(result.rows_affected(), Some(0));
    }

    #[tokio::test]
    async fn severed_connection() {
        init_logs();
        let library = library(EchoNative::new());
        let connection = library
            .connect(&database("severed"), None, None)
            .expect("Could not connect");
        assert!(connection.is_connected().expect("Could not check"));
        library.native().sever_connections();
        assert!(!connection.is_connected().expect("Could not check"));
        silent_logs! {
            let error = connection
                .prepare("SELECT 1")
                .expect_err("The session is gone");
            assert_eq!(ErrorKind::of(&error), Some(ErrorKind::Connection));
            assert_eq!(bridge_error(&error).sqlstate(), Some("08S01"));
        }
        connection.close().expect("Could not close a severed connection");
        assert_eq!(library.native().resources(), Resources::default());
    }

    #[tokio::test]
    async fn drivers_and_data_sources() {
        init_logs();
        let library = library(EchoNative::new().with_data_source("reports"));
        let drivers = library.drivers().expect("Could not list the drivers");
        assert_eq!(drivers.len(), 1);
        assert_eq!(drivers[0].name, "Echo");
        let sources = library
            .data_sources()
            .expect("Could not list the data sources")
            .into_iter()
            .map(|v| v.name)
            .collect::<Vec<_>>();
        assert_eq!(sources, ["echo", "reports"]);
        let connection = library
            .connect("DSN=reports", None, None)
            .expect("Could not connect through a data source");
        assert_eq!(connection.catalog().expect("Could not read the catalog"), "main");

        let empty = self::library(EchoNative::new().without_data_sources());
        assert!(
            empty
                .data_sources()
                .expect("No data sources is not an error")
                .is_empty()
        );
    }

    #[tokio::test]
    async fn catalog_and_transactions() {
        init_logs();
        let library = library(EchoNative::new());
        let connection = library
            .connect(&database("first"), None, None)
            .expect("Could not connect");
        run(&connection, "CREATE TABLE t (n INTEGER)");
        connection
            .set_catalog("second")
            .expect("Could not change the catalog");
        assert_eq!(connection.catalog().expect("Could not read"), "second");
        silent_logs! {
            let error = connection
                .execute_direct("SELECT n FROM t")
                .expect_err("The table is in the other catalog");
            assert_eq!(bridge_error(&error).sqlstate(), Some("42S02"));
        }
        let transaction = connection.begin().expect("Could not begin");
        silent_logs! {
            let error = transaction
                .set_catalog("first")
                .expect_err("The catalog cannot change inside a transaction");
            assert_eq!(bridge_error(&error).sqlstate(), Some("25000"));
        }
        transaction.commit().expect("Could not commit");
        connection
            .set_catalog("first")
            .expect("Could not change the catalog");
        assert_eq!(count_rows(&connection, "t"), 0);
    }

    #[tokio::test]
    async fn undescribed_parameters() {
        init_logs();
        let library = library(EchoNative::new().with_parameter_description(false));
        let connection = library
            .connect(&database("undescribed"), None, None)
            .expect("Could not connect");
        run(
            &connection,
            indoc! {"
                CREATE TABLE prices (
                    item VARCHAR(20) NOT NULL,
                    price DECIMAL(8, 2),
                    flag BIT
                )
            "},
        );
        let insert = connection
            .prepare("INSERT INTO prices VALUES (?, ?, ?)")
            .expect("Could not prepare");
        assert!(
            insert
                .parameters()
                .expect("Could not read the parameters")
                .iter()
                .all(|v| v.data_type == DataType::Unknown)
        );
        insert
            .bind_all([
                Value::from("tea"),
                Value::from(Decimal::new(350, 2)),
                Value::from(true),
            ])
            .expect("Could not bind");
        insert.execute().expect("Could not insert");
        let row = run(&connection, "SELECT item, price, flag FROM prices")
            .into_cursor()
            .expect("Expected a result set")
            .next()
            .expect("Expected a row")
            .expect("Could not fetch");
        assert_eq!(row.get(0), Some(&Value::from("tea")));
        assert_eq!(
            row.get(1),
            Some(&Value::Decimal(Some(Decimal::new(35, 1)), 8, 2))
        );
        assert_eq!(row.get(2), Some(&Value::Boolean(Some(true))));
    }
}
