#[cfg(test)]
mod tests {
    use indoc::indoc;
    use odbridge::{
        AsValue, BridgeError, Config, Connection, DataType, ErrorKind, Library, Nullability, Value,
    };
    use odbridge_echo::{EchoNative, Resources};
    use odbridge_tests::{count_rows, init_logs, run, silent_logs};
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use time::macros::date;

    fn connect(library: &Library<EchoNative>, database: &str) -> Connection<EchoNative> {
        library
            .connect(&format!("DRIVER={{Echo}};DATABASE={}", database), None, None)
            .expect("Could not connect")
    }

    #[tokio::test]
    async fn ledger() {
        init_logs();
        let library = Library::new(EchoNative::new(), Config::default())
            .expect("Could not load the echo library");
        let connection = connect(&library, "ledger");
        run(
            &connection,
            indoc! {"
                CREATE TABLE ledger (
                    id BIGINT NOT NULL,
                    booked DATE,
                    amount DECIMAL(12, 2),
                    memo VARCHAR(60)
                )
            "},
        );
        let insert = connection
            .prepare("INSERT INTO ledger (id, booked, amount, memo) VALUES (?, ?, ?, ?)")
            .expect("Could not prepare the insert");
        let parameters = insert.parameters().expect("Could not describe the parameters");
        assert_eq!(parameters.len(), 4);
        assert_eq!(parameters[0].data_type, DataType::BigInt);
        assert_eq!(parameters[0].nullable, Nullability::NoNulls);
        for (id, amount, memo) in [
            (1i64, "10.50", Some("coffee")),
            (2, "-3.25", None),
            (3, "1200.00", Some("rent")),
        ] {
            insert
                .bind_all([
                    id.as_value(),
                    date!(2024 - 01 - 31).as_value(),
                    Decimal::from_str(amount).unwrap().as_value(),
                    memo.map(String::from).as_value(),
                ])
                .expect("Could not bind");
            let affected = insert
                .execute()
                .expect("Could not insert")
                .rows_affected()
                .expect("An insert affects rows");
            assert_eq!(affected, 1);
        }
        assert_eq!(count_rows(&connection, "ledger"), 3);

        let select = connection
            .prepare("SELECT id, amount, memo FROM ledger")
            .expect("Could not prepare the select");
        select.set_scrollable(true).expect("Could not ask for a scrollable cursor");
        let mut cursor = select
            .execute()
            .expect("Could not select")
            .into_cursor()
            .expect("A select returns rows");
        assert!(cursor.is_scrollable());
        assert_eq!(cursor.column_index("memo"), Some(2));
        let last = cursor
            .fetch_relative(3)
            .expect("Could not move")
            .expect("There are three rows");
        assert_eq!(last.values[0], Value::Int64(Some(3)));
        let second = cursor
            .fetch_relative(-1)
            .expect("Could not move back")
            .expect("There is a second row");
        assert!(second.values[2].is_null());
        assert_eq!(
            Decimal::try_from_value(second.values[1].clone()).unwrap(),
            Decimal::from_str("-3.25").unwrap()
        );
        assert!(matches!(second.values[1], Value::Decimal(_, 12, 2)));
        drop(cursor);
        drop(select);
        drop(insert);

        let transaction = connection.begin().expect("Could not begin");
        run(
            transaction.connection(),
            "DELETE FROM ledger WHERE memo = 'rent'",
        );
        assert_eq!(count_rows(transaction.connection(), "ledger"), 2);
        drop(transaction);
        assert_eq!(count_rows(&connection, "ledger"), 3);
        assert!(connection.auto_commit().expect("Could not read autocommit"));

        connection.close().expect("Could not close");
        assert_eq!(library.native().resources(), Resources::default());
    }

    #[tokio::test]
    async fn failures_carry_context() {
        init_logs();
        let library = Library::new(EchoNative::new(), Config::default())
            .expect("Could not load the echo library");
        let connection = connect(&library, "context");
        silent_logs! {
            let error = connection
                .execute_direct("RAISE '40001' 'serialization failure'")
                .expect_err("The statement raises");
            assert_eq!(ErrorKind::of(&error), Some(ErrorKind::Execution));
            let native = error
                .downcast_ref::<BridgeError>()
                .expect("Expected the native failure");
            assert_eq!(native.sqlstate(), Some("40001"));
            assert!(native.message().ends_with("serialization failure"));
            assert!(error.chain().count() > 1, "The operation adds its context");
            assert!(format!("{:#}", error).contains("RAISE"));
        }
    }
}
