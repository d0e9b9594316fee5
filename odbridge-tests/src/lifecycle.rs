use crate::{run, silent_logs};
use odbridge_core::{ErrorKind, Library, Native, Value};
use std::sync::LazyLock;
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub async fn lifecycle<N: Native>(library: &Library<N>, connection_string: &str) {
    let _lock = MUTEX.lock().await;

    let connection = library
        .connect(connection_string, None, None)
        .expect("Could not connect");
    assert!(connection.is_open());
    assert!(
        connection
            .is_connected()
            .expect("Could not check the connection")
    );

    // Setup
    run(&connection, "DROP TABLE IF EXISTS odbridge_lifecycle");
    run(
        &connection,
        "CREATE TABLE odbridge_lifecycle (id INTEGER, name VARCHAR(20))",
    );

    let insert = connection
        .prepare("INSERT INTO odbridge_lifecycle (id, name) VALUES (?, ?)")
        .expect("Could not prepare the insert");
    assert_eq!(insert.parameter_count().expect("Could not count"), 2);
    insert
        .bind_all([Value::from(1), Value::from("one")])
        .expect("Could not bind the first row");
    let result = insert.execute().expect("Could not insert the first row");
    assert_eq!(result.rows_affected(), Some(1));
    insert
        .bind_all([Value::from(2), Value::from("two")])
        .expect("Could not bind the second row");
    assert_eq!(
        insert
            .execute()
            .expect("Could not insert the second row")
            .rows_affected(),
        Some(1)
    );
    assert_eq!(
        insert.bound(2).expect("Could not read the binding"),
        Some(Value::from("two"))
    );

    let select = connection
        .prepare("SELECT id, name FROM odbridge_lifecycle")
        .expect("Could not prepare the select");
    let mut cursor = select
        .execute()
        .expect("Could not execute the select")
        .into_cursor()
        .expect("A select must return a result set");
    assert_eq!(cursor.columns().len(), 2);
    assert_eq!(cursor.column_index("NAME"), Some(1));
    let row = cursor
        .fetch_next()
        .expect("Could not fetch")
        .expect("Expected a row");
    assert_eq!(row.len(), 2);
    assert_eq!(cursor.fetched(), 1);

    // Closing the connection invalidates everything derived from it
    connection.close().expect("Could not close the connection");
    assert!(!connection.is_open());
    assert!(!insert.is_open());
    silent_logs! {
        let error = insert.execute().expect_err("The statement must be invalidated");
        assert_eq!(ErrorKind::of(&error), Some(ErrorKind::State));
        let error = cursor.fetch_next().expect_err("The cursor must be invalidated");
        assert_eq!(ErrorKind::of(&error), Some(ErrorKind::State));
        let error = connection.prepare("SELECT 1").expect_err("The connection is closed");
        assert_eq!(ErrorKind::of(&error), Some(ErrorKind::State));
    }
    connection.close().expect("Closing twice does nothing");
    assert!(
        !connection
            .is_connected()
            .expect("A closed connection is not connected")
    );
    cursor.close().expect("Closing an invalidated cursor does nothing");
    select.close().expect("Closing an invalidated statement does nothing");
}
