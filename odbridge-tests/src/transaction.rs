use crate::{count_rows, run};
use odbridge_core::{IsolationLevel, Library, Native};
use std::sync::LazyLock;
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub async fn transaction<N: Native>(library: &Library<N>, connection_string: &str) {
    let _lock = MUTEX.lock().await;
    let connection = library
        .connect(connection_string, None, None)
        .expect("Could not connect");

    // Setup
    run(&connection, "DROP TABLE IF EXISTS odbridge_transaction");
    run(&connection, "CREATE TABLE odbridge_transaction (n INTEGER)");
    assert!(connection.auto_commit().expect("Could not read autocommit"));
    connection
        .set_isolation(IsolationLevel::ReadCommitted)
        .expect("Could not set the isolation level");
    assert_eq!(
        connection.isolation().expect("Could not read the isolation level"),
        IsolationLevel::ReadCommitted
    );

    // Rollback
    let transaction = connection.begin().expect("Could not begin a transaction");
    assert!(!transaction.auto_commit().expect("Could not read autocommit"));
    run(transaction.connection(), "INSERT INTO odbridge_transaction (n) VALUES (1)");
    assert_eq!(count_rows(transaction.connection(), "odbridge_transaction"), 1);
    transaction.rollback().expect("Could not roll back");
    assert!(connection.auto_commit().expect("Could not read autocommit"));
    assert_eq!(count_rows(&connection, "odbridge_transaction"), 0);

    // Commit
    let transaction = connection.begin().expect("Could not begin a transaction");
    run(transaction.connection(), "INSERT INTO odbridge_transaction (n) VALUES (2)");
    run(transaction.connection(), "INSERT INTO odbridge_transaction (n) VALUES (3)");
    transaction.commit().expect("Could not commit");
    assert_eq!(count_rows(&connection, "odbridge_transaction"), 2);

    // Dropped without an outcome
    {
        let transaction = connection.begin().expect("Could not begin a transaction");
        run(transaction.connection(), "DELETE FROM odbridge_transaction WHERE n = 2");
    }
    assert!(connection.auto_commit().expect("Could not read autocommit"));
    assert_eq!(count_rows(&connection, "odbridge_transaction"), 2);

    // Closing the connection rolls back
    let other = library
        .connect(connection_string, None, None)
        .expect("Could not connect");
    other
        .set_auto_commit(false)
        .expect("Could not switch autocommit off");
    run(&other, "INSERT INTO odbridge_transaction (n) VALUES (4)");
    other.close().expect("Could not close the connection");
    assert_eq!(count_rows(&connection, "odbridge_transaction"), 2);
}
