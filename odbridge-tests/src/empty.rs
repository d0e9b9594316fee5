use crate::run;
use odbridge_core::{Library, Native, Nullability};
use std::sync::LazyLock;
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub async fn empty<N: Native>(library: &Library<N>, connection_string: &str) {
    let _lock = MUTEX.lock().await;
    let connection = library
        .connect(connection_string, None, None)
        .expect("Could not connect");

    run(&connection, "DROP TABLE IF EXISTS odbridge_empty");
    run(
        &connection,
        "CREATE TABLE odbridge_empty (code INTEGER NOT NULL, label VARCHAR(8))",
    );

    let mut cursor = run(&connection, "SELECT code, label FROM odbridge_empty")
        .into_cursor()
        .expect("An empty select still returns a result set");
    let columns = cursor.columns().to_vec();
    assert_eq!(columns.len(), 2);
    assert!(columns[0].name.eq_ignore_ascii_case("code"));
    assert_eq!(columns[0].nullable, Nullability::NoNulls);
    assert!(columns[1].nullable.could_be_null());
    assert!(
        cursor
            .fetch_next()
            .expect("Could not fetch from the empty result")
            .is_none()
    );
    assert!(cursor.is_exhausted());
    assert!(cursor.fetch_next().expect("Fetch after the end").is_none());
    assert_eq!(cursor.fetched(), 0);
    assert_eq!(cursor.columns(), columns.as_slice());
    cursor.close().expect("Could not close the cursor");
    assert!(cursor.is_closed());

    let deleted = run(&connection, "DELETE FROM odbridge_empty WHERE code = 1");
    assert_eq!(deleted.rows_affected(), Some(0));
}
