use crate::{run, silent_logs};
use odbridge_core::{ErrorKind, Library, Native};
use std::sync::LazyLock;
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub async fn cursor<N: Native>(library: &Library<N>, connection_string: &str) {
    let _lock = MUTEX.lock().await;
    let connection = library
        .connect(connection_string, None, None)
        .expect("Could not connect");

    // Setup
    run(&connection, "DROP TABLE IF EXISTS odbridge_cursor");
    run(&connection, "CREATE TABLE odbridge_cursor (n INTEGER)");
    run(
        &connection,
        "INSERT INTO odbridge_cursor (n) VALUES (1), (2), (3)",
    );

    let select = connection
        .prepare("SELECT n FROM odbridge_cursor")
        .expect("Could not prepare the select");

    // Forward only
    let mut first = select
        .execute()
        .expect("Could not execute the select")
        .into_cursor()
        .expect("A select must return a result set");
    assert!(!first.is_scrollable());
    first
        .fetch_next()
        .expect("Could not fetch")
        .expect("Expected a row");
    silent_logs! {
        let error = first
            .fetch_relative(-1)
            .expect_err("A forward only cursor cannot move backwards");
        assert_eq!(ErrorKind::of(&error), Some(ErrorKind::State));
    }

    // A later execution invalidates the previous cursor
    let mut second = select
        .execute()
        .expect("Could not execute the select again")
        .into_cursor()
        .expect("A select must return a result set");
    silent_logs! {
        let error = first
            .fetch_next()
            .expect_err("The first cursor must be invalidated");
        assert_eq!(ErrorKind::of(&error), Some(ErrorKind::State));
    }
    let rows = second
        .by_ref()
        .map(|v| v.expect("Could not fetch"))
        .collect::<Vec<_>>();
    assert_eq!(rows.len(), 3);
    assert!(second.is_exhausted());
    assert!(second.next().is_none());
    drop(first);
    drop(second);

    // Scrollable
    #[cfg(not(feature = "disable-scrollable"))]
    {
        select
            .set_scrollable(true)
            .expect("Could not request a scrollable cursor");
        let mut cursor = select
            .execute()
            .expect("Could not execute the scrollable select")
            .into_cursor()
            .expect("A select must return a result set");
        assert!(cursor.is_scrollable());
        let one = cursor
            .fetch_next()
            .expect("Could not fetch")
            .expect("Expected the first row");
        let two = cursor
            .fetch_next()
            .expect("Could not fetch")
            .expect("Expected the second row");
        assert_ne!(one.values, two.values);
        let back = cursor
            .fetch_relative(-1)
            .expect("Could not move back")
            .expect("Expected the first row again");
        assert_eq!(back.values, one.values);
        assert!(
            cursor
                .fetch_relative(10)
                .expect("Moving past the end is not an error")
                .is_none()
        );
        select
            .set_scrollable(false)
            .expect("Could not request a forward only cursor");
    }
}
