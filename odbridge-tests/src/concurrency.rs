use crate::{count_rows, run, silent_logs};
use odbridge_core::{ErrorKind, Library, Native};
use std::{
    sync::{Arc, LazyLock},
    time::Duration,
};
use tokio::{
    sync::Mutex,
    task::{JoinSet, spawn_blocking},
    time::{sleep, timeout},
};

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

const WORKERS: usize = 4;
const ROWS: i32 = 25;

pub async fn concurrency<N: Native>(library: Arc<Library<N>>, connection_string: &str) {
    let _lock = MUTEX.lock().await;

    // A connection per thread
    let mut tasks = JoinSet::new();
    for worker in 0..WORKERS {
        let library = library.clone();
        let connection_string = connection_string.to_string();
        tasks.spawn_blocking(move || {
            let connection = library
                .connect(&connection_string, None, None)
                .expect("Could not connect");
            let table = format!("odbridge_worker_{}", worker);
            run(&connection, &format!("DROP TABLE IF EXISTS {}", table));
            run(&connection, &format!("CREATE TABLE {} (n INTEGER)", table));
            let insert = connection
                .prepare(&format!("INSERT INTO {} (n) VALUES (?)", table))
                .expect("Could not prepare the insert");
            for n in 0..ROWS {
                insert.bind(1, n).expect("Could not bind");
                insert.execute().expect("Could not insert");
            }
            count_rows(&connection, &table)
        });
    }
    while let Some(result) = tasks.join_next().await {
        assert_eq!(result.expect("The worker panicked"), ROWS as usize);
    }

    // A statement shared by many threads
    let connection = library
        .connect(connection_string, None, None)
        .expect("Could not connect");
    let statement = Arc::new(
        connection
            .prepare("SELECT n FROM odbridge_worker_0")
            .expect("Could not prepare the shared select"),
    );
    let mut tasks = JoinSet::new();
    for _ in 0..WORKERS {
        let statement = statement.clone();
        tasks.spawn_blocking(move || {
            let mut cursor = statement
                .execute()
                .expect("Could not execute the shared statement")
                .into_cursor()
                .expect("A select must return a result set");
            let mut read = 0;
            loop {
                match cursor.fetch_next() {
                    Ok(Some(..)) => read += 1,
                    Ok(None) => return Some(read),
                    // Another thread executed the statement again
                    Err(e) if ErrorKind::of(&e) == Some(ErrorKind::State) => return None,
                    Err(e) => panic!("Unexpected error: {:#}", e),
                }
            }
        });
    }
    while let Some(result) = tasks.join_next().await {
        if let Some(read) = result.expect("The reader panicked") {
            assert_eq!(read, ROWS);
        }
    }
    drop(statement);
    connection.close().expect("Could not close the connection");
}

/// Closes a connection while one of its statements blocks in `blocking_sql`
/// and another thread cancels that statement. The close cancels the
/// execution instead of waiting for it and the cancel never waits for the
/// close.
pub async fn close_while_executing<N: Native>(
    library: &Library<N>,
    connection_string: &str,
    blocking_sql: &str,
) {
    let _lock = MUTEX.lock().await;
    let limit = Duration::from_secs(10);
    let connection = Arc::new(
        library
            .connect(connection_string, None, None)
            .expect("Could not connect"),
    );
    let statement = Arc::new(
        connection
            .prepare(blocking_sql)
            .expect("Could not prepare the blocking query"),
    );
    silent_logs! {
        let execution = {
            let statement = statement.clone();
            spawn_blocking(move || statement.execute().map(|_| ()))
        };
        sleep(Duration::from_millis(100)).await;
        let closing = {
            let connection = connection.clone();
            spawn_blocking(move || connection.close())
        };
        sleep(Duration::from_millis(20)).await;
        let cancelling = {
            let statement = statement.clone();
            spawn_blocking(move || statement.cancel())
        };

        let cancelled = timeout(limit, cancelling)
            .await
            .expect("The cancel waited for the closing connection")
            .expect("The cancel panicked");
        if let Err(e) = cancelled {
            // The close already invalidated the statement
            assert_eq!(ErrorKind::of(&e), Some(ErrorKind::State), "{:#}", e);
        }
        timeout(limit, closing)
            .await
            .expect("The close waited for the blocking execution")
            .expect("The close panicked")
            .expect("Could not close the connection");
        let executed = timeout(limit, execution)
            .await
            .expect("The execution was not cancelled")
            .expect("The execution panicked");
        assert!(executed.is_err(), "The execution must be cancelled");
    }
    assert!(!connection.is_open());
    assert!(!statement.is_open());
}
