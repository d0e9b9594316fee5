mod concurrency;
mod cursor;
mod empty;
mod lifecycle;
mod mismatch;
mod round_trip;
#[cfg(not(feature = "disable-transactions"))]
mod transaction;

use crate::{
    concurrency::concurrency, cursor::cursor, empty::empty, lifecycle::lifecycle,
    mismatch::mismatch, round_trip::round_trip,
};
pub use concurrency::close_while_executing;
use log::LevelFilter;
use odbridge_core::{BridgeError, Connection, Error, Library, Native, QueryResult, truncate_long};
use std::{env, sync::Arc};
#[cfg(not(feature = "disable-transactions"))]
use transaction::transaction;

pub fn init_logs() {
    let mut logger = env_logger::builder();
    logger
        .is_test(true)
        .format_file(true)
        .format_line_number(true);
    if env::var("RUST_LOG").is_err() {
        logger.filter_level(LevelFilter::Warn);
    }
    let _ = logger.try_init();
}

/// Runs the behavior tests every native library must pass, against the data
/// source reached through `connection_string`.
pub async fn execute_tests<N: Native>(library: Arc<Library<N>>, connection_string: &str) {
    lifecycle(&library, connection_string).await;
    round_trip(&library, connection_string).await;
    empty(&library, connection_string).await;
    mismatch(&library, connection_string).await;
    cursor(&library, connection_string).await;
    #[cfg(not(feature = "disable-transactions"))]
    transaction(&library, connection_string).await;
    concurrency(library.clone(), connection_string).await;
}

/// Executes `sql` directly, panicking on failure.
pub fn run<N: Native>(connection: &Connection<N>, sql: &str) -> QueryResult<N> {
    connection
        .execute_direct(sql)
        .unwrap_or_else(|e| panic!("Could not run:\n{}\n{:#}", truncate_long!(sql), e))
}

/// The native failure behind `error`, panicking when the bridge raised none.
pub fn bridge_error(error: &Error) -> &BridgeError {
    error
        .downcast_ref::<BridgeError>()
        .unwrap_or_else(|| panic!("Expected a bridge error, got: {:#}", error))
}

/// Number of rows in `table`.
pub fn count_rows<N: Native>(connection: &Connection<N>, table: &str) -> usize {
    run(connection, &format!("SELECT * FROM {}", table))
        .into_cursor()
        .expect("A select must return a result set")
        .map(|v| v.expect("Could not fetch a row"))
        .count()
}

#[macro_export]
macro_rules! silent_logs {
    ($($code:tt)+) => {{
        let level = log::max_level();
        log::set_max_level(log::LevelFilter::Off);
        $($code)+
        log::set_max_level(level);
    }};
}
