use std::env;

/// Connection string of the data source used by the integration tests, taken
/// from `ODBRIDGE_TEST_CONNECTION`.
pub fn init() -> Option<String> {
    match env::var("ODBRIDGE_TEST_CONNECTION") {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => {
            log::warn!("ODBRIDGE_TEST_CONNECTION is not set, skipping the data source tests");
            None
        }
    }
}

/// A query that blocks until cancelled on the test data source, taken from
/// `ODBRIDGE_TEST_BLOCKING_QUERY` (for example `SELECT pg_sleep(3600)`).
#[allow(dead_code)]
pub fn blocking_query() -> Option<String> {
    env::var("ODBRIDGE_TEST_BLOCKING_QUERY")
        .ok()
        .filter(|v| !v.trim().is_empty())
}
