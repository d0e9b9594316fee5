mod init;

#[cfg(test)]
mod tests {
    use super::init::{blocking_query, init};
    use odbridge_core::{Config, ErrorKind, Library};
    use odbridge_odbc::OdbcNative;
    use odbridge_tests::{
        bridge_error, close_while_executing, execute_tests, init_logs, run, silent_logs,
    };
    use std::sync::{Arc, Mutex};

    static MUTEX: Mutex<()> = Mutex::new(());

    fn library() -> Library<OdbcNative> {
        let native = OdbcNative::new().expect("Could not load the driver manager");
        Library::new(native, Config::from_env()).expect("Could not load the driver manager")
    }

    #[tokio::test]
    async fn odbc() {
        init_logs();
        let _guard = MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let Some(connection_string) = init() else {
            return;
        };
        execute_tests(Arc::new(library()), &connection_string).await;
    }

    #[tokio::test]
    async fn close_cancels_execution() {
        init_logs();
        let _guard = MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let (Some(connection_string), Some(query)) = (init(), blocking_query()) else {
            return;
        };
        close_while_executing(&library(), &connection_string, &query).await;
    }

    #[tokio::test]
    async fn connection_is_alive() {
        init_logs();
        let _guard = MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        let Some(connection_string) = init() else {
            return;
        };
        let library = library();
        let connection = library
            .connect(&connection_string, None, None)
            .expect("Could not connect");
        assert!(connection.is_connected().expect("Could not read the connection state"));
        assert!(connection.auto_commit().expect("Could not read autocommit"));
        let rows = run(&connection, "SELECT 1")
            .into_cursor()
            .expect("Expected a result set")
            .map(|v| v.expect("Could not fetch"))
            .count();
        assert_eq!(rows, 1);
        connection.close().expect("Could not close");
        assert!(!connection.is_open());
    }

    #[tokio::test]
    async fn unknown_data_source() {
        init_logs();
        let library = library();
        silent_logs! {
            let error = library
                .connect("DSN=odbridge_no_such_data_source", None, None)
                .expect_err("The data source does not exist");
            assert_eq!(ErrorKind::of(&error), Some(ErrorKind::Connection));
            assert!(bridge_error(&error).status().is_some());
            assert!(bridge_error(&error).primary().is_some());
        }
    }

    #[tokio::test]
    async fn list_drivers() {
        init_logs();
        let library = library();
        let drivers = library.drivers().expect("Could not list the drivers");
        assert!(drivers.iter().all(|v| !v.name.is_empty()));
        library
            .data_sources()
            .expect("Could not list the data sources");
    }
}
