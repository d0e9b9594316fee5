#[cfg(test)]
mod tests {
    use odbridge_core::ErrorKind;
    use odbridge_odbc::{OdbcNative, shutdown};
    use odbridge_tests::init_logs;

    #[test]
    fn no_environment_after_shutdown() {
        init_logs();
        OdbcNative::new().expect("Could not load the driver manager");
        shutdown();
        let error = match OdbcNative::new() {
            Ok(..) => panic!("The environment was shut down"),
            Err(e) => e,
        };
        assert_eq!(ErrorKind::of(&error), Some(ErrorKind::NativeLibraryLoad));
        shutdown();
    }
}
