use crate::{bridge_error, count_rows, run, silent_logs};
use odbridge_core::{DataType, ErrorKind, Library, Native, Value};
use std::sync::LazyLock;
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub async fn mismatch<N: Native>(library: &Library<N>, connection_string: &str) {
    let _lock = MUTEX.lock().await;
    let connection = library
        .connect(connection_string, None, None)
        .expect("Could not connect");

    run(&connection, "DROP TABLE IF EXISTS odbridge_mismatch");
    run(
        &connection,
        "CREATE TABLE odbridge_mismatch (quantity INTEGER, label VARCHAR(10))",
    );
    let insert = connection
        .prepare("INSERT INTO odbridge_mismatch (quantity, label) VALUES (?, ?)")
        .expect("Could not prepare the insert");

    let parameters = insert.parameters().expect("Could not read the parameters");
    assert_eq!(parameters.len(), 2);
    if parameters[0].data_type != DataType::Unknown {
        silent_logs! {
            let error = insert
                .bind(1, "three")
                .expect_err("Text cannot be bound to an integer parameter");
            assert_eq!(ErrorKind::of(&error), Some(ErrorKind::TypeMismatch));
            assert!(bridge_error(&error).status().is_none(), "The native library must not be called");
        }
        assert_eq!(insert.bound(1).expect("Could not read the binding"), None);
    } else {
        log::warn!("{} cannot describe parameters, skipping the type mismatch", library.native().name());
    }

    silent_logs! {
        let error = insert.execute().expect_err("The parameters are not bound");
        assert_eq!(ErrorKind::of(&error), Some(ErrorKind::Bind));
        let error = insert.bind(3, 1).expect_err("There are only two parameters");
        assert_eq!(ErrorKind::of(&error), Some(ErrorKind::Bind));
    }

    insert.bind(1, 3).expect("Could not bind the quantity");
    insert.bind(2, "three").expect("Could not bind the label");
    insert.execute().expect("Could not insert after the rebind");
    insert.bind(2, Value::Varchar(None)).expect("Could not bind NULL");
    insert.execute().expect("Could not insert a NULL label");
    assert_eq!(count_rows(&connection, "odbridge_mismatch"), 2);

    insert.clear_bindings().expect("Could not clear the bindings");
    assert_eq!(insert.bound(1).expect("Could not read the binding"), None);

    // Text bound to a binary parameter, then the bytes
    #[cfg(not(feature = "disable-extended-types"))]
    {
        run(&connection, "DROP TABLE IF EXISTS odbridge_mismatch_binary");
        run(
            &connection,
            "CREATE TABLE odbridge_mismatch_binary (payload VARBINARY(16))",
        );
        let insert = connection
            .prepare("INSERT INTO odbridge_mismatch_binary (payload) VALUES (?)")
            .expect("Could not prepare the binary insert");
        let parameters = insert.parameters().expect("Could not read the parameters");
        if parameters[0].data_type != DataType::Unknown {
            silent_logs! {
                let error = insert
                    .bind(1, "bytes")
                    .expect_err("Text cannot be bound to a binary parameter");
                assert_eq!(ErrorKind::of(&error), Some(ErrorKind::TypeMismatch));
                assert!(bridge_error(&error).status().is_none());
            }
            assert_eq!(insert.bound(1).expect("Could not read the binding"), None);
        }
        insert
            .bind(1, &b"bytes"[..])
            .expect("Could not bind the bytes");
        insert.execute().expect("Could not insert the bytes");
        assert_eq!(count_rows(&connection, "odbridge_mismatch_binary"), 1);
    }
}
