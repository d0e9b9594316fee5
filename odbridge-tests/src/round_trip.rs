use crate::run;
use odbridge_core::{AsValue, Library, Native, Row, Value};
use rust_decimal::Decimal;
use std::sync::LazyLock;
use time::macros::{date, datetime};
use tokio::sync::Mutex;

static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

fn column<T: AsValue>(row: &Row, index: usize) -> T {
    let value = row
        .get(index)
        .unwrap_or_else(|| panic!("Missing column {}", index))
        .clone();
    T::try_from_value(value)
        .unwrap_or_else(|e| panic!("Could not convert column {}: {:#}", index, e))
}

pub async fn round_trip<N: Native>(library: &Library<N>, connection_string: &str) {
    let _lock = MUTEX.lock().await;
    let connection = library
        .connect(connection_string, None, None)
        .expect("Could not connect");

    // Setup
    run(&connection, "DROP TABLE IF EXISTS odbridge_round_trip");
    run(
        &connection,
        "CREATE TABLE odbridge_round_trip (
            id INTEGER NOT NULL,
            small SMALLINT,
            big BIGINT,
            ratio DOUBLE PRECISION,
            amount DECIMAL(10, 2),
            note VARCHAR(40),
            day DATE,
            at TIMESTAMP
        )",
    );

    let insert = connection
        .prepare(
            "INSERT INTO odbridge_round_trip (id, small, big, ratio, amount, note, day, at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .expect("Could not prepare the insert");
    assert_eq!(insert.parameter_count().expect("Could not count"), 8);
    insert
        .bind_all([
            Value::from(1),
            Value::from(-12i16),
            Value::from(9_876_543_210i64),
            Value::from(0.25f64),
            Value::from(Decimal::new(1250, 2)),
            Value::from("Hello, bridge! ¿Qué tal?"),
            Value::from(date!(2024 - 02 - 29)),
            Value::from(datetime!(2024-02-29 13:14:15.250)),
        ])
        .expect("Could not bind the full row");
    insert.execute().expect("Could not insert the full row");

    insert.bind(1, 2).expect("Could not bind the id");
    for ordinal in 2..=8 {
        insert
            .bind(ordinal, Value::Null)
            .unwrap_or_else(|e| panic!("Could not bind NULL to {}: {:#}", ordinal, e));
    }
    insert.execute().expect("Could not insert the null row");

    let select = connection
        .prepare(
            "SELECT small, big, ratio, amount, note, day, at \
             FROM odbridge_round_trip WHERE id = ?",
        )
        .expect("Could not prepare the select");

    select.bind(1, 1).expect("Could not bind the key");
    let row = select
        .execute()
        .expect("Could not select the full row")
        .into_cursor()
        .expect("A select must return a result set")
        .next()
        .expect("Expected the full row")
        .expect("Could not fetch the full row");
    assert_eq!(column::<i16>(&row, 0), -12);
    assert_eq!(column::<i64>(&row, 1), 9_876_543_210);
    assert_eq!(column::<f64>(&row, 2), 0.25);
    assert_eq!(column::<Decimal>(&row, 3), Decimal::new(125, 1));
    assert_eq!(column::<String>(&row, 4), "Hello, bridge! ¿Qué tal?");
    assert_eq!(column::<time::Date>(&row, 5), date!(2024 - 02 - 29));
    assert_eq!(
        column::<time::PrimitiveDateTime>(&row, 6),
        datetime!(2024-02-29 13:14:15.250)
    );

    select.bind(1, 2).expect("Could not bind the key");
    let row = select
        .execute()
        .expect("Could not select the null row")
        .into_cursor()
        .expect("A select must return a result set")
        .next()
        .expect("Expected the null row")
        .expect("Could not fetch the null row");
    assert!(row.iter().all(|(_, v)| v.is_null()));
    assert!(matches!(row.get(0), Some(Value::Int16(None))));
    assert!(matches!(row.get(4), Some(Value::Varchar(None))));
    assert_eq!(column::<Option<i64>>(&row, 1), None);
    assert_ne!(row.get(4), Some(&Value::Null));

    #[cfg(not(feature = "disable-extended-types"))]
    extended_types(&connection);
}

/// Booleans, times, zoned timestamps, uuids and binary data with embedded zeros.
#[cfg(not(feature = "disable-extended-types"))]
fn extended_types<N: Native>(connection: &odbridge_core::Connection<N>) {
    use odbridge_core::uuid::Uuid;
    use time::{
        OffsetDateTime, Time,
        macros::{offset, time},
    };

    run(connection, "DROP TABLE IF EXISTS odbridge_extended");
    run(
        connection,
        "CREATE TABLE odbridge_extended (
            id INTEGER NOT NULL,
            flag BOOLEAN,
            moment TIME,
            zoned TIMESTAMP WITH TIME ZONE,
            tag UUID,
            payload VARBINARY(16)
        )",
    );
    let zoned = datetime!(2024-07-01 08:30:00).assume_offset(offset!(+02:00));
    let tag = Uuid::from_u128(0x6f1f_3a2e_91c4_4b7d_8e0a_5c3d_2b1a_0f9e);
    let payload = [1u8, 0, 0, 2, 0];

    let insert = connection
        .prepare(
            "INSERT INTO odbridge_extended (id, flag, moment, zoned, tag, payload) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .expect("Could not prepare the insert");
    insert
        .bind_all([
            Value::from(1),
            Value::from(true),
            Value::from(time!(23:59:58)),
            Value::from(zoned),
            Value::from(tag),
            Value::from(payload.to_vec()),
        ])
        .expect("Could not bind the extended row");
    insert.execute().expect("Could not insert the extended row");

    let row = run(
        connection,
        "SELECT flag, moment, zoned, tag, payload FROM odbridge_extended WHERE id = 1",
    )
    .into_cursor()
    .expect("A select must return a result set")
    .next()
    .expect("Expected the extended row")
    .expect("Could not fetch the extended row");
    assert!(column::<bool>(&row, 0));
    assert_eq!(column::<Time>(&row, 1), time!(23:59:58));
    let read = column::<OffsetDateTime>(&row, 2);
    assert_eq!(read, zoned, "Same instant");
    assert_eq!(column::<Uuid>(&row, 3), tag);
    let bytes = column::<Vec<u8>>(&row, 4);
    assert_eq!(bytes, payload, "Embedded zeros must survive");
}
