#[cfg(test)]
mod tests {
    use odbridge_core::{
        CType, ColumnDescription, DataType, ErrorKind, NativeBuffer, Nullability, TypeFamily,
        Value, marshal,
    };
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use time::{Date, Month, PrimitiveDateTime, Time, macros::datetime};
    use uuid::Uuid;

    fn column(data_type: DataType) -> ColumnDescription {
        ColumnDescription::new("c", data_type, Nullability::Nullable)
    }

    fn through(value: Value, data_type: DataType) -> Value {
        let buffer = marshal::to_native(&value, &data_type).expect("Could not marshal");
        marshal::from_native(&buffer, &column(data_type)).expect("Could not unmarshal")
    }

    #[test]
    fn compatibility_matrix() {
        use TypeFamily as F;
        assert!(marshal::compatible(F::Integer, F::Decimal));
        assert!(marshal::compatible(F::Boolean, F::Integer));
        assert!(marshal::compatible(F::Any, F::Timestamp));
        assert!(marshal::compatible(F::Text, F::Any));
        assert!(marshal::compatible(F::Date, F::Timestamp));
        assert!(marshal::compatible(F::Guid, F::Text));
        assert!(!marshal::compatible(F::Text, F::Integer));
        assert!(!marshal::compatible(F::Decimal, F::Integer));
        assert!(!marshal::compatible(F::Float, F::Decimal));
        assert!(!marshal::compatible(F::Timestamp, F::Date));
    }

    #[test]
    fn check_compatible_kinds() {
        let error =
            marshal::check_compatible(&Value::Varchar(Some("abc".into())), &DataType::Integer)
                .unwrap_err();
        assert_eq!(ErrorKind::of(&error), Some(ErrorKind::TypeMismatch));
        assert!(error.to_string().contains("VARCHAR"));
        assert!(error.to_string().contains("INTEGER"));
        let other = DataType::Other {
            code: -151,
            size: 0,
            digits: 0,
        };
        let error = marshal::check_compatible(&Value::Int32(Some(1)), &other).unwrap_err();
        assert_eq!(ErrorKind::of(&error), Some(ErrorKind::UnsupportedType));
        marshal::check_compatible(&Value::Null, &other).expect("Untyped NULL binds anywhere");
    }

    #[test]
    fn integers_are_native_width() {
        let buffer = marshal::to_native(&Value::Int32(Some(-2)), &DataType::Integer).unwrap();
        assert_eq!(buffer.c_type, CType::SLong);
        assert_eq!(buffer.bytes(), (-2i32).to_ne_bytes());
        let buffer = marshal::to_native(&Value::Int16(Some(7)), &DataType::BigInt).unwrap();
        assert_eq!(buffer.c_type, CType::SShort);
        assert_eq!(buffer.indicator, 2);
    }

    #[test]
    fn null_is_the_indicator() {
        let buffer = marshal::to_native(&Value::Int32(None), &DataType::Integer).unwrap();
        assert!(buffer.is_null());
        assert_eq!(buffer.indicator, NativeBuffer::NULL_DATA);
        let buffer = marshal::to_native(&Value::Null, &DataType::Date).unwrap();
        assert_eq!(buffer.c_type, CType::Date);
        assert!(buffer.is_null());
        let buffer = marshal::to_native(&Value::Varchar(Some("".into())), &DataType::Varchar {
            length: 10,
        })
        .unwrap();
        assert!(!buffer.is_null());
        assert_eq!(buffer.indicator, 0);
    }

    #[test]
    fn null_keeps_the_column_type() {
        let value = marshal::from_native(
            &NativeBuffer::null(CType::Char),
            &column(DataType::Decimal {
                precision: 10,
                scale: 2,
            }),
        )
        .unwrap();
        assert!(matches!(value, Value::Decimal(None, 10, 2)));
        let value =
            marshal::from_native(&NativeBuffer::null(CType::Timestamp), &column(DataType::Timestamp {
                precision: 3,
            }))
            .unwrap();
        assert_eq!(value, Value::Timestamp(None));
    }

    #[test]
    fn decimals_are_exact() {
        let decimal = Decimal::from_str("-12345678901234567.89").unwrap();
        let declared = DataType::Decimal {
            precision: 19,
            scale: 2,
        };
        let buffer = marshal::to_native(&Value::Decimal(Some(decimal), 19, 2), &declared).unwrap();
        assert_eq!(buffer.c_type, CType::Char);
        assert_eq!(buffer.bytes(), b"-12345678901234567.89");
        let back = through(Value::Decimal(Some(decimal), 19, 2), declared);
        assert!(matches!(back, Value::Decimal(Some(v), 19, 2) if v == decimal));
        let value = marshal::from_native(
            &NativeBuffer::new(CType::Char, b" 1.5E2 ".to_vec()),
            &column(declared),
        )
        .unwrap();
        assert_eq!(value, Value::Decimal(Some(Decimal::from(150)), 19, 2));
    }

    #[test]
    fn integer_into_decimal_parameter() {
        let declared = DataType::Numeric {
            precision: 8,
            scale: 0,
        };
        let buffer = marshal::to_native(&Value::Int64(Some(99)), &declared).unwrap();
        assert_eq!(buffer.c_type, CType::SBigInt);
    }

    #[test]
    fn text_is_utf8() {
        let declared = DataType::WVarchar { length: 20 };
        assert_eq!(
            through(Value::Varchar(Some("héllo wörld".into())), declared),
            Value::Varchar(Some("héllo wörld".into()))
        );
        let error = marshal::from_native(
            &NativeBuffer::new(CType::Char, vec![0xFF, 0xFE]),
            &column(declared),
        )
        .unwrap_err();
        assert_eq!(ErrorKind::of(&error), Some(ErrorKind::TypeMismatch));
    }

    #[test]
    fn temporal_values() {
        let date = Date::from_calendar_date(1999, Month::December, 31).unwrap();
        assert_eq!(
            through(Value::Date(Some(date)), DataType::Date),
            Value::Date(Some(date))
        );
        let timestamp: PrimitiveDateTime = datetime!(2025-03-01 12:34:56.123456789);
        assert_eq!(
            through(
                Value::Timestamp(Some(timestamp)),
                DataType::Timestamp { precision: 9 }
            ),
            Value::Timestamp(Some(timestamp))
        );
        let time = Time::from_hms(8, 0, 1).unwrap();
        assert_eq!(
            through(Value::Time(Some(time)), DataType::Time { precision: 0 }),
            Value::Time(Some(time))
        );
        let fractional = Time::from_hms_milli(8, 0, 1, 250).unwrap();
        let buffer =
            marshal::to_native(&Value::Time(Some(fractional)), &DataType::Time { precision: 2 })
                .unwrap();
        assert_eq!(buffer.c_type, CType::Char);
        assert_eq!(
            through(
                Value::Time(Some(fractional)),
                DataType::Time { precision: 2 }
            ),
            Value::Time(Some(fractional))
        );
    }

    #[test]
    fn zoned_timestamps() {
        let parsed = marshal::parse_zoned("2024-05-06 07:08:09.5 +02:00").unwrap();
        assert_eq!(parsed.offset().whole_hours(), 2);
        assert_eq!(parsed.millisecond(), 500);
        assert!(marshal::parse_zoned("2024-05-06T07:08:09Z").is_some());
        assert!(marshal::parse_zoned("yesterday").is_none());
        let value = Value::TimestampWithTimezone(Some(parsed));
        assert_eq!(
            through(
                value.clone(),
                DataType::TimestampWithTimezone { precision: 3 }
            ),
            value
        );
    }

    #[test]
    fn guid_values() {
        let uuid = Uuid::from_str("936da01f-9abd-4d9d-80c7-02af85c822a8").unwrap();
        assert_eq!(
            through(Value::Uuid(Some(uuid)), DataType::Guid),
            Value::Uuid(Some(uuid))
        );
        let buffer =
            marshal::to_native(&Value::Uuid(Some(uuid)), &DataType::Varchar { length: 36 })
                .unwrap();
        assert_eq!(buffer.c_type, CType::Char);
        assert_eq!(buffer.bytes(), b"936da01f-9abd-4d9d-80c7-02af85c822a8");
    }

    #[test]
    fn wrong_buffer_shape() {
        let error = marshal::from_native(
            &NativeBuffer::new(CType::SLong, vec![1, 2]),
            &column(DataType::Integer),
        )
        .unwrap_err();
        assert_eq!(ErrorKind::of(&error), Some(ErrorKind::TypeMismatch));
        let error = marshal::from_native(
            &NativeBuffer::new(CType::SBigInt, 1i64.to_ne_bytes().to_vec()),
            &column(DataType::Integer),
        )
        .unwrap_err();
        assert_eq!(ErrorKind::of(&error), Some(ErrorKind::TypeMismatch));
    }

    #[test]
    fn unsupported_columns() {
        let error = marshal::from_native(
            &NativeBuffer::new(CType::Binary, vec![0]),
            &column(DataType::Other {
                code: -151,
                size: 0,
                digits: 0,
            }),
        )
        .unwrap_err();
        assert_eq!(ErrorKind::of(&error), Some(ErrorKind::UnsupportedType));
        assert!(marshal::c_type_for(&DataType::Unknown).is_err());
    }

    #[test]
    fn floats_follow_precision() {
        assert_eq!(
            marshal::c_type_for(&DataType::Float { precision: 24 }).unwrap(),
            CType::Float
        );
        assert_eq!(
            marshal::c_type_for(&DataType::Float { precision: 53 }).unwrap(),
            CType::Double
        );
        assert_eq!(
            through(Value::Float64(Some(0.1)), DataType::Double),
            Value::Float64(Some(0.1))
        );
        assert_eq!(
            through(Value::Float32(Some(2.5)), DataType::Real),
            Value::Float32(Some(2.5))
        );
    }

    #[test]
    fn native_type_codes() {
        assert_eq!(DataType::from_native(4, 10, 0), DataType::Integer);
        assert_eq!(
            DataType::from_native(3, 10, 2),
            DataType::Decimal {
                precision: 10,
                scale: 2
            }
        );
        assert_eq!(DataType::Integer.to_native(), (4, 10, 0));
        assert!(matches!(
            DataType::from_native(-151, 0, 0),
            DataType::Other { code: -151, .. }
        ));
        assert_eq!(
            DataType::for_value(&Value::Decimal(Some(Decimal::from_str("123.45").unwrap()), 0, 2)),
            DataType::Decimal {
                precision: 5,
                scale: 2
            }
        );
    }
}
