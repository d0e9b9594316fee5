#[cfg(test)]
mod tests {
    use odbridge_core::{AsValue, ErrorKind, TypeFamily, Value};
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use time::{Date, Month, Time};
    use uuid::Uuid;

    #[test]
    fn value_none() {
        assert_eq!(Value::Null, Value::Null);
        assert_ne!(Value::Float32(Some(1.0)), Value::Null);
        assert_eq!(Value::Int32(None), Value::Int32(None));
        assert_ne!(Value::Int32(None), Value::Int64(None));
        assert!(Value::Varchar(None).is_null());
        assert!(!Value::Varchar(Some("".into())).is_null());
        assert_eq!(Value::Int16(Some(4)).as_null(), Value::Int16(None));
    }

    #[test]
    fn value_bool() {
        let val: Value = true.into();
        assert_eq!(val, Value::Boolean(Some(true)));
        assert_ne!(val, Value::Boolean(Some(false)));
        assert_ne!(val, Value::Varchar(Some("true".into())));
        assert!(bool::try_from_value(val).unwrap());
        let error = bool::try_from_value(Value::Int8(Some(1))).unwrap_err();
        assert_eq!(ErrorKind::of(&error), Some(ErrorKind::TypeMismatch));
    }

    #[test]
    fn value_integers() {
        let val: Value = 127i8.into();
        assert_eq!(val, Value::Int8(Some(127)));
        assert_eq!(i64::try_from_value(val).unwrap(), 127);
        assert_eq!(i16::try_from_value(Value::Int64(Some(-300))).unwrap(), -300);
        assert_eq!(
            ErrorKind::of(&i8::try_from_value(Value::Int32(Some(300))).unwrap_err()),
            Some(ErrorKind::TypeMismatch)
        );
        assert_eq!(
            i32::try_from_value(Value::Decimal(Some(Decimal::from(42)), 10, 0)).unwrap(),
            42
        );
        assert!(i32::try_from_value(Value::Decimal(Some(Decimal::new(425, 1)), 10, 1)).is_err());
        assert!(i32::try_from_value(Value::Float64(Some(1.0))).is_err());
        assert!(i32::try_from_value(Value::Varchar(Some("1".into()))).is_err());
    }

    #[test]
    fn value_null_into_plain_type() {
        let error = i32::try_from_value(Value::Int32(None)).unwrap_err();
        assert_eq!(ErrorKind::of(&error), Some(ErrorKind::TypeMismatch));
        assert!(error.to_string().contains("Option"));
        assert_eq!(Option::<i32>::try_from_value(Value::Int32(None)).unwrap(), None);
        assert_eq!(Option::<i32>::try_from_value(Value::Null).unwrap(), None);
        assert_eq!(
            Option::<i32>::try_from_value(Value::Int32(Some(7))).unwrap(),
            Some(7)
        );
        assert_eq!(None::<String>.as_value(), Value::Varchar(None));
    }

    #[test]
    fn value_floats() {
        let val: Value = 1.5f32.into();
        assert_eq!(val, Value::Float32(Some(1.5)));
        assert_eq!(f64::try_from_value(val).unwrap(), 1.5);
        assert!(f32::try_from_value(Value::Float64(Some(1.5))).is_err());
    }

    #[test]
    fn value_decimal() {
        let decimal = Decimal::from_str("1234.50").unwrap();
        let val = decimal.as_value();
        assert_eq!(val, Value::Decimal(Some(decimal), 0, 2));
        assert_eq!(Decimal::try_from_value(val).unwrap(), decimal);
        assert_eq!(
            Decimal::try_from_value(Value::Int64(Some(12))).unwrap(),
            Decimal::from(12)
        );
        assert!(Decimal::try_from_value(Value::Float64(Some(1.0))).is_err());
        assert_eq!(val_family(decimal), TypeFamily::Decimal);
    }

    fn val_family(v: impl AsValue) -> TypeFamily {
        v.as_value().family()
    }

    #[test]
    fn value_text_and_binary() {
        let val: Value = "it's".into();
        assert_eq!(val, Value::Varchar(Some("it's".into())));
        assert_eq!(val.to_string(), "'it''s'");
        assert_eq!(String::try_from_value(val).unwrap(), "it's");
        let val: Value = vec![0xCAu8, 0xFE].into();
        assert_eq!(val.to_string(), "X'CAFE'");
        assert_eq!(Vec::<u8>::try_from_value(val).unwrap(), [0xCA, 0xFE]);
    }

    #[test]
    fn value_temporal() {
        let date = Date::from_calendar_date(2024, Month::February, 29).unwrap();
        let val = date.as_value();
        assert_eq!(val, Value::Date(Some(date)));
        assert_eq!(Date::try_from_value(val).unwrap(), date);
        let time = Time::from_hms(23, 59, 58).unwrap();
        assert_eq!(Time::try_from_value(time.as_value()).unwrap(), time);
        assert!(Time::try_from_value(date.as_value()).is_err());
    }

    #[test]
    fn value_uuid() {
        let uuid = Uuid::from_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(Uuid::try_from_value(uuid.as_value()).unwrap(), uuid);
        let text = Value::Varchar(Some("67e55044-10b1-426f-9247-bb680e5fe0c8".into()));
        assert_eq!(Uuid::try_from_value(text).unwrap(), uuid);
        let error = Uuid::try_from_value(Value::Varchar(Some("nope".into()))).unwrap_err();
        assert_eq!(ErrorKind::of(&error), Some(ErrorKind::TypeMismatch));
    }

    #[test]
    fn value_families() {
        assert_eq!(Value::Null.family(), TypeFamily::Any);
        assert_eq!(Value::Int8(None).family(), TypeFamily::Integer);
        assert_eq!(Value::Int64(Some(1)).family(), TypeFamily::Integer);
        assert_eq!(Value::Float32(None).family(), TypeFamily::Float);
        assert_eq!(Value::Blob(None).family(), TypeFamily::Binary);
        assert_eq!(Value::Uuid(None).family(), TypeFamily::Guid);
        assert!(Value::Decimal(None, 10, 2).same_type(&Value::Decimal(None, 10, 2)));
        assert!(!Value::Decimal(None, 10, 2).same_type(&Value::Decimal(None, 12, 2)));
    }
}
