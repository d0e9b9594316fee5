//! Conversion between [`Value`] and the buffers exchanged with the native library.
//!
//! One value at a time, in both directions. Integers travel as fixed width C
//! integers, decimals as exact text, text as UTF-8 with an explicit length,
//! binary as raw bytes, naive date and time values as the ODBC structs and
//! zoned timestamps as RFC 3339 text. NULL is always the indicator, never an
//! empty or zero value.

use crate::{
    CType, ColumnDescription, DataType, DateStruct, Error, ErrorKind, GuidStruct, NativeBuffer,
    Result, TimeStruct, TimestampStruct, TypeFamily, Value, truncate_long,
};
use rust_decimal::Decimal;
use time::{
    Date, Month, OffsetDateTime, PrimitiveDateTime, Time,
    format_description::well_known::Rfc3339, macros::format_description,
};
use uuid::Uuid;

/// Whether a value of family `value` can be bound to a parameter declared as `declared`.
pub fn compatible(value: TypeFamily, declared: TypeFamily) -> bool {
    use TypeFamily as F;
    matches!(
        (value, declared),
        (F::Any, _)
            | (_, F::Any)
            | (F::Boolean, F::Boolean | F::Integer)
            | (F::Integer, F::Integer | F::Decimal)
            | (F::Float, F::Float)
            | (F::Decimal, F::Decimal)
            | (F::Text, F::Text)
            | (F::Binary, F::Binary)
            | (F::Date, F::Date | F::Timestamp)
            | (F::Time, F::Time)
            | (F::Timestamp, F::Timestamp)
            | (F::TimestampWithTimezone, F::TimestampWithTimezone)
            | (F::Guid, F::Guid | F::Text)
    )
}

/// Fails with a type mismatch when `value` cannot be bound to `declared`.
pub fn check_compatible(value: &Value, declared: &DataType) -> Result<()> {
    let family = value.family();
    let declared_family = declared.family();
    if declared_family == TypeFamily::Unsupported && family != TypeFamily::Any {
        return Err(ErrorKind::UnsupportedType.error(format!(
            "Cannot bind a value to a parameter of {}",
            declared
        )));
    }
    if !compatible(family, declared_family) {
        return Err(ErrorKind::TypeMismatch.error(format!(
            "Cannot bind a {} value to a parameter declared as {}",
            value.type_name(),
            declared
        )));
    }
    Ok(())
}

/// C type used to read a column of type `data_type`.
pub fn c_type_for(data_type: &DataType) -> Result<CType> {
    Ok(match *data_type {
        DataType::Char { .. }
        | DataType::Varchar { .. }
        | DataType::LongVarchar { .. }
        | DataType::WChar { .. }
        | DataType::WVarchar { .. }
        | DataType::WLongVarchar { .. } => CType::Char,
        DataType::Binary { .. } | DataType::Varbinary { .. } | DataType::LongVarbinary { .. } => {
            CType::Binary
        }
        DataType::Bit => CType::Bit,
        DataType::TinyInt => CType::STinyInt,
        DataType::SmallInt => CType::SShort,
        DataType::Integer => CType::SLong,
        DataType::BigInt => CType::SBigInt,
        DataType::Real => CType::Float,
        DataType::Float { precision } if precision > 0 && precision <= 24 => CType::Float,
        DataType::Float { .. } | DataType::Double => CType::Double,
        DataType::Decimal { .. } | DataType::Numeric { .. } => CType::Char,
        DataType::Date => CType::Date,
        DataType::Time { precision } if precision > 0 => CType::Char,
        DataType::Time { .. } => CType::Time,
        DataType::Timestamp { .. } => CType::Timestamp,
        DataType::TimestampWithTimezone { .. } => CType::Char,
        DataType::Guid => CType::Guid,
        DataType::Unknown | DataType::Other { .. } => {
            return Err(ErrorKind::UnsupportedType.error(format!(
                "Values of {} cannot be converted",
                data_type
            )));
        }
    })
}

fn c_type_of(value: &Value, declared: &DataType) -> CType {
    match value {
        Value::Null => c_type_for(declared).unwrap_or(CType::Char),
        Value::Boolean(..) => CType::Bit,
        Value::Int8(..) => CType::STinyInt,
        Value::Int16(..) => CType::SShort,
        Value::Int32(..) => CType::SLong,
        Value::Int64(..) => CType::SBigInt,
        Value::Float32(..) => CType::Float,
        Value::Float64(..) => CType::Double,
        Value::Decimal(..) | Value::Varchar(..) | Value::TimestampWithTimezone(..) => CType::Char,
        Value::Blob(..) => CType::Binary,
        Value::Date(..) => CType::Date,
        Value::Time(Some(v)) if v.nanosecond() != 0 => CType::Char,
        Value::Time(..) => CType::Time,
        Value::Timestamp(..) => CType::Timestamp,
        Value::Uuid(..) if declared.family() == TypeFamily::Text => CType::Char,
        Value::Uuid(..) => CType::Guid,
    }
}

fn mismatch(message: String) -> Error {
    ErrorKind::TypeMismatch.error(message)
}

/// Converts `value` into the buffer bound to a parameter declared as `declared`.
pub fn to_native(value: &Value, declared: &DataType) -> Result<NativeBuffer> {
    check_compatible(value, declared)?;
    let c_type = c_type_of(value, declared);
    if value.is_null() {
        return Ok(NativeBuffer::null(c_type));
    }
    let data = match value {
        Value::Boolean(Some(v)) => vec![*v as u8],
        Value::Int8(Some(v)) => v.to_ne_bytes().to_vec(),
        Value::Int16(Some(v)) => v.to_ne_bytes().to_vec(),
        Value::Int32(Some(v)) => v.to_ne_bytes().to_vec(),
        Value::Int64(Some(v)) => v.to_ne_bytes().to_vec(),
        Value::Float32(Some(v)) => v.to_ne_bytes().to_vec(),
        Value::Float64(Some(v)) => v.to_ne_bytes().to_vec(),
        Value::Decimal(Some(v), ..) => v.to_string().into_bytes(),
        Value::Varchar(Some(v)) => v.as_bytes().to_vec(),
        Value::Blob(Some(v)) => v.to_vec(),
        Value::Date(Some(v)) => date_struct(v)?.to_bytes(),
        Value::Time(Some(v)) if c_type == CType::Char => v
            .format(format_description!(
                "[hour]:[minute]:[second].[subsecond digits:9]"
            ))
            .map_err(|e| mismatch(format!("Cannot format time {}: {}", v, e)))?
            .into_bytes(),
        Value::Time(Some(v)) => TimeStruct {
            hour: v.hour() as _,
            minute: v.minute() as _,
            second: v.second() as _,
        }
        .to_bytes(),
        Value::Timestamp(Some(v)) => timestamp_struct(v)?.to_bytes(),
        Value::TimestampWithTimezone(Some(v)) => v
            .format(&Rfc3339)
            .map_err(|e| mismatch(format!("Cannot format timestamp {}: {}", v, e)))?
            .into_bytes(),
        Value::Uuid(Some(v)) if c_type == CType::Char => v.hyphenated().to_string().into_bytes(),
        Value::Uuid(Some(v)) => {
            let (d1, d2, d3, d4) = v.as_fields();
            GuidStruct {
                d1,
                d2,
                d3,
                d4: *d4,
            }
            .to_bytes()
        }
        _ => return Ok(NativeBuffer::null(c_type)),
    };
    Ok(NativeBuffer::new(c_type, data))
}

fn date_struct(v: &Date) -> Result<DateStruct> {
    Ok(DateStruct {
        year: i16::try_from(v.year())
            .map_err(|_| mismatch(format!("Year of {} does not fit a native date", v)))?,
        month: u8::from(v.month()) as _,
        day: v.day() as _,
    })
}

fn timestamp_struct(v: &PrimitiveDateTime) -> Result<TimestampStruct> {
    let date = date_struct(&v.date())?;
    Ok(TimestampStruct {
        year: date.year,
        month: date.month,
        day: date.day,
        hour: v.hour() as _,
        minute: v.minute() as _,
        second: v.second() as _,
        fraction: v.nanosecond(),
    })
}

/// The NULL of the variant matching `data_type`.
pub fn null_of(data_type: &DataType) -> Value {
    match *data_type {
        DataType::Char { .. }
        | DataType::Varchar { .. }
        | DataType::LongVarchar { .. }
        | DataType::WChar { .. }
        | DataType::WVarchar { .. }
        | DataType::WLongVarchar { .. } => Value::Varchar(None),
        DataType::Binary { .. } | DataType::Varbinary { .. } | DataType::LongVarbinary { .. } => {
            Value::Blob(None)
        }
        DataType::Bit => Value::Boolean(None),
        DataType::TinyInt => Value::Int8(None),
        DataType::SmallInt => Value::Int16(None),
        DataType::Integer => Value::Int32(None),
        DataType::BigInt => Value::Int64(None),
        DataType::Real => Value::Float32(None),
        DataType::Float { precision } if precision > 0 && precision <= 24 => Value::Float32(None),
        DataType::Float { .. } | DataType::Double => Value::Float64(None),
        DataType::Decimal { precision, scale } | DataType::Numeric { precision, scale } => {
            Value::Decimal(None, precision, scale)
        }
        DataType::Date => Value::Date(None),
        DataType::Time { .. } => Value::Time(None),
        DataType::Timestamp { .. } => Value::Timestamp(None),
        DataType::TimestampWithTimezone { .. } => Value::TimestampWithTimezone(None),
        DataType::Guid => Value::Uuid(None),
        DataType::Unknown | DataType::Other { .. } => Value::Null,
    }
}

fn fixed<const N: usize>(buffer: &NativeBuffer, column: &ColumnDescription) -> Result<[u8; N]> {
    buffer.bytes().try_into().map_err(|_| {
        mismatch(format!(
            "Column `{}` returned {} bytes for {}, expected {}",
            column.name,
            buffer.bytes().len(),
            buffer.c_type,
            N
        ))
    })
}

fn text<'a>(buffer: &'a NativeBuffer, column: &ColumnDescription) -> Result<&'a str> {
    std::str::from_utf8(buffer.bytes()).map_err(|e| {
        mismatch(format!(
            "Column `{}` returned text that is not valid UTF-8: {}",
            column.name, e
        ))
    })
}

fn invalid(column: &ColumnDescription, what: &str, value: impl std::fmt::Display) -> Error {
    mismatch(format!(
        "Column `{}` returned an invalid {}: {}",
        column.name, what, value
    ))
}

/// Converts a buffer read from `column` into a value.
pub fn from_native(buffer: &NativeBuffer, column: &ColumnDescription) -> Result<Value> {
    let expected = c_type_for(&column.data_type)?;
    if buffer.is_null() {
        return Ok(null_of(&column.data_type));
    }
    if buffer.c_type != expected {
        return Err(mismatch(format!(
            "Column `{}` of type {} returned {}, expected {}",
            column.name, column.data_type, buffer.c_type, expected
        )));
    }
    Ok(match column.data_type {
        DataType::Char { .. }
        | DataType::Varchar { .. }
        | DataType::LongVarchar { .. }
        | DataType::WChar { .. }
        | DataType::WVarchar { .. }
        | DataType::WLongVarchar { .. } => Value::Varchar(Some(text(buffer, column)?.to_string())),
        DataType::Binary { .. } | DataType::Varbinary { .. } | DataType::LongVarbinary { .. } => {
            Value::Blob(Some(buffer.bytes().into()))
        }
        DataType::Bit => Value::Boolean(Some(u8::from_ne_bytes(fixed(buffer, column)?) != 0)),
        DataType::TinyInt => Value::Int8(Some(i8::from_ne_bytes(fixed(buffer, column)?))),
        DataType::SmallInt => Value::Int16(Some(i16::from_ne_bytes(fixed(buffer, column)?))),
        DataType::Integer => Value::Int32(Some(i32::from_ne_bytes(fixed(buffer, column)?))),
        DataType::BigInt => Value::Int64(Some(i64::from_ne_bytes(fixed(buffer, column)?))),
        DataType::Real | DataType::Float { .. } | DataType::Double => match expected {
            CType::Float => Value::Float32(Some(f32::from_ne_bytes(fixed(buffer, column)?))),
            _ => Value::Float64(Some(f64::from_ne_bytes(fixed(buffer, column)?))),
        },
        DataType::Decimal { precision, scale } | DataType::Numeric { precision, scale } => {
            let text = text(buffer, column)?.trim();
            let value = Decimal::from_str_exact(text)
                .or_else(|_| Decimal::from_scientific(text))
                .map_err(|e| invalid(column, "decimal", format!("`{}` {}", truncate_long!(text), e)))?;
            Value::Decimal(Some(value), precision, scale)
        }
        DataType::Date => {
            let v = DateStruct::from_bytes(buffer.bytes())
                .ok_or_else(|| invalid(column, "date", "short buffer"))?;
            Value::Date(Some(date(&v, column)?))
        }
        DataType::Time { .. } if expected == CType::Char => {
            let text = text(buffer, column)?.trim();
            let value = Time::parse(
                text,
                format_description!("[hour]:[minute]:[second][optional [.[subsecond]]]"),
            )
            .map_err(|e| invalid(column, "time", format!("`{}` {}", truncate_long!(text), e)))?;
            Value::Time(Some(value))
        }
        DataType::Time { .. } => {
            let v = TimeStruct::from_bytes(buffer.bytes())
                .ok_or_else(|| invalid(column, "time", "short buffer"))?;
            let value = Time::from_hms(v.hour as _, v.minute as _, v.second as _)
                .map_err(|e| invalid(column, "time", e))?;
            Value::Time(Some(value))
        }
        DataType::Timestamp { .. } => {
            let v = TimestampStruct::from_bytes(buffer.bytes())
                .ok_or_else(|| invalid(column, "timestamp", "short buffer"))?;
            let date = date(
                &DateStruct {
                    year: v.year,
                    month: v.month,
                    day: v.day,
                },
                column,
            )?;
            let time = Time::from_hms_nano(v.hour as _, v.minute as _, v.second as _, v.fraction)
                .map_err(|e| invalid(column, "timestamp", e))?;
            Value::Timestamp(Some(PrimitiveDateTime::new(date, time)))
        }
        DataType::TimestampWithTimezone { .. } => {
            let text = text(buffer, column)?;
            let value = parse_zoned(text).ok_or_else(|| {
                invalid(column, "timestamp with time zone", truncate_long!(text))
            })?;
            Value::TimestampWithTimezone(Some(value))
        }
        DataType::Guid => {
            let v = GuidStruct::from_bytes(buffer.bytes())
                .ok_or_else(|| invalid(column, "guid", "short buffer"))?;
            Value::Uuid(Some(Uuid::from_fields(v.d1, v.d2, v.d3, &v.d4)))
        }
        DataType::Unknown | DataType::Other { .. } => {
            return Err(ErrorKind::UnsupportedType.error(format!(
                "Values of {} cannot be converted",
                column.data_type
            )));
        }
    })
}

fn date(v: &DateStruct, column: &ColumnDescription) -> Result<Date> {
    let month = Month::try_from(v.month.min(u8::MAX as u16) as u8)
        .map_err(|e| invalid(column, "date", e))?;
    Date::from_calendar_date(v.year as i32, month, v.day.min(u8::MAX as u16) as u8)
        .map_err(|e| invalid(column, "date", e))
}

/// Parses RFC 3339 and the `YYYY-MM-DD hh:mm:ss[.f] +hh:mm` form used by most drivers.
pub fn parse_zoned(text: &str) -> Option<OffsetDateTime> {
    let text = text.trim();
    if let Ok(value) = OffsetDateTime::parse(text, &Rfc3339) {
        return Some(value);
    }
    OffsetDateTime::parse(
        text,
        format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]][optional [ ]][offset_hour sign:mandatory]:[offset_minute]"
        ),
    )
    .ok()
}
