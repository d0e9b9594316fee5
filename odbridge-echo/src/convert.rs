use crate::{EchoResult, diag};
use odbridge_core::{
    CType, DateStruct, DiagnosticRecord, GuidStruct, NativeBuffer, TimeStruct, TimestampStruct,
};
use std::fmt::Write;
use time::{Date, PrimitiveDateTime, Time, macros::format_description};
use uuid::Uuid;

fn is_integer(c_type: CType) -> bool {
    matches!(
        c_type,
        CType::Bit | CType::STinyInt | CType::SShort | CType::SLong | CType::SBigInt
    )
}

fn restricted(source: CType, target: CType) -> DiagnosticRecord {
    diag(
        "07006",
        format!(
            "Restricted data type attribute violation, cannot convert {} to {}",
            source, target
        ),
    )
}

fn fixed<const N: usize>(buffer: &NativeBuffer) -> EchoResult<[u8; N]> {
    buffer.bytes().try_into().map_err(|_| {
        diag(
            "HY090",
            format!(
                "Invalid string or buffer length {} for {}",
                buffer.bytes().len(),
                buffer.c_type
            ),
        )
    })
}

fn integer(buffer: &NativeBuffer) -> EchoResult<i64> {
    Ok(match buffer.c_type {
        CType::Bit => u8::from_ne_bytes(fixed(buffer)?) as i64,
        CType::STinyInt => i8::from_ne_bytes(fixed(buffer)?) as i64,
        CType::SShort => i16::from_ne_bytes(fixed(buffer)?) as i64,
        CType::SLong => i32::from_ne_bytes(fixed(buffer)?) as i64,
        CType::SBigInt => i64::from_ne_bytes(fixed(buffer)?),
        other => return Err(restricted(other, CType::SBigInt)),
    })
}

fn float(buffer: &NativeBuffer) -> EchoResult<f64> {
    Ok(match buffer.c_type {
        CType::Float => f32::from_ne_bytes(fixed(buffer)?) as f64,
        CType::Double => f64::from_ne_bytes(fixed(buffer)?),
        other => return Err(restricted(other, CType::Double)),
    })
}

fn from_integer(value: i64, source: CType, target: CType) -> EchoResult<NativeBuffer> {
    let out_of_range =
        || diag("22003", format!("Numeric value {} out of range for {}", value, target));
    let data = match target {
        CType::Bit => match value {
            0 | 1 => vec![value as u8],
            _ => return Err(out_of_range()),
        },
        CType::STinyInt => i8::try_from(value)
            .map_err(|_| out_of_range())?
            .to_ne_bytes()
            .to_vec(),
        CType::SShort => i16::try_from(value)
            .map_err(|_| out_of_range())?
            .to_ne_bytes()
            .to_vec(),
        CType::SLong => i32::try_from(value)
            .map_err(|_| out_of_range())?
            .to_ne_bytes()
            .to_vec(),
        CType::SBigInt => value.to_ne_bytes().to_vec(),
        CType::Float => (value as f32).to_ne_bytes().to_vec(),
        CType::Double => (value as f64).to_ne_bytes().to_vec(),
        CType::Char => value.to_string().into_bytes(),
        other => return Err(restricted(source, other)),
    };
    Ok(NativeBuffer::new(target, data))
}

fn from_text(text: &str, target: CType) -> EchoResult<NativeBuffer> {
    let invalid = || {
        diag(
            "22018",
            format!(
                "Invalid character value for cast specification, `{}` to {}",
                text, target
            ),
        )
    };
    let trimmed = text.trim();
    let data = match target {
        CType::Char => text.as_bytes().to_vec(),
        CType::Bit => {
            let value = match trimmed.to_ascii_lowercase().as_str() {
                "1" | "true" => 1,
                "0" | "false" => 0,
                _ => return Err(invalid()),
            };
            return from_integer(value, CType::Char, target);
        }
        CType::STinyInt | CType::SShort | CType::SLong | CType::SBigInt => {
            let value = trimmed.parse::<i64>().map_err(|_| invalid())?;
            return from_integer(value, CType::Char, target);
        }
        CType::Float => trimmed
            .parse::<f32>()
            .map_err(|_| invalid())?
            .to_ne_bytes()
            .to_vec(),
        CType::Double => trimmed
            .parse::<f64>()
            .map_err(|_| invalid())?
            .to_ne_bytes()
            .to_vec(),
        CType::Date => {
            let v = Date::parse(trimmed, format_description!("[year]-[month]-[day]"))
                .map_err(|_| invalid())?;
            DateStruct {
                year: v.year() as _,
                month: u8::from(v.month()) as _,
                day: v.day() as _,
            }
            .to_bytes()
        }
        CType::Time => {
            let v = Time::parse(
                trimmed,
                format_description!("[hour]:[minute]:[second][optional [.[subsecond]]]"),
            )
            .map_err(|_| invalid())?;
            TimeStruct {
                hour: v.hour() as _,
                minute: v.minute() as _,
                second: v.second() as _,
            }
            .to_bytes()
        }
        CType::Timestamp => {
            let v = PrimitiveDateTime::parse(
                trimmed,
                format_description!(
                    "[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"
                ),
            )
            .map_err(|_| invalid())?;
            TimestampStruct {
                year: v.year() as _,
                month: u8::from(v.month()) as _,
                day: v.day() as _,
                hour: v.hour() as _,
                minute: v.minute() as _,
                second: v.second() as _,
                fraction: v.nanosecond(),
            }
            .to_bytes()
        }
        CType::Guid => {
            let v = Uuid::parse_str(trimmed).map_err(|_| invalid())?;
            let (d1, d2, d3, d4) = v.as_fields();
            GuidStruct {
                d1,
                d2,
                d3,
                d4: *d4,
            }
            .to_bytes()
        }
        CType::Binary => return Err(restricted(CType::Char, target)),
    };
    Ok(NativeBuffer::new(target, data))
}

fn to_text(buffer: &NativeBuffer) -> EchoResult<String> {
    let short = || diag("HY090", format!("Invalid buffer for {}", buffer.c_type));
    Ok(match buffer.c_type {
        CType::Float | CType::Double => float(buffer)?.to_string(),
        CType::Date => {
            let v = DateStruct::from_bytes(buffer.bytes()).ok_or_else(short)?;
            format!("{:04}-{:02}-{:02}", v.year, v.month, v.day)
        }
        CType::Time => {
            let v = TimeStruct::from_bytes(buffer.bytes()).ok_or_else(short)?;
            format!("{:02}:{:02}:{:02}", v.hour, v.minute, v.second)
        }
        CType::Timestamp => {
            let v = TimestampStruct::from_bytes(buffer.bytes()).ok_or_else(short)?;
            let mut out = format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                v.year, v.month, v.day, v.hour, v.minute, v.second
            );
            if v.fraction > 0 {
                let _ = write!(out, ".{:09}", v.fraction);
            }
            out
        }
        CType::Guid => {
            let v = GuidStruct::from_bytes(buffer.bytes()).ok_or_else(short)?;
            Uuid::from_fields(v.d1, v.d2, v.d3, &v.d4)
                .hyphenated()
                .to_string()
        }
        CType::Binary => buffer.bytes().iter().fold(String::new(), |mut out, v| {
            let _ = write!(out, "{:02X}", v);
            out
        }),
        other => return Err(restricted(other, CType::Char)),
    })
}

/// Converts `buffer` to the C type `target`, the way a driver does when a
/// value is bound or read with a type other than its own.
pub(crate) fn convert(buffer: &NativeBuffer, target: CType) -> EchoResult<NativeBuffer> {
    let source = buffer.c_type;
    if buffer.is_null() {
        return Ok(NativeBuffer::null(target));
    }
    if source == target {
        return Ok(buffer.clone());
    }
    match source {
        _ if is_integer(source) => from_integer(integer(buffer)?, source, target),
        CType::Float | CType::Double => {
            let value = float(buffer)?;
            match target {
                CType::Float => Ok(NativeBuffer::new(
                    target,
                    (value as f32).to_ne_bytes().to_vec(),
                )),
                CType::Double => Ok(NativeBuffer::new(target, value.to_ne_bytes().to_vec())),
                CType::Char => Ok(NativeBuffer::new(target, value.to_string().into_bytes())),
                _ => Err(restricted(source, target)),
            }
        }
        CType::Char => {
            let text = std::str::from_utf8(buffer.bytes())
                .map_err(|_| diag("22018", "Character data is not valid UTF-8"))?;
            from_text(text, target)
        }
        CType::Date if target == CType::Timestamp => {
            let v = DateStruct::from_bytes(buffer.bytes())
                .ok_or_else(|| restricted(source, target))?;
            Ok(NativeBuffer::new(
                target,
                TimestampStruct {
                    year: v.year,
                    month: v.month,
                    day: v.day,
                    ..Default::default()
                }
                .to_bytes(),
            ))
        }
        CType::Timestamp if target == CType::Date => {
            let v = TimestampStruct::from_bytes(buffer.bytes())
                .ok_or_else(|| restricted(source, target))?;
            Ok(NativeBuffer::new(
                target,
                DateStruct {
                    year: v.year,
                    month: v.month,
                    day: v.day,
                }
                .to_bytes(),
            ))
        }
        _ if target == CType::Char => Ok(NativeBuffer::new(target, to_text(buffer)?.into_bytes())),
        _ => Err(restricted(source, target)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> NativeBuffer {
        NativeBuffer::new(CType::Char, value.as_bytes().to_vec())
    }

    #[test]
    fn integers_are_range_checked() {
        let big = NativeBuffer::new(CType::SBigInt, 300i64.to_ne_bytes().to_vec());
        let error = convert(&big, CType::STinyInt).expect_err("300 does not fit a tinyint");
        assert_eq!(error.state, "22003");
        let small = convert(&big, CType::SShort).expect("300 fits a smallint");
        assert_eq!(small.bytes(), 300i16.to_ne_bytes());
        let flag = NativeBuffer::new(CType::SLong, 2i32.to_ne_bytes().to_vec());
        assert_eq!(convert(&flag, CType::Bit).unwrap_err().state, "22003");
    }

    #[test]
    fn text_to_numbers() {
        let value = convert(&text(" 42 "), CType::SLong).unwrap();
        assert_eq!(value.bytes(), 42i32.to_ne_bytes());
        assert_eq!(convert(&text("4x2"), CType::SLong).unwrap_err().state, "22018");
        assert_eq!(convert(&text("true"), CType::Bit).unwrap().bytes(), [1]);
    }

    #[test]
    fn text_is_never_binary() {
        let error = convert(&text("abc"), CType::Binary).unwrap_err();
        assert_eq!(error.state, "07006");
        assert!(error.message.starts_with("[odbridge][Echo]"));
        assert_eq!(error.subsystem, "Echo");
    }

    #[test]
    fn timestamps_through_text() {
        let buffer = convert(&text("2024-02-29 13:14:15.000000250"), CType::Timestamp).unwrap();
        let value = TimestampStruct::from_bytes(buffer.bytes()).unwrap();
        assert_eq!(value.day, 29);
        assert_eq!(value.fraction, 250);
        let back = convert(&buffer, CType::Char).unwrap();
        assert_eq!(back.bytes(), b"2024-02-29 13:14:15.000000250");
        let date = convert(&buffer, CType::Date).unwrap();
        assert_eq!(
            DateStruct::from_bytes(date.bytes()).unwrap(),
            DateStruct {
                year: 2024,
                month: 2,
                day: 29
            }
        );
    }

    #[test]
    fn null_keeps_the_indicator() {
        let value = convert(&NativeBuffer::null(CType::Char), CType::SBigInt).unwrap();
        assert!(value.is_null());
        assert_eq!(value.c_type, CType::SBigInt);
    }

    #[test]
    fn guid_as_text() {
        let uuid = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        let guid = convert(&text(uuid), CType::Guid).unwrap();
        assert_eq!(guid.bytes().len(), 16);
        assert_eq!(convert(&guid, CType::Char).unwrap().bytes(), uuid.as_bytes());
    }
}
