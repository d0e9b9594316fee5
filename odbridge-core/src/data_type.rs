use crate::Value;
use std::fmt::{self, Display};

/// Native SQL type of a column or parameter, decoded from the ODBC type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// The native library could not describe it. Accepts any value.
    Unknown,
    Char { length: usize },
    Varchar { length: usize },
    LongVarchar { length: usize },
    WChar { length: usize },
    WVarchar { length: usize },
    WLongVarchar { length: usize },
    Binary { length: usize },
    Varbinary { length: usize },
    LongVarbinary { length: usize },
    Bit,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Float { precision: usize },
    Double,
    Decimal { precision: u8, scale: u8 },
    Numeric { precision: u8, scale: u8 },
    Date,
    Time { precision: u8 },
    Timestamp { precision: u8 },
    TimestampWithTimezone { precision: u8 },
    Guid,
    /// A type code the bridge does not know how to marshal.
    Other { code: i16, size: usize, digits: i16 },
}

/// Families of the compatibility matrix between values and declared types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeFamily {
    Any,
    Boolean,
    Integer,
    Float,
    Decimal,
    Text,
    Binary,
    Date,
    Time,
    Timestamp,
    TimestampWithTimezone,
    Guid,
    Unsupported,
}

impl Display for TypeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TypeFamily::Any => "any",
            TypeFamily::Boolean => "boolean",
            TypeFamily::Integer => "integer",
            TypeFamily::Float => "floating point",
            TypeFamily::Decimal => "fixed decimal",
            TypeFamily::Text => "text",
            TypeFamily::Binary => "binary",
            TypeFamily::Date => "date",
            TypeFamily::Time => "time",
            TypeFamily::Timestamp => "timestamp",
            TypeFamily::TimestampWithTimezone => "timestamp with time zone",
            TypeFamily::Guid => "guid",
            TypeFamily::Unsupported => "unsupported",
        })
    }
}

impl DataType {
    /// Decodes a native SQL type code, the form returned by `SQLDescribeCol`
    /// and `SQLDescribeParam`. Unknown codes become [`DataType::Other`].
    pub fn from_native(code: i16, size: usize, digits: i16) -> Self {
        let precision = size.min(u8::MAX as usize) as u8;
        let digits_u8 = digits.clamp(0, u8::MAX as i16) as u8;
        match code {
            0 => DataType::Unknown,
            1 => DataType::Char { length: size },
            12 => DataType::Varchar { length: size },
            -1 => DataType::LongVarchar { length: size },
            -8 => DataType::WChar { length: size },
            -9 => DataType::WVarchar { length: size },
            -10 => DataType::WLongVarchar { length: size },
            -2 => DataType::Binary { length: size },
            -3 => DataType::Varbinary { length: size },
            -4 => DataType::LongVarbinary { length: size },
            -7 => DataType::Bit,
            -6 => DataType::TinyInt,
            5 => DataType::SmallInt,
            4 => DataType::Integer,
            -5 => DataType::BigInt,
            7 => DataType::Real,
            6 => DataType::Float { precision: size },
            8 => DataType::Double,
            3 => DataType::Decimal {
                precision,
                scale: digits_u8,
            },
            2 => DataType::Numeric {
                precision,
                scale: digits_u8,
            },
            9 | 91 => DataType::Date,
            10 | 92 => DataType::Time {
                precision: digits_u8,
            },
            11 | 93 => DataType::Timestamp {
                precision: digits_u8,
            },
            95 | -155 => DataType::TimestampWithTimezone {
                precision: digits_u8,
            },
            -11 => DataType::Guid,
            code => DataType::Other { code, size, digits },
        }
    }

    /// Native type code, column size and decimal digits, the arguments of
    /// `SQLBindParameter`.
    pub fn to_native(&self) -> (i16, usize, i16) {
        match *self {
            DataType::Unknown => (0, 0, 0),
            DataType::Char { length } => (1, length, 0),
            DataType::Varchar { length } => (12, length, 0),
            DataType::LongVarchar { length } => (-1, length, 0),
            DataType::WChar { length } => (-8, length, 0),
            DataType::WVarchar { length } => (-9, length, 0),
            DataType::WLongVarchar { length } => (-10, length, 0),
            DataType::Binary { length } => (-2, length, 0),
            DataType::Varbinary { length } => (-3, length, 0),
            DataType::LongVarbinary { length } => (-4, length, 0),
            DataType::Bit => (-7, 1, 0),
            DataType::TinyInt => (-6, 3, 0),
            DataType::SmallInt => (5, 5, 0),
            DataType::Integer => (4, 10, 0),
            DataType::BigInt => (-5, 19, 0),
            DataType::Real => (7, 7, 0),
            DataType::Float { precision } => (6, precision, 0),
            DataType::Double => (8, 15, 0),
            DataType::Decimal { precision, scale } => (3, precision as usize, scale as i16),
            DataType::Numeric { precision, scale } => (2, precision as usize, scale as i16),
            DataType::Date => (91, 10, 0),
            DataType::Time { precision } => (
                92,
                8 + if precision > 0 { precision as usize + 1 } else { 0 },
                precision as i16,
            ),
            DataType::Timestamp { precision } => (
                93,
                19 + if precision > 0 { precision as usize + 1 } else { 0 },
                precision as i16,
            ),
            DataType::TimestampWithTimezone { precision } => (
                95,
                26 + if precision > 0 { precision as usize + 1 } else { 0 },
                precision as i16,
            ),
            DataType::Guid => (-11, 36, 0),
            DataType::Other { code, size, digits } => (code, size, digits),
        }
    }

    pub fn family(&self) -> TypeFamily {
        match self {
            DataType::Unknown => TypeFamily::Any,
            DataType::Char { .. }
            | DataType::Varchar { .. }
            | DataType::LongVarchar { .. }
            | DataType::WChar { .. }
            | DataType::WVarchar { .. }
            | DataType::WLongVarchar { .. } => TypeFamily::Text,
            DataType::Binary { .. }
            | DataType::Varbinary { .. }
            | DataType::LongVarbinary { .. } => TypeFamily::Binary,
            DataType::Bit => TypeFamily::Boolean,
            DataType::TinyInt | DataType::SmallInt | DataType::Integer | DataType::BigInt => {
                TypeFamily::Integer
            }
            DataType::Real | DataType::Float { .. } | DataType::Double => TypeFamily::Float,
            DataType::Decimal { .. } | DataType::Numeric { .. } => TypeFamily::Decimal,
            DataType::Date => TypeFamily::Date,
            DataType::Time { .. } => TypeFamily::Time,
            DataType::Timestamp { .. } => TypeFamily::Timestamp,
            DataType::TimestampWithTimezone { .. } => TypeFamily::TimestampWithTimezone,
            DataType::Guid => TypeFamily::Guid,
            DataType::Other { .. } => TypeFamily::Unsupported,
        }
    }

    /// Type to declare when binding `value` to a parameter the library could
    /// not describe.
    pub fn for_value(value: &Value) -> Self {
        match value {
            Value::Null => DataType::Varchar { length: 0 },
            Value::Boolean(..) => DataType::Bit,
            Value::Int8(..) => DataType::TinyInt,
            Value::Int16(..) => DataType::SmallInt,
            Value::Int32(..) => DataType::Integer,
            Value::Int64(..) => DataType::BigInt,
            Value::Float32(..) => DataType::Real,
            Value::Float64(..) => DataType::Double,
            Value::Decimal(v, precision, scale) => {
                let (precision, scale) = match v {
                    Some(v) if *precision == 0 => (
                        (v.mantissa().unsigned_abs().checked_ilog10().unwrap_or(0) + 1)
                            .max(v.scale()) as u8,
                        v.scale() as u8,
                    ),
                    _ => (*precision, *scale),
                };
                DataType::Decimal { precision, scale }
            }
            Value::Varchar(v) => DataType::Varchar {
                length: v.as_ref().map(|v| v.len()).unwrap_or(0).max(1),
            },
            Value::Blob(v) => DataType::Varbinary {
                length: v.as_ref().map(|v| v.len()).unwrap_or(0).max(1),
            },
            Value::Date(..) => DataType::Date,
            Value::Time(v) => DataType::Time {
                precision: if v.is_some_and(|v| v.nanosecond() != 0) {
                    9
                } else {
                    0
                },
            },
            Value::Timestamp(..) => DataType::Timestamp { precision: 9 },
            Value::TimestampWithTimezone(..) => DataType::TimestampWithTimezone { precision: 9 },
            Value::Uuid(..) => DataType::Guid,
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Unknown => f.write_str("UNKNOWN"),
            DataType::Char { length } => write!(f, "CHAR({length})"),
            DataType::Varchar { length } => write!(f, "VARCHAR({length})"),
            DataType::LongVarchar { .. } => f.write_str("LONGVARCHAR"),
            DataType::WChar { length } => write!(f, "WCHAR({length})"),
            DataType::WVarchar { length } => write!(f, "WVARCHAR({length})"),
            DataType::WLongVarchar { .. } => f.write_str("WLONGVARCHAR"),
            DataType::Binary { length } => write!(f, "BINARY({length})"),
            DataType::Varbinary { length } => write!(f, "VARBINARY({length})"),
            DataType::LongVarbinary { .. } => f.write_str("LONGVARBINARY"),
            DataType::Bit => f.write_str("BIT"),
            DataType::TinyInt => f.write_str("TINYINT"),
            DataType::SmallInt => f.write_str("SMALLINT"),
            DataType::Integer => f.write_str("INTEGER"),
            DataType::BigInt => f.write_str("BIGINT"),
            DataType::Real => f.write_str("REAL"),
            DataType::Float { precision } => write!(f, "FLOAT({precision})"),
            DataType::Double => f.write_str("DOUBLE"),
            DataType::Decimal { precision, scale } => write!(f, "DECIMAL({precision}, {scale})"),
            DataType::Numeric { precision, scale } => write!(f, "NUMERIC({precision}, {scale})"),
            DataType::Date => f.write_str("DATE"),
            DataType::Time { .. } => f.write_str("TIME"),
            DataType::Timestamp { .. } => f.write_str("TIMESTAMP"),
            DataType::TimestampWithTimezone { .. } => f.write_str("TIMESTAMP WITH TIME ZONE"),
            DataType::Guid => f.write_str("GUID"),
            DataType::Other { code, .. } => write!(f, "native type {code}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Nullability {
    NoNulls,
    Nullable,
    #[default]
    Unknown,
}

impl Nullability {
    /// Decodes `SQL_NO_NULLS` (0), `SQL_NULLABLE` (1) and anything else as unknown.
    pub fn from_native(code: i16) -> Self {
        match code {
            0 => Nullability::NoNulls,
            1 => Nullability::Nullable,
            _ => Nullability::Unknown,
        }
    }

    pub fn could_be_null(&self) -> bool {
        *self != Nullability::NoNulls
    }
}

/// Metadata of a result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescription {
    pub name: String,
    pub data_type: DataType,
    pub nullable: Nullability,
}

impl ColumnDescription {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: Nullability) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }

    /// Declared size, characters for text, bytes for binary, digits for numbers.
    pub fn column_size(&self) -> usize {
        self.data_type.to_native().1
    }

    pub fn decimal_digits(&self) -> i16 {
        self.data_type.to_native().2
    }
}

/// Declared type of a statement parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterDescription {
    pub data_type: DataType,
    pub nullable: Nullability,
}

impl ParameterDescription {
    pub const UNKNOWN: ParameterDescription = ParameterDescription {
        data_type: DataType::Unknown,
        nullable: Nullability::Unknown,
    };
}
