use std::fmt::{self, Display};

/// C data types used to exchange values, the `SQL_C_*` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CType {
    Bit,
    STinyInt,
    SShort,
    SLong,
    SBigInt,
    Float,
    Double,
    /// Narrow characters, UTF-8.
    Char,
    Binary,
    Date,
    Time,
    Timestamp,
    Guid,
}

impl CType {
    /// Size of the fixed width types, `None` for variable length ones.
    pub const fn fixed_size(self) -> Option<usize> {
        Some(match self {
            CType::Bit | CType::STinyInt => 1,
            CType::SShort => 2,
            CType::SLong | CType::Float => 4,
            CType::SBigInt | CType::Double => 8,
            CType::Date | CType::Time => 6,
            CType::Timestamp | CType::Guid => 16,
            CType::Char | CType::Binary => return None,
        })
    }

    /// The `SQL_C_*` code.
    pub const fn code(self) -> i16 {
        match self {
            CType::Bit => -7,
            CType::STinyInt => -26,
            CType::SShort => -15,
            CType::SLong => -16,
            CType::SBigInt => -25,
            CType::Float => 7,
            CType::Double => 8,
            CType::Char => 1,
            CType::Binary => -2,
            CType::Date => 91,
            CType::Time => 92,
            CType::Timestamp => 93,
            CType::Guid => -11,
        }
    }
}

impl Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CType::Bit => "SQL_C_BIT",
            CType::STinyInt => "SQL_C_STINYINT",
            CType::SShort => "SQL_C_SSHORT",
            CType::SLong => "SQL_C_SLONG",
            CType::SBigInt => "SQL_C_SBIGINT",
            CType::Float => "SQL_C_FLOAT",
            CType::Double => "SQL_C_DOUBLE",
            CType::Char => "SQL_C_CHAR",
            CType::Binary => "SQL_C_BINARY",
            CType::Date => "SQL_C_TYPE_DATE",
            CType::Time => "SQL_C_TYPE_TIME",
            CType::Timestamp => "SQL_C_TYPE_TIMESTAMP",
            CType::Guid => "SQL_C_GUID",
        })
    }
}

/// A value in the memory layout the native library reads and writes.
///
/// `indicator` is either [`NativeBuffer::NULL_DATA`] or the length in bytes of
/// `data`, text is never null terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeBuffer {
    pub c_type: CType,
    pub data: Vec<u8>,
    pub indicator: isize,
}

impl NativeBuffer {
    pub const NULL_DATA: isize = -1;

    pub fn new(c_type: CType, data: Vec<u8>) -> Self {
        let indicator = data.len() as isize;
        Self {
            c_type,
            data,
            indicator,
        }
    }

    pub fn null(c_type: CType) -> Self {
        Self {
            c_type,
            data: Vec::new(),
            indicator: Self::NULL_DATA,
        }
    }

    pub fn is_null(&self) -> bool {
        self.indicator == Self::NULL_DATA
    }

    /// The meaningful bytes, empty when null.
    pub fn bytes(&self) -> &[u8] {
        if self.is_null() {
            return &[];
        }
        let len = (self.indicator.max(0) as usize).min(self.data.len());
        &self.data[..len]
    }
}

/// `SQL_DATE_STRUCT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateStruct {
    pub year: i16,
    pub month: u16,
    pub day: u16,
}

/// `SQL_TIME_STRUCT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeStruct {
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
}

/// `SQL_TIMESTAMP_STRUCT`, `fraction` is in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimestampStruct {
    pub year: i16,
    pub month: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
    pub fraction: u32,
}

/// `SQLGUID`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GuidStruct {
    pub d1: u32,
    pub d2: u16,
    pub d3: u16,
    pub d4: [u8; 8],
}

fn take<const N: usize>(bytes: &[u8], offset: usize) -> Option<[u8; N]> {
    bytes.get(offset..offset + N)?.try_into().ok()
}

impl DateStruct {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(6);
        out.extend_from_slice(&self.year.to_ne_bytes());
        out.extend_from_slice(&self.month.to_ne_bytes());
        out.extend_from_slice(&self.day.to_ne_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Some(Self {
            year: i16::from_ne_bytes(take(bytes, 0)?),
            month: u16::from_ne_bytes(take(bytes, 2)?),
            day: u16::from_ne_bytes(take(bytes, 4)?),
        })
    }
}

impl TimeStruct {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(6);
        out.extend_from_slice(&self.hour.to_ne_bytes());
        out.extend_from_slice(&self.minute.to_ne_bytes());
        out.extend_from_slice(&self.second.to_ne_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Some(Self {
            hour: u16::from_ne_bytes(take(bytes, 0)?),
            minute: u16::from_ne_bytes(take(bytes, 2)?),
            second: u16::from_ne_bytes(take(bytes, 4)?),
        })
    }
}

impl TimestampStruct {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16);
        out.extend_from_slice(&self.year.to_ne_bytes());
        out.extend_from_slice(&self.month.to_ne_bytes());
        out.extend_from_slice(&self.day.to_ne_bytes());
        out.extend_from_slice(&self.hour.to_ne_bytes());
        out.extend_from_slice(&self.minute.to_ne_bytes());
        out.extend_from_slice(&self.second.to_ne_bytes());
        out.extend_from_slice(&self.fraction.to_ne_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Some(Self {
            year: i16::from_ne_bytes(take(bytes, 0)?),
            month: u16::from_ne_bytes(take(bytes, 2)?),
            day: u16::from_ne_bytes(take(bytes, 4)?),
            hour: u16::from_ne_bytes(take(bytes, 6)?),
            minute: u16::from_ne_bytes(take(bytes, 8)?),
            second: u16::from_ne_bytes(take(bytes, 10)?),
            fraction: u32::from_ne_bytes(take(bytes, 12)?),
        })
    }
}

impl GuidStruct {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16);
        out.extend_from_slice(&self.d1.to_ne_bytes());
        out.extend_from_slice(&self.d2.to_ne_bytes());
        out.extend_from_slice(&self.d3.to_ne_bytes());
        out.extend_from_slice(&self.d4);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Some(Self {
            d1: u32::from_ne_bytes(take(bytes, 0)?),
            d2: u16::from_ne_bytes(take(bytes, 4)?),
            d3: u16::from_ne_bytes(take(bytes, 6)?),
            d4: take(bytes, 8)?,
        })
    }
}
