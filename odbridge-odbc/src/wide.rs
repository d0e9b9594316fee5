//! UTF-16 text of the wide entry points and of `SQL_C_WCHAR` buffers.
//!
//! The bridge speaks UTF-8, the driver manager is always called through the
//! `W` functions so the driver never picks a narrow encoding on its own.

use std::{
    fmt::{self, Display},
    string::FromUtf16Error,
};

/// `SQL_C_WCHAR` terminator, in bytes.
pub(crate) const TERMINATOR: usize = 2;

pub(crate) fn encode(text: &str) -> Vec<u16> {
    text.encode_utf16().collect()
}

/// Decodes data, unpaired surrogates are an error.
pub(crate) fn decode(units: &[u16]) -> Result<String, FromUtf16Error> {
    String::from_utf16(units)
}

/// Decodes text describing the data source: messages, names, catalogs.
/// Unpaired surrogates are replaced and logged.
pub(crate) fn decode_reported(units: &[u16], what: &str) -> String {
    String::from_utf16(units).unwrap_or_else(|e| {
        log::warn!("The driver reported a {} that is not valid UTF-16: {}", what, e);
        String::from_utf16_lossy(units)
    })
}

/// The units before the first terminator, all of them when there is none.
pub(crate) fn until_terminator(units: &[u16]) -> &[u16] {
    let end = units.iter().position(|v| *v == 0).unwrap_or(units.len());
    &units[..end]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WideError {
    /// Bytes bound as text are not UTF-8.
    Utf8(std::str::Utf8Error),
    /// Bytes read as `SQL_C_WCHAR` are not UTF-16.
    Utf16,
    /// Odd number of bytes read as `SQL_C_WCHAR`.
    OddLength(usize),
}

impl Display for WideError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WideError::Utf8(e) => write!(f, "text is not valid UTF-8: {}", e),
            WideError::Utf16 => f.write_str("text is not valid UTF-16"),
            WideError::OddLength(v) => write!(f, "wide text of {} bytes has a dangling byte", v),
        }
    }
}

/// UTF-8 bytes to the native endian bytes of a `SQL_C_WCHAR` buffer.
pub(crate) fn to_wide_bytes(utf8: &[u8]) -> Result<Vec<u8>, WideError> {
    let text = std::str::from_utf8(utf8).map_err(WideError::Utf8)?;
    Ok(text.encode_utf16().flat_map(u16::to_ne_bytes).collect())
}

/// Native endian bytes of a `SQL_C_WCHAR` buffer to UTF-8 bytes.
pub(crate) fn from_wide_bytes(bytes: &[u8]) -> Result<Vec<u8>, WideError> {
    if bytes.len() % 2 != 0 {
        return Err(WideError::OddLength(bytes.len()));
    }
    let units = bytes
        .chunks_exact(2)
        .map(|v| u16::from_ne_bytes([v[0], v[1]]))
        .collect::<Vec<_>>();
    decode(&units)
        .map(String::into_bytes)
        .map_err(|_| WideError::Utf16)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wide(units: &[u16]) -> Vec<u8> {
        units.iter().flat_map(|v| v.to_ne_bytes()).collect()
    }

    #[test]
    fn text_round_trip() {
        for text in ["", "plain", "¿Qué tal?", "日本語", "emoji 🦀 pair"] {
            let bytes = to_wide_bytes(text.as_bytes()).expect("Valid UTF-8");
            assert_eq!(bytes.len(), text.encode_utf16().count() * 2);
            assert_eq!(from_wide_bytes(&bytes).expect("Valid UTF-16"), text.as_bytes());
        }
    }

    #[test]
    fn invalid_text_is_refused() {
        assert!(matches!(
            to_wide_bytes(&[b'a', 0xFF]),
            Err(WideError::Utf8(..))
        ));
        // Lone high surrogate
        assert_eq!(
            from_wide_bytes(&wide(&[0x61, 0xD83E])),
            Err(WideError::Utf16)
        );
        assert_eq!(from_wide_bytes(&[0x61, 0, 0x62]), Err(WideError::OddLength(3)));
    }

    #[test]
    fn reported_text_is_replaced() {
        assert_eq!(decode_reported(&encode("Driver"), "name"), "Driver");
        assert_eq!(decode_reported(&[0x61, 0xDC00], "message"), "a\u{FFFD}");
    }

    #[test]
    fn terminator() {
        assert_eq!(until_terminator(&[0x48, 0x49, 0, 0x4A]), [0x48, 0x49]);
        assert_eq!(until_terminator(&[0x48]), [0x48]);
        assert!(until_terminator(&[0, 0x48]).is_empty());
    }
}
