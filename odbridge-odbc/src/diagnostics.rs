use crate::wide;
use odbc_sys as sys;
use odbridge_core::{DiagnosticRecord, SqlReturn};

/// Reads every diagnostic record attached to `handle`.
pub(crate) fn read(handle_type: sys::HandleType, handle: sys::Handle) -> Vec<DiagnosticRecord> {
    let mut records = Vec::new();
    let mut message = vec![0u16; 512];
    let mut number: sys::SmallInt = 1;
    while number < sys::SmallInt::MAX {
        let mut state = [0u16; 6];
        let mut native_error: sys::Integer = 0;
        let mut length: sys::SmallInt = 0;
        let rc = unsafe {
            sys::SQLGetDiagRecW(
                handle_type,
                handle,
                number,
                state.as_mut_ptr(),
                &mut native_error,
                message.as_mut_ptr(),
                message.len().min(sys::SmallInt::MAX as usize) as sys::SmallInt,
                &mut length,
            )
        };
        // Characters, without the terminator
        let length = length.max(0) as usize;
        match SqlReturn::from_code(rc.0) {
            SqlReturn::SuccessWithInfo
                if length >= message.len() && message.len() < sys::SmallInt::MAX as usize =>
            {
                message.resize(length + 1, 0);
                continue;
            }
            SqlReturn::Success | SqlReturn::SuccessWithInfo => {}
            _ => break,
        }
        records.push(DiagnosticRecord::new(
            wide::decode_reported(wide::until_terminator(&state[..5]), "SQLSTATE"),
            native_error,
            wide::decode_reported(&message[..length.min(message.len())], "diagnostic message"),
        ));
        number += 1;
    }
    records
}
