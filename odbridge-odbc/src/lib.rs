//! The system ODBC driver manager as a native library of Odbridge.
//!
//! The driver manager (`libodbc`, `libiodbc` or `odbc32.dll`) is linked when
//! this crate is built, through `odbc-sys`, and the driver is then loaded by
//! the driver manager at connection time. A missing driver manager is a link
//! failure, not a runtime error. Every entry point is bound at link time, so
//! [`OdbcNative`] reports all of them as supported and
//! [`Library::new`](odbridge_core::Library::new) validation always succeeds.
//! A driver manager that refuses to allocate the environment surfaces as a
//! [`NativeLibraryLoad`](odbridge_core::ErrorKind::NativeLibraryLoad) error
//! from [`OdbcNative::new`].
//!
//! Text is exchanged through the wide (`W`) entry points and `SQL_C_WCHAR`
//! buffers. Data that is not valid UTF-16 fails the read with SQLSTATE
//! `22018`, a type mismatch.

mod cbox;
mod diagnostics;
mod environment;
mod native;
mod wide;

pub(crate) use cbox::*;
pub use environment::shutdown;
pub use native::*;
