//! Odbridge: a native ODBC bridge.
//!
//! A [`Library`] wraps a native implementation of the ODBC entry points and
//! hands out [`Connection`]s, [`Statement`]s and [`Cursor`]s whose native
//! handles are released exactly once, either explicitly or on drop. Values
//! cross the boundary as [`Value`]. Failures come back as [`Error`], an
//! [`anyhow::Error`] carrying the operation context around a [`BridgeError`]
//! with the native status and every diagnostic record.
//!
//! ```rust
//! use odbridge::{Config, Library, Value};
//! use odbridge_echo::EchoNative;
//!
//! let library = Library::new(EchoNative::new(), Config::default())?;
//! let connection = library.connect("DRIVER={Echo};DATABASE=fruits", None, None)?;
//! connection.execute_direct("CREATE TABLE fruit (name VARCHAR(20), weight INTEGER)")?;
//! let insert = connection.prepare("INSERT INTO fruit (name, weight) VALUES (?, ?)")?;
//! insert.bind(1, "apple")?;
//! insert.bind(2, 150)?;
//! insert.execute()?;
//! let mut cursor = connection
//!     .execute_direct("SELECT name, weight FROM fruit")?
//!     .into_cursor()
//!     .expect("A select returns rows");
//! let row = cursor.fetch_next()?.expect("One row was inserted");
//! assert_eq!(row.values[1], Value::Int32(Some(150)));
//! # Ok::<(), odbridge::Error>(())
//! ```
//!
//! The system driver manager is available behind the `odbc` feature as
//! [`odbc::OdbcNative`](https://docs.rs/odbridge-odbc).

pub use odbridge_core::*;
#[cfg(feature = "odbc")]
pub use odbridge_odbc as odbc;
