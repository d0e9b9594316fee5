mod as_value;
mod buffer;
mod config;
mod connection;
mod cursor;
mod data_type;
mod diagnostics;
mod error;
mod handle;
mod library;
pub mod marshal;
mod native;
mod query;
mod statement;
mod transaction;
mod util;
mod value;

pub use as_value::*;
pub use buffer::*;
pub use config::*;
pub use connection::*;
pub use cursor::*;
pub use data_type::*;
pub use diagnostics::*;
pub use error::*;
pub use library::*;
pub use native::*;
pub use query::*;
pub use statement::*;
pub use transaction::*;
pub use util::*;
pub use value::*;

pub use ::anyhow;
pub use ::indoc;
pub use ::rust_decimal;
pub use ::time;
pub use ::uuid;
