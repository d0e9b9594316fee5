mod convert;
mod native;
mod sql;
mod state;
mod store;
mod utility;

pub(crate) use convert::*;
pub use native::*;
pub(crate) use utility::*;
