pub mod error;
pub mod value;

pub use error::{ErrorKind, Result, ShardingError};
pub use value::Value;
