pub mod decrypt;
pub mod distinct;
pub mod result;
pub mod row;

pub use decrypt::{decrypt_result, decrypt_result_with};
pub use distinct::DistinctMerger;
pub use result::QueryResult;
pub use row::QueryRow;
