pub mod engine;

pub use engine::{RewriteEngine, RewriteRule};
