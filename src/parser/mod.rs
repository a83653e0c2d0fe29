//! Query parsing: text to term match tree

pub mod query;

pub use query::{QueryParser, StreamConfiguration};
