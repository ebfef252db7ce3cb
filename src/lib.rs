pub mod error;
pub mod fetch;
pub mod links;
pub mod listing;
pub mod parse;
pub mod runtime;
pub mod store;
pub mod types;
pub mod validate;

pub use error::{HarvestError, ParseError};
pub use types::{DraftRecord, EventMode, EventRecord};
