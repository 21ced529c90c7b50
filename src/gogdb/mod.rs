pub mod api;
pub mod requester;
pub mod session;

pub use api::{GogdbApi, is_empty_result};
