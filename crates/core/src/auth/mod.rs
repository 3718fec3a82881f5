pub mod api;
pub mod claims;
pub mod credential;
pub mod store;
