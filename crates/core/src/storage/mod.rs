pub mod encryption;
pub mod format;
pub mod vault;
