pub mod http;
pub mod traits;
