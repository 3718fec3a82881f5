pub mod cache;
pub mod controller;
pub mod selection;
