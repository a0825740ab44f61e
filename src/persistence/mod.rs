pub mod cache;
pub mod record;
pub mod serialize;
pub mod store;
