pub mod client;
pub mod money;
pub mod types;
