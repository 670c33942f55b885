pub mod config;
pub mod sim;
pub mod traits;
