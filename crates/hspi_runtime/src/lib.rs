pub mod cdc;
pub mod engine;
pub mod fifo;
