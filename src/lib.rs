pub mod error;
pub mod selftest;
