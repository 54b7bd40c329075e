extern crate self as pool_core;

pub mod log;
pub mod panic;
