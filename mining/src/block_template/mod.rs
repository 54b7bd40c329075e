pub mod builder;
pub mod coinbase;
