pub mod share;
pub mod store;
pub mod template;
