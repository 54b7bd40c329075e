pub mod job;
pub mod template;
