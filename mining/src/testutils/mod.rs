pub mod fixtures;
pub mod grind;
pub mod hanging_store;
pub mod template_client_mock;
