pub mod encoding;
pub mod header;
pub mod target;

pub use header::{BlockHeader, HEADER_SIZE};
pub use target::{MAX_TARGET, Target};
