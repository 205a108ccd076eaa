//! Stream reading and transport retries

pub mod retry;
pub mod stream;

pub use retry::*;
pub use stream::*;
