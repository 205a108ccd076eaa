//! Utility functions for vidresolve

pub mod cache;
pub mod cancel;
pub mod mime;
pub mod url;

pub use cache::*;
pub use cancel::*;
pub use mime::*;
pub use url::*;
