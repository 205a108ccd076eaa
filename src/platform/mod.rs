//! Host front end: transport, page parsing, stream descriptors and cipher extraction

pub mod cipher;
pub mod client;
pub mod extractor;
pub mod formats;
pub mod metadata;
pub mod playlist;
pub mod script;
pub mod streams;

#[cfg(test)]
pub(crate) mod fixture;

pub use crate::utils::cache::CipherCache;
pub use cipher::*;
pub use client::*;
pub use extractor::{CipherExtractor, CipherHelperMatcher, ReverseMatcher, SpliceMatcher, SwapMatcher};
pub use formats::*;
