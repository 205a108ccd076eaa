//! Command line interface

pub mod args;
pub mod output;

pub use args::{Args, Command, VerbosityLevel};
pub use output::OutputFormatter;

use crate::error::ResolveError;

/// Process exit code for a failed command
pub fn exit_code(error: &ResolveError) -> i32 {
    match error {
        ResolveError::Cancelled => 130,
        ResolveError::InvalidVideoId(_) | ResolveError::InvalidPlaylistId(_) => 64,
        e if e.is_not_found() => 2,
        e if e.is_restriction() => 3,
        e if e.is_extraction_failure() => 4,
        ResolveError::NoStreamsAvailable { .. } => 4,
        _ => 1,
    }
}
