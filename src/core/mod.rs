//! Resolution pipeline and its data model

pub mod caption;
pub mod resolver;
pub mod video_info;

pub use caption::*;
pub use resolver::*;
pub use video_info::*;
