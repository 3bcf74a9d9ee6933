//! Data models for the upload engine
//!
//! Files own their chunk upload records; statuses are derived in `status`.

mod file;
mod status;
mod upload;

pub use file::*;
pub use status::*;
pub use upload::*;
