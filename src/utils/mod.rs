//! Utility modules and shared functionality

pub mod errors;
pub mod fs;
pub mod http;
pub mod path;
