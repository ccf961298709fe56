//! Shared error taxonomy, subprocess plumbing, and small utilities used across
//! all mdpress crates.

pub mod error;
pub mod process;
pub mod time;

pub use error::{Error, ErrorKind, Result};
