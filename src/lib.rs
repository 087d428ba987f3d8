pub mod commands;
pub mod config;
pub mod error;

pub use error::{Result, SyncError};
