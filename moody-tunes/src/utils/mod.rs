//! Utility modules for moody-tunes

pub mod db_retry;
pub mod sanitize;

pub use db_retry::retry_on_lock;
