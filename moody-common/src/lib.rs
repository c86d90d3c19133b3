//! # MoodyTunes Common Library
//!
//! Shared code for the MoodyTunes service including:
//! - Error taxonomy
//! - Bootstrap configuration loading
//! - Database schema, seed data and models
//! - Emotion registry and acoustic attribute types
//! - Token encryption

pub mod config;
pub mod crypto;
pub mod db;
pub mod emotion;
pub mod error;
pub mod time;

pub use emotion::{Attributes, Axis, Emotion, VoteContext};
pub use error::{Error, Result};
