//! Database access for moody-tunes
//!
//! Free async functions over the shared SQLite pool, one module per table
//! family. Schema creation lives in `moody_common::db::init`.

pub mod emotions;
pub mod oauth_states;
pub mod provider_auth;
pub mod settings;
pub mod songs;
pub mod tasks;
pub mod user_emotions;
pub mod users;
pub mod votes;
