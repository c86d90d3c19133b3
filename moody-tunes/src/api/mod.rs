//! HTTP API handlers for moody-tunes

pub mod accounts;
pub mod auth;
pub mod extract;
pub mod health;
pub mod spotify;
pub mod tunes;

pub use accounts::account_routes;
pub use health::health_routes;
pub use spotify::spotify_routes;
pub use tunes::tunes_routes;
