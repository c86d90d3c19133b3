//! Business services for moody-tunes

pub mod analytics;
pub mod browse;
pub mod browse_cache;
pub mod cover_image;
pub mod export;
pub mod fetch_song;
pub mod oauth;
pub mod playlist;
pub mod provider;
pub mod provider_auth;
pub mod spotify_client;
pub mod suggest;
pub mod top_artists;
pub mod user_emotion;
pub mod users;
pub mod votes;

pub use browse::BrowseService;
pub use browse_cache::BrowseCache;
pub use export::ExportService;
pub use oauth::OAuthService;
pub use provider::MusicProvider;
pub use provider_auth::ProviderAuthStore;
pub use spotify_client::SpotifyClient;
pub use suggest::SuggestLimiter;
pub use votes::VoteService;
