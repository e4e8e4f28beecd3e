pub mod cache;
pub mod db;
pub mod error;
pub mod leaderboard;

// Daemon, HTTP API and config file (only compiled with server feature)
#[cfg(feature = "server")]
pub mod server;
