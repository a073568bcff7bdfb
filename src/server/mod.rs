//! Server-side modules for the clipshare board server.

pub mod config;
pub mod hub;
pub mod routes;
pub mod store;
mod ws;

pub use config::ServerConfig;
pub use hub::BoardHub;
pub use routes::{router, AppState};
pub use store::{BoardStore, Stored};
