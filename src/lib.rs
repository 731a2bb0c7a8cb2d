//! Admin console backend library.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod store;

pub use config::schema::ConsoleConfig;
pub use http::HttpServer;
pub use lifecycle::{AdminWatchdog, Console, Shutdown};
