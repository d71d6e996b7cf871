//! Accept loop and per-connection handling.

pub mod core;
pub mod handlers;

pub use self::core::BingoServer;
pub use handlers::handle_connection;
