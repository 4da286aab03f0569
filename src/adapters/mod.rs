//! External system adapters

pub mod order_ws;
pub mod postgres;

pub use order_ws::WsFeed;
pub use postgres::PostgresStore;
