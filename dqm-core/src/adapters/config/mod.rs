//! Adapter configuration types.

mod connection;

pub use connection::ConnectionConfig;
