//! Jupyter Spy Core - Message model, filters, connection info and configuration
//!
//! This crate provides the foundational types shared by every Jupyter Spy component:
//!
//! - **Message**: the structured record for one kernel protocol message
//! - **Filter**: composable message predicates (status, comm lifecycle, comm ids)
//! - **Connection**: kernel connection info and connection-file discovery
//! - **Config**: layered TOML/env configuration

pub mod config;
pub mod connection;
pub mod filter;
pub mod message;

// Re-export commonly used types
pub use config::{ConfigLoader, SpyConfig};
pub use connection::{ConnectInfo, ConnectionError, ConnectionInfo};
pub use filter::{CommIds, Filter};
pub use message::{Header, Message, MessageDate};

/// Jupyter messaging protocol version this crate understands
pub const PROTOCOL_VERSION: &str = "5.3";

/// Spy version
pub const SPY_VERSION: &str = env!("CARGO_PKG_VERSION");
