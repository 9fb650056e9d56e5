pub mod config;
pub mod providers;
pub mod server;
pub mod tools;
pub mod transport;

pub use config::{ConfigError, ServerConfig};
pub use server::McpServer;
pub use tools::{build_registry, ToolRegistry};
pub use transport::Strictness;
