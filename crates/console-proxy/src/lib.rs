pub mod config;
pub mod discovery;
pub mod error;
pub mod relay;
pub mod server;

pub use config::ProxyConfig;
pub use error::ProxyError;
pub use server::ConsoleServer;
