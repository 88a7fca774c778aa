mod config;
mod error;
mod router;
mod server;

pub use config::{BasicConfig, DigestConfig, LimitsConfig, ListenConfig, ServerConfig};
pub use error::ServerError;
pub use router::Router;
pub use server::{Server, ServerStats};
