//! Gantry server: an axum service bootstrap with environment configuration,
//! console or cloud structured logging, request ids, and graceful shutdown.

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod network;

pub use auth::{AccountRegistration, IdentityProvider, ProviderError};
pub use config::{ConfigError, ServiceConfig};
pub use error::ServerError;
pub use logging::{LogBackend, LoggerKind, RequestLogger};
pub use network::{ServiceInstance, ShutdownOutcome};
