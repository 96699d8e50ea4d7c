//! Service instance, listener configuration, middleware, and shutdown control.

pub mod assets;
pub mod config;
pub mod handlers;
pub mod instance;
pub mod middleware;
pub mod shutdown;
pub mod signal;

pub use assets::{normalize_prefix, with_static_assets, StaticAssetsConfig};
pub use config::*;
pub use handlers::AppState;
pub use instance::{ServiceInstance, ShutdownOutcome};
pub use shutdown::*;
pub use signal::{os_signal, ShutdownReason};
