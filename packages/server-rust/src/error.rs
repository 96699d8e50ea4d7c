//! Fatal server errors.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that stop a service instance from starting or serving.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] io::Error),

    #[error("invalid value for header {name}: {value:?}")]
    InvalidHeader { name: &'static str, value: String },

    #[error("static asset directory not found: {}", .0.display())]
    InvalidStaticDir(PathBuf),
}
