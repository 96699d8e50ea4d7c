//! Static asset routes.
//!
//! Files under the configured prefix are served from a directory with a
//! public cache lifetime. Every path no other route matches gets the index
//! file with caching disabled, which is what single-page apps expect.

use std::path::PathBuf;

use axum::http::header::CACHE_CONTROL;
use axum::http::HeaderValue;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::error::ServerError;

/// `Cache-Control` value of the fallback index.
pub const NO_CACHE: &str = "private; max-age=0";

/// Where static files live and how they are cached.
#[derive(Debug, Clone)]
pub struct StaticAssetsConfig {
    /// Directory served under `static_path`.
    pub public_dir: PathBuf,
    /// File returned for every unmatched path.
    pub index_file: PathBuf,
    /// Route prefix; normalized to start and end with `/`.
    pub static_path: String,
    /// `max-age` in seconds for files under `static_path`.
    pub cache_max_age: u32,
}

impl Default for StaticAssetsConfig {
    fn default() -> Self {
        Self {
            public_dir: PathBuf::from("public"),
            index_file: PathBuf::from("public/index.html"),
            static_path: "/static/".to_string(),
            cache_max_age: 3600,
        }
    }
}

/// Coerces `path` to start and end with `/`. Empty becomes `/`.
#[must_use]
pub fn normalize_prefix(path: &str) -> String {
    let mut prefix = String::with_capacity(path.len() + 2);
    if !path.starts_with('/') {
        prefix.push('/');
    }
    prefix.push_str(path);
    if !prefix.ends_with('/') {
        prefix.push('/');
    }
    prefix
}

/// Adds the static prefix route and the index fallback to `router`.
///
/// Replaces any fallback `router` already had.
///
/// # Errors
///
/// Returns [`ServerError::InvalidStaticDir`] if `public_dir` is not a
/// directory.
pub fn with_static_assets(router: Router, config: &StaticAssetsConfig) -> Result<Router, ServerError> {
    if !config.public_dir.is_dir() {
        return Err(ServerError::InvalidStaticDir(config.public_dir.clone()));
    }

    let public = format!("public, max-age={}", config.cache_max_age);
    let public = HeaderValue::from_str(&public).map_err(|_| ServerError::InvalidHeader {
        name: "cache-control",
        value: public.clone(),
    })?;

    let index = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            CACHE_CONTROL,
            HeaderValue::from_static(NO_CACHE),
        ))
        .service(ServeFile::new(&config.index_file));

    let prefix = normalize_prefix(&config.static_path);
    if prefix == "/" {
        // The directory owns the root; missing files fall through to the index.
        let files = ServiceBuilder::new()
            .layer(SetResponseHeaderLayer::if_not_present(CACHE_CONTROL, public))
            .service(ServeDir::new(&config.public_dir).fallback(index));
        return Ok(router.fallback_service(files));
    }

    let files = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(CACHE_CONTROL, public))
        .service(ServeDir::new(&config.public_dir));
    Ok(router
        .nest_service(prefix.trim_end_matches('/'), files)
        .fallback_service(index))
}
