//! Per-request identifiers.
//!
//! An identifier is either taken from the inbound `X-Request-Id` header or
//! generated from the OS random source and hex-encoded. Generation never
//! fails the request: if the random source is unavailable a fixed sentinel
//! is used instead.

use std::fmt;

use rand::rngs::OsRng;
use rand::TryRngCore;

/// Header carrying the request identifier in both directions.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Number of random bytes behind a generated identifier.
pub const REQUEST_ID_BYTES: usize = 8;

/// Identifier substituted when the random source cannot be read.
pub const FAILED_REQUEST_ID: &str = "fail-xxx";

/// Opaque token correlating every log line of a single request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// Reuses `existing` when it is present and non-empty, otherwise
    /// generates a fresh identifier.
    #[must_use]
    pub fn ensure(existing: Option<&str>) -> Self {
        match existing.filter(|id| !id.is_empty()) {
            Some(id) => Self(id.to_string()),
            None => Self::generate(),
        }
    }

    /// Generates an identifier from the OS random source.
    #[must_use]
    pub fn generate() -> Self {
        Self::generate_with(&mut OsRng)
    }

    /// Generates an identifier from `rng`, falling back to
    /// [`FAILED_REQUEST_ID`] if the source reports an error.
    pub fn generate_with<R>(rng: &mut R) -> Self
    where
        R: TryRngCore + ?Sized,
    {
        let mut bytes = [0u8; REQUEST_ID_BYTES];
        match rng.try_fill_bytes(&mut bytes) {
            Ok(()) => Self(hex::encode(bytes)),
            Err(err) => {
                tracing::warn!(error = %err, "random source unavailable, using sentinel request id");
                Self(FAILED_REQUEST_ID.to_string())
            }
        }
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    fn is_sentinel(&self) -> bool {
        self.0 == FAILED_REQUEST_ID
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RequestId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
