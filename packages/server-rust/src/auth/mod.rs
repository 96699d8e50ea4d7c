//! Account registration against an external identity provider.
//!
//! [`AccountRegistration`] maps the public registration payload onto a
//! provider-neutral [`NewUser`] and hands it to an [`IdentityProvider`].
//! Provider results, including conflicts such as a duplicate email, are
//! returned verbatim. There is no retry and no local validation.

pub mod firebase;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use gantry_core::{NewUser, RegistrationRequest, UserRecord};
use thiserror::Error;

pub use firebase::{Credential, FirebaseAuth, FirebaseAuthConfig};
pub use memory::InMemoryIdentityProvider;

/// Errors reported by an identity provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("the email address is already in use by another account")]
    EmailExists,

    #[error("the phone number is already in use by another account")]
    PhoneNumberExists,

    #[error("the user id is already in use by another account")]
    UidExists,

    #[error("provider rejected the request ({status}): {code}")]
    Rejected { status: u16, code: String },

    #[error("provider credentials unavailable: {0}")]
    Credentials(String),

    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected provider response: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Whether the error reports a uniqueness conflict with an existing account.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::EmailExists | Self::PhoneNumberExists | Self::UidExists
        )
    }
}

/// External service owning user records.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create a user account and return the stored record.
    async fn create_user(&self, user: &NewUser) -> Result<UserRecord, ProviderError>;
}

/// Registration passthrough shared by HTTP handlers.
#[derive(Clone)]
pub struct AccountRegistration {
    provider: Arc<dyn IdentityProvider>,
}

impl AccountRegistration {
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    /// Creates the account described by `request`.
    ///
    /// # Errors
    ///
    /// Returns the provider's [`ProviderError`] unchanged.
    pub async fn register(&self, request: RegistrationRequest) -> Result<UserRecord, ProviderError> {
        let user = NewUser::from(request);
        self.provider.create_user(&user).await
    }
}

impl std::fmt::Debug for AccountRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountRegistration").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration() -> AccountRegistration {
        AccountRegistration::new(Arc::new(InMemoryIdentityProvider::new()))
    }

    fn request(email: &str) -> RegistrationRequest {
        RegistrationRequest {
            email: email.to_string(),
            password: "correct horse".to_string(),
            display_name: "Ann".to_string(),
            ..RegistrationRequest::default()
        }
    }

    #[tokio::test]
    async fn register_returns_record_with_uid() {
        let record = registration().register(request("ann@example.com")).await.unwrap();
        assert!(!record.uid.is_empty());
        assert_eq!(record.email.as_deref(), Some("ann@example.com"));
        assert_eq!(record.display_name.as_deref(), Some("Ann"));
        assert!(record.photo_url.is_none());
    }

    #[tokio::test]
    async fn duplicate_email_surfaces_conflict() {
        let registration = registration();
        registration.register(request("ann@example.com")).await.unwrap();

        let err = registration
            .register(request("ann@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::EmailExists));
        assert!(err.is_conflict());
        assert!(err.to_string().contains("email address is already in use"));
    }

    #[test]
    fn rejected_is_not_a_conflict() {
        let err = ProviderError::Rejected {
            status: 400,
            code: "INVALID_EMAIL".to_string(),
        };
        assert!(!err.is_conflict());
        assert_eq!(err.to_string(), "provider rejected the request (400): INVALID_EMAIL");
    }
}
