//! In-process identity provider for development and tests.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use gantry_core::{NewUser, UserRecord};
use parking_lot::Mutex;
use rand::RngCore;

use super::{IdentityProvider, ProviderError};

const UID_BYTES: usize = 14;

/// Keeps created accounts in memory. Email (case-insensitive) and phone
/// number must be unique, like a real provider.
#[derive(Debug, Default)]
pub struct InMemoryIdentityProvider {
    users: Mutex<Vec<UserRecord>>,
}

impl InMemoryIdentityProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accounts created so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.lock().is_empty()
    }
}

fn new_uid() -> String {
    let mut bytes = [0u8; UID_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn now_millis() -> Option<u64> {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
    u64::try_from(elapsed.as_millis()).ok()
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn create_user(&self, user: &NewUser) -> Result<UserRecord, ProviderError> {
        let mut users = self.users.lock();

        if let Some(email) = &user.email {
            let taken = users.iter().any(|existing| {
                existing
                    .email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(email))
            });
            if taken {
                return Err(ProviderError::EmailExists);
            }
        }
        if let Some(phone) = &user.phone_number {
            if users
                .iter()
                .any(|existing| existing.phone_number.as_ref() == Some(phone))
            {
                return Err(ProviderError::PhoneNumberExists);
            }
        }

        let record = UserRecord {
            uid: new_uid(),
            email: user.email.clone(),
            email_verified: user.email_verified,
            phone_number: user.phone_number.clone(),
            display_name: user.display_name.clone(),
            photo_url: user.photo_url.clone(),
            disabled: user.disabled,
            created_at_millis: now_millis(),
        };
        users.push(record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: Option<&str>, phone: Option<&str>) -> NewUser {
        NewUser {
            email: email.map(str::to_string),
            phone_number: phone.map(str::to_string),
            ..NewUser::default()
        }
    }

    #[tokio::test]
    async fn assigns_distinct_hex_uids() {
        let provider = InMemoryIdentityProvider::new();
        let a = provider.create_user(&user(Some("a@x.io"), None)).await.unwrap();
        let b = provider.create_user(&user(Some("b@x.io"), None)).await.unwrap();

        assert_eq!(a.uid.len(), UID_BYTES * 2);
        assert_ne!(a.uid, b.uid);
        assert!(a.created_at_millis.is_some());
        assert_eq!(provider.len(), 2);
    }

    #[tokio::test]
    async fn email_uniqueness_ignores_case() {
        let provider = InMemoryIdentityProvider::new();
        provider.create_user(&user(Some("Ann@X.io"), None)).await.unwrap();

        let err = provider
            .create_user(&user(Some("ann@x.io"), None))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::EmailExists));
        assert_eq!(provider.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_phone_is_rejected() {
        let provider = InMemoryIdentityProvider::new();
        provider
            .create_user(&user(None, Some("+15555550100")))
            .await
            .unwrap();

        let err = provider
            .create_user(&user(Some("c@x.io"), Some("+15555550100")))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::PhoneNumberExists));
    }

    #[tokio::test]
    async fn accounts_without_email_do_not_conflict() {
        let provider = InMemoryIdentityProvider::new();
        provider.create_user(&user(None, None)).await.unwrap();
        provider.create_user(&user(None, None)).await.unwrap();
        assert_eq!(provider.len(), 2);
    }
}
