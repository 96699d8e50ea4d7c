//! Account registration records exchanged with an identity provider.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Registration payload accepted by the register endpoint.
///
/// Field names follow the public JSON contract (`Email`, `PhotoURL`, ...).
/// Every field is optional on the wire and defaults to its zero value.
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct RegistrationRequest {
    pub email: String,
    pub email_verified: bool,
    pub phone_number: String,
    pub password: String,
    pub display_name: String,
    #[serde(rename = "PhotoURL")]
    pub photo_url: String,
    pub disabled: bool,
}

impl fmt::Debug for RegistrationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationRequest")
            .field("email", &self.email)
            .field("email_verified", &self.email_verified)
            .field("phone_number", &self.phone_number)
            .field("password", &"<redacted>")
            .field("display_name", &self.display_name)
            .field("photo_url", &self.photo_url)
            .field("disabled", &self.disabled)
            .finish()
    }
}

/// Provider-neutral account creation request.
///
/// Empty strings from the registration payload become `None` so that the
/// provider only receives attributes the caller actually set.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct NewUser {
    pub email: Option<String>,
    pub email_verified: bool,
    pub phone_number: Option<String>,
    pub password: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub disabled: bool,
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

impl From<RegistrationRequest> for NewUser {
    fn from(req: RegistrationRequest) -> Self {
        Self {
            email: non_empty(req.email),
            email_verified: req.email_verified,
            phone_number: non_empty(req.phone_number),
            password: non_empty(req.password),
            display_name: non_empty(req.display_name),
            photo_url: non_empty(req.photo_url),
            disabled: req.disabled,
        }
    }
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("email", &self.email)
            .field("email_verified", &self.email_verified)
            .field("phone_number", &self.phone_number)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("display_name", &self.display_name)
            .field("photo_url", &self.photo_url)
            .field("disabled", &self.disabled)
            .finish()
    }
}

/// User record as returned by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Provider-assigned user identifier.
    pub uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub email_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub disabled: bool,
    /// Creation time in milliseconds since the Unix epoch, if reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at_millis: Option<u64>,
}
