//! Firebase Authentication provider over the Identity Toolkit REST API.
//!
//! Account creation is a `POST .../accounts` followed by an
//! `accounts:lookup` of the new uid, so the returned record reflects what
//! the provider stored rather than what was sent.

use std::fmt;

use async_trait::async_trait;
use gantry_core::{NewUser, UserRecord};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{IdentityProvider, ProviderError};
use crate::config::ConfigError;

/// Production Identity Toolkit endpoint.
pub const DEFAULT_BASE_URL: &str = "https://identitytoolkit.googleapis.com";

/// Environment variable names read by [`FirebaseAuthConfig::from_env`].
pub mod vars {
    pub const EMULATOR_HOST: &str = "FIREBASE_AUTH_EMULATOR_HOST";
    pub const ACCESS_TOKEN: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";
    pub const PROJECT_ID: &str = "PROJECT_ID";
    pub const GOOGLE_CLOUD_PROJECT: &str = "GOOGLE_CLOUD_PROJECT";
}

/// How requests are authorized.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// The Auth emulator accepts the fixed bearer token `owner`.
    Emulator,
    /// OAuth2 access token with the Firebase admin scope.
    AccessToken(String),
}

impl Credential {
    fn bearer(&self) -> &str {
        match self {
            Self::Emulator => "owner",
            Self::AccessToken(token) => token,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Emulator => f.write_str("Emulator"),
            Self::AccessToken(_) => f.write_str("AccessToken(<redacted>)"),
        }
    }
}

/// Connection settings for [`FirebaseAuth`].
#[derive(Debug, Clone)]
pub struct FirebaseAuthConfig {
    pub project_id: String,
    /// Base URL without trailing slash, e.g. [`DEFAULT_BASE_URL`].
    pub base_url: String,
    pub credential: Credential,
}

impl FirebaseAuthConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// See [`FirebaseAuthConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// The emulator is used when `FIREBASE_AUTH_EMULATOR_HOST` is set;
    /// otherwise an access token is required.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotSet`] when no project id is configured, or
    /// when neither the emulator host nor an access token is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|value| !value.is_empty());

        let project_id = get(vars::PROJECT_ID)
            .or_else(|| get(vars::GOOGLE_CLOUD_PROJECT))
            .ok_or_else(|| ConfigError::NotSet {
                var: vars::PROJECT_ID.to_string(),
            })?;

        if let Some(host) = get(vars::EMULATOR_HOST) {
            return Ok(Self {
                project_id,
                base_url: format!("http://{host}/identitytoolkit.googleapis.com"),
                credential: Credential::Emulator,
            });
        }

        let token = get(vars::ACCESS_TOKEN).ok_or_else(|| ConfigError::NotSet {
            var: vars::ACCESS_TOKEN.to_string(),
        })?;
        Ok(Self {
            project_id,
            base_url: DEFAULT_BASE_URL.to_string(),
            credential: Credential::AccessToken(token),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateAccountRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    email_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone_number: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    photo_url: Option<&'a str>,
    disabled: bool,
}

impl<'a> From<&'a NewUser> for CreateAccountRequest<'a> {
    fn from(user: &'a NewUser) -> Self {
        Self {
            email: user.email.as_deref(),
            email_verified: user.email_verified,
            phone_number: user.phone_number.as_deref(),
            password: user.password.as_deref(),
            display_name: user.display_name.as_deref(),
            photo_url: user.photo_url.as_deref(),
            disabled: user.disabled,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAccountResponse {
    local_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    local_id: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<AccountInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountInfo {
    local_id: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    phone_number: Option<String>,
    display_name: Option<String>,
    photo_url: Option<String>,
    #[serde(default)]
    disabled: bool,
    /// Milliseconds since the epoch, encoded as a string.
    created_at: Option<String>,
}

impl From<AccountInfo> for UserRecord {
    fn from(info: AccountInfo) -> Self {
        Self {
            uid: info.local_id,
            email: info.email,
            email_verified: info.email_verified,
            phone_number: info.phone_number,
            display_name: info.display_name,
            photo_url: info.photo_url,
            disabled: info.disabled,
            created_at_millis: info.created_at.and_then(|ms| ms.parse().ok()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Maps an Identity Toolkit error message such as `EMAIL_EXISTS` or
/// `PHONE_NUMBER_EXISTS : ...` to a [`ProviderError`].
fn classify_error(status: u16, message: &str) -> ProviderError {
    let code = message
        .split([' ', ':'])
        .find(|token| !token.is_empty())
        .unwrap_or_default();
    match code {
        "EMAIL_EXISTS" => ProviderError::EmailExists,
        "PHONE_NUMBER_EXISTS" => ProviderError::PhoneNumberExists,
        "DUPLICATE_LOCAL_ID" => ProviderError::UidExists,
        _ => ProviderError::Rejected {
            status,
            code: if message.is_empty() {
                "UNKNOWN".to_string()
            } else {
                message.to_string()
            },
        },
    }
}

/// Firebase Authentication client.
#[derive(Debug, Clone)]
pub struct FirebaseAuth {
    client: Client,
    config: FirebaseAuthConfig,
}

impl FirebaseAuth {
    #[must_use]
    pub fn new(config: FirebaseAuthConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    #[must_use]
    pub fn with_client(client: Client, config: FirebaseAuthConfig) -> Self {
        Self { client, config }
    }

    #[must_use]
    pub fn config(&self) -> &FirebaseAuthConfig {
        &self.config
    }

    fn url(&self, method: &str) -> String {
        format!(
            "{}/v1/projects/{}/{method}",
            self.config.base_url.trim_end_matches('/'),
            self.config.project_id
        )
    }

    fn authorization(&self) -> Result<HeaderValue, ProviderError> {
        HeaderValue::from_str(&format!("Bearer {}", self.config.credential.bearer())).map_err(|_| {
            ProviderError::Credentials("access token is not a valid header value".to_string())
        })
    }

    async fn post<T, R>(&self, method: &str, body: &T) -> Result<R, ProviderError>
    where
        T: Serialize + ?Sized + Sync,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(self.url(method))
            .header(AUTHORIZATION, self.authorization()?)
            .json(body)
            .send()
            .await?;
        decode(response).await
    }

    async fn lookup(&self, uid: &str) -> Result<UserRecord, ProviderError> {
        let response: LookupResponse = self
            .post("accounts:lookup", &LookupRequest { local_id: [uid] })
            .await?;
        response
            .users
            .into_iter()
            .find(|user| user.local_id == uid)
            .map(UserRecord::from)
            .ok_or_else(|| ProviderError::Decode(format!("created user {uid} not found")))
    }
}

async fn decode<R>(response: Response) -> Result<R, ProviderError>
where
    R: for<'de> Deserialize<'de>,
{
    let status = response.status();
    let body = response.bytes().await?;
    if !status.is_success() {
        let message = serde_json::from_slice::<ErrorEnvelope>(&body)
            .map(|envelope| envelope.error.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());
        return Err(classify_error(status.as_u16(), &message));
    }
    serde_json::from_slice(&body).map_err(|err| ProviderError::Decode(err.to_string()))
}

#[async_trait]
impl IdentityProvider for FirebaseAuth {
    async fn create_user(&self, user: &NewUser) -> Result<UserRecord, ProviderError> {
        let created: CreateAccountResponse = self
            .post("accounts", &CreateAccountRequest::from(user))
            .await?;
        debug!(uid = %created.local_id, "account created");
        self.lookup(&created.local_id).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode, Uri};
    use axum::response::{IntoResponse, Response};
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use tokio::net::TcpListener;

    use super::*;

    #[derive(Clone, Default)]
    struct Mock {
        requests: Arc<Mutex<Vec<(String, Option<String>, Value)>>>,
        emails: Arc<Mutex<Vec<String>>>,
    }

    async fn toolkit(State(mock): State<Mock>, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
        let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        mock.requests
            .lock()
            .push((uri.path().to_string(), auth, body.clone()));

        if uri.path().ends_with("/accounts") {
            let email = body["email"].as_str().unwrap_or_default().to_string();
            let mut emails = mock.emails.lock();
            if emails.contains(&email) {
                let error = json!({"error": {"code": 400, "message": "EMAIL_EXISTS"}});
                return (StatusCode::BAD_REQUEST, Json(error)).into_response();
            }
            emails.push(email);
            Json(json!({"kind": "identitytoolkit#SignupNewUserResponse", "localId": "uid-1"}))
                .into_response()
        } else if uri.path().ends_with("/accounts:lookup") {
            Json(json!({"users": [{
                "localId": "uid-1",
                "email": mock.emails.lock().last(),
                "emailVerified": true,
                "displayName": "Ann",
                "createdAt": "1700000000123",
            }]}))
            .into_response()
        } else {
            StatusCode::NOT_FOUND.into_response()
        }
    }

    async fn mock_server() -> (String, Mock) {
        let mock = Mock::default();
        let app = Router::new().fallback(toolkit).with_state(mock.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), mock)
    }

    fn client(base_url: String, credential: Credential) -> FirebaseAuth {
        FirebaseAuth::new(FirebaseAuthConfig {
            project_id: "demo-project".to_string(),
            base_url,
            credential,
        })
    }

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |var: &str| env.get(var).cloned()
    }

    #[tokio::test]
    async fn create_user_posts_account_then_reads_it_back() {
        let (base, mock) = mock_server().await;
        let auth = client(base, Credential::AccessToken("tok-1".to_string()));
        let user = NewUser {
            email: Some("ann@example.com".to_string()),
            email_verified: true,
            password: Some("s3cret!".to_string()),
            display_name: Some("Ann".to_string()),
            ..NewUser::default()
        };

        let record = auth.create_user(&user).await.unwrap();

        assert_eq!(record.uid, "uid-1");
        assert_eq!(record.email.as_deref(), Some("ann@example.com"));
        assert!(record.email_verified);
        assert_eq!(record.created_at_millis, Some(1_700_000_000_123));

        let requests = mock.requests.lock();
        assert_eq!(requests.len(), 2);
        let (path, auth_header, body) = &requests[0];
        assert_eq!(path, "/v1/projects/demo-project/accounts");
        assert_eq!(auth_header.as_deref(), Some("Bearer tok-1"));
        assert_eq!(body["email"], "ann@example.com");
        assert_eq!(body["password"], "s3cret!");
        assert!(body.get("phoneNumber").is_none());
        assert_eq!(requests[1].0, "/v1/projects/demo-project/accounts:lookup");
        assert_eq!(requests[1].2, json!({"localId": ["uid-1"]}));
    }

    #[tokio::test]
    async fn duplicate_email_maps_to_conflict() {
        let (base, _mock) = mock_server().await;
        let auth = client(base, Credential::Emulator);
        let user = NewUser {
            email: Some("dup@example.com".to_string()),
            ..NewUser::default()
        };

        auth.create_user(&user).await.unwrap();
        let err = auth.create_user(&user).await.unwrap_err();
        assert!(matches!(err, ProviderError::EmailExists));
    }

    #[tokio::test]
    async fn emulator_uses_owner_token() {
        let (base, mock) = mock_server().await;
        let auth = client(base, Credential::Emulator);
        auth.create_user(&NewUser::default()).await.unwrap();
        assert_eq!(mock.requests.lock()[0].1.as_deref(), Some("Bearer owner"));
    }

    #[test]
    fn classify_error_reads_leading_code() {
        assert!(matches!(
            classify_error(400, "PHONE_NUMBER_EXISTS : already taken"),
            ProviderError::PhoneNumberExists
        ));
        assert!(matches!(
            classify_error(400, "DUPLICATE_LOCAL_ID"),
            ProviderError::UidExists
        ));
        match classify_error(400, "WEAK_PASSWORD : too short") {
            ProviderError::Rejected { status, code } => {
                assert_eq!(status, 400);
                assert_eq!(code, "WEAK_PASSWORD : too short");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn config_prefers_emulator() {
        let config = FirebaseAuthConfig::from_lookup(lookup(&[
            ("PROJECT_ID", "demo"),
            ("FIREBASE_AUTH_EMULATOR_HOST", "localhost:9099"),
        ]))
        .unwrap();
        assert_eq!(config.credential, Credential::Emulator);
        assert_eq!(config.base_url, "http://localhost:9099/identitytoolkit.googleapis.com");
    }

    #[test]
    fn config_falls_back_to_google_cloud_project() {
        let config = FirebaseAuthConfig::from_lookup(lookup(&[
            ("GOOGLE_CLOUD_PROJECT", "gcp-demo"),
            ("GOOGLE_OAUTH_ACCESS_TOKEN", "tok"),
        ]))
        .unwrap();
        assert_eq!(config.project_id, "gcp-demo");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(format!("{:?}", config.credential), "AccessToken(<redacted>)");
    }

    #[test]
    fn config_requires_project_and_token() {
        let err = FirebaseAuthConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::NotSet { ref var } if var == "PROJECT_ID"));

        let err = FirebaseAuthConfig::from_lookup(lookup(&[("PROJECT_ID", "demo")])).unwrap_err();
        assert!(matches!(err, ConfigError::NotSet { ref var } if var == "GOOGLE_OAUTH_ACCESS_TOKEN"));
    }
}
