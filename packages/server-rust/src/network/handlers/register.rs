//! Account registration endpoint.
//!
//! `POST /api/auth/firebase-auth/register` decodes a [`RegistrationRequest`],
//! passes it to the configured identity provider and answers with the
//! provider's user record as JSON.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Extension, Router};
use bytes::Bytes;
use gantry_core::RegistrationRequest;

use crate::auth::AccountRegistration;
use crate::logging::RequestLogger;

/// Route of the registration endpoint.
pub const REGISTER_PATH: &str = "/api/auth/firebase-auth/register";

/// Router exposing [`register_handler`] at [`REGISTER_PATH`].
///
/// Must be served by a [`ServiceInstance`](crate::network::ServiceInstance)
/// so the request logger extension is present.
pub fn register_routes(registration: AccountRegistration) -> Router {
    Router::new()
        .route(REGISTER_PATH, post(register_handler))
        .with_state(registration)
}

/// Creates an account from the JSON body.
///
/// - 200 with the JSON user record on success
/// - 400 with `failed to register: <err>` when the provider refuses
/// - 500 when the body cannot be decoded or the record cannot be encoded
pub async fn register_handler(
    State(registration): State<AccountRegistration>,
    Extension(logger): Extension<RequestLogger>,
    body: Bytes,
) -> Response {
    let request: RegistrationRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            logger.error(format_args!("invalid registration payload: {err}"));
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let record = match registration.register(request).await {
        Ok(record) => record,
        Err(err) => {
            logger.error(format_args!("failed to register: {err}"));
            return (StatusCode::BAD_REQUEST, format!("failed to register: {err}")).into_response();
        }
    };

    match serde_json::to_vec(&record) {
        Ok(json) => {
            logger.info(format_args!("successfully created user uid={}", record.uid));
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/json")],
                json,
            )
                .into_response()
        }
        Err(err) => {
            logger.error(format_args!("failed to encode user record: {err}"));
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
