//! Gantry core: request identifiers, request scope, log severities, and account records.

pub mod account;
pub mod context;
pub mod request_id;
pub mod severity;

pub use account::{NewUser, RegistrationRequest, UserRecord};
pub use context::RequestContext;
pub use request_id::{RequestId, FAILED_REQUEST_ID, REQUEST_ID_HEADER};
pub use severity::Severity;

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
