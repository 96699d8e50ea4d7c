use crate::request_id::RequestId;

/// Per-request scope carrying the request identifier and the owning service.
/// Created once when a request enters the server and threaded explicitly to
/// every logging call for that request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Name of the service handling this request (the `app` log field).
    pub service: String,
    /// Identifier correlating all log lines of this request.
    pub request_id: RequestId,
}

impl RequestContext {
    #[must_use]
    pub fn new(service: impl Into<String>, request_id: RequestId) -> Self {
        Self {
            service: service.into(),
            request_id,
        }
    }

    /// Builds a context from an optional inbound identifier, generating one
    /// if it is missing.
    #[must_use]
    pub fn from_inbound(service: impl Into<String>, inbound_id: Option<&str>) -> Self {
        Self::new(service, RequestId::ensure(inbound_id))
    }
}
