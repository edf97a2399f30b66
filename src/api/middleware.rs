use axum::http::{HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Keeps a caller-supplied request id, otherwise generates a UUIDv4.
#[derive(Clone, Copy, Debug, Default)]
pub struct MakeRequestUuidOrHeader;

impl MakeRequestId for MakeRequestUuidOrHeader {
    fn make_request_id<B>(&mut self, request: &Request<B>) -> Option<RequestId> {
        let existing = request.headers().get(REQUEST_ID_HEADER).filter(|v| !v.is_empty() && v.len() <= 128);
        if let Some(value) = existing {
            return Some(RequestId::new(value.clone()));
        }
        HeaderValue::from_str(&Uuid::new_v4().to_string()).ok().map(RequestId::new)
    }
}
