//! Axum middleware layers applied to every route: request correlation,
//! client IP extraction, security headers, and backpressure.

mod backpressure;
mod client_ip;
mod request_id;
mod security_headers;

pub use backpressure::backpressure_middleware;
pub use client_ip::{ClientIp, client_ip_middleware};
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
pub use security_headers::security_headers_middleware;
