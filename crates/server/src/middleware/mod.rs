//! HTTP middleware for the asset server.

pub mod request_id;

pub use request_id::{make_request_span, request_id_layers, UuidRequestId, X_REQUEST_ID};
