//! Response handling and transformation.
//!
//! # Responsibilities
//! - Tag responses with the backend that produced them
//! - Strip hop-by-hop headers from backend responses
//! - Render pipeline errors with the request's correlation ID
//!
//! # Design Decisions
//! - Streaming responses avoid buffering entire body
//! - Body framing headers (content-length, transfer-encoding) are kept

use axum::{
    http::{header, HeaderName},
    response::Response,
};

use crate::error::GatewayError;

/// Response extension naming the backend a request was routed to.
#[derive(Debug, Clone)]
pub struct ServiceLabel(pub String);

const HOP_BY_HOP: [HeaderName; 3] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
];

pub fn strip_hop_headers(response: &mut Response) {
    for name in HOP_BY_HOP.iter() {
        response.headers_mut().remove(name);
    }
}

pub fn label(mut response: Response, service: &str) -> Response {
    response
        .extensions_mut()
        .insert(ServiceLabel(service.to_string()));
    response
}

/// Render `err`, labelled with its backend when it has one.
pub fn error_response(err: GatewayError, request_id: &str, expose_details: bool) -> Response {
    let service = err.service().map(str::to_string);
    let response = err.into_response_for(request_id, expose_details);
    match service {
        Some(service) => label(response, &service),
        None => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_hop_headers_removed() {
        let mut response = Response::builder()
            .header("connection", "keep-alive")
            .header("keep-alive", "timeout=5")
            .header("content-length", "0")
            .body(Body::empty())
            .unwrap();
        strip_hop_headers(&mut response);
        assert!(response.headers().get("connection").is_none());
        assert!(response.headers().get("keep-alive").is_none());
        assert!(response.headers().get("content-length").is_some());
    }

    #[test]
    fn test_error_response_labelled() {
        let response = error_response(
            GatewayError::CircuitOpen {
                service: "cart".into(),
            },
            "r-1",
            false,
        );
        assert_eq!(response.status().as_u16(), 503);
        assert_eq!(response.extensions().get::<ServiceLabel>().unwrap().0, "cart");
    }
}
