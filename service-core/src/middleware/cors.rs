use axum::http::{HeaderName, Method, header};
use tower_http::cors::{Any, CorsLayer};

/// Headers browser and edge clients send with API calls.
pub const DEFAULT_ALLOWED_HEADERS: [HeaderName; 4] = [
    header::AUTHORIZATION,
    HeaderName::from_static("x-client-info"),
    HeaderName::from_static("apikey"),
    header::CONTENT_TYPE,
];

/// Permissive CORS for public JSON endpoints: any origin, the given methods
/// and [`DEFAULT_ALLOWED_HEADERS`]. Pre-flight `OPTIONS` requests are answered
/// by the layer itself.
pub fn permissive_cors(methods: &[Method]) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(methods.to_vec())
        .allow_headers(DEFAULT_ALLOWED_HEADERS.to_vec())
}
