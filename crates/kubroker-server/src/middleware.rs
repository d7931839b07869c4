use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use kubroker_api::{API_VERSION_HEADER, ApiError, is_supported_api_version};
use uuid::Uuid;

// Request ID middleware: propagate X-Request-Id or generate a new one
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static("x-request-id");

    let req_id_value = req.headers().get(&header_name).cloned().unwrap_or_else(|| {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
    });

    // Add to request extensions for downstream usage (e.g., logging)
    req.extensions_mut().insert(req_id_value.clone());

    let mut res = next.run(req).await;
    res.headers_mut().insert(header_name, req_id_value);
    res
}

/// Rejects broker requests without a supported `X-Broker-API-Version` with 412.
pub async fn broker_api_version(req: Request<Body>, next: Next) -> Response {
    let version = req
        .headers()
        .get(API_VERSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match version {
        Some(v) if is_supported_api_version(&v) => next.run(req).await,
        Some(v) => {
            tracing::debug!(version = %v, "Unsupported broker API version");
            ApiError::precondition_failed(format!("unsupported {API_VERSION_HEADER}: {v}"))
                .into_response()
        }
        None => ApiError::precondition_failed(format!("missing {API_VERSION_HEADER} header"))
            .into_response(),
    }
}
