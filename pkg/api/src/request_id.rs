use axum::{extract::Request, middleware::Next, response::Response};
use tracing::Instrument;
use uuid::Uuid;

/// Middleware tagging every request with a fresh UUID. The id rides on
/// the tracing span for the whole handler and is echoed back in the
/// `x-request-id` response header.
pub async fn request_id_middleware(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();

    let span = tracing::info_span!(
        "api_request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    let mut response = next.run(req).instrument(span).await;
    // A UUID is always a valid header value.
    response
        .headers_mut()
        .insert("x-request-id", request_id.parse().unwrap());

    response
}
