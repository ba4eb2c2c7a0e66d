use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

/// Tool results carry tenant business data; nothing here should be framed,
/// sniffed or cached by intermediaries.
const BASELINE: [(&str, &str); 5] = [
    ("x-content-type-options", "nosniff"),
    ("referrer-policy", "no-referrer"),
    ("x-frame-options", "DENY"),
    ("content-security-policy", "default-src 'none'; frame-ancestors 'none'"),
    ("cache-control", "no-store"),
];

pub async fn apply(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    for (name, value) in BASELINE {
        headers.insert(name, HeaderValue::from_static(value));
    }
    response
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::post;
    use axum::{Router, middleware};
    use tower::ServiceExt;

    use super::BASELINE;

    #[tokio::test]
    async fn every_response_gets_the_baseline() {
        let app = Router::new()
            .route("/mcp", post(|| async { StatusCode::ACCEPTED }))
            .layer(middleware::from_fn(super::apply));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mcp")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        for (name, value) in BASELINE {
            assert_eq!(
                response
                    .headers()
                    .get(name)
                    .unwrap_or_else(|| panic!("{name} header should exist")),
                value
            );
        }
    }
}
