//! Cross-origin headers.
//!
//! Every response is tagged with an allow-all origin, and preflight requests
//! are answered locally by echoing back whatever the caller asked for.

use http::{
    HeaderMap, HeaderValue, Response, StatusCode,
    header::{
        ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
        ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD,
    },
    request,
};
use tracing::debug;

use crate::service::{ResponseBody, empty_response};

/// Adds `Access-Control-Allow-Origin: *`.
pub fn allow_any_origin<B>(mut response: Response<B>) -> Response<B> {
    response
        .headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

/// Answers a preflight request with an empty `200 OK`.
///
/// Requested headers and method are echoed verbatim; an allow header is left
/// out when the matching request header is absent.
pub fn preflight(parts: &request::Parts) -> Response<ResponseBody> {
    debug!("Answering preflight for {}", parts.uri);

    let mut response = allow_any_origin(empty_response(StatusCode::OK));
    let headers = response.headers_mut();
    echo(&parts.headers, ACCESS_CONTROL_REQUEST_HEADERS, headers, ACCESS_CONTROL_ALLOW_HEADERS);
    echo(&parts.headers, ACCESS_CONTROL_REQUEST_METHOD, headers, ACCESS_CONTROL_ALLOW_METHODS);
    response
}

fn echo(
    request: &HeaderMap,
    requested: http::HeaderName,
    response: &mut HeaderMap,
    allowed: http::HeaderName,
) {
    if let Some(value) = request.get(requested) {
        response.insert(allowed, value.clone());
    }
}

#[cfg(test)]
mod tests {
    use http::{Method, Request};
    use http_body_util::BodyExt as _;

    use super::*;

    fn preflight_for(headers: &[(&str, &str)]) -> Response<ResponseBody> {
        let mut builder = Request::builder().method(Method::OPTIONS).uri("/anything/at/all");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (parts, ()) = builder.body(()).unwrap().into_parts();
        preflight(&parts)
    }

    #[tokio::test]
    async fn echoes_requested_headers() {
        let response = preflight_for(&[("Access-Control-Request-Headers", "X-Foo")]);

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_HEADERS], "X-Foo");
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }

    #[test]
    fn echoes_requested_method() {
        let response = preflight_for(&[
            ("Access-Control-Request-Method", "GET"),
            ("Access-Control-Request-Headers", "content-type, x-requested-with"),
        ]);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_METHODS], "GET");
        assert_eq!(
            response.headers()[ACCESS_CONTROL_ALLOW_HEADERS],
            "content-type, x-requested-with"
        );
    }

    #[test]
    fn omits_allow_headers_that_were_not_requested() {
        let response = preflight_for(&[]);
        assert!(response.headers().get(ACCESS_CONTROL_ALLOW_METHODS).is_none());
        assert!(response.headers().get(ACCESS_CONTROL_ALLOW_HEADERS).is_none());
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[test]
    fn origin_overrides_existing_value() {
        let response = Response::builder()
            .header(ACCESS_CONTROL_ALLOW_ORIGIN, "https://example.com")
            .body(())
            .unwrap();
        let response = allow_any_origin(response);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}
