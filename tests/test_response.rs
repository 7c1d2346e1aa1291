use tollgate::http::response::{Response, ResponseBuilder, StatusCode};

#[test]
fn test_status_code_as_u16() {
    assert_eq!(StatusCode::OK.as_u16(), 200);
    assert_eq!(StatusCode::PERMANENT_REDIRECT.as_u16(), 308);
    assert_eq!(StatusCode::BAD_REQUEST.as_u16(), 400);
    assert_eq!(StatusCode::BAD_GATEWAY.as_u16(), 502);
}

#[test]
fn test_status_code_reason_phrase() {
    assert_eq!(StatusCode::OK.reason_phrase(), "OK");
    assert_eq!(
        StatusCode::PERMANENT_REDIRECT.reason_phrase(),
        "Permanent Redirect"
    );
    assert_eq!(StatusCode::BAD_GATEWAY.reason_phrase(), "Bad Gateway");
    assert_eq!(StatusCode::from_u16(599).unwrap().reason_phrase(), "");
}

#[test]
fn test_status_code_range() {
    assert!(StatusCode::from_u16(99).is_none());
    assert!(StatusCode::from_u16(1000).is_none());
    assert!(StatusCode::from_u16(100).is_some());
}

#[test]
fn test_status_code_bodyless() {
    assert!(StatusCode::NO_CONTENT.is_bodyless());
    assert!(StatusCode::NOT_MODIFIED.is_bodyless());
    assert!(StatusCode::from_u16(101).unwrap().is_bodyless());
    assert!(!StatusCode::OK.is_bodyless());
}

#[test]
fn test_response_builder_auto_content_length() {
    let body = b"This is the body".to_vec();
    let response = ResponseBuilder::new(StatusCode::OK).body(body.clone()).build();

    assert_eq!(
        response.headers.get("Content-Length").unwrap(),
        body.len().to_string()
    );
}

#[test]
fn test_response_builder_preserves_custom_content_length() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .header("Content-Length", "999")
        .body(b"test".to_vec())
        .build();

    assert_eq!(response.headers.get("Content-Length").unwrap(), "999");
    assert_eq!(response.headers.len(), 1);
}

#[test]
fn test_response_builder_header_replaces() {
    let response = ResponseBuilder::new(StatusCode::OK)
        .header("X-Custom", "one")
        .header("x-custom", "two")
        .build();

    assert_eq!(response.headers.get_all("X-Custom").collect::<Vec<_>>(), vec!["two"]);
}

#[test]
fn test_permanent_redirect_helper() {
    let response = Response::permanent_redirect("https://example.com/something");

    assert_eq!(response.status, StatusCode::PERMANENT_REDIRECT);
    assert_eq!(
        response.headers.get("Location"),
        Some("https://example.com/something")
    );
    assert_eq!(response.headers.get("Content-Length"), Some("0"));
    assert!(response.body.is_empty());
}

#[test]
fn test_bad_gateway_helper() {
    let response = Response::bad_gateway();

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert_eq!(response.body, b"Upstream error\n".to_vec());
}
