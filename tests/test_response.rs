use courier::http::response::{Response, ResponseBuilder, StatusCode};
use courier::http::service::{Body, Reply};

#[test]
fn test_status_code_as_u16() {
    assert_eq!(StatusCode::Ok.as_u16(), 200);
    assert_eq!(StatusCode::NoContent.as_u16(), 204);
    assert_eq!(StatusCode::BadRequest.as_u16(), 400);
    assert_eq!(StatusCode::RequestTimeout.as_u16(), 408);
    assert_eq!(StatusCode::InternalServerError.as_u16(), 500);
    assert_eq!(StatusCode::NotImplemented.as_u16(), 501);
}

#[test]
fn test_status_code_reason_phrase() {
    assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    assert_eq!(StatusCode::NotFound.reason_phrase(), "Not Found");
    assert_eq!(StatusCode::RequestTimeout.reason_phrase(), "Request Timeout");
    assert_eq!(
        StatusCode::ServiceUnavailable.reason_phrase(),
        "Service Unavailable"
    );
}

#[test]
fn test_response_builder_with_headers() {
    let response = ResponseBuilder::new(StatusCode::Ok)
        .header("Content-Type", "text/plain")
        .header("X-Custom", "value")
        .build();

    assert_eq!(response.header("content-type"), Some("text/plain"));
    assert_eq!(response.header("X-Custom"), Some("value"));
    // The write path decides the framing, the builder does not.
    assert_eq!(response.content_length(), None);
}

#[test]
fn test_set_header_replaces_regardless_of_case() {
    let mut response = Response::new(StatusCode::Ok);
    response.set_header("content-type", "text/plain");
    response.set_header("Content-Type", "application/json");

    assert_eq!(response.headers.len(), 1);
    assert_eq!(response.header("CONTENT-TYPE"), Some("application/json"));
}

#[test]
fn test_content_length_and_chunked_are_exclusive() {
    let mut response = ResponseBuilder::new(StatusCode::Ok).content_length(12).build();
    assert_eq!(response.content_length(), Some(12));
    assert!(!response.is_chunked());

    response.set_chunked();
    assert_eq!(response.content_length(), None);
    assert!(response.is_chunked());

    response.set_content_length(3);
    assert_eq!(response.content_length(), Some(3));
    assert!(!response.is_chunked());
}

#[test]
fn test_wants_close() {
    let response = ResponseBuilder::new(StatusCode::Ok)
        .header("Connection", "Close")
        .build();

    assert!(response.wants_close());
    assert!(!Response::new(StatusCode::Ok).wants_close());
}

#[test]
fn test_reply_ok_declares_length() {
    let reply = Reply::ok("test content");

    assert_eq!(reply.response.status, StatusCode::Ok);
    assert_eq!(reply.response.content_length(), Some(12));
    match reply.body {
        Body::Full(bytes) => assert_eq!(&bytes[..], b"test content"),
        Body::Stream(_) => panic!("expected a full body"),
    }
}

#[test]
fn test_reply_not_found_helper() {
    let reply = Reply::not_found();

    assert_eq!(reply.response.status, StatusCode::NotFound);
    assert_eq!(reply.response.content_length(), Some(13));
}

#[test]
fn test_reply_internal_error_helper() {
    let reply = Reply::internal_error();

    assert_eq!(reply.response.status, StatusCode::InternalServerError);
}
