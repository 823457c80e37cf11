use {
    std::{collections::HashMap, time::Duration},
    httpmock::prelude::*,
    hyper::{Method, StatusCode},
    serde_json::json,
    counter_common::{HttpRequest, CountBody, IncrementBody, ErrorBody},
    counter_runtime::runtime::{VisitorCounter, config::CosmosConnector},
    crate::store::env,
};


const MASTER_KEY: &str = "dGVzdC1tYXN0ZXIta2V5";
const CONTAINER_PATH: &str = "/dbs/Counter/colls/Visitors";
const DOCUMENT_PATH: &str = "/dbs/Counter/colls/Visitors/docs/1";

fn cosmos_env(server: &MockServer) -> HashMap<String, String> {
    let endpoint = server.base_url();
    env(&[
        ("COSMOS_DB_URL", endpoint.as_str()),
        ("COSMOS_DB_KEY", MASTER_KEY),
    ])
}

fn counter(server: &MockServer) -> VisitorCounter {
    VisitorCounter::new(cosmos_env(server), CosmosConnector::new(Duration::from_secs(5)))
}

fn request(method: Method) -> HttpRequest {
    HttpRequest::new().with_method(method).with_url("/api/http_trigger").unwrap()
}

fn mock_container(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET).path(CONTAINER_PATH);
        then.status(200).json_body(json!({ "id": "Visitors" }));
    });
}

#[test]
fn get_reads_counter_document() {
    let server = MockServer::start();
    mock_container(&server);
    let read = server.mock(|when, then| {
        when.method(GET)
            .path(DOCUMENT_PATH)
            .header("x-ms-documentdb-partitionkey", r#"["1"]"#)
            .header_exists("authorization");
        then.status(200).json_body(json!({ "id": "1", "count": 5, "_etag": "\"etag-1\"" }));
    });

    let response = counter(&server).handle(&request(Method::GET));

    read.assert();
    assert_eq!(StatusCode::OK, response.status);
    assert_eq!(CountBody { count: 5 }, response.json::<CountBody>().unwrap());
}

#[test]
fn get_accepts_whole_float_count() {
    let server = MockServer::start();
    mock_container(&server);
    server.mock(|when, then| {
        when.method(GET).path(DOCUMENT_PATH);
        then.status(200).json_body(json!({ "id": "1", "count": 5.0 }));
    });

    let response = counter(&server).handle(&request(Method::GET));

    assert_eq!(StatusCode::OK, response.status);
    assert_eq!(5, response.json::<CountBody>().unwrap().count);
}

#[test]
fn post_replaces_with_etag_precondition() {
    let server = MockServer::start();
    mock_container(&server);
    server.mock(|when, then| {
        when.method(GET).path(DOCUMENT_PATH);
        then.status(200).json_body(json!({ "id": "1", "count": 5, "_etag": "\"etag-1\"" }));
    });
    let replace = server.mock(|when, then| {
        when.method(PUT)
            .path(DOCUMENT_PATH)
            .header("if-match", "\"etag-1\"")
            .json_body_partial(r#"{ "id": "1", "count": 6 }"#);
        then.status(200).json_body(json!({ "id": "1", "count": 6, "_etag": "\"etag-2\"" }));
    });

    let response = counter(&server).handle(&request(Method::POST));

    replace.assert_hits(1);
    assert_eq!(StatusCode::OK, response.status);
    assert_eq!(IncrementBody::incremented(6), response.json::<IncrementBody>().unwrap());
}

#[test]
fn post_creates_missing_document() {
    let server = MockServer::start();
    mock_container(&server);
    server.mock(|when, then| {
        when.method(GET).path(DOCUMENT_PATH);
        then.status(404).json_body(json!({ "code": "NotFound" }));
    });
    let create = server.mock(|when, then| {
        when.method(POST)
            .path("/dbs/Counter/colls/Visitors/docs")
            .json_body(json!({ "id": "1", "count": 1 }));
        then.status(201).json_body(json!({ "id": "1", "count": 1, "_etag": "\"etag-1\"" }));
    });

    let response = counter(&server).handle(&request(Method::POST));

    create.assert();
    assert_eq!(StatusCode::CREATED, response.status);
    assert_eq!(IncrementBody::created(), response.json::<IncrementBody>().unwrap());
}

#[test]
fn missing_container_returns_not_found() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path(CONTAINER_PATH);
        then.status(404).json_body(json!({ "code": "NotFound" }));
    });
    let read = server.mock(|when, then| {
        when.method(GET).path(DOCUMENT_PATH);
        then.status(200).json_body(json!({ "id": "1", "count": 5 }));
    });

    let counter = counter(&server);
    for method in [Method::GET, Method::POST] {
        let response = counter.handle(&request(method));
        assert_eq!(StatusCode::NOT_FOUND, response.status);
        assert_eq!(ErrorBody::new("Database or container not found."), response.json::<ErrorBody>().unwrap());
    }

    read.assert_hits(0);
}

#[test]
fn rejected_credential_returns_internal_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path(CONTAINER_PATH);
        then.status(401).json_body(json!({ "code": "Unauthorized" }));
    });

    let response = counter(&server).handle(&request(Method::GET));

    assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, response.status);
    assert_eq!(ErrorBody::new("Internal storage error."), response.json::<ErrorBody>().unwrap());
}
