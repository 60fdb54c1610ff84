//! HTTP transport behavior that only makes sense against a real (if local)
//! server: retrying a transient status code and giving up on a 404.

#![cfg(feature = "http")]

use httptest::{matchers::*, responders::*, Expectation, Server};
use std::io::Read;
use trustframe::{ClientSettings, HttpTransport, Transport};
use url::Url;

#[test]
fn retries_a_transient_failure_then_succeeds() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/flaky.json"))
            .times(1)
            .respond_with(status_code(503)),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", "/flaky.json"))
            .times(1)
            .respond_with(status_code(200).body("ok")),
    );

    let settings = ClientSettings { initial_backoff: std::time::Duration::from_millis(1), ..ClientSettings::default() };
    let transport = HttpTransport::from_settings(settings);
    let url = Url::parse(&format!("http://{}/flaky.json", server.addr())).unwrap();

    let mut reader = transport.fetch(url).unwrap();
    let mut body = Vec::new();
    reader.read_to_end(&mut body).unwrap();
    assert_eq!(body, b"ok");
}

#[test]
fn a_404_is_not_found_and_is_not_retried() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/missing.json"))
            .times(1)
            .respond_with(status_code(404)),
    );

    let transport = HttpTransport::new();
    let url = Url::parse(&format!("http://{}/missing.json", server.addr())).unwrap();
    let err = transport.fetch(url).err().unwrap();
    assert!(matches!(err.kind, trustframe::TransportErrorKind::FileNotFound));
}
