//! Smoke test for the demo binary: it isn't part of the library's tested
//! surface, but it should still run end-to-end against a mocked registry.

use assert_cmd::Command;
use httpmock::prelude::*;
use predicates::prelude::*;
use serde_json::json;

#[test]
fn demo_binary_warps_an_npm_package_through_a_mocked_registry() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/some-package");
        then.status(200).header("Content-Type", "application/json").json_body(json!({
            "time": {
                "created": "2021-01-01T00:00:00Z",
                "modified": "2023-01-01T00:00:00Z",
                "1.0.0": "2021-06-01T00:00:00Z",
                "2.0.0": "2022-06-01T00:00:00Z",
            },
            "versions": {
                "1.0.0": {},
                "2.0.0": {},
            },
        }));
    });

    Command::cargo_bin("timewarp-registry")
        .unwrap()
        .args([
            "--npm-base-url",
            &server.base_url(),
            "npm",
            "2022-01-01T00:00:00Z",
            &format!("{}/some-package", server.base_url()),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("200 OK"))
        .stdout(predicate::str::contains("\"1.0.0\""));
}
