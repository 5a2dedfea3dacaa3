use super::{create_router, AppState};
use crate::config::Config;
use crate::runner::QpdfRunner;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

mod system;

/// Multipart boundary used by every test upload
const BOUNDARY: &str = "unlock-test-boundary-7MA4YWxkTrZu0gW";

/// Write an executable shell script standing in for qpdf.
///
/// Scripts receive `--password=<pw> --decrypt <input> <output>`.
fn fake_tool(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-qpdf");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
    }
    path
}

/// Router backed by a fake qpdf with the given script body.
///
/// The TempDir keeps the script alive for the duration of the test.
fn test_router_with(config: Config, tool_body: &str) -> (Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let tool = fake_tool(dir.path(), tool_body);
    let state = AppState::new(Arc::new(config), Arc::new(QpdfRunner::new(tool)));
    (create_router(state), dir)
}

fn test_router(tool_body: &str) -> (Router, tempfile::TempDir) {
    test_router_with(Config::default(), tool_body)
}

/// Build a multipart start request.
///
/// `file` is `(filename, declared content type, bytes)`; `client` becomes
/// the X-Forwarded-For header so tests can pick their rate-limit key.
fn start_request(file: Option<(&str, &str, &[u8])>, password: &str, client: &str) -> Request<Body> {
    let mut body: Vec<u8> = Vec::new();

    if let Some((filename, content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"password\"\r\n\r\n{password}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/unlock-pdf/start")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header("x-forwarded-for", client)
        .body(Body::from(body))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Start a job and return its id, asserting the 202 contract.
async fn start_job(app: &Router, file_bytes: &[u8], password: &str, client: &str) -> String {
    let response = app
        .clone()
        .oneshot(start_request(
            Some(("test.pdf", "application/pdf", file_bytes)),
            password,
            client,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["status"], "running");
    json["jobId"].as_str().unwrap().to_string()
}

/// Poll the result endpoint until it stops answering 202.
async fn poll_until_terminal(app: &Router, job_id: &str) -> axum::response::Response {
    for _ in 0..200 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/unlock-pdf/result/{job_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        if response.status() != StatusCode::ACCEPTED {
            return response;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} never reached a terminal state");
}
