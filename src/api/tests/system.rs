use super::*;

#[tokio::test]
async fn health_reports_ok() {
    let (app, _dir) = test_router("exit 0");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["ok"], true);
}

#[tokio::test]
async fn security_headers_set_on_every_response() {
    let (app, _dir) = test_router("exit 0");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(
        headers.get("x-content-type-options").unwrap(),
        "nosniff"
    );
    assert_eq!(
        headers.get("referrer-policy").unwrap(),
        "strict-origin-when-cross-origin"
    );
    assert_eq!(
        headers.get("cross-origin-resource-policy").unwrap(),
        "same-origin"
    );
}

#[tokio::test]
async fn openapi_document_is_served() {
    let (app, _dir) = test_router("exit 0");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json["paths"]["/api/unlock-pdf/start"].is_object());
}

#[tokio::test]
async fn cross_origin_start_is_rejected() {
    let (app, _dir) = test_router("exit 0");

    let mut request = start_request(
        Some(("test.pdf", "application/pdf", b"%PDF")),
        "pw",
        "origin-test",
    );
    request
        .headers_mut()
        .insert("origin", "https://evil.example".parse().unwrap());
    request
        .headers_mut()
        .insert("host", "unlock.example".parse().unwrap());

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = body_json(response).await;
    assert_eq!(json["error"]["message"], "Origin not allowed.");
}

#[tokio::test]
async fn matching_origin_is_allowed_through() {
    let (app, _dir) = test_router("exit 0");

    // no file field: the request must get past the origin check and fail
    // on validation instead
    let mut request = start_request(None, "pw", "origin-test");
    request
        .headers_mut()
        .insert("origin", "https://unlock.example".parse().unwrap());
    request
        .headers_mut()
        .insert("host", "unlock.example".parse().unwrap());

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unparseable_origin_is_rejected() {
    let (app, _dir) = test_router("exit 0");

    let mut request = start_request(None, "pw", "origin-test");
    request
        .headers_mut()
        .insert("origin", "null".parse().unwrap());

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let json = body_json(response).await;
    assert_eq!(json["error"]["message"], "Invalid request origin.");
}

#[tokio::test]
async fn origin_check_ignores_health() {
    let (app, _dir) = test_router("exit 0");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .header("origin", "https://anywhere.example")
                .header("host", "unlock.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
