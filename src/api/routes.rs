//! HTTP handlers: health, start, result, cancel

use crate::api::AppState;
use crate::error::{ApiError, Error};
use crate::jobs::{FinishedOutcome, PollOutcome};
use crate::types::{HealthResponse, JobId, JobStatus, JobStatusResponse, StartedResponse, UnlockErrorKind};
use axum::{
    Json,
    extract::{ConnectInfo, Multipart, Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;

/// Declared content type required for uploads
const PDF_MIME: &str = "application/pdf";

/// Fallback name when the upload carries no filename
const DEFAULT_NAME: &str = "document.pdf";

/// Rate-limiting key for a request: first `X-Forwarded-For` entry, else the
/// socket peer address, else "unknown".
fn client_key(headers: &HeaderMap, connect_info: Option<&SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, connect_info) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}

/// Download filename: suffix marker inserted before the extension.
///
/// Quotes are stripped so the Content-Disposition header stays parseable.
fn attachment_filename(original_name: &str) -> String {
    let cleaned: String = original_name
        .chars()
        .filter(|c| *c != '"' && !c.is_control())
        .collect();
    let stem = cleaned
        .strip_suffix(".pdf")
        .or_else(|| cleaned.strip_suffix(".PDF"))
        .unwrap_or(&cleaned);
    if stem.is_empty() {
        return "document-unlocked.pdf".to_string();
    }
    format!("{stem}-unlocked.pdf")
}

/// GET /api/health - Health check
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "system",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse { ok: true })
}

/// GET /api/openapi.json - OpenAPI specification
#[utoipa::path(
    get,
    path = "/api/openapi.json",
    tag = "system",
    responses(
        (status = 200, description = "OpenAPI 3.1 specification in JSON format")
    )
)]
pub async fn openapi_spec() -> impl IntoResponse {
    use crate::api::openapi::ApiDoc;
    use utoipa::OpenApi;

    Json(ApiDoc::openapi())
}

/// POST /api/unlock-pdf/start - Begin an unlock job
///
/// Multipart fields: `file` (the encrypted PDF) and `password`. Responds
/// immediately with the job id; the client polls the result endpoint until
/// a terminal state appears.
#[utoipa::path(
    post,
    path = "/api/unlock-pdf/start",
    tag = "unlock",
    request_body(content = Vec<u8>, description = "Encrypted PDF and password (multipart/form-data)", content_type = "multipart/form-data"),
    responses(
        (status = 202, description = "Job accepted and running", body = StartedResponse),
        (status = 400, description = "File missing or not a PDF", body = ApiError),
        (status = 403, description = "Cross-origin request rejected", body = ApiError),
        (status = 429, description = "Rate or password-failure limit exceeded", body = ApiError),
        (status = 500, description = "Job could not be initialized", body = ApiError)
    )
)]
pub async fn start_unlock(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let client = client_key(&headers, connect_info.as_ref().map(|c| &c.0));

    if !state.limiter.check_and_consume(&client).await {
        tracing::debug!(client = %client, "unlock request rate limited");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ApiError::too_many_requests(
                "Too many unlock requests. Try again later.",
            )),
        )
            .into_response();
    }

    let mut file_bytes: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut declared_type: Option<String> = None;
    let mut password = String::new();

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                if let Some(filename) = field.file_name() {
                    file_name = Some(filename.to_string());
                }
                declared_type = field.content_type().map(|ct| ct.to_string());
                match field.bytes().await {
                    Ok(bytes) => file_bytes = Some(bytes.to_vec()),
                    Err(e) => {
                        return (
                            StatusCode::BAD_REQUEST,
                            Json(ApiError::validation(format!(
                                "Failed to read uploaded file: {e}"
                            ))),
                        )
                            .into_response();
                    }
                }
            }
            "password" => {
                if let Ok(text) = field.text().await {
                    password = text;
                }
            }
            _ => {}
        }
    }

    let Some(file_bytes) = file_bytes else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiError::validation("PDF file is required.")),
        )
            .into_response();
    };

    if declared_type.as_deref() != Some(PDF_MIME) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiError::validation("Only PDF files are allowed.")),
        )
            .into_response();
    }

    if state.failures.has_exceeded(&client).await {
        tracing::debug!(client = %client, "password failure threshold exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ApiError::too_many_requests(
                "Too many incorrect password attempts. Try again later.",
            )),
        )
            .into_response();
    }

    let original_name = file_name.unwrap_or_else(|| DEFAULT_NAME.to_string());

    match state
        .store
        .create(&file_bytes, &original_name, &password, &client)
        .await
    {
        Ok(job_id) => (
            StatusCode::ACCEPTED,
            Json(StartedResponse {
                job_id,
                status: JobStatus::Running,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to initialize unlock job");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::internal("Failed to initialize unlock job.")),
            )
                .into_response()
        }
    }
}

/// GET /api/unlock-pdf/result/{job_id} - Poll a job, streaming the PDF when done
///
/// Terminal responses remove the job and delete its files; a second poll
/// for the same id returns 404.
#[utoipa::path(
    get,
    path = "/api/unlock-pdf/result/{job_id}",
    tag = "unlock",
    params(
        ("job_id" = String, Path, description = "Job identifier from start")
    ),
    responses(
        (status = 200, description = "Decrypted PDF bytes", content_type = "application/pdf"),
        (status = 202, description = "Still working", body = JobStatusResponse),
        (status = 401, description = "Incorrect password", body = ApiError),
        (status = 404, description = "Unknown job", body = ApiError),
        (status = 410, description = "Job was canceled", body = ApiError),
        (status = 500, description = "Unlock failed", body = ApiError)
    )
)]
pub async fn unlock_result(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Response {
    state.store.reap().await;

    let Ok(job_id) = job_id.parse::<JobId>() else {
        // ids we never issued are indistinguishable from expired ones
        return (StatusCode::NOT_FOUND, Json(ApiError::not_found("Unlock job"))).into_response();
    };

    let finished = match state.store.poll(job_id).await {
        PollOutcome::NotFound => return Error::JobNotFound(job_id).into_response(),
        PollOutcome::Running => {
            return (
                StatusCode::ACCEPTED,
                Json(JobStatusResponse {
                    status: JobStatus::Running,
                }),
            )
                .into_response();
        }
        PollOutcome::Finished(finished) => finished,
    };

    match &finished.outcome {
        FinishedOutcome::Done => {
            let bytes = tokio::fs::read(&finished.output_path).await;
            let filename = attachment_filename(&finished.original_name);
            finished.cleanup().await;

            match bytes {
                Ok(bytes) if !bytes.is_empty() => (
                    StatusCode::OK,
                    [
                        (header::CONTENT_TYPE, PDF_MIME.to_string()),
                        (
                            header::CONTENT_DISPOSITION,
                            format!("attachment; filename=\"{filename}\""),
                        ),
                    ],
                    bytes,
                )
                    .into_response(),
                Ok(_) | Err(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiError::internal("Failed to unlock PDF.")),
                )
                    .into_response(),
            }
        }
        FinishedOutcome::Canceled => {
            finished.cleanup().await;
            (StatusCode::GONE, Json(ApiError::gone("Unlock canceled."))).into_response()
        }
        FinishedOutcome::Failed { kind, message } => {
            let response = match kind {
                UnlockErrorKind::IncorrectPassword => (
                    StatusCode::UNAUTHORIZED,
                    Json(ApiError::unauthorized(message.clone())),
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiError::new(kind.as_str(), message.clone())),
                ),
            };
            finished.cleanup().await;
            response.into_response()
        }
    }
}

/// POST /api/unlock-pdf/cancel/{job_id} - Cancel a running job
///
/// Canceling a terminal job is a no-op acknowledgment carrying its current
/// status.
#[utoipa::path(
    post,
    path = "/api/unlock-pdf/cancel/{job_id}",
    tag = "unlock",
    params(
        ("job_id" = String, Path, description = "Job identifier from start")
    ),
    responses(
        (status = 200, description = "Current or canceled status", body = JobStatusResponse),
        (status = 404, description = "Unknown job", body = ApiError)
    )
)]
pub async fn cancel_unlock(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Response {
    let Ok(job_id) = job_id.parse::<JobId>() else {
        // ids we never issued are indistinguishable from expired ones
        return (StatusCode::NOT_FOUND, Json(ApiError::not_found("Unlock job"))).into_response();
    };

    match state.store.cancel(job_id).await {
        None => Error::JobNotFound(job_id).into_response(),
        Some(status) => (StatusCode::OK, Json(JobStatusResponse { status })).into_response(),
    }
}
