//! OpenAPI documentation for the unlock API

use utoipa::OpenApi;

/// OpenAPI document covering every route the router exposes
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::start_unlock,
        crate::api::routes::unlock_result,
        crate::api::routes::cancel_unlock,
    ),
    components(schemas(
        crate::types::JobId,
        crate::types::JobStatus,
        crate::types::UnlockErrorKind,
        crate::types::StartedResponse,
        crate::types::JobStatusResponse,
        crate::types::HealthResponse,
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "system", description = "Health and documentation"),
        (name = "unlock", description = "PDF unlock job lifecycle")
    ),
    info(
        title = "pdf-unlock-backend API",
        description = "Asynchronous start/poll/cancel API around qpdf password removal",
        license(name = "MIT OR Apache-2.0")
    )
)]
pub struct ApiDoc;
