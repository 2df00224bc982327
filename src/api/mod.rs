use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::controller::Controller;
use crate::error::ControllerError;

#[derive(Clone)]
pub struct ApiState {
    pub controller: Arc<Controller>,
}

#[derive(Serialize)]
struct PipelineResponse {
    id: u64,
    owner: Option<String>,
    unassigned_secs: Option<u64>,
}

#[derive(Serialize)]
struct SynchronizerPipelinesResponse {
    id: String,
    pipelines: Vec<u64>,
}

#[derive(Deserialize)]
struct RegisterRequest {
    id: String,
}

#[derive(Serialize)]
struct ActionResponse {
    success: bool,
    error: Option<String>,
}

impl ActionResponse {
    fn ok() -> Json<Self> {
        Json(Self {
            success: true,
            error: None,
        })
    }
}

/// Maps controller errors onto HTTP statuses: unknown IDs are 404, anything
/// a synchronizer did wrong is 502.
pub struct ApiError(ControllerError);

impl From<ControllerError> for ApiError {
    fn from(e: ControllerError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_not_found() {
            StatusCode::NOT_FOUND
        } else if self.0.is_remote() {
            StatusCode::BAD_GATEWAY
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (
            status,
            Json(ActionResponse {
                success: false,
                error: Some(self.0.to_string()),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/pipelines", get(list_pipelines_handler))
        .route("/api/synchronizers", post(register_handler))
        .route("/api/synchronizers/:id", delete(unregister_handler))
        .route("/api/synchronizers/:id/pipelines", get(synchronizer_pipelines_handler))
        .route(
            "/api/synchronizers/:id/pipelines/:pipeline_id/assign",
            post(assign_handler),
        )
        .route(
            "/api/synchronizers/:id/pipelines/:pipeline_id/revoke",
            post(revoke_handler),
        )
        .route(
            "/api/synchronizers/:id/pipelines/:pipeline_id/release",
            post(release_handler),
        )
        .route(
            "/api/synchronizers/:id/subscribers/:subscriber_id",
            post(register_subscriber_handler).delete(unregister_subscriber_handler),
        )
        .layer(cors)
        .with_state(state)
}

/// Serve the admin API until `shutdown` is cancelled.
pub async fn run_api(addr: SocketAddr, state: ApiState, shutdown: CancellationToken) {
    let app = router(state);

    tracing::info!(addr = %addr, "Starting admin API");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind admin API");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
    {
        tracing::error!(error = %e, "Admin API failed");
    }
}

async fn status_handler(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.controller.status().await)
}

async fn list_pipelines_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let pipelines: Vec<PipelineResponse> = state
        .controller
        .pipelines()
        .pipelines()
        .await
        .into_iter()
        .map(|p| PipelineResponse {
            id: p.id,
            unassigned_secs: p.unassigned_for().map(|d| d.as_secs()),
            owner: p.owner,
        })
        .collect();

    Json(pipelines)
}

async fn register_handler(
    State(state): State<ApiState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<Response> {
    if payload.id.trim().is_empty() {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(ActionResponse {
                success: false,
                error: Some("synchronizer id must not be empty".to_string()),
            }),
        )
            .into_response());
    }
    let synchronizer = state.controller.register(&payload.id).await?;
    Ok((StatusCode::CREATED, Json(synchronizer)).into_response())
}

async fn unregister_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.controller.unregister(&id).await?;
    Ok(ActionResponse::ok())
}

async fn synchronizer_pipelines_handler(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let pipelines = state.controller.get_pipelines(&id).await?;
    Ok(Json(SynchronizerPipelinesResponse { id, pipelines }))
}

async fn assign_handler(
    State(state): State<ApiState>,
    Path((id, pipeline_id)): Path<(String, u64)>,
) -> ApiResult<impl IntoResponse> {
    state.controller.assign_pipeline(&id, pipeline_id).await?;
    Ok((StatusCode::ACCEPTED, ActionResponse::ok()))
}

async fn revoke_handler(
    State(state): State<ApiState>,
    Path((id, pipeline_id)): Path<(String, u64)>,
) -> ApiResult<impl IntoResponse> {
    state.controller.revoke_pipeline(&id, pipeline_id).await?;
    Ok(ActionResponse::ok())
}

async fn release_handler(
    State(state): State<ApiState>,
    Path((id, pipeline_id)): Path<(String, u64)>,
) -> ApiResult<impl IntoResponse> {
    state.controller.release_pipeline(&id, pipeline_id).await?;
    Ok(ActionResponse::ok())
}

async fn register_subscriber_handler(
    State(state): State<ApiState>,
    Path((id, subscriber_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    state
        .controller
        .register_subscriber(&id, &subscriber_id)
        .await?;
    Ok(ActionResponse::ok())
}

async fn unregister_subscriber_handler(
    State(state): State<ApiState>,
    Path((id, subscriber_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    state
        .controller
        .unregister_subscriber(&id, &subscriber_id)
        .await?;
    Ok(ActionResponse::ok())
}
