use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    routing::{get, post},
};
use std::sync::Arc;

use super::protocol::{
    BackupRequest, BackupResponse, ENDPOINT_BACKUP, ENDPOINT_MEMBERSHIP, ENDPOINT_OPERATION,
    ENDPOINT_STATS, ExecuteRequest, ExecuteResponse, MembershipRequest, MembershipResponse,
    StatsResponse,
};
use super::service::OperationService;

/// Internal HTTP surface of a node.
pub fn node_router(service: Arc<OperationService>) -> Router {
    Router::new()
        .route(ENDPOINT_OPERATION, post(handle_operation))
        .route(ENDPOINT_BACKUP, post(handle_backup))
        .route(ENDPOINT_MEMBERSHIP, post(handle_membership))
        .route(ENDPOINT_STATS, get(handle_stats))
        .layer(Extension(service))
}

/// Runs a forwarded operation as owner. Domain failures travel in the body with `200 OK`.
pub async fn handle_operation(
    Extension(service): Extension<Arc<OperationService>>,
    Json(req): Json<ExecuteRequest>,
) -> (StatusCode, Json<ExecuteResponse>) {
    let kind = req.op.kind().label();
    let name = req.op.name().to_string();

    let outcome = service.execute_as_owner(req.op).await;
    if let Err(e) = &outcome {
        tracing::debug!("Forwarded {} on '{}' failed: {}", kind, name, e);
    }

    (StatusCode::OK, Json(ExecuteResponse { outcome }))
}

pub async fn handle_backup(
    Extension(service): Extension<Arc<OperationService>>,
    Json(req): Json<BackupRequest>,
) -> (StatusCode, Json<BackupResponse>) {
    let label = req.op.kind.label();

    match service.apply_backup(req.op).await {
        Ok(applied) => (
            StatusCode::OK,
            Json(BackupResponse {
                applied,
                error: None,
            }),
        ),
        Err(e) => {
            tracing::warn!("Failed to apply {}: {}", label, e);
            (
                StatusCode::OK,
                Json(BackupResponse {
                    applied: false,
                    error: Some(e),
                }),
            )
        }
    }
}

pub async fn handle_membership(
    Extension(service): Extension<Arc<OperationService>>,
    Json(req): Json<MembershipRequest>,
) -> (StatusCode, Json<MembershipResponse>) {
    let membership = service.router().membership();
    let changed = membership.apply(req.event);
    if changed {
        tracing::info!("Membership changed, epoch is now {}", membership.epoch());
    }

    (
        StatusCode::OK,
        Json(MembershipResponse {
            changed,
            epoch: membership.epoch(),
        }),
    )
}

pub async fn handle_stats(
    Extension(service): Extension<Arc<OperationService>>,
) -> (StatusCode, Json<StatsResponse>) {
    (StatusCode::OK, Json(service.stats()))
}
