use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::Extension;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::api::errors::{ApiError, INVALID_SPEND_MESSAGE};
use crate::engine::PointsService;
use crate::models::{Balances, SpendRequest, SpendingDetail, Transaction};
use crate::storage::LedgerStore;

/// Routes for the points ledger, backed by `service`.
pub fn router<S: LedgerStore>(service: Arc<PointsService<S>>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/balance", get(balance::<S>))
        .route("/transactions", post(add_transaction::<S>))
        .route("/spend", post(spend_points::<S>))
        .layer(Extension(service))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "Healthy"
}

async fn balance<S: LedgerStore>(
    Extension(service): Extension<Arc<PointsService<S>>>
) -> Result<Json<Balances>, ApiError> {
    Ok(Json(service.balance().await?))
}

async fn add_transaction<S: LedgerStore>(
    Extension(service): Extension<Arc<PointsService<S>>>,
    payload: Result<Json<Transaction>, JsonRejection>
) -> Result<Json<Transaction>, ApiError> {
    let Json(transaction) = payload.map_err(|rejection| {
        warn!("Rejected transaction body: {rejection}");
        ApiError::InvalidRequest(rejection.body_text())
    })?;

    if transaction.points == 0 {
        return Err(ApiError::InvalidRequest("points must be non-zero".to_string()));
    }

    service.add(&transaction).await?;

    Ok(Json(transaction))
}

async fn spend_points<S: LedgerStore>(
    Extension(service): Extension<Arc<PointsService<S>>>,
    payload: Result<Json<SpendRequest>, JsonRejection>
) -> Result<Json<Vec<SpendingDetail>>, ApiError> {
    let request = match payload {
        Ok(Json(request)) if request.points > 0 => request,
        Ok(Json(request)) => {
            warn!("Rejected spend of [{}] points", request.points);
            return Err(ApiError::InvalidRequest(INVALID_SPEND_MESSAGE.to_string()));
        }
        Err(rejection) => {
            warn!("Rejected spend body: {rejection}");
            return Err(ApiError::InvalidRequest(INVALID_SPEND_MESSAGE.to_string()));
        }
    };

    Ok(Json(service.spend(request.points).await?))
}
