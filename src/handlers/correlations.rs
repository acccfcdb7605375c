//! Read-only correlation queries, consumed by the analytics dashboard.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::models::CorrelationRecord;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/correlations/client/{client_id}",
            get(list_client_correlations),
        )
        .route(
            "/correlations/intent/{payment_intent_id}",
            get(get_correlation_by_intent),
        )
}

pub async fn list_client_correlations(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<Json<Vec<CorrelationRecord>>> {
    let conn = state.db.get()?;
    let records = queries::list_correlations_for_client(&conn, &client_id)?;
    Ok(Json(records))
}

pub async fn get_correlation_by_intent(
    State(state): State<AppState>,
    Path(payment_intent_id): Path<String>,
) -> Result<Json<CorrelationRecord>> {
    let conn = state.db.get()?;
    let record = queries::get_correlation_by_intent(&conn, &payment_intent_id)?
        .ok_or_else(|| AppError::NotFound(format!("No correlation for {}", payment_intent_id)))?;
    Ok(Json(record))
}
