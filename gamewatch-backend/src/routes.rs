use crate::AppState;
use crate::error::AppError;
use crate::validation;

use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use axum_macros::debug_handler;
use gamewatch_core::StatusRecord;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
pub(crate) struct StatusParams {
    addresses: Option<String>,
}

#[derive(Serialize)]
pub(crate) struct ResolveResponse {
    servers: Vec<StatusRecord>,
}

/// `GET /`: resolve `?addresses=type:ip:port,...` on demand, or return the
/// background snapshot when no addresses are given.
#[debug_handler]
pub(crate) async fn status(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatusParams>,
) -> Result<Response, AppError> {
    let Some(raw) = params.addresses else {
        let snapshot = state.snapshot.read();
        return Ok(Json(&*snapshot).into_response());
    };

    let servers = validation::parse_addresses(&raw, state.max_addresses_per_request)?;
    let records = state.aggregator.resolve_all(&servers).await;

    Ok(Json(ResolveResponse { servers: records }).into_response())
}
