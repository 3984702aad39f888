//! Dividend query endpoint.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use taopulse_core::{DividendQuery, RequestId, SubnetId};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Query string of `GET /api/v1/tao_dividends`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DividendParams {
    pub netuid: Option<SubnetId>,
    pub hotkey: Option<String>,
    #[serde(default)]
    pub trade: bool,
}

impl From<DividendParams> for DividendQuery {
    fn from(params: DividendParams) -> Self {
        DividendQuery {
            subnet_id: params.netuid,
            account: params.hotkey,
            trigger_action: params.trade,
        }
    }
}

/// GET /api/v1/tao_dividends
///
/// Returns the dividends for the subnet (and hotkey, if given). With
/// `trade=true` the response also carries the stake adjustment outcome.
pub async fn get_dividends(
    State(state): State<AppState>,
    params: Result<Query<DividendParams>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(params) = params.map_err(|e| ApiError::invalid_input(e.body_text()))?;
    let request_id = RequestId::generate();

    let response = state
        .engine
        .query_as(request_id.clone(), params.into())
        .await?;

    Ok(([("x-request-id", request_id.to_string())], Json(response)))
}
