#![allow(dead_code)]
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;

use crate::database::Database;
use crate::screener::Screener;
use crate::types::{ScreeningSnapshot, TimeFrame};

/// Shared state for the minimal HTTP surface (§A.6): a health probe, an
/// on-demand screening pass, and a read of the latest persisted survivors.
/// No dashboard, no websockets, no notification transport live here.
#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<Database>,
    pub screener: Arc<Screener>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/screen", post(screen))
        .route("/top-opportunities", get(top_opportunities))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
struct ScreenParams {
    timeframe: Option<String>,
}

async fn screen(State(state): State<ApiState>, Query(params): Query<ScreenParams>) -> Result<Json<Vec<ScreeningSnapshot>>, ApiError> {
    let timeframe = parse_timeframe(params.timeframe.as_deref())?;
    let survivors = state.screener.run_pass(timeframe).await.map_err(ApiError)?;
    Ok(Json(survivors))
}

#[derive(Debug, Deserialize)]
struct TopOpportunitiesParams {
    timeframe: Option<String>,
    min_score: Option<Decimal>,
    limit: Option<i64>,
}

async fn top_opportunities(State(state): State<ApiState>, Query(params): Query<TopOpportunitiesParams>) -> Result<Json<Vec<ScreeningSnapshot>>, ApiError> {
    let timeframe = parse_timeframe(params.timeframe.as_deref())?;
    let rows = state
        .db
        .top_opportunities(timeframe, params.min_score, params.limit.unwrap_or(20))
        .await
        .map_err(ApiError)?;
    Ok(Json(rows))
}

fn parse_timeframe(raw: Option<&str>) -> Result<TimeFrame, ApiError> {
    let raw = raw.unwrap_or("15m");
    TimeFrame::from_str(raw).ok_or_else(|| ApiError(crate::error::AppError::Validation(format!("unknown timeframe: {raw}"))))
}

struct ApiError(crate::error::AppError);

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        use crate::error::AppError;
        let status = match &self.0 {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NoMarketData => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.0.to_string()).into_response()
    }
}
