//! HTTP 处理器

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{info, instrument, warn};

use crate::dto::{
    EvaluatePromotionRequest, HealthResponse, MetricsResponse, PromotionResponse, ReloadResponse,
};
use crate::error::Result;
use crate::state::AppState;

/// 评估促销
///
/// POST /promotion
///
/// 命中返回 200，未命中返回 204 且无响应体。
#[instrument(skip(state, body))]
pub async fn evaluate_promotion(State(state): State<AppState>, body: Bytes) -> Result<Response> {
    let attributes = EvaluatePromotionRequest::parse(&body)?.into_attributes()?;
    let outcome = state.engine.evaluate(&attributes)?;

    Ok(match PromotionResponse::from_outcome(outcome) {
        Some(response) => Json(response).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// 获取评估指标
///
/// GET /metrics
pub async fn get_metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    let rules = state.store.snapshot();
    Json(state.metrics.snapshot(&rules).into())
}

/// 重置评估指标
///
/// POST /metrics/reset
pub async fn reset_metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    state.metrics.reset();
    get_metrics(State(state)).await
}

/// 重新加载规则文档
///
/// POST /reload
#[instrument(skip(state))]
pub async fn reload_rules(State(state): State<AppState>) -> (StatusCode, Json<ReloadResponse>) {
    match state.loader.reload().await {
        Ok(summary) => {
            info!(rules_loaded = summary.rules_loaded, "规则手动重载成功");
            (StatusCode::OK, Json(ReloadResponse::success(&summary)))
        }
        Err(e) => {
            warn!(error = %e, "规则手动重载失败");
            (e.status_code(), Json(ReloadResponse::failure(e)))
        }
    }
}

/// 健康检查
///
/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        active_rules: state.store.len(),
    })
}
