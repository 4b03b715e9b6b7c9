//! 路由配置

use axum::{
    Router, middleware,
    routing::{get, post},
};
use promotion_shared::observability::middleware as obs_middleware;
use tower_http::cors::CorsLayer;

use crate::{handlers, state::AppState};

/// 业务路由，根路径与 `/api` 下各挂一份
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/promotion", post(handlers::evaluate_promotion))
        .route("/metrics", get(handlers::get_metrics))
        .route("/metrics/reset", post(handlers::reset_metrics))
        .route("/reload", post(handlers::reload_rules))
        .route("/health", get(handlers::health))
}

/// 构建完整应用路由
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api_routes())
        .nest("/api", api_routes())
        // 文档页面在浏览器中直接调用接口
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state)
}
