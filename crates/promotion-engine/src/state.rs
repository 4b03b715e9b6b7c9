//! 应用状态
//!
//! 所有共享组件在入口处显式构造后注入路由，不使用全局单例。

use crate::engine::PromotionEngine;
use crate::loader::{FileRuleSource, RuleLoader, RuleSource};
use crate::metrics_store::MetricsStore;
use crate::store::RuleStore;
use promotion_shared::config::AppConfig;
use std::sync::Arc;

/// Axum 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub store: RuleStore,
    pub metrics: Arc<MetricsStore>,
    pub engine: Arc<PromotionEngine>,
    pub loader: Arc<RuleLoader>,
}

impl AppState {
    pub fn new(store: RuleStore, metrics: Arc<MetricsStore>, source: Arc<dyn RuleSource>) -> Self {
        let engine = Arc::new(PromotionEngine::new(Arc::new(store.clone()), metrics.clone()));
        let loader = Arc::new(RuleLoader::new(store.clone(), source));
        Self {
            store,
            metrics,
            engine,
            loader,
        }
    }

    /// 按配置构造：规则从 `rules.path` 读取，耗时窗口容量取 `metrics_window.capacity`
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            RuleStore::new(),
            Arc::new(MetricsStore::with_capacity(config.metrics_window.capacity)),
            Arc::new(FileRuleSource::new(&config.rules.path)),
        )
    }
}
