//! 促销规则引擎
//!
//! 从外部规则文档中为玩家挑选最合适的促销：
//! - YAML/JSON 规则文档的解析、结构校验与原子热加载
//! - 按优先级的条件匹配与过期判断
//! - 评估次数、命中率与耗时窗口统计
//! - REST 接口

pub mod dto;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod handlers;
pub mod loader;
pub mod metrics_store;
pub mod models;
pub mod operators;
pub mod routes;
pub mod state;
pub mod store;
pub mod watcher;

pub use engine::{EvaluationOutcome, PromotionEngine};
pub use error::{FieldError, PromotionError, Result, ValidationIssue};
pub use evaluator::ConditionEvaluator;
pub use loader::{FileRuleSource, LoadSummary, RuleLoader, RuleSource, parse_document};
pub use metrics_store::{MetricsSnapshot, MetricsStore};
pub use models::{
    ConditionValue, PlayerAttributes, PlayerField, PromotionRule, Reward, RuleCondition,
    RulesDocument, SpendTier,
};
pub use operators::Operator;
pub use state::AppState;
pub use store::{RuleProvider, RuleSet, RuleStore};
pub use watcher::{FileRuleWatcher, RuleWatcher};
