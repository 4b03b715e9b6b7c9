//! 促销评估引擎
//!
//! 按优先级从高到低遍历规则，返回第一条条件全部满足且未过期的规则。

use crate::error::Result;
use crate::evaluator::ConditionEvaluator;
use crate::metrics_store::MetricsStore;
use crate::models::{PlayerAttributes, PromotionRule};
use crate::store::RuleProvider;
use chrono::{DateTime, Utc};
use promotion_shared::observability::metrics;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, instrument};

/// 单次评估结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationOutcome {
    pub promotion: Option<PromotionRule>,
    /// 条件全部通过的规则（含已过期被跳过的），按评估顺序
    #[serde(rename = "matchedRules")]
    pub matched_rule_ids: Vec<String>,
    /// 保留一位小数
    pub evaluation_time_ms: f64,
}

impl EvaluationOutcome {
    pub fn is_match(&self) -> bool {
        self.promotion.is_some()
    }
}

/// 评估引擎
pub struct PromotionEngine {
    rules: Arc<dyn RuleProvider>,
    metrics: Arc<MetricsStore>,
}

impl PromotionEngine {
    pub fn new(rules: Arc<dyn RuleProvider>, metrics: Arc<MetricsStore>) -> Self {
        Self { rules, metrics }
    }

    pub fn evaluate(&self, attributes: &PlayerAttributes) -> Result<EvaluationOutcome> {
        self.evaluate_at(attributes, Utc::now())
    }

    /// 以指定时间判断规则是否过期
    #[instrument(skip(self, attributes), fields(player_id = %attributes.player_id))]
    pub fn evaluate_at(
        &self,
        attributes: &PlayerAttributes,
        now: DateTime<Utc>,
    ) -> Result<EvaluationOutcome> {
        let started = Instant::now();

        // 读取失败也要计入总请求和未命中，再把错误抛出
        let rule_set = match self.rules.current() {
            Ok(rule_set) => rule_set,
            Err(e) => {
                let elapsed = started.elapsed();
                self.metrics
                    .record_evaluation(false, elapsed.as_secs_f64() * 1000.0);
                metrics::record_promotion_evaluation("error", elapsed.as_secs_f64());
                error!(error = %e, "读取规则集失败");
                return Err(e);
            }
        };

        // 稳定排序，同优先级保持安装顺序
        let mut ordered: Vec<&PromotionRule> = rule_set.rules.iter().collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut matched_rule_ids = Vec::new();
        let mut promotion = None;

        for rule in ordered {
            if !ConditionEvaluator::matches_all(&rule.conditions, attributes) {
                continue;
            }

            matched_rule_ids.push(rule.id.clone());

            if rule.is_expired_at(now) {
                debug!(rule_id = %rule.id, valid_until = ?rule.valid_until, "规则已过期，跳过");
                continue;
            }

            promotion = Some(rule.clone());
            break;
        }

        let elapsed = started.elapsed();
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let matched = promotion.is_some();

        self.metrics.record_evaluation(matched, elapsed_ms);
        metrics::record_promotion_evaluation(
            if matched { "matched" } else { "missed" },
            elapsed.as_secs_f64(),
        );

        debug!(
            matched,
            promotion_id = promotion.as_ref().map(|r| r.id.as_str()),
            matched_rules = matched_rule_ids.len(),
            "促销评估完成"
        );

        Ok(EvaluationOutcome {
            promotion,
            matched_rule_ids,
            evaluation_time_ms: round_to(elapsed_ms, 1),
        })
    }
}

/// 四舍五入到指定小数位
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
