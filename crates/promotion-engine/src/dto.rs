//! 请求与响应 DTO

use crate::engine::{EvaluationOutcome, round_to};
use crate::error::{FieldError, PromotionError, Result, ValidationIssue};
use crate::loader::LoadSummary;
use crate::metrics_store::MetricsSnapshot;
use crate::models::{PlayerAttributes, PromotionRule, SpendTier, deserialize_integral};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// 促销评估请求
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EvaluatePromotionRequest {
    #[validate(length(min = 1, message = "Player ID is required"))]
    pub player_id: String,

    #[serde(deserialize_with = "deserialize_integral")]
    #[validate(range(min = 1, message = "Level must be a positive integer"))]
    pub level: i64,

    #[validate(length(min = 2, message = "Country code is required"))]
    pub country: String,

    #[validate(custom(
        function = "validate_spend_tier",
        message = "Spend tier must be low, medium, or high"
    ))]
    pub spend_tier: String,

    #[serde(deserialize_with = "deserialize_integral")]
    #[validate(range(min = 0, message = "Days since last purchase must be non-negative"))]
    pub days_since_last_purchase: i64,

    #[validate(range(min = 0.0, message = "Total spent must be non-negative"))]
    pub total_spent: Option<f64>,

    pub game_mode: Option<String>,
}

fn validate_spend_tier(value: &str) -> std::result::Result<(), ValidationError> {
    if SpendTier::parse(value).is_some() {
        Ok(())
    } else {
        Err(ValidationError::new("spend_tier"))
    }
}

impl EvaluatePromotionRequest {
    /// 从原始请求体解析并校验
    pub fn parse(body: &[u8]) -> Result<Self> {
        let request: Self = serde_json::from_slice(body).map_err(|e| {
            PromotionError::InvalidRequest(vec![FieldError::new("body", e.to_string())])
        })?;
        request.validate()?;
        Ok(request)
    }

    /// 转为领域对象，调用前必须已通过校验
    pub fn into_attributes(self) -> Result<PlayerAttributes> {
        let spend_tier = SpendTier::parse(&self.spend_tier).ok_or_else(|| {
            PromotionError::InvalidRequest(vec![FieldError::new(
                "spendTier",
                "Spend tier must be low, medium, or high",
            )])
        })?;

        Ok(PlayerAttributes {
            player_id: self.player_id,
            level: self.level,
            country: self.country,
            spend_tier,
            days_since_last_purchase: self.days_since_last_purchase,
            total_spent: self.total_spent,
            game_mode: self.game_mode,
        })
    }
}

/// 命中时的评估响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionResponse {
    pub promotion: PromotionRule,
    pub matched_rules: Vec<String>,
    pub evaluation_time_ms: f64,
}

impl PromotionResponse {
    /// 未命中时返回 None
    pub fn from_outcome(outcome: EvaluationOutcome) -> Option<Self> {
        let EvaluationOutcome {
            promotion,
            matched_rule_ids,
            evaluation_time_ms,
        } = outcome;

        promotion.map(|promotion| Self {
            promotion,
            matched_rules: matched_rule_ids,
            evaluation_time_ms,
        })
    }
}

/// 指标响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    pub total_requests: u64,
    pub successful_matches: u64,
    pub missed_matches: u64,
    /// 保留三位小数
    pub hit_rate: f64,
    /// 保留一位小数
    pub average_evaluation_time_ms: f64,
    pub uptime: String,
    pub uptime_seconds: u64,
    pub rules_last_reloaded: String,
    pub active_rules: usize,
}

impl From<MetricsSnapshot> for MetricsResponse {
    fn from(snapshot: MetricsSnapshot) -> Self {
        Self {
            total_requests: snapshot.total_requests,
            successful_matches: snapshot.successful_matches,
            missed_matches: snapshot.missed_matches,
            hit_rate: round_to(snapshot.hit_rate, 3),
            average_evaluation_time_ms: round_to(snapshot.average_evaluation_time_ms, 1),
            uptime: snapshot.uptime,
            uptime_seconds: snapshot.uptime_seconds,
            rules_last_reloaded: format_time(snapshot.rules_last_reloaded),
            active_rules: snapshot.active_rules,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadStatus {
    Success,
    Error,
}

/// 重载响应，成功与失败共用同一结构
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadResponse {
    pub status: ReloadStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules_loaded: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reload_time: Option<String>,
    pub validation_errors: Vec<ValidationIssue>,
}

impl ReloadResponse {
    pub fn success(summary: &LoadSummary) -> Self {
        Self {
            status: ReloadStatus::Success,
            message: "Rules reloaded successfully".to_string(),
            rules_loaded: Some(summary.rules_loaded),
            reload_time: Some(format_time(summary.reloaded_at)),
            validation_errors: Vec::new(),
        }
    }

    /// 校验失败列出全部问题；其他故障只给出单条通用问题
    pub fn failure(error: PromotionError) -> Self {
        match error {
            PromotionError::InvalidRules(issues) => Self {
                status: ReloadStatus::Error,
                message: "Rules validation failed".to_string(),
                rules_loaded: None,
                reload_time: None,
                validation_errors: issues,
            },
            other => Self {
                status: ReloadStatus::Error,
                message: other.to_string(),
                rules_loaded: None,
                reload_time: None,
                validation_errors: vec![ValidationIssue::new("", "Failed to reload rules")],
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_rules: usize,
}

fn format_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
