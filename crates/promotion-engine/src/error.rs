//! 促销引擎错误类型

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// 请求参数的单字段校验错误
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// 规则文档的校验问题
///
/// `path` 为点分字段路径，如 `rules.0.priority`；解析错误时 `line` 为解析器给出的行号。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    #[serde(rename = "field")]
    pub path: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            line: None,
        }
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

#[derive(Debug, Error)]
pub enum PromotionError {
    #[error("请求参数校验失败: {} 个字段不合法", .0.len())]
    InvalidRequest(Vec<FieldError>),

    #[error("规则文档校验失败: {} 个问题", .0.len())]
    InvalidRules(Vec<ValidationIssue>),

    #[error("读取规则文档失败: {location}: {message}")]
    RuleSource { location: String, message: String },

    #[error("规则存储读取失败: {0}")]
    RuleStore(String),
}

pub type Result<T> = std::result::Result<T, PromotionError>;

impl PromotionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::InvalidRules(_) => StatusCode::BAD_REQUEST,
            Self::RuleSource { .. } | Self::RuleStore(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::InvalidRules(_) => "INVALID_RULES",
            Self::RuleSource { .. } => "RULE_SOURCE_ERROR",
            Self::RuleStore(_) => "RULE_STORE_ERROR",
        }
    }
}

impl IntoResponse for PromotionError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        let body = match &self {
            Self::InvalidRequest(details) => json!({
                "error": "Invalid request body",
                "code": code,
                "message": self.to_string(),
                "details": details,
            }),
            Self::InvalidRules(details) => json!({
                "error": "Invalid rules",
                "code": code,
                "message": self.to_string(),
                "details": details,
            }),
            // 系统级错误只返回通用提示，详细信息仅记录日志
            other => {
                tracing::error!(error = %other, code, "请求处理失败");
                json!({
                    "error": "Internal server error",
                    "code": code,
                    "message": "服务内部错误，请稍后重试",
                })
            }
        };

        (status, axum::Json(body)).into_response()
    }
}

/// 从 validator 错误转换，字段名转为 camelCase 并按字段名排序
impl From<validator::ValidationErrors> for PromotionError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<FieldError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errors)| {
                let field = to_camel_case(&field);
                errors.iter().map(move |error| {
                    let message = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| error.code.to_string());
                    FieldError::new(field.clone(), message)
                })
            })
            .collect();
        details.sort_by(|a, b| a.field.cmp(&b.field));
        Self::InvalidRequest(details)
    }
}

fn to_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for ch in name.chars() {
        if ch == '_' {
            upper = true;
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_error_variants() -> Vec<(PromotionError, StatusCode, &'static str)> {
        vec![
            (
                PromotionError::InvalidRequest(vec![FieldError::new("level", "must be >= 1")]),
                StatusCode::BAD_REQUEST,
                "INVALID_REQUEST",
            ),
            (
                PromotionError::InvalidRules(vec![ValidationIssue::new("rules.0.priority", "Required")]),
                StatusCode::BAD_REQUEST,
                "INVALID_RULES",
            ),
            (
                PromotionError::RuleSource {
                    location: "rules.yaml".into(),
                    message: "No such file".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
                "RULE_SOURCE_ERROR",
            ),
            (
                PromotionError::RuleStore("poisoned".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "RULE_STORE_ERROR",
            ),
        ]
    }

    #[test]
    fn test_status_and_error_codes() {
        for (error, status, code) in all_error_variants() {
            assert_eq!(error.status_code(), status, "{error:?}");
            assert_eq!(error.error_code(), code, "{error:?}");
        }
    }

    #[tokio::test]
    async fn test_internal_details_hidden() {
        let response = PromotionError::RuleStore("lock poisoned at 0xdead".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("0xdead"));
        assert!(text.contains("RULE_STORE_ERROR"));
    }

    #[tokio::test]
    async fn test_validation_details_rendered() {
        let response = PromotionError::InvalidRequest(vec![FieldError::new("country", "too short")])
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Invalid request body");
        assert_eq!(json["details"][0]["field"], "country");
    }

    #[test]
    fn test_from_validation_errors() {
        use validator::{ValidationError, ValidationErrors};

        let mut errors = ValidationErrors::new();
        let mut level = ValidationError::new("range");
        level.message = Some("Level must be a positive integer".into());
        errors.add("level", level);
        errors.add("days_since_last_purchase", ValidationError::new("range"));

        let error: PromotionError = errors.into();
        match &error {
            PromotionError::InvalidRequest(details) => {
                assert_eq!(details.len(), 2);
                assert_eq!(details[0].field, "daysSinceLastPurchase");
                assert_eq!(details[0].message, "range");
                assert_eq!(details[1].field, "level");
                assert_eq!(details[1].message, "Level must be a positive integer");
            }
            other => panic!("期望 InvalidRequest 变体，实际: {other:?}"),
        }
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_to_camel_case() {
        assert_eq!(to_camel_case("player_id"), "playerId");
        assert_eq!(to_camel_case("days_since_last_purchase"), "daysSinceLastPurchase");
        assert_eq!(to_camel_case("level"), "level");
    }
}
