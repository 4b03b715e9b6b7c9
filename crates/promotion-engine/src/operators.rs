//! 规则操作符定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 条件操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    /// 严格相等（类型与值都必须一致）
    Equals,
    GreaterThan,
    LessThan,
    /// 忽略大小写的子串匹配
    Contains,
    /// 未经加载器校验直接反序列化时的兜底值，永远不匹配
    #[serde(other)]
    Unsupported,
}

impl Operator {
    /// 规则文档中允许出现的操作符
    pub const SUPPORTED: [Operator; 4] = [
        Operator::Equals,
        Operator::GreaterThan,
        Operator::LessThan,
        Operator::Contains,
    ];

    /// 按规则文档中的名称解析，不认识的名称返回 None
    pub fn parse(name: &str) -> Option<Self> {
        Self::SUPPORTED.into_iter().find(|op| op.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::GreaterThan => "greaterThan",
            Self::LessThan => "lessThan",
            Self::Contains => "contains",
            Self::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_supported() {
        assert_eq!(Operator::parse("equals"), Some(Operator::Equals));
        assert_eq!(Operator::parse("greaterThan"), Some(Operator::GreaterThan));
        assert_eq!(Operator::parse("lessThan"), Some(Operator::LessThan));
        assert_eq!(Operator::parse("contains"), Some(Operator::Contains));
        assert_eq!(Operator::parse("gte"), None);
        assert_eq!(Operator::parse("unsupported"), None);
    }

    #[test]
    fn test_unknown_operator_deserializes_to_unsupported() {
        let op: Operator = serde_json::from_str("\"regex\"").unwrap();
        assert_eq!(op, Operator::Unsupported);

        let op: Operator = serde_json::from_str("\"lessThan\"").unwrap();
        assert_eq!(op, Operator::LessThan);
    }
}
