//! 条件评估器
//!
//! 所有比较都是失败即不匹配：类型不符、字段缺失、未知字段或未知操作符
//! 都只让条件为 false，不会产生错误。

use crate::models::{AttributeValue, ConditionValue, PlayerAttributes, PlayerField, RuleCondition};
use crate::operators::Operator;

/// 条件评估器
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 评估单个条件
    pub fn evaluate(condition: &RuleCondition, attributes: &PlayerAttributes) -> bool {
        let Some(field) = PlayerField::resolve(&condition.field) else {
            return false;
        };
        let Some(actual) = field.extract(attributes) else {
            return false;
        };

        Self::apply(actual, condition.operator, &condition.value)
    }

    /// 条件列表按 AND 组合，空列表视为命中
    pub fn matches_all(conditions: &[RuleCondition], attributes: &PlayerAttributes) -> bool {
        conditions
            .iter()
            .all(|condition| Self::evaluate(condition, attributes))
    }

    /// 对已取出的字段值应用操作符
    pub fn apply(actual: AttributeValue<'_>, operator: Operator, expected: &ConditionValue) -> bool {
        match operator {
            Operator::Equals => Self::equals(actual, expected),
            Operator::GreaterThan => Self::compare(actual, expected, |a, b| a > b),
            Operator::LessThan => Self::compare(actual, expected, |a, b| a < b),
            Operator::Contains => Self::contains(actual, expected),
            Operator::Unsupported => false,
        }
    }

    /// 类型和值都一致才相等
    fn equals(actual: AttributeValue<'_>, expected: &ConditionValue) -> bool {
        match (actual, expected) {
            (AttributeValue::Text(a), ConditionValue::Text(b)) => a == b,
            (AttributeValue::Number(a), ConditionValue::Number(b)) => {
                b.as_f64().is_some_and(|b| a == b)
            }
            _ => false,
        }
    }

    fn compare<F>(actual: AttributeValue<'_>, expected: &ConditionValue, cmp: F) -> bool
    where
        F: Fn(f64, f64) -> bool,
    {
        match (actual, expected.as_f64()) {
            (AttributeValue::Number(a), Some(b)) => cmp(a, b),
            _ => false,
        }
    }

    /// 忽略大小写的子串匹配
    fn contains(actual: AttributeValue<'_>, expected: &ConditionValue) -> bool {
        match (actual, expected.as_str()) {
            (AttributeValue::Text(haystack), Some(needle)) => haystack
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            _ => false,
        }
    }
}
