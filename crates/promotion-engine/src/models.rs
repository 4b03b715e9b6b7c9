//! 促销规则数据模型
//!
//! 规则文档（YAML）与玩家属性（JSON）的字段形状即对外兼容面，
//! 序列化时一律使用 camelCase。

use crate::operators::Operator;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Number;
use std::fmt;

/// 玩家消费档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpendTier {
    Low,
    Medium,
    High,
}

impl SpendTier {
    pub const ALL: [SpendTier; 3] = [SpendTier::Low, SpendTier::Medium, SpendTier::High];

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tier| tier.as_str() == value)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for SpendTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 玩家属性
///
/// 评估请求的输入值，只在单次评估内存在。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerAttributes {
    pub player_id: String,
    #[serde(deserialize_with = "deserialize_integral")]
    pub level: i64,
    pub country: String,
    pub spend_tier: SpendTier,
    #[serde(deserialize_with = "deserialize_integral")]
    pub days_since_last_purchase: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_spent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_mode: Option<String>,
}

impl PlayerAttributes {
    pub fn new(
        player_id: impl Into<String>,
        level: i64,
        country: impl Into<String>,
        spend_tier: SpendTier,
        days_since_last_purchase: i64,
    ) -> Self {
        Self {
            player_id: player_id.into(),
            level,
            country: country.into(),
            spend_tier,
            days_since_last_purchase,
            total_spent: None,
            game_mode: None,
        }
    }

    pub fn with_total_spent(mut self, total_spent: f64) -> Self {
        self.total_spent = Some(total_spent);
        self
    }

    pub fn with_game_mode(mut self, game_mode: impl Into<String>) -> Self {
        self.game_mode = Some(game_mode.into());
        self
    }
}

/// 从玩家属性中取出的字段值
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttributeValue<'a> {
    Text(&'a str),
    Number(f64),
}

/// 条件可引用的玩家字段
///
/// 字段名到类型化访问器的显式映射，取代按字符串动态索引。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerField {
    PlayerId,
    Level,
    Country,
    SpendTier,
    DaysSinceLastPurchase,
    TotalSpent,
    GameMode,
}

impl PlayerField {
    pub const ALL: [PlayerField; 7] = [
        PlayerField::PlayerId,
        PlayerField::Level,
        PlayerField::Country,
        PlayerField::SpendTier,
        PlayerField::DaysSinceLastPurchase,
        PlayerField::TotalSpent,
        PlayerField::GameMode,
    ];

    /// 按规则文档中的字段名解析，未知字段返回 None
    pub fn resolve(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::PlayerId => "playerId",
            Self::Level => "level",
            Self::Country => "country",
            Self::SpendTier => "spendTier",
            Self::DaysSinceLastPurchase => "daysSinceLastPurchase",
            Self::TotalSpent => "totalSpent",
            Self::GameMode => "gameMode",
        }
    }

    /// 读取字段值；可选字段缺失时返回 None
    pub fn extract<'a>(&self, attributes: &'a PlayerAttributes) -> Option<AttributeValue<'a>> {
        match self {
            Self::PlayerId => Some(AttributeValue::Text(&attributes.player_id)),
            Self::Level => Some(AttributeValue::Number(attributes.level as f64)),
            Self::Country => Some(AttributeValue::Text(&attributes.country)),
            Self::SpendTier => Some(AttributeValue::Text(attributes.spend_tier.as_str())),
            Self::DaysSinceLastPurchase => Some(AttributeValue::Number(
                attributes.days_since_last_purchase as f64,
            )),
            Self::TotalSpent => attributes.total_spent.map(AttributeValue::Number),
            Self::GameMode => attributes.game_mode.as_deref().map(AttributeValue::Text),
        }
    }
}

/// 条件期望值
///
/// 数字保留原始字面量，规则原样返回给调用方时不会丢失精度或改变写法。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Bool(bool),
    Number(Number),
    Text(String),
}

impl ConditionValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Text(_) => "string",
        }
    }
}

impl From<bool> for ConditionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ConditionValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<i32> for ConditionValue {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for ConditionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ConditionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// 单个条件：字段 + 操作符 + 期望值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCondition {
    pub field: String,
    pub operator: Operator,
    pub value: ConditionValue,
}

impl RuleCondition {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<ConditionValue>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }
}

/// 奖励内容，引擎不解释，按原样返回
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reward {
    #[serde(rename = "type")]
    pub reward_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Number>,
}

impl Reward {
    pub fn new(reward_type: impl Into<String>) -> Self {
        Self {
            reward_type: reward_type.into(),
            multiplier: None,
            items: None,
            amount: None,
        }
    }

    pub fn with_items<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.items = Some(items.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_amount(mut self, amount: i64) -> Self {
        self.amount = Some(amount.into());
        self
    }
}

/// 促销规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionRule {
    pub id: String,
    pub name: String,
    pub description: String,
    /// 数值越大越先评估
    pub priority: i64,
    /// 条件之间是 AND 关系，空列表表示总是命中
    pub conditions: Vec<RuleCondition>,
    pub reward: Reward,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<String>,
}

impl PromotionRule {
    pub fn new(id: impl Into<String>, priority: i64, reward: Reward) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            priority,
            conditions: Vec::new(),
            reward,
            valid_until: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_condition(mut self, condition: RuleCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_valid_until(mut self, valid_until: impl Into<String>) -> Self {
        self.valid_until = Some(valid_until.into());
        self
    }

    /// 解析后的过期时间；未设置或无法解析时视为永不过期
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.valid_until.as_deref().and_then(parse_timestamp)
    }

    /// 过期时间严格早于 now 才算过期
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expires| expires < now)
    }
}

/// 规则文档顶层结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesDocument {
    pub rules: Vec<PromotionRule>,
}

/// 解析 ISO-8601 时间
///
/// 支持 RFC 3339、不带时区的日期时间（按 UTC）以及纯日期（UTC 零点）。
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// 取整数值，`10.0` 这类没有小数部分的浮点数同样视为整数
pub fn integral_value(number: &Number) -> Option<i64> {
    if let Some(value) = number.as_i64() {
        return Some(value);
    }
    let value = number.as_f64()?;
    // i64::MAX 无法精确表示为 f64，上界取开区间
    (value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64)
        .then_some(value as i64)
}

/// 整数字段接受 `25` 与 `25.0`，拒绝 `25.5`
pub fn deserialize_integral<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let number = Number::deserialize(deserializer)?;
    integral_value(&number).ok_or_else(|| {
        serde::de::Error::invalid_value(
            serde::de::Unexpected::Float(number.as_f64().unwrap_or(f64::NAN)),
            &"an integer",
        )
    })
}
