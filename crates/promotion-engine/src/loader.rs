//! 规则加载器
//!
//! 读取规则文档、校验结构，校验全部通过后才整体写入规则存储。
//! 任何解析或校验问题都会原样返回，已生效的规则集保持不变。

use crate::error::{PromotionError, Result, ValidationIssue};
use crate::models::{PlayerField, PromotionRule, RulesDocument, integral_value, parse_timestamp};
use crate::operators::Operator;
use crate::store::RuleStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use promotion_shared::observability::metrics;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

/// 规则文档来源
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RuleSource: Send + Sync {
    /// 用于日志和错误信息的位置描述
    fn location(&self) -> String;

    async fn read(&self) -> Result<String>;
}

/// 基于本地文件的规则来源
#[derive(Debug, Clone)]
pub struct FileRuleSource {
    path: PathBuf,
}

impl FileRuleSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RuleSource for FileRuleSource {
    fn location(&self) -> String {
        self.path.display().to_string()
    }

    async fn read(&self) -> Result<String> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| PromotionError::RuleSource {
                location: self.location(),
                message: e.to_string(),
            })
    }
}

/// 成功加载的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSummary {
    pub rules_loaded: usize,
    pub reloaded_at: DateTime<Utc>,
}

/// 规则加载器
pub struct RuleLoader {
    store: RuleStore,
    source: Arc<dyn RuleSource>,
    /// 串行化重载，避免慢的旧读取覆盖新的结果
    reload_lock: Mutex<()>,
}

impl RuleLoader {
    pub fn new(store: RuleStore, source: Arc<dyn RuleSource>) -> Self {
        Self {
            store,
            source,
            reload_lock: Mutex::new(()),
        }
    }

    /// 解析并安装规则文档
    #[instrument(skip(self, source_text), fields(bytes = source_text.len()))]
    pub fn load(&self, source_text: &str) -> Result<LoadSummary> {
        let rules = parse_document(source_text)?;
        warn_suspicious_rules(&rules);

        let reloaded_at = Utc::now();
        let rules_loaded = rules.len();
        self.store.replace(rules, reloaded_at);

        info!(rules_loaded, "规则文档加载成功");
        Ok(LoadSummary {
            rules_loaded,
            reloaded_at,
        })
    }

    /// 从配置的来源重新读取并加载
    #[instrument(skip(self), fields(location = %self.source.location()))]
    pub async fn reload(&self) -> Result<LoadSummary> {
        let _guard = self.reload_lock.lock().await;

        let source_text = match self.source.read().await {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "读取规则文档失败");
                metrics::record_rule_reload("error");
                return Err(e);
            }
        };

        match self.load(&source_text) {
            Ok(summary) => {
                metrics::record_rule_reload("success");
                metrics::set_active_rules(summary.rules_loaded);
                Ok(summary)
            }
            Err(e) => {
                warn!(error = %e, "规则文档无效，保留当前规则集");
                metrics::record_rule_reload("invalid");
                Err(e)
            }
        }
    }
}

/// 解析规则文档并校验结构，不触碰规则存储
///
/// YAML 是 JSON 的超集，JSON 文档同样可以加载。
pub fn parse_document(source_text: &str) -> Result<Vec<PromotionRule>> {
    let mut document: Value = serde_yaml::from_str(source_text).map_err(|e| {
        let mut issue = ValidationIssue::new("", format!("Failed to parse rules document: {e}"));
        if let Some(location) = e.location() {
            issue = issue.with_line(location.line());
        }
        PromotionError::InvalidRules(vec![issue])
    })?;

    let issues = SchemaChecker::check(&document);
    if !issues.is_empty() {
        return Err(PromotionError::InvalidRules(issues));
    }
    normalize_priorities(&mut document);

    serde_json::from_value::<RulesDocument>(document)
        .map(|doc| doc.rules)
        .map_err(|e| PromotionError::InvalidRules(vec![ValidationIssue::new("", e.to_string())]))
}

/// `priority: 10.0` 改写为整数 10，结构校验已保证没有小数部分
fn normalize_priorities(document: &mut Value) {
    let Some(rules) = document.get_mut("rules").and_then(Value::as_array_mut) else {
        return;
    };

    for priority in rules.iter_mut().filter_map(|rule| rule.get_mut("priority")) {
        let integral = match priority {
            Value::Number(n) if !n.is_i64() => integral_value(n),
            _ => None,
        };
        if let Some(value) = integral {
            *priority = Value::from(value);
        }
    }
}

/// 加载成功但值得注意的情况只记日志
fn warn_suspicious_rules(rules: &[PromotionRule]) {
    let mut seen = HashSet::new();

    for rule in rules {
        if !seen.insert(rule.id.as_str()) {
            warn!(rule_id = %rule.id, "规则 ID 重复");
        }

        for condition in &rule.conditions {
            if PlayerField::resolve(&condition.field).is_none() {
                warn!(rule_id = %rule.id, field = %condition.field, "条件字段不是玩家属性，该条件永远不会命中");
            }
        }

        if let Some(valid_until) = &rule.valid_until {
            if parse_timestamp(valid_until).is_none() {
                warn!(rule_id = %rule.id, valid_until = %valid_until, "validUntil 无法解析，视为永不过期");
            }
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn join(path: &str, segment: impl std::fmt::Display) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}

/// 文档结构校验，收集全部问题而不是遇到第一个就停止
///
/// 可选字段缺失或为 null 都视为未设置，未知字段忽略。
#[derive(Default)]
struct SchemaChecker {
    issues: Vec<ValidationIssue>,
}

impl SchemaChecker {
    fn check(document: &Value) -> Vec<ValidationIssue> {
        let mut checker = Self::default();
        checker.check_document(document);
        checker.issues
    }

    fn push(&mut self, path: String, message: impl Into<String>) {
        self.issues.push(ValidationIssue::new(path, message));
    }

    fn type_mismatch(&mut self, path: String, expected: &str, actual: &Value) {
        self.push(path, format!("Expected {expected}, received {}", type_name(actual)));
    }

    fn check_document(&mut self, document: &Value) {
        let Some(root) = document.as_object() else {
            self.type_mismatch(String::new(), "object", document);
            return;
        };

        match root.get("rules") {
            None | Some(Value::Null) => self.push("rules".into(), "Required"),
            Some(Value::Array(rules)) => {
                for (index, rule) in rules.iter().enumerate() {
                    self.check_rule(rule, join("rules", index));
                }
            }
            Some(other) => self.type_mismatch("rules".into(), "array", other),
        }
    }

    fn check_rule(&mut self, rule: &Value, path: String) {
        let Some(rule) = rule.as_object() else {
            self.type_mismatch(path, "object", rule);
            return;
        };

        for key in ["id", "name", "description"] {
            self.required_string(rule, key, &path);
        }

        match Self::field(rule, "priority") {
            None => self.push(join(&path, "priority"), "Required"),
            Some(Value::Number(n)) if integral_value(n).is_some() => {}
            Some(Value::Number(_)) => self.push(
                join(&path, "priority"),
                "Expected integer, received float",
            ),
            Some(other) => self.type_mismatch(join(&path, "priority"), "number", other),
        }

        match Self::field(rule, "conditions") {
            None => self.push(join(&path, "conditions"), "Required"),
            Some(Value::Array(conditions)) => {
                let conditions_path = join(&path, "conditions");
                for (index, condition) in conditions.iter().enumerate() {
                    self.check_condition(condition, join(&conditions_path, index));
                }
            }
            Some(other) => self.type_mismatch(join(&path, "conditions"), "array", other),
        }

        match Self::field(rule, "reward") {
            None => self.push(join(&path, "reward"), "Required"),
            Some(reward) => self.check_reward(reward, join(&path, "reward")),
        }

        if let Some(valid_until) = Self::field(rule, "validUntil") {
            if !valid_until.is_string() {
                self.type_mismatch(join(&path, "validUntil"), "string", valid_until);
            }
        }
    }

    fn check_condition(&mut self, condition: &Value, path: String) {
        let Some(condition) = condition.as_object() else {
            self.type_mismatch(path, "object", condition);
            return;
        };

        self.required_string(condition, "field", &path);

        match Self::field(condition, "operator") {
            None => self.push(join(&path, "operator"), "Required"),
            Some(Value::String(name)) if Operator::parse(name).is_some() => {}
            Some(other) => {
                let expected = Operator::SUPPORTED
                    .iter()
                    .map(|op| format!("'{op}'"))
                    .collect::<Vec<_>>()
                    .join(" | ");
                let received = match other {
                    Value::String(s) => format!("'{s}'"),
                    v => type_name(v).to_string(),
                };
                self.push(
                    join(&path, "operator"),
                    format!("Invalid enum value. Expected {expected}, received {received}"),
                );
            }
        }

        match Self::field(condition, "value") {
            None => self.push(join(&path, "value"), "Required"),
            Some(Value::String(_) | Value::Number(_) | Value::Bool(_)) => {}
            Some(other) => {
                self.type_mismatch(join(&path, "value"), "string, number or boolean", other)
            }
        }
    }

    fn check_reward(&mut self, reward: &Value, path: String) {
        let Some(reward) = reward.as_object() else {
            self.type_mismatch(path, "object", reward);
            return;
        };

        self.required_string(reward, "type", &path);

        for key in ["multiplier", "amount"] {
            if let Some(value) = Self::field(reward, key) {
                if !value.is_number() {
                    self.type_mismatch(join(&path, key), "number", value);
                }
            }
        }

        match Self::field(reward, "items") {
            None => {}
            Some(Value::Array(items)) => {
                let items_path = join(&path, "items");
                for (index, item) in items.iter().enumerate() {
                    if !item.is_string() {
                        self.type_mismatch(join(&items_path, index), "string", item);
                    }
                }
            }
            Some(other) => self.type_mismatch(join(&path, "items"), "array", other),
        }
    }

    fn required_string(&mut self, object: &Map<String, Value>, key: &str, path: &str) {
        match Self::field(object, key) {
            None => self.push(join(path, key), "Required"),
            Some(Value::String(_)) => {}
            Some(other) => self.type_mismatch(join(path, key), "string", other),
        }
    }

    /// 缺失和 null 同样视为未设置
    fn field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
        object.get(key).filter(|value| !value.is_null())
    }
}
