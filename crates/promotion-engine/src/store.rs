//! 规则存储
//!
//! 使用 ArcSwap 持有当前生效的规则集，整体替换是一次指针交换，
//! 读者只会看到完整的旧规则集或完整的新规则集。

use crate::error::Result;
use crate::models::PromotionRule;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument};

/// 规则集快照
///
/// 规则按安装顺序保存，优先级排序在评估时进行。
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    pub rules: Vec<PromotionRule>,
    pub last_reloaded_at: DateTime<Utc>,
}

impl RuleSet {
    pub fn new(rules: Vec<PromotionRule>, last_reloaded_at: DateTime<Utc>) -> Self {
        Self {
            rules,
            last_reloaded_at,
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// 评估引擎读取规则集的入口
#[cfg_attr(test, mockall::automock)]
pub trait RuleProvider: Send + Sync {
    fn current(&self) -> Result<Arc<RuleSet>>;
}

/// 规则存储
#[derive(Clone)]
pub struct RuleStore {
    inner: Arc<ArcSwap<RuleSet>>,
}

impl RuleStore {
    /// 创建空的规则存储，重载时间初始化为创建时间
    pub fn new() -> Self {
        Self::with_rules(Vec::new())
    }

    pub fn with_rules(rules: Vec<PromotionRule>) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(RuleSet::new(rules, Utc::now()))),
        }
    }

    /// 规则副本，修改副本不影响存储
    pub fn get_rules(&self) -> Vec<PromotionRule> {
        self.inner.load().rules.clone()
    }

    /// 当前规则集的共享快照
    pub fn snapshot(&self) -> Arc<RuleSet> {
        self.inner.load_full()
    }

    /// 整体替换规则，保留重载时间
    #[instrument(skip(self, rules), fields(count = rules.len()))]
    pub fn set_rules(&self, rules: Vec<PromotionRule>) {
        self.inner.rcu(|current| RuleSet::new(rules.clone(), current.last_reloaded_at));
        info!("规则集已替换");
    }

    pub fn set_last_reloaded(&self, at: DateTime<Utc>) {
        self.inner.rcu(|current| RuleSet::new(current.rules.clone(), at));
    }

    pub fn get_last_reloaded(&self) -> DateTime<Utc> {
        self.inner.load().last_reloaded_at
    }

    /// 同时替换规则和重载时间
    #[instrument(skip(self, rules), fields(count = rules.len()))]
    pub fn replace(&self, rules: Vec<PromotionRule>, at: DateTime<Utc>) {
        self.inner.store(Arc::new(RuleSet::new(rules, at)));
        info!(reloaded_at = %at, "规则集已安装");
    }

    pub fn len(&self) -> usize {
        self.inner.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.load().is_empty()
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleProvider for RuleStore {
    fn current(&self) -> Result<Arc<RuleSet>> {
        Ok(self.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Reward;
    use chrono::Duration;

    fn rule(id: &str, priority: i64) -> PromotionRule {
        PromotionRule::new(id, priority, Reward::new("coins"))
    }

    #[test]
    fn test_new_store_is_empty() {
        let store = RuleStore::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
        assert!(store.get_last_reloaded() <= Utc::now());
    }

    #[test]
    fn test_get_rules_returns_copy() {
        let store = RuleStore::with_rules(vec![rule("a", 1)]);

        let mut copy = store.get_rules();
        copy[0].priority = 99;
        copy.push(rule("b", 2));

        let stored = store.get_rules();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].priority, 1);
    }

    #[test]
    fn test_set_rules_keeps_insertion_order() {
        let store = RuleStore::new();
        store.set_rules(vec![rule("low", 1), rule("high", 10), rule("mid", 5)]);

        let ids: Vec<_> = store.get_rules().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["low", "high", "mid"]);
    }

    #[test]
    fn test_set_rules_preserves_timestamp() {
        let store = RuleStore::new();
        let at = Utc::now() - Duration::hours(1);
        store.set_last_reloaded(at);

        store.set_rules(vec![rule("a", 1)]);
        assert_eq!(store.get_last_reloaded(), at);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_replace_updates_both() {
        let store = RuleStore::with_rules(vec![rule("old", 1)]);
        let at = Utc::now() + Duration::seconds(5);

        store.replace(vec![rule("new-1", 1), rule("new-2", 2)], at);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.last_reloaded_at, at);
    }

    #[test]
    fn test_snapshot_unaffected_by_later_replace() {
        let store = RuleStore::with_rules(vec![rule("old", 1)]);
        let before = store.snapshot();

        store.replace(vec![rule("new", 1)], Utc::now());

        assert_eq!(before.rules[0].id, "old");
        assert_eq!(store.snapshot().rules[0].id, "new");
    }

    #[test]
    fn test_clones_share_state() {
        let store = RuleStore::new();
        let clone = store.clone();
        clone.set_rules(vec![rule("a", 1)]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_concurrent_readers_never_see_torn_sets() {
        let store = RuleStore::new();
        let set_a: Vec<_> = (0..50).map(|i| rule(&format!("a-{i}"), i)).collect();
        let set_b: Vec<_> = (0..80).map(|i| rule(&format!("b-{i}"), i)).collect();
        store.set_rules(set_a.clone());

        std::thread::scope(|scope| {
            let writer = store.clone();
            scope.spawn(move || {
                for i in 0..200 {
                    let next = if i % 2 == 0 { set_b.clone() } else { set_a.clone() };
                    writer.replace(next, Utc::now());
                }
            });

            for _ in 0..4 {
                let reader = store.clone();
                scope.spawn(move || {
                    for _ in 0..500 {
                        let snapshot = reader.snapshot();
                        let prefix = &snapshot.rules[0].id[..2];
                        assert!(snapshot.len() == 50 || snapshot.len() == 80);
                        assert!(snapshot.rules.iter().all(|r| r.id.starts_with(prefix)));
                    }
                });
            }
        });
    }
}
