//! 评估指标存储
//!
//! 计数器和耗时窗口放在同一把锁里，每次变更都是一个完整的原子单元。
//! 派生值（命中率、平均耗时、运行时长）在读取快照时计算。

use crate::store::RuleSet;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::info;

/// 耗时窗口默认容量
pub const DEFAULT_WINDOW_CAPACITY: usize = 1000;

struct MetricsState {
    total_requests: u64,
    successful_matches: u64,
    missed_matches: u64,
    /// 最近的评估耗时（毫秒），最旧的在队首
    evaluation_times: VecDeque<f64>,
    started_at: Instant,
}

impl MetricsState {
    fn new(capacity: usize) -> Self {
        Self {
            total_requests: 0,
            successful_matches: 0,
            missed_matches: 0,
            evaluation_times: VecDeque::with_capacity(capacity),
            started_at: Instant::now(),
        }
    }

    fn push_sample(&mut self, ms: f64, capacity: usize) {
        while self.evaluation_times.len() >= capacity {
            self.evaluation_times.pop_front();
        }
        self.evaluation_times.push_back(ms);
    }
}

/// 指标快照
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_matches: u64,
    pub missed_matches: u64,
    pub hit_rate: f64,
    pub average_evaluation_time_ms: f64,
    /// 形如 `1d 2h 3m`
    pub uptime: String,
    pub uptime_seconds: u64,
    pub rules_last_reloaded: DateTime<Utc>,
    pub active_rules: usize,
    pub window_size: usize,
}

/// 指标存储
pub struct MetricsStore {
    state: Mutex<MetricsState>,
    capacity: usize,
}

impl MetricsStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_WINDOW_CAPACITY)
    }

    /// 容量为 0 时按 1 处理
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(MetricsState::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn increment_total_requests(&self) {
        self.state.lock().total_requests += 1;
    }

    pub fn increment_successful_matches(&self) {
        self.state.lock().successful_matches += 1;
    }

    pub fn increment_missed_matches(&self) {
        self.state.lock().missed_matches += 1;
    }

    /// 追加一次耗时采样，窗口满时淘汰最旧的
    pub fn add_evaluation_time(&self, ms: f64) {
        self.state.lock().push_sample(ms, self.capacity);
    }

    /// 在一次加锁内记录一次评估的全部结果
    pub fn record_evaluation(&self, matched: bool, ms: f64) {
        let mut state = self.state.lock();
        state.total_requests += 1;
        if matched {
            state.successful_matches += 1;
        } else {
            state.missed_matches += 1;
        }
        state.push_sample(ms, self.capacity);
    }

    /// 窗口内的耗时采样，按写入顺序
    pub fn evaluation_times(&self) -> Vec<f64> {
        self.state.lock().evaluation_times.iter().copied().collect()
    }

    pub fn snapshot(&self, rules: &RuleSet) -> MetricsSnapshot {
        let state = self.state.lock();

        let hit_rate = if state.total_requests == 0 {
            0.0
        } else {
            state.successful_matches as f64 / state.total_requests as f64
        };

        let window_size = state.evaluation_times.len();
        let average_evaluation_time_ms = if window_size == 0 {
            0.0
        } else {
            state.evaluation_times.iter().sum::<f64>() / window_size as f64
        };

        let uptime = state.started_at.elapsed();

        MetricsSnapshot {
            total_requests: state.total_requests,
            successful_matches: state.successful_matches,
            missed_matches: state.missed_matches,
            hit_rate,
            average_evaluation_time_ms,
            uptime: format_uptime(uptime),
            uptime_seconds: uptime.as_secs(),
            rules_last_reloaded: rules.last_reloaded_at,
            active_rules: rules.len(),
            window_size,
        }
    }

    /// 清零计数器和耗时窗口，重置运行时长基准；不影响规则存储
    pub fn reset(&self) {
        *self.state.lock() = MetricsState::new(self.capacity);
        info!("评估指标已重置");
    }
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::new()
    }
}

pub fn format_uptime(uptime: Duration) -> String {
    let total_minutes = uptime.as_secs() / 60;
    let days = total_minutes / (24 * 60);
    let hours = (total_minutes / 60) % 24;
    let minutes = total_minutes % 60;
    format!("{days}d {hours}h {minutes}m")
}
