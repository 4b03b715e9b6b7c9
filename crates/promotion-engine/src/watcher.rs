//! 规则文件热加载
//!
//! 监听规则文档所在目录（编辑器常用"写临时文件再重命名"的方式保存），
//! 过滤出针对规则文档的事件，去抖后调用 `RuleLoader::reload`。

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::loader::RuleLoader;

/// 规则变更监听器
#[async_trait]
pub trait RuleWatcher: Send + Sync {
    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;
}

/// 基于文件系统事件的规则监听器
pub struct FileRuleWatcher {
    rule_path: PathBuf,
    debounce: Duration,
    loader: Arc<RuleLoader>,
    /// notify 句柄，drop 即停止监听
    watcher: Mutex<Option<RecommendedWatcher>>,
    shutdown_tx: watch::Sender<bool>,
}

impl FileRuleWatcher {
    pub fn new(rule_path: impl Into<PathBuf>, debounce: Duration, loader: Arc<RuleLoader>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            rule_path: rule_path.into(),
            debounce,
            loader,
            watcher: Mutex::new(None),
            shutdown_tx,
        }
    }

    fn watch_dir(&self) -> PathBuf {
        match self.rule_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

/// 只关心规则文档本身的写入、创建和删除
fn is_rule_event(event: &Event, file_name: &OsStr) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    ) && event
        .paths
        .iter()
        .any(|path| path.file_name() == Some(file_name))
}

fn file_name_of(path: &Path) -> Result<OsString> {
    path.file_name()
        .map(OsStr::to_os_string)
        .with_context(|| format!("规则文件路径缺少文件名: {}", path.display()))
}

#[async_trait]
impl RuleWatcher for FileRuleWatcher {
    async fn start(&self) -> Result<()> {
        let mut slot = self.watcher.lock();
        if slot.is_some() {
            warn!(path = %self.rule_path.display(), "规则文件监听已在运行，忽略重复启动");
            return Ok(());
        }

        let file_name = file_name_of(&self.rule_path)?;
        let watch_dir = self.watch_dir();

        let (event_tx, mut event_rx) = mpsc::channel::<()>(16);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if is_rule_event(&event, &file_name) {
                    let _ = event_tx.try_send(());
                }
            }
            Err(e) => warn!(error = %e, "规则文件监听事件错误"),
        })
        .context("创建规则文件监听器失败")?;

        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("监听目录失败: {}", watch_dir.display()))?;

        *slot = Some(watcher);
        drop(slot);
        // stop 之后允许再次启动
        self.shutdown_tx.send_replace(false);
        info!(path = %self.rule_path.display(), "规则文件监听已启动");

        let loader = self.loader.clone();
        let debounce = self.debounce;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(()) = event_rx.recv() => {
                        // 去抖：等待窗口期后丢弃积压的重复事件
                        tokio::time::sleep(debounce).await;
                        while event_rx.try_recv().is_ok() {}

                        match loader.reload().await {
                            Ok(summary) => info!(
                                rules_loaded = summary.rules_loaded,
                                "规则文件变更，已自动重新加载"
                            ),
                            Err(e) => error!(
                                error = %e,
                                "规则文件自动重新加载失败，保留当前规则集"
                            ),
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            info!("规则文件监听已停止");
                            break;
                        }
                    }
                }
            }
        });

        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.watcher.lock().take();
        let _ = self.shutdown_tx.send(true);
        Ok(())
    }
}
