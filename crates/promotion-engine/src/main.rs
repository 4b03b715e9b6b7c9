//! 促销规则引擎服务
//!
//! 提供 REST 接口的促销评估、规则热加载与评估指标查询。

use anyhow::Result;
use promotion_engine::{AppState, FileRuleWatcher, RuleWatcher, routes};
use promotion_shared::config::AppConfig;
use promotion_shared::observability;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load("promotion-engine").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    let obs_config = config.observability.clone().with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!(
        environment = %config.environment,
        rules_path = %config.rules.path,
        "Starting promotion-engine service..."
    );

    let state = AppState::from_config(&config);

    // 初始加载失败不阻止启动，以空规则集对外服务，等待后续重载
    match state.loader.reload().await {
        Ok(summary) => info!("Loaded {} rules from {}", summary.rules_loaded, config.rules.path),
        Err(e) => warn!(
            error = %e,
            "Failed to load rules from {}, starting with empty rule set",
            config.rules.path
        ),
    }

    let watcher = if config.rules.watch {
        let watcher = FileRuleWatcher::new(
            &config.rules.path,
            Duration::from_millis(config.rules.debounce_ms),
            state.loader.clone(),
        );
        match watcher.start().await {
            Ok(()) => Some(watcher),
            Err(e) => {
                error!(error = %e, "规则文件监听启动失败，仅支持手动重载");
                None
            }
        }
    } else {
        None
    };

    let app = routes::build_router(state);

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(watcher) = watcher {
        watcher.stop().await?;
    }

    info!("Server shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
