//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// 服务配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// 规则文件配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// 规则文档路径（YAML 或 JSON）
    pub path: String,
    /// 是否监听规则文件变化并自动热加载
    pub watch: bool,
    /// 文件事件去抖窗口
    pub debounce_ms: u64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            path: "rules.yaml".to_string(),
            watch: false,
            debounce_ms: 500,
        }
    }
}

/// 评估耗时采样窗口配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsWindowConfig {
    pub capacity: usize,
}

impl Default for MetricsWindowConfig {
    fn default() -> Self {
        Self { capacity: 1000 }
    }
}

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// 服务名称，用于标识追踪和指标的来源
    pub service_name: String,
    pub log_level: String,
    /// 是否输出 JSON 格式日志（否则为人类可读格式）
    pub json_logs: bool,
    pub metrics_enabled: bool,
    /// Prometheus 指标导出端口
    pub metrics_port: u16,
    /// OpenTelemetry OTLP 端点，为空时禁用分布式追踪导出
    pub otlp_endpoint: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown-service".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
            metrics_port: 9090,
            otlp_endpoint: None,
        }
    }
}

impl ObservabilityConfig {
    /// 注入服务名（配置文件中通常不重复填写）
    pub fn with_service_name(mut self, service_name: &str) -> Self {
        self.service_name = service_name.to_string();
        self
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub server: ServerConfig,
    pub rules: RulesConfig,
    pub metrics_window: MetricsWindowConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（PROMO_ 前缀，`__` 分隔层级，如 PROMO_RULES__PATH -> rules.path）
    /// 5. 服务端口环境变量（如 PROMOTION_ENGINE_PORT）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("PROMO_ENV").unwrap_or_else(|_| "development".to_string());

        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env.clone())?
            .add_source(File::from(Path::new(&config_dir).join("default.toml")).required(false))
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", env))).required(false),
            )
            .add_source(
                File::from(Path::new(&config_dir).join(format!("{}.toml", service_name)))
                    .required(false),
            )
            .add_source(
                Environment::with_prefix("PROMO")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut config: Self = builder.build()?.try_deserialize()?;

        if let Some(port) = Self::get_service_port_from_env(service_name) {
            config.server.port = port;
        }

        Ok(config)
    }

    /// 从环境变量获取服务端口
    ///
    /// 将 "promotion-engine" 转换为 "PROMOTION_ENGINE_PORT"
    fn get_service_port_from_env(service_name: &str) -> Option<u16> {
        std::env::var(Self::port_env_var(service_name))
            .ok()
            .and_then(|v| v.parse().ok())
    }

    fn port_env_var(service_name: &str) -> String {
        format!("{}_PORT", service_name.to_uppercase().replace('-', "_"))
    }

    /// 获取服务地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
