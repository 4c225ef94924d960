//! 统一配置中心
//!
//! 提供聊天服务的全局配置管理，包括：
//! - 服务监听地址与 CORS
//! - 会话存储（PostgreSQL，可选）
//! - 聊天中枢的队列与配色
//! - 外部用户目录
//!
//! 加载优先级：默认值 -> 可选配置文件（`APP_CONFIG_FILE`）-> 环境变量（`APP_*`，以 `__` 分隔层级）

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// 全局应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    /// 服务配置
    #[serde(default)]
    #[validate(nested)]
    pub server: ServerConfig,
    /// 数据库配置
    #[serde(default)]
    #[validate(nested)]
    pub database: DatabaseConfig,
    /// 聊天中枢配置
    #[serde(default)]
    #[validate(nested)]
    pub hub: HubConfig,
    /// 用户目录配置
    #[serde(default)]
    #[validate(nested)]
    pub user_directory: UserDirectoryConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    /// 允许的跨域来源；包含 `*` 时放开所有来源
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3005,
            cors_origins: vec!["*".into()],
        }
    }
}

/// 数据库配置；未设置 URL 时使用内存存储
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    #[validate(url)]
    pub url: Option<String>,
    #[validate(range(min = 1))]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

/// 出站队列溢出策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// 丢弃最早的待发送事件
    #[default]
    DropOldest,
    /// 强制断开慢消费者
    Disconnect,
}

/// 聊天中枢配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct HubConfig {
    /// 中枢命令通道容量
    #[validate(range(min = 1))]
    pub command_buffer: usize,
    /// 每个连接的出站队列容量
    #[validate(range(min = 1))]
    pub outbound_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    /// 记住的客户端消息ID数量（重发去重窗口），0 表示关闭去重
    pub dedup_window: usize,
    /// 在线用户的配色表
    #[validate(custom(function = "validate_palette"))]
    pub palette: Vec<String>,
    /// 用户身份缓存的有效期（秒）
    pub profile_cache_ttl_secs: u64,
    /// 用户身份缓存的最大条目数，0 表示不缓存
    pub profile_cache_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            command_buffer: 256,
            outbound_capacity: 64,
            overflow_policy: OverflowPolicy::DropOldest,
            dedup_window: 1000,
            palette: default_palette(),
            profile_cache_ttl_secs: 300,
            profile_cache_capacity: 10_000,
        }
    }
}

/// 默认配色
pub fn default_palette() -> Vec<String> {
    [
        "#E53935", "#1E88E5", "#43A047", "#FB8C00", "#8E24AA", "#00ACC1", "#F4511E", "#3949AB",
        "#7CB342", "#D81B60", "#6D4C41", "#00897B",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}

fn validate_palette(palette: &[String]) -> Result<(), ValidationError> {
    if palette.is_empty() {
        return Err(ValidationError::new("palette_empty"));
    }
    let valid = palette.iter().all(|color| {
        color.len() == 7
            && color.starts_with('#')
            && color[1..].chars().all(|c| c.is_ascii_hexdigit())
    });
    if !valid {
        return Err(ValidationError::new("palette_color_format"));
    }
    Ok(())
}

/// 外部用户目录配置；未设置 base_url 时只使用握手参数中的名称
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UserDirectoryConfig {
    #[validate(url)]
    pub base_url: Option<String>,
    /// 调用用户服务时携带的 Bearer token
    pub service_token: Option<String>,
    #[validate(range(min = 1))]
    pub timeout_ms: u64,
}

impl Default for UserDirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            service_token: None,
            timeout_ms: 2000,
        }
    }
}

impl AppConfig {
    /// 按优先级加载配置并校验
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var("APP_CONFIG_FILE") {
            figment = if path.ends_with(".yml") || path.ends_with(".yaml") {
                figment.merge(Yaml::file(path))
            } else if path.ends_with(".json") {
                figment.merge(Json::file(path))
            } else {
                figment.merge(Toml::file(path))
            };
        }
        Self::from_figment(figment.merge(Env::prefixed("APP_").split("__")))
    }

    /// 从任意 figment 提取并校验
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 日志用的脱敏描述
    pub fn sanitize(&self) -> String {
        let database = match &self.database.url {
            Some(url) => match url.split_once('@') {
                Some((_, host)) => format!("postgres://[REDACTED]@{host}"),
                None => "postgres://[REDACTED]".to_string(),
            },
            None => "in-memory".to_string(),
        };
        format!(
            "bind={} database={} outbound_capacity={} overflow_policy={:?} user_directory={}",
            self.bind_address(),
            database,
            self.hub.outbound_capacity,
            self.hub.overflow_policy,
            self.user_directory.base_url.as_deref().unwrap_or("disabled"),
        )
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.database.url.is_none());
        assert_eq!(config.hub.overflow_policy, OverflowPolicy::DropOldest);
    }

    #[test]
    fn env_overrides_nested_values() {
        Jail::expect_with(|jail| {
            jail.set_env("APP_SERVER__PORT", "4000");
            jail.set_env("APP_HUB__OUTBOUND_CAPACITY", "8");
            jail.set_env("APP_HUB__OVERFLOW_POLICY", "disconnect");

            let config = AppConfig::load().expect("load config");
            assert_eq!(config.server.port, 4000);
            assert_eq!(config.hub.outbound_capacity, 8);
            assert_eq!(config.hub.overflow_policy, OverflowPolicy::Disconnect);
            Ok(())
        });
    }

    #[test]
    fn config_file_is_merged_before_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "chat.toml",
                r#"
                [database]
                url = "postgres://chat:secret@db:5432/chat"
                max_connections = 9
                "#,
            )?;
            jail.set_env("APP_CONFIG_FILE", "chat.toml");
            jail.set_env("APP_DATABASE__MAX_CONNECTIONS", "3");

            let config = AppConfig::load().expect("load config");
            assert_eq!(
                config.database.url.as_deref(),
                Some("postgres://chat:secret@db:5432/chat")
            );
            assert_eq!(config.database.max_connections, 3);
            assert!(!config.sanitize().contains("secret"));
            Ok(())
        });
    }

    #[test]
    fn invalid_palette_is_rejected() {
        let mut config = AppConfig::default();
        config.hub.palette = vec!["red".into()];
        assert!(config.validate().is_err());

        config.hub.palette.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut config = AppConfig::default();
        config.hub.outbound_capacity = 0;
        assert!(config.validate().is_err());
    }
}
