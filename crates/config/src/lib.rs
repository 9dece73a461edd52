//! 统一配置中心
//!
//! 提供聊天连接中心的全局配置管理，包括：
//! - 服务监听地址
//! - JWT认证
//! - 心跳间隔与超时
//!
//! 加载顺序：内置默认值 → YAML 文件（`CHAT_HUB_CONFIG` 指定路径）→ `CHAT_HUB_` 前缀的环境变量，
//! 嵌套字段用 `__` 分隔，例如 `CHAT_HUB_HUB__PONG_TIMEOUT_SECS=90`。

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "CHAT_HUB_CONFIG";

/// 环境变量前缀
const ENV_PREFIX: &str = "CHAT_HUB_";

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    /// 服务配置
    #[validate(nested)]
    pub server: ServerConfig,
    /// JWT认证配置
    #[validate(nested)]
    pub jwt: JwtConfig,
    /// 连接中心配置
    #[validate(nested)]
    pub hub: HubConfig,
    /// 默认日志级别（`RUST_LOG` 优先）
    #[validate(length(min = 1))]
    pub log_level: String,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
}

/// JWT配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JwtConfig {
    #[validate(length(min = 32))]
    pub secret: String,
    #[validate(range(min = 1))]
    pub expiration_hours: i64,
}

/// 连接中心配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct HubConfig {
    /// 心跳扫描间隔（秒）
    #[validate(range(min = 1))]
    pub ping_interval_secs: u64,
    /// 超过该时长未收到 pong 的连接会被驱逐（秒）
    #[validate(range(min = 1))]
    pub pong_timeout_secs: u64,
    /// 每个连接写队列的容量，队列满时新帧被丢弃
    #[validate(range(min = 1))]
    pub outbound_queue_capacity: usize,
}

impl HubConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: 30,
            pong_timeout_secs: 60,
            outbound_queue_capacity: 64,
        }
    }
}

impl Default for AppConfig {
    /// 开发环境默认值，生产环境必须通过环境变量覆盖 JWT 密钥
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            jwt: JwtConfig {
                secret: "dev-secret-key-not-for-production-use-minimum-32-chars".to_string(),
                expiration_hours: 24,
            },
            hub: HubConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// 按默认值、配置文件、环境变量的顺序加载配置并校验
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).ok();
        Self::load_from(path.as_deref().map(Path::new))
    }

    /// 从指定配置文件（可选）加载配置
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config: AppConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|err| ConfigError::Load(Box::new(err)))?;

        config.validate_all()?;
        Ok(config)
    }

    /// 字段级校验之外，再检查字段之间的约束
    pub fn validate_all(&self) -> Result<(), ConfigError> {
        self.validate()?;

        if self.hub.pong_timeout_secs <= self.hub.ping_interval_secs {
            return Err(ConfigError::InvalidHubConfig(format!(
                "pong timeout ({}s) must be greater than ping interval ({}s)",
                self.hub.pong_timeout_secs, self.hub.ping_interval_secs
            )));
        }

        Ok(())
    }

    /// 监听地址
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("invalid hub configuration: {0}")]
    InvalidHubConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate_all().is_ok());
        assert_eq!(config.hub.ping_interval(), Duration::from_secs(30));
        assert_eq!(config.hub.pong_timeout(), Duration::from_secs(60));
        assert_eq!(config.hub.outbound_queue_capacity, 64);
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_short_jwt_secret_rejected() {
        let mut config = AppConfig::default();
        config.jwt.secret = "short".to_string();
        assert!(matches!(
            config.validate_all(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_pong_timeout_must_exceed_ping_interval() {
        let mut config = AppConfig::default();
        config.hub.pong_timeout_secs = 30;
        let result = config.validate_all();
        assert!(matches!(result, Err(ConfigError::InvalidHubConfig(_))));
    }

    #[test]
    fn test_env_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.set_env("CHAT_HUB_SERVER__PORT", "9090");
            jail.set_env("CHAT_HUB_HUB__PONG_TIMEOUT_SECS", "90");

            let config = AppConfig::load_from(None).map_err(|err| err.to_string())?;
            assert_eq!(config.server.port, 9090);
            assert_eq!(config.hub.pong_timeout_secs, 90);
            assert_eq!(config.hub.ping_interval_secs, 30);
            Ok(())
        });
    }

    #[test]
    fn test_yaml_file_then_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "hub.yaml",
                r#"
server:
  host: 0.0.0.0
  port: 7000
hub:
  ping_interval_secs: 10
  pong_timeout_secs: 25
"#,
            )?;
            jail.set_env("CHAT_HUB_SERVER__PORT", "7001");

            let config =
                AppConfig::load_from(Some(Path::new("hub.yaml"))).map_err(|err| err.to_string())?;
            assert_eq!(config.server.host, "0.0.0.0");
            assert_eq!(config.server.port, 7001);
            assert_eq!(config.hub.ping_interval_secs, 10);
            assert_eq!(config.hub.pong_timeout_secs, 25);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_file_values_fail_validation() {
        Jail::expect_with(|jail| {
            jail.create_file("bad.yaml", "hub:\n  ping_interval_secs: 0\n")?;
            let result = AppConfig::load_from(Some(Path::new("bad.yaml")));
            assert!(result.is_err());
            Ok(())
        });
    }
}
