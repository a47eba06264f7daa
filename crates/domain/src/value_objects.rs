use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::ProtocolError;

/// 租户（团队）命名空间，所有路由键的前缀。
///
/// 连接建立时从 Host 的子域名推导一次，会话期间不可变。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Team(String);

impl Team {
    /// 取 Host 的第一个 DNS 标签并去掉端口，例如 `eng.chat.example.com:8080` -> `eng`。
    pub fn from_host(host: &str) -> Result<Self, ProtocolError> {
        let label = host.split('.').next().unwrap_or_default();
        let label = label.split(':').next().unwrap_or_default().trim();
        if label.is_empty() {
            return Err(ProtocolError::InvalidTeam(host.to_string()));
        }
        Ok(Self(label.to_string()))
    }

    pub fn parse(value: impl Into<String>) -> Result<Self, ProtocolError> {
        let value = value.into();
        if value.trim().is_empty() || value.contains('.') {
            return Err(ProtocolError::InvalidTeam(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
