//! 在线状态与探测消息的头部结构
//!
//! presence / probe / probe-reply 三类消息没有消息体，字段全部放在代理消息头里。
//! 解码时校验类型，缺失或取值非法时返回 [`DecodeError`]。

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DecodeError;

/// 已解码为字符串的代理消息头
pub type Headers = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresenceStatus {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(PresenceStatus::Online),
            "offline" => Ok(PresenceStatus::Offline),
            other => Err(DecodeError::InvalidStatus(other.to_string())),
        }
    }
}

/// presence 与 probe-reply 消息头：`{name, status}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceHeaders {
    pub name: String,
    pub status: PresenceStatus,
}

impl PresenceHeaders {
    pub fn new(name: impl Into<String>, status: PresenceStatus) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }

    pub fn from_headers(headers: &Headers) -> Result<Self, DecodeError> {
        let name = required(headers, "name")?;
        let status = required(headers, "status")?.parse()?;
        Ok(Self {
            name: name.to_string(),
            status,
        })
    }

    pub fn to_headers(&self) -> Headers {
        let mut headers = Headers::new();
        headers.insert("name".into(), self.name.clone());
        headers.insert("status".into(), self.status.as_str().into());
        headers
    }
}

/// probe 消息头：`{from}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeHeaders {
    pub from: String,
}

impl ProbeHeaders {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }

    pub fn from_headers(headers: &Headers) -> Result<Self, DecodeError> {
        Ok(Self {
            from: required(headers, "from")?.to_string(),
        })
    }

    pub fn to_headers(&self) -> Headers {
        let mut headers = Headers::new();
        headers.insert("from".into(), self.from.clone());
        headers
    }
}

fn required<'a>(headers: &'a Headers, key: &'static str) -> Result<&'a str, DecodeError> {
    headers
        .get(key)
        .map(String::as_str)
        .ok_or(DecodeError::MissingHeader(key))
}
