//! 客户端线路帧
//!
//! 每帧一个 JSON 对象。先读取 `type` 字段，会话状态放行后再按具体类型完整解码。

use serde::{Deserialize, Serialize};

use crate::errors::ProtocolError;
use crate::presence::PresenceStatus;

/// 帧类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Login,
    Chat,
    Presence,
}

impl MessageType {
    pub fn parse(value: &str) -> Result<Self, ProtocolError> {
        match value {
            "login" => Ok(Self::Login),
            "chat" => Ok(Self::Chat),
            "presence" => Ok(Self::Presence),
            other => Err(ProtocolError::UnsupportedType(other.to_string())),
        }
    }

    /// 只读取 `type` 标签，不校验其余字段
    pub fn of_frame(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text).map_err(malformed)?;
        Self::parse(&envelope.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginMessage {
    pub name: String,
}

/// 聊天帧。服务端只读取 `to`，原始字节原样转发。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,
}

/// 下发给客户端的在线状态帧
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub name: String,
    pub status: PresenceStatus,
}

impl PresenceMessage {
    pub fn new(name: impl Into<String>, status: PresenceStatus) -> Self {
        Self {
            kind: MessageType::Presence,
            name: name.into(),
            status,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// 会话接受的客户端上行帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Login(LoginMessage),
    Chat(ChatMessage),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type", default)]
    kind: String,
}

impl LoginMessage {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let login: LoginMessage = serde_json::from_str(text).map_err(malformed)?;
        if login.name.trim().is_empty() {
            return Err(ProtocolError::InvalidName(login.name));
        }
        Ok(login)
    }
}

impl ChatMessage {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(malformed)
    }
}

fn malformed(err: serde_json::Error) -> ProtocolError {
    ProtocolError::MalformedFrame(err.to_string())
}
