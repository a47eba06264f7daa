//! 领域模型错误定义
//!
//! 协议违规与投递解码两类错误，均不携带 I/O 细节。

use thiserror::Error;

/// 客户端违反会话协议
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// 登录前发送了其他帧
    #[error("must send login message first")]
    MustLoginFirst,

    /// 已登录后再次登录
    #[error("duplicate login message")]
    DuplicateLogin,

    /// 未知的帧类型
    #[error("unknown message type: {0:?}")]
    UnsupportedType(String),

    /// JSON 无法解析或缺少字段
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// 登录名为空
    #[error("invalid login name: {0:?}")]
    InvalidName(String),

    /// presence 帧只能由服务端下发
    #[error("presence frames are server-to-client only")]
    PresenceFromClient,

    /// 无法从 Host 推导出团队
    #[error("cannot derive team from host {0:?}")]
    InvalidTeam(String),
}

/// 代理投递无法转换为客户端帧
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("missing header {0:?}")]
    MissingHeader(&'static str),

    #[error("invalid presence status {0:?}")]
    InvalidStatus(String),

    #[error("delivery from unknown exchange {0:?}")]
    UnknownExchange(String),

    #[error("delivery body is not valid UTF-8")]
    InvalidBody,
}
