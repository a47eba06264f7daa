//! 客户端传输端口
//!
//! 会话从 [`ClientStream`] 读取文本帧，向 [`ClientSink`] 写文本帧。
//! WebSocket 适配在 web-api 中实现。

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("receive failed: {0}")]
    Receive(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("client transport closed")]
    Closed,
}

/// WebSocket 关闭帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub const POLICY_VIOLATION: u16 = 1008;
    pub const INTERNAL_ERROR: u16 = 1011;

    // 控制帧负载上限 125 字节，其中 2 字节是关闭码
    const MAX_REASON_BYTES: usize = 123;

    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        let mut reason = reason.into();
        if reason.len() > Self::MAX_REASON_BYTES {
            let mut end = Self::MAX_REASON_BYTES;
            while !reason.is_char_boundary(end) {
                end -= 1;
            }
            reason.truncate(end);
        }
        Self { code, reason }
    }

    pub fn policy(reason: impl Into<String>) -> Self {
        Self::new(Self::POLICY_VIOLATION, reason)
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::new(Self::INTERNAL_ERROR, reason)
    }
}

#[async_trait]
pub trait ClientStream: Send {
    /// 下一个文本帧；客户端正常关闭时返回 `None`
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClientSink: Send + Sync {
    async fn send_text(&self, text: String) -> Result<(), TransportError>;

    async fn close(&self, reason: CloseReason) -> Result<(), TransportError>;
}
