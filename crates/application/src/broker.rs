//! 消息代理端口
//!
//! 会话逻辑只依赖这里的 trait；AMQP 适配器在 infrastructure 中实现，
//! 进程内实现见 [`crate::local_broker`]。

use std::sync::Arc;

use async_trait::async_trait;
use domain::{ExchangeSpec, Headers};
use futures_util::stream::BoxStream;
use thiserror::Error;

/// 代理操作错误
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("broker connection error: {message}")]
    Connection { message: String },

    #[error("broker unavailable: {message}")]
    Unavailable { message: String },

    #[error("channel error: {message}")]
    Channel { message: String },

    #[error("exchange declare failed for {exchange}: {message}")]
    Declare { exchange: String, message: String },

    #[error("queue operation failed: {message}")]
    Queue { message: String },

    #[error("queue bind failed ({exchange} -> {routing_key:?}): {message}")]
    Bind {
        exchange: String,
        routing_key: String,
        message: String,
    },

    #[error("publish to {exchange} failed: {message}")]
    Publish { exchange: String, message: String },

    #[error("consume failed: {message}")]
    Consume { message: String },

    #[error("ack failed: {message}")]
    Ack { message: String },

    #[error("channel closed")]
    Closed,
}

impl BrokerError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn channel(message: impl Into<String>) -> Self {
        Self::Channel {
            message: message.into(),
        }
    }
}

/// 待发布的消息。presence/probe 只有消息头，chat 只有消息体。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutboundMessage {
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
}

impl OutboundMessage {
    pub fn headers(headers: Headers) -> Self {
        Self {
            headers,
            body: None,
        }
    }

    pub fn body(body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers: Headers::new(),
            body: Some(body.into()),
        }
    }
}

/// 单条投递的确认句柄，只能使用一次
#[async_trait]
pub trait Acker: Send {
    async fn ack(self: Box<Self>) -> Result<(), BrokerError>;
}

/// 从私有队列收到的一条投递
pub struct Delivery {
    pub exchange: String,
    pub routing_key: String,
    pub headers: Headers,
    pub body: Vec<u8>,
    pub acker: Box<dyn Acker>,
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("exchange", &self.exchange)
            .field("routing_key", &self.routing_key)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .finish()
    }
}

pub type DeliveryStream = BoxStream<'static, Result<Delivery, BrokerError>>;

/// 代理通道：会话独占，声明、绑定、发布、消费都经由它完成
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// 幂等声明；参数不一致时返回 [`BrokerError::Declare`]
    async fn declare_exchange(&self, spec: &ExchangeSpec) -> Result<(), BrokerError>;

    /// 声明服务端命名的、独占且自动删除的私有队列，返回队列名
    async fn declare_private_queue(&self) -> Result<String, BrokerError>;

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError>;

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: OutboundMessage,
    ) -> Result<(), BrokerError>;

    /// 开始消费，需要手动确认
    async fn consume(&self, queue: &str) -> Result<DeliveryStream, BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;
}

/// 一条存活的代理连接
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    async fn open_channel(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError>;

    fn is_connected(&self) -> bool;

    /// 连接断开时返回
    async fn closed(&self);
}

/// 建立新连接，由 [`crate::ConnectionSupervisor`] 在断线后反复调用
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn BrokerConnection>, BrokerError>;

    /// 用于日志的目标描述，不含凭据
    fn describe(&self) -> String;
}
