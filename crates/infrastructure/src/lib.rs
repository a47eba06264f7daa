//! 基础设施层实现。
//!
//! 提供 AMQP 代理适配器，并按配置选择代理后端、启动连接监督与拓扑声明。

pub mod amqp;
pub mod builder;

pub use amqp::{AmqpChannel, AmqpConnection, AmqpConnector};
pub use builder::{topology_variant, Backend, Infrastructure, InfrastructureError};
