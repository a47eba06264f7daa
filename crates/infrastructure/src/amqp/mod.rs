//! AMQP 0-9-1 代理适配器
//!
//! 基于 `lapin` 实现应用层的代理端口。交换机持久化声明；私有队列由服务端命名，
//! 独占且自动删除；消息非持久化投递，presence/probe 字段放在消息头。

pub mod channel;
pub mod connector;
pub mod error;
pub mod headers;

pub use channel::AmqpChannel;
pub use connector::{AmqpConnection, AmqpConnector};
