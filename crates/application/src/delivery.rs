//! 投递转发
//!
//! 每个已登录会话一个任务：消费私有队列，按来源交换机把投递翻译成客户端帧。
//! 每条投递在转发尝试之后确认一次，无论转发是否成功。

use std::sync::Arc;

use domain::{DecodeError, Exchange, PresenceHeaders, PresenceMessage, ProbeHeaders};
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument};

use crate::broker::{BrokerError, Delivery, DeliveryStream};
use crate::error::ApplicationError;
use crate::publisher::Publisher;
use crate::transport::{ClientSink, TransportError};

/// 转发任务结束的原因；任何一种都会结束所属会话
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwarderExit {
    /// 队列的投递流结束（通道关闭或连接断开）
    StreamEnded,
    Client(TransportError),
    Broker(BrokerError),
    Panicked(String),
}

impl From<ForwarderExit> for ApplicationError {
    fn from(exit: ForwarderExit) -> Self {
        match exit {
            ForwarderExit::Client(err) => ApplicationError::Transport(err),
            ForwarderExit::Broker(err) => ApplicationError::Broker(err),
            ForwarderExit::StreamEnded => {
                ApplicationError::Forwarder("delivery stream ended".to_string())
            }
            ForwarderExit::Panicked(message) => ApplicationError::Forwarder(message),
        }
    }
}

pub struct DeliveryForwarder {
    publisher: Publisher,
    name: String,
    client: Arc<dyn ClientSink>,
}

impl DeliveryForwarder {
    pub fn new(publisher: Publisher, name: impl Into<String>, client: Arc<dyn ClientSink>) -> Self {
        Self {
            publisher,
            name: name.into(),
            client,
        }
    }

    /// 在当前 span 下启动转发任务
    pub fn spawn(self, deliveries: DeliveryStream) -> JoinHandle<ForwarderExit> {
        tokio::spawn(self.run(deliveries).in_current_span())
    }

    pub async fn run(self, mut deliveries: DeliveryStream) -> ForwarderExit {
        while let Some(next) = deliveries.next().await {
            let delivery = match next {
                Ok(delivery) => delivery,
                Err(err) => return ForwarderExit::Broker(err),
            };
            let Delivery {
                exchange,
                routing_key,
                headers,
                body,
                acker,
            } = delivery;

            let outcome = self.forward(&exchange, &headers, body).await;
            if let Err(err) = acker.ack().await {
                return ForwarderExit::Broker(err);
            }

            match outcome {
                Ok(()) => {}
                Err(ApplicationError::Transport(err)) => return ForwarderExit::Client(err),
                Err(ApplicationError::Broker(err)) => return ForwarderExit::Broker(err),
                Err(err) => {
                    warn!(exchange = %exchange, routing_key = %routing_key, error = %err, "跳过无法处理的投递");
                }
            }
        }
        ForwarderExit::StreamEnded
    }

    async fn forward(
        &self,
        exchange: &str,
        headers: &domain::Headers,
        body: Vec<u8>,
    ) -> Result<(), ApplicationError> {
        let exchange = Exchange::from_name(exchange)
            .ok_or_else(|| DecodeError::UnknownExchange(exchange.to_string()))?;

        match exchange {
            Exchange::Probe => {
                let probe = ProbeHeaders::from_headers(headers)?;
                if probe.from == self.name {
                    return Ok(());
                }
                debug!(asker = %probe.from, "answering probe");
                self.publisher.reply_to_probe(&probe.from, &self.name).await?;
            }
            Exchange::Presence | Exchange::ProbeReply => {
                let presence = PresenceHeaders::from_headers(headers)?;
                let frame = PresenceMessage::new(presence.name, presence.status).to_json()?;
                self.client.send_text(frame).await?;
            }
            Exchange::Chat => {
                let frame = String::from_utf8(body).map_err(|_| DecodeError::InvalidBody)?;
                self.client.send_text(frame).await?;
            }
        }
        Ok(())
    }
}
