use domain::PresenceStatus;
use tracing::{debug, info};

use crate::broker::{BrokerError, DeliveryStream};
use crate::error::ApplicationError;
use crate::publisher::Publisher;

/// 基于发布订阅的在线发现协议
///
/// 登录时：声明私有队列，绑定 probe / probe-reply / presence / chat，
/// 广播上线，发出探测，然后开始消费。会话结束时补发一次下线广播。
/// 没有独立的在线状态存储。
pub struct PresenceSession {
    publisher: Publisher,
    name: String,
    announced: bool,
}

impl PresenceSession {
    pub fn new(publisher: Publisher, name: impl Into<String>) -> Self {
        Self {
            publisher,
            name: name.into(),
            announced: false,
        }
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// 上线广播已发出且下线广播尚未发出
    pub fn announced(&self) -> bool {
        self.announced
    }

    /// 执行登录序列，返回私有队列的投递流
    pub async fn join(&mut self) -> Result<DeliveryStream, ApplicationError> {
        let channel = self.publisher.channel().clone();
        let topology = self.publisher.topology();

        let queue = channel.declare_private_queue().await?;
        for binding in topology.bindings(self.publisher.team(), &self.name) {
            channel
                .bind_queue(&queue, binding.exchange.name(), &binding.routing_key)
                .await?;
            debug!(
                queue = %queue,
                exchange = binding.exchange.name(),
                routing_key = %binding.routing_key,
                "queue bound"
            );
        }

        self.publisher
            .announce(&self.name, PresenceStatus::Online)
            .await?;
        self.announced = true;

        self.publisher.probe(&self.name).await?;

        let deliveries = channel.consume(&queue).await?;
        info!(queue = %queue, "presence announced, consuming private queue");
        Ok(deliveries)
    }

    /// 在会话自己的通道上广播下线
    pub async fn leave(&mut self) -> Result<(), BrokerError> {
        let publisher = self.publisher.clone();
        self.leave_with(&publisher).await
    }

    /// 经由指定发布者广播下线；每个会话至多成功一次
    pub async fn leave_with(&mut self, publisher: &Publisher) -> Result<(), BrokerError> {
        if !self.announced {
            return Ok(());
        }
        publisher
            .announce(&self.name, PresenceStatus::Offline)
            .await?;
        self.announced = false;
        info!("offline presence announced");
        Ok(())
    }
}
