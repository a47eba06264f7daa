//! 路由 / 发布
//!
//! 把聊天帧和 presence/probe 控制消息投到正确的交换机与路由键。

use std::sync::Arc;

use domain::{Exchange, PresenceHeaders, PresenceStatus, ProbeHeaders, Team, Topology};
use tracing::debug;

use crate::broker::{BrokerChannel, BrokerError, OutboundMessage};

#[derive(Clone)]
pub struct Publisher {
    channel: Arc<dyn BrokerChannel>,
    topology: Topology,
    team: Team,
}

impl Publisher {
    pub fn new(channel: Arc<dyn BrokerChannel>, topology: Topology, team: Team) -> Self {
        Self {
            channel,
            topology,
            team,
        }
    }

    pub fn channel(&self) -> &Arc<dyn BrokerChannel> {
        &self.channel
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn team(&self) -> &Team {
        &self.team
    }

    /// 向团队广播在线状态
    pub async fn announce(&self, name: &str, status: PresenceStatus) -> Result<(), BrokerError> {
        let headers = PresenceHeaders::new(name, status).to_headers();
        self.send(
            Exchange::Presence,
            self.topology.broadcast_key(&self.team),
            OutboundMessage::headers(headers),
        )
        .await
    }

    /// 请团队中所有在线成员报到
    pub async fn probe(&self, from: &str) -> Result<(), BrokerError> {
        let headers = ProbeHeaders::new(from).to_headers();
        self.send(
            Exchange::Probe,
            self.topology.broadcast_key(&self.team),
            OutboundMessage::headers(headers),
        )
        .await
    }

    /// 私下告诉 `asker`：`name` 在线
    pub async fn reply_to_probe(&self, asker: &str, name: &str) -> Result<(), BrokerError> {
        let headers = PresenceHeaders::new(name, PresenceStatus::Online).to_headers();
        self.send(
            Exchange::ProbeReply,
            self.topology.member_key(&self.team, asker),
            OutboundMessage::headers(headers),
        )
        .await
    }

    /// 原样转发客户端提交的聊天帧字节，不改写任何字段，`from` 由客户端自报
    pub async fn route_chat(&self, to: &str, frame: &[u8]) -> Result<(), BrokerError> {
        self.send(
            Exchange::Chat,
            self.topology.member_key(&self.team, to),
            OutboundMessage::body(frame),
        )
        .await
    }

    async fn send(
        &self,
        exchange: Exchange,
        routing_key: String,
        message: OutboundMessage,
    ) -> Result<(), BrokerError> {
        debug!(exchange = exchange.name(), routing_key = %routing_key, "publishing");
        self.channel
            .publish(exchange.name(), &routing_key, message)
            .await
    }
}
