//! 交换机拓扑与路由键规则
//!
//! 四个固定名称的交换机。两种部署形态二选一，绑定、发布、路由键格式都由同一个
//! [`Topology`] 决定，不会混用：
//!
//! - [`TopologyVariant::TeamDirect`]：全部 `direct`，广播键为 `<team>`，点对点键为 `<team>.<name>`；
//! - [`TopologyVariant::GlobalFanout`]：`presence`/`probe` 为 `fanout`（全局广播），
//!   `chat`/`probe-reply` 为 `direct`，点对点键仅为 `<name>`。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value_objects::Team;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exchange {
    Chat,
    Presence,
    Probe,
    ProbeReply,
}

impl Exchange {
    pub const ALL: [Exchange; 4] = [
        Exchange::Chat,
        Exchange::Presence,
        Exchange::Probe,
        Exchange::ProbeReply,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Exchange::Chat => "chat",
            Exchange::Presence => "presence",
            Exchange::Probe => "probe",
            Exchange::ProbeReply => "probe-reply",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|exchange| exchange.name() == name)
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Direct,
    Fanout,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Direct => "direct",
            ExchangeKind::Fanout => "fanout",
        }
    }
}

/// 交换机声明参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeSpec {
    pub exchange: Exchange,
    pub kind: ExchangeKind,
    pub durable: bool,
}

impl ExchangeSpec {
    pub fn name(&self) -> &'static str {
        self.exchange.name()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TopologyVariant {
    /// 多租户，全部 direct，路由键带团队前缀
    #[default]
    TeamDirect,
    /// 单租户，presence/probe 全局 fanout
    GlobalFanout,
}

/// 会话私有队列的一条绑定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub exchange: Exchange,
    pub routing_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Topology {
    variant: TopologyVariant,
}

impl Topology {
    pub fn new(variant: TopologyVariant) -> Self {
        Self { variant }
    }

    pub fn variant(&self) -> TopologyVariant {
        self.variant
    }

    pub fn kind_of(&self, exchange: Exchange) -> ExchangeKind {
        match (self.variant, exchange) {
            (TopologyVariant::GlobalFanout, Exchange::Presence | Exchange::Probe) => {
                ExchangeKind::Fanout
            }
            _ => ExchangeKind::Direct,
        }
    }

    pub fn exchanges(&self) -> [ExchangeSpec; 4] {
        Exchange::ALL.map(|exchange| ExchangeSpec {
            exchange,
            kind: self.kind_of(exchange),
            durable: true,
        })
    }

    /// presence / probe 广播使用的路由键
    pub fn broadcast_key(&self, team: &Team) -> String {
        match self.variant {
            TopologyVariant::TeamDirect => team.to_string(),
            TopologyVariant::GlobalFanout => String::new(),
        }
    }

    /// chat / probe-reply 点对点使用的路由键
    pub fn member_key(&self, team: &Team, name: &str) -> String {
        match self.variant {
            TopologyVariant::TeamDirect => format!("{team}.{name}"),
            TopologyVariant::GlobalFanout => name.to_string(),
        }
    }

    /// 登录时私有队列需要的四条绑定，顺序为 probe、probe-reply、presence、chat。
    pub fn bindings(&self, team: &Team, name: &str) -> [Binding; 4] {
        let broadcast = self.broadcast_key(team);
        let member = self.member_key(team, name);
        [
            Binding {
                exchange: Exchange::Probe,
                routing_key: broadcast.clone(),
            },
            Binding {
                exchange: Exchange::ProbeReply,
                routing_key: member.clone(),
            },
            Binding {
                exchange: Exchange::Presence,
                routing_key: broadcast,
            },
            Binding {
                exchange: Exchange::Chat,
                routing_key: member,
            },
        ]
    }
}
