use std::sync::Arc;

use application::{
    declare_topology, BrokerError, ConnectionSupervisor, Connector, LocalBroker, SessionContext,
    SupervisorConfig,
};
use config::{BrokerConfig, TopologyMode};
use domain::{Topology, TopologyVariant};
use thiserror::Error;
use tracing::info;

use crate::amqp::AmqpConnector;

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("unsupported broker url scheme: {0}")]
    UnsupportedScheme(String),
    #[error("broker {target} unreachable: {source}")]
    Unreachable {
        target: String,
        #[source]
        source: BrokerError,
    },
    #[error("topology declaration failed: {0}")]
    Topology(#[source] BrokerError),
}

/// 代理后端，由 URL scheme 决定
#[derive(Clone)]
pub enum Backend {
    Amqp,
    /// 进程内代理，单节点开发与测试使用
    Memory(LocalBroker),
}

#[derive(Clone)]
pub struct Infrastructure {
    pub supervisor: ConnectionSupervisor,
    pub topology: Topology,
    pub backend: Backend,
}

impl Infrastructure {
    /// 启动连接监督者，等待首个连接并声明拓扑。任何一步失败都视为启动失败。
    pub async fn start(config: &BrokerConfig) -> Result<Self, InfrastructureError> {
        let (connector, backend) = select_backend(&config.url)?;
        let target = connector.describe();

        let supervisor = ConnectionSupervisor::start(
            connector,
            SupervisorConfig {
                fetch_timeout: config.login_timeout(),
                reconnect_initial: config.reconnect_initial(),
                reconnect_max: config.reconnect_max(),
            },
        );

        let topology = Topology::new(topology_variant(config.topology));
        declare_topology(&supervisor, topology, config.startup_timeout())
            .await
            .map_err(|err| match err {
                BrokerError::Unavailable { .. } => InfrastructureError::Unreachable {
                    target: target.clone(),
                    source: err,
                },
                other => InfrastructureError::Topology(other),
            })?;
        info!(target_url = %target, variant = ?topology.variant(), "broker topology ready");

        Ok(Self {
            supervisor,
            topology,
            backend,
        })
    }

    pub fn session_context(&self) -> SessionContext {
        SessionContext::new(self.supervisor.clone(), self.topology)
    }
}

fn select_backend(url: &str) -> Result<(Arc<dyn Connector>, Backend), InfrastructureError> {
    let scheme = url
        .split_once("://")
        .map(|(scheme, _)| scheme.to_ascii_lowercase())
        .unwrap_or_default();
    match scheme.as_str() {
        "amqp" | "amqps" => Ok((Arc::new(AmqpConnector::new(url)), Backend::Amqp)),
        "memory" => {
            let broker = LocalBroker::new();
            Ok((broker.connector(), Backend::Memory(broker)))
        }
        _ => Err(InfrastructureError::UnsupportedScheme(scheme)),
    }
}

pub fn topology_variant(mode: TopologyMode) -> TopologyVariant {
    match mode {
        TopologyMode::Direct => TopologyVariant::TeamDirect,
        TopologyMode::Fanout => TopologyVariant::GlobalFanout,
    }
}
