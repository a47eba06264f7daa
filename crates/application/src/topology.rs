use std::time::Duration;

use domain::Topology;
use tracing::info;

use crate::broker::BrokerError;
use crate::supervisor::ConnectionSupervisor;

/// 启动时声明四个交换机，之后不再调用。
///
/// 重复声明相同参数是空操作；参数不一致返回 [`BrokerError::Declare`]，调用方应视为致命配置错误。
pub async fn declare_topology(
    supervisor: &ConnectionSupervisor,
    topology: Topology,
    wait: Duration,
) -> Result<(), BrokerError> {
    let connection = supervisor.wait_ready(wait).await?;
    let channel = connection.open_channel().await?;

    let mut declared = Ok(());
    for spec in topology.exchanges() {
        declared = channel.declare_exchange(&spec).await;
        if declared.is_err() {
            break;
        }
        info!(
            exchange = spec.name(),
            kind = spec.kind.as_str(),
            durable = spec.durable,
            "exchange declared"
        );
    }

    let closed = channel.close().await;
    declared?;
    closed
}
