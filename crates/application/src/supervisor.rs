//! 代理连接监督者
//!
//! 维护唯一一条存活连接，断线后按退避重新拨号，并通过 `watch` 通道把新连接发布给
//! 所有使用方。使用方不得跨 `.await` 缓存连接，每次都重新获取。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::broker::{BrokerConnection, BrokerError, Connector};
use crate::retry::Backoff;

type Current = Option<Arc<dyn BrokerConnection>>;

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// 登录路径上获取连接的最长等待
    pub fetch_timeout: Duration,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(1),
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(30),
        }
    }
}

/// 可廉价克隆的连接来源，显式注入到每个会话
#[derive(Clone)]
pub struct ConnectionSupervisor {
    receiver: watch::Receiver<Current>,
    fetch_timeout: Duration,
}

impl ConnectionSupervisor {
    /// 启动后台重连循环。该任务随进程存活，不会被显式停止。
    pub fn start(connector: Arc<dyn Connector>, config: SupervisorConfig) -> Self {
        let (sender, receiver) = watch::channel::<Current>(None);
        let backoff = Backoff::exponential(config.reconnect_initial, config.reconnect_max);
        tokio::spawn(Self::run(connector, sender, backoff));
        Self {
            receiver,
            fetch_timeout: config.fetch_timeout,
        }
    }

    async fn run(connector: Arc<dyn Connector>, sender: watch::Sender<Current>, mut backoff: Backoff) {
        let target = connector.describe();
        loop {
            match connector.connect().await {
                Ok(connection) => {
                    backoff.reset();
                    info!(target_url = %target, "broker connection established");
                    sender.send_replace(Some(connection.clone()));
                    connection.closed().await;
                    sender.send_replace(None);
                    warn!(target_url = %target, "broker connection lost, redialing");
                }
                Err(err) => {
                    let delay = backoff.next_delay();
                    warn!(
                        target_url = %target,
                        attempt = backoff.attempts(),
                        error = %err,
                        "broker dial failed, retry in {:.1}s",
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// 获取当前连接，最多等待 `fetch_timeout`
    pub async fn current(&self) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        self.wait_ready(self.fetch_timeout).await
    }

    /// 获取当前连接，最多等待 `limit`
    pub async fn wait_ready(&self, limit: Duration) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        let mut receiver = self.receiver.clone();
        let fetch = async move {
            let current = receiver
                .wait_for(|current| current.as_ref().is_some_and(|conn| conn.is_connected()))
                .await
                .map_err(|_| BrokerError::unavailable("connection supervisor stopped"))?;
            current
                .clone()
                .ok_or_else(|| BrokerError::unavailable("no broker connection"))
        };
        tokio::time::timeout(limit, fetch).await.map_err(|_| {
            BrokerError::unavailable(format!(
                "cannot connect to backend within {}ms",
                limit.as_millis()
            ))
        })?
    }

    pub fn is_connected(&self) -> bool {
        self.receiver
            .borrow()
            .as_ref()
            .is_some_and(|conn| conn.is_connected())
    }
}
