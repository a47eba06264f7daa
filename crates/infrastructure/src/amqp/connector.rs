use std::sync::Arc;

use application::{BrokerChannel, BrokerConnection, BrokerError, Connector};
use async_trait::async_trait;
use lapin::{Connection, ConnectionProperties};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::channel::AmqpChannel;
use super::error;

/// 拨号 `amqp://` / `amqps://` 地址
pub struct AmqpConnector {
    url: String,
}

impl AmqpConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for AmqpConnector {
    async fn connect(&self) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        let connection = Connection::connect(&self.url, ConnectionProperties::default())
            .await
            .map_err(error::connection)?;

        let (lost, _) = watch::channel(false);
        let lost = Arc::new(lost);
        let notifier = lost.clone();
        connection.on_error(move |err| {
            warn!(error = %err, "AMQP connection error");
            notifier.send_replace(true);
        });
        debug!(target_url = %self.describe(), "AMQP connection opened");

        Ok(Arc::new(AmqpConnection { connection, lost }))
    }

    fn describe(&self) -> String {
        config::redact_credentials(&self.url)
    }
}

pub struct AmqpConnection {
    connection: Connection,
    lost: Arc<watch::Sender<bool>>,
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    async fn open_channel(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(error::channel)?;
        Ok(Arc::new(AmqpChannel::new(channel)))
    }

    fn is_connected(&self) -> bool {
        self.connection.status().connected() && !*self.lost.borrow()
    }

    async fn closed(&self) {
        let mut lost = self.lost.subscribe();
        let _ = lost.wait_for(|lost| *lost).await;
    }
}
