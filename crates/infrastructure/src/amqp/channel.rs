use application::{Acker, BrokerChannel, BrokerError, Delivery, DeliveryStream, OutboundMessage};
use async_trait::async_trait;
use domain::{ExchangeKind, ExchangeSpec};
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{FieldTable, ShortString};
use lapin::{BasicProperties, Channel};
use uuid::Uuid;

use super::error;
use super::headers::{from_field_table, to_field_table};

const TRANSIENT: u8 = 1;
const REPLY_SUCCESS: u16 = 200;

pub struct AmqpChannel {
    channel: Channel,
}

impl AmqpChannel {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

fn exchange_kind(kind: ExchangeKind) -> lapin::ExchangeKind {
    match kind {
        ExchangeKind::Direct => lapin::ExchangeKind::Direct,
        ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
    }
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn declare_exchange(&self, spec: &ExchangeSpec) -> Result<(), BrokerError> {
        let options = ExchangeDeclareOptions {
            durable: spec.durable,
            ..ExchangeDeclareOptions::default()
        };
        self.channel
            .exchange_declare(
                spec.name(),
                exchange_kind(spec.kind),
                options,
                FieldTable::default(),
            )
            .await
            .map_err(|err| error::declare(spec.name(), err))
    }

    async fn declare_private_queue(&self) -> Result<String, BrokerError> {
        let options = QueueDeclareOptions {
            exclusive: true,
            auto_delete: true,
            ..QueueDeclareOptions::default()
        };
        let queue = self
            .channel
            .queue_declare("", options, FieldTable::default())
            .await
            .map_err(error::queue)?;
        Ok(queue.name().as_str().to_string())
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|err| error::bind(exchange, routing_key, err))
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: OutboundMessage,
    ) -> Result<(), BrokerError> {
        let mut properties = BasicProperties::default().with_delivery_mode(TRANSIENT);
        if !message.headers.is_empty() {
            properties = properties.with_headers(to_field_table(&message.headers));
        }
        if message.body.is_some() {
            properties = properties.with_content_type(ShortString::from("application/json".to_string()));
        }
        let payload = message.body.unwrap_or_default();

        self.channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
            .map_err(|err| error::publish(exchange, err))?
            .await
            .map_err(|err| error::publish(exchange, err))?;
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<DeliveryStream, BrokerError> {
        let tag = format!("teamchat-{}", Uuid::new_v4());
        let consumer = self
            .channel
            .basic_consume(
                queue,
                &tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(error::consume)?;

        let deliveries = consumer.map(|next| -> Result<Delivery, BrokerError> {
            let delivery = next.map_err(error::consume)?;
            Ok(Delivery {
                exchange: delivery.exchange.as_str().to_string(),
                routing_key: delivery.routing_key.as_str().to_string(),
                headers: from_field_table(delivery.properties.headers().as_ref()),
                body: delivery.data,
                acker: Box::new(AmqpAcker {
                    acker: delivery.acker,
                }),
            })
        });
        Ok(deliveries.boxed())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if !self.channel.status().connected() {
            return Ok(());
        }
        self.channel
            .close(REPLY_SUCCESS, "session closed")
            .await
            .map_err(error::channel)
    }
}

struct AmqpAcker {
    acker: lapin::acker::Acker,
}

#[async_trait]
impl Acker for AmqpAcker {
    async fn ack(self: Box<Self>) -> Result<(), BrokerError> {
        self.acker
            .ack(BasicAckOptions::default())
            .await
            .map_err(error::ack)
    }
}
