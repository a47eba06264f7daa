// 进程内消息代理：单节点开发与测试使用，语义与 AMQP 后端一致
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use domain::{ExchangeKind, ExchangeSpec, Headers};
use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::broker::{
    Acker, BrokerChannel, BrokerConnection, BrokerError, Connector, Delivery, DeliveryStream,
    OutboundMessage,
};

/// 已发布消息的记录，仅在 [`LocalBroker::recording`] 创建的代理上保留
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
struct Envelope {
    exchange: String,
    routing_key: String,
    headers: Headers,
    body: Vec<u8>,
}

struct LocalQueue {
    channel_id: u64,
    bindings: Vec<(String, String)>,
    sender: mpsc::UnboundedSender<Envelope>,
    receiver: Option<mpsc::UnboundedReceiver<Envelope>>,
}

#[derive(Default)]
struct BrokerState {
    exchanges: HashMap<String, (ExchangeKind, bool)>,
    queues: HashMap<String, LocalQueue>,
    journal: Option<Vec<PublishedMessage>>,
}

struct Inner {
    state: Mutex<BrokerState>,
    generation: watch::Sender<u64>,
    available: AtomicBool,
    channel_epoch: AtomicU64,
    acks: AtomicUsize,
    sequence: AtomicU64,
}

#[derive(Clone)]
pub struct LocalBroker {
    inner: Arc<Inner>,
}

impl LocalBroker {
    /// 不保留发布记录，供长期运行使用
    pub fn new() -> Self {
        Self::with_journal(None)
    }

    /// 保留每条发布消息，供 [`published`](Self::published) 检查
    pub fn recording() -> Self {
        Self::with_journal(Some(Vec::new()))
    }

    fn with_journal(journal: Option<Vec<PublishedMessage>>) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(BrokerState {
                    journal,
                    ..BrokerState::default()
                }),
                generation,
                available: AtomicBool::new(true),
                channel_epoch: AtomicU64::new(0),
                acks: AtomicUsize::new(0),
                sequence: AtomicU64::new(1),
            }),
        }
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(LocalConnector {
            broker: self.clone(),
        })
    }

    /// 模拟代理宕机：现有连接全部断开，独占队列随之删除，新的拨号失败
    pub fn disconnect(&self) {
        self.inner.available.store(false, Ordering::SeqCst);
        self.state().queues.clear();
        self.inner.generation.send_modify(|generation| *generation += 1);
    }

    /// 模拟代理强制关闭全部通道：连接保持可用，独占队列随通道删除
    pub fn drop_channels(&self) {
        self.inner.channel_epoch.fetch_add(1, Ordering::SeqCst);
        self.state().queues.clear();
    }

    /// 恢复可用，之后的拨号成功
    pub fn restore(&self) {
        self.inner.available.store(true, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state().journal.clone().unwrap_or_default()
    }

    pub fn published_to(&self, exchange: &str) -> Vec<PublishedMessage> {
        self.state()
            .journal
            .iter()
            .flatten()
            .filter(|message| message.exchange == exchange)
            .cloned()
            .collect()
    }

    pub fn acked(&self) -> usize {
        self.inner.acks.load(Ordering::SeqCst)
    }

    pub fn queue_count(&self) -> usize {
        self.state().queues.len()
    }

    pub fn exchange_kind(&self, name: &str) -> Option<ExchangeKind> {
        self.state().exchanges.get(name).map(|(kind, _)| *kind)
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn generation(&self) -> u64 {
        *self.inner.generation.borrow()
    }

    fn channel_epoch(&self) -> u64 {
        self.inner.channel_epoch.load(Ordering::SeqCst)
    }

    fn next_id(&self) -> u64 {
        self.inner.sequence.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for LocalBroker {
    fn default() -> Self {
        Self::new()
    }
}

struct LocalConnector {
    broker: LocalBroker,
}

#[async_trait]
impl Connector for LocalConnector {
    async fn connect(&self) -> Result<Arc<dyn BrokerConnection>, BrokerError> {
        if !self.broker.inner.available.load(Ordering::SeqCst) {
            return Err(BrokerError::connection("in-process broker is down"));
        }
        Ok(Arc::new(LocalConnection {
            broker: self.broker.clone(),
            generation: self.broker.generation(),
        }))
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}

struct LocalConnection {
    broker: LocalBroker,
    generation: u64,
}

#[async_trait]
impl BrokerConnection for LocalConnection {
    async fn open_channel(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError> {
        if !self.is_connected() {
            return Err(BrokerError::connection("connection closed"));
        }
        Ok(Arc::new(LocalChannel {
            broker: self.broker.clone(),
            generation: self.generation,
            epoch: self.broker.channel_epoch(),
            id: self.broker.next_id(),
            closed: AtomicBool::new(false),
        }))
    }

    fn is_connected(&self) -> bool {
        self.broker.inner.available.load(Ordering::SeqCst)
            && self.broker.generation() == self.generation
    }

    async fn closed(&self) {
        let mut receiver = self.broker.inner.generation.subscribe();
        let generation = self.generation;
        let _ = receiver.wait_for(|current| *current != generation).await;
    }
}

struct LocalChannel {
    broker: LocalBroker,
    generation: u64,
    epoch: u64,
    id: u64,
    closed: AtomicBool,
}

impl LocalChannel {
    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst)
            || self.broker.generation() != self.generation
            || self.broker.channel_epoch() != self.epoch
        {
            return Err(BrokerError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerChannel for LocalChannel {
    async fn declare_exchange(&self, spec: &ExchangeSpec) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut state = self.broker.state();
        if let Some(existing) = state.exchanges.get(spec.name()).copied() {
            if existing != (spec.kind, spec.durable) {
                return Err(BrokerError::Declare {
                    exchange: spec.name().to_string(),
                    message: format!(
                        "PRECONDITION_FAILED - inequivalent arg 'type': received '{}' but current is '{}'",
                        spec.kind.as_str(),
                        existing.0.as_str()
                    ),
                });
            }
            return Ok(());
        }
        state
            .exchanges
            .insert(spec.name().to_string(), (spec.kind, spec.durable));
        Ok(())
    }

    async fn declare_private_queue(&self) -> Result<String, BrokerError> {
        self.ensure_open()?;
        let name = format!("amq.gen-{}", self.broker.next_id());
        let (sender, receiver) = mpsc::unbounded_channel();
        self.broker.state().queues.insert(
            name.clone(),
            LocalQueue {
                channel_id: self.id,
                bindings: Vec::new(),
                sender,
                receiver: Some(receiver),
            },
        );
        Ok(name)
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let bind_error = |message: &str| BrokerError::Bind {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            message: message.to_string(),
        };
        let mut state = self.broker.state();
        if !state.exchanges.contains_key(exchange) {
            return Err(bind_error("NOT_FOUND - no exchange"));
        }
        let queue = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| bind_error("NOT_FOUND - no queue"))?;
        let binding = (exchange.to_string(), routing_key.to_string());
        if !queue.bindings.contains(&binding) {
            queue.bindings.push(binding);
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: OutboundMessage,
    ) -> Result<(), BrokerError> {
        self.ensure_open()?;
        let mut state = self.broker.state();
        let kind = state
            .exchanges
            .get(exchange)
            .map(|(kind, _)| *kind)
            .ok_or_else(|| BrokerError::Publish {
                exchange: exchange.to_string(),
                message: "NOT_FOUND - no exchange".to_string(),
            })?;

        let envelope = Envelope {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            headers: message.headers.clone(),
            body: message.body.clone().unwrap_or_default(),
        };
        for queue in state.queues.values() {
            let matched = queue.bindings.iter().any(|(bound, key)| {
                bound == exchange && (kind == ExchangeKind::Fanout || key == routing_key)
            });
            if matched {
                // 消费端已结束时直接丢弃
                let _ = queue.sender.send(envelope.clone());
            }
        }

        if let Some(journal) = state.journal.as_mut() {
            journal.push(PublishedMessage {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                headers: message.headers,
                body: message.body,
            });
        }
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<DeliveryStream, BrokerError> {
        self.ensure_open()?;
        let receiver = self
            .broker
            .state()
            .queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::Consume {
                message: format!("NOT_FOUND - no queue '{queue}'"),
            })?
            .receiver
            .take()
            .ok_or_else(|| BrokerError::Consume {
                message: format!("queue '{queue}' already has a consumer"),
            })?;

        let broker = self.broker.clone();
        let stream = UnboundedReceiverStream::new(receiver).map(move |envelope| {
            Ok(Delivery {
                exchange: envelope.exchange,
                routing_key: envelope.routing_key,
                headers: envelope.headers,
                body: envelope.body,
                acker: Box::new(LocalAcker {
                    broker: broker.clone(),
                }),
            })
        });
        Ok(stream.boxed())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // 独占、自动删除的队列随通道关闭而删除
        self.broker
            .state()
            .queues
            .retain(|_, queue| queue.channel_id != self.id);
        Ok(())
    }
}

struct LocalAcker {
    broker: LocalBroker,
}

#[async_trait]
impl Acker for LocalAcker {
    async fn ack(self: Box<Self>) -> Result<(), BrokerError> {
        self.broker.inner.acks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Exchange, Topology, TopologyVariant};

    async fn channel(broker: &LocalBroker) -> Arc<dyn BrokerChannel> {
        let connection = broker.connector().connect().await.expect("connect");
        connection.open_channel().await.expect("channel")
    }

    async fn declare(channel: &Arc<dyn BrokerChannel>, variant: TopologyVariant) {
        for spec in Topology::new(variant).exchanges() {
            channel.declare_exchange(&spec).await.expect("declare");
        }
    }

    #[tokio::test]
    async fn direct_exchange_routes_by_exact_key() {
        let broker = LocalBroker::recording();
        let ch = channel(&broker).await;
        declare(&ch, TopologyVariant::TeamDirect).await;

        let alice = ch.declare_private_queue().await.unwrap();
        let bob = ch.declare_private_queue().await.unwrap();
        ch.bind_queue(&alice, "chat", "eng.alice").await.unwrap();
        ch.bind_queue(&bob, "chat", "eng.bob").await.unwrap();
        let mut alice_stream = ch.consume(&alice).await.unwrap();

        ch.publish("chat", "eng.alice", OutboundMessage::body("hello"))
            .await
            .unwrap();
        let delivery = alice_stream.next().await.unwrap().unwrap();
        assert_eq!(delivery.exchange, "chat");
        assert_eq!(delivery.body, b"hello");
        delivery.acker.ack().await.unwrap();
        assert_eq!(broker.acked(), 1);
        assert_eq!(broker.published_to("chat").len(), 1);
    }

    #[tokio::test]
    async fn fanout_exchange_ignores_routing_key() {
        let broker = LocalBroker::new();
        let ch = channel(&broker).await;
        declare(&ch, TopologyVariant::GlobalFanout).await;
        assert_eq!(
            broker.exchange_kind(Exchange::Presence.name()),
            Some(ExchangeKind::Fanout)
        );

        let queue = ch.declare_private_queue().await.unwrap();
        ch.bind_queue(&queue, "presence", "").await.unwrap();
        let mut stream = ch.consume(&queue).await.unwrap();

        ch.publish("presence", "anything", OutboundMessage::default())
            .await
            .unwrap();
        assert!(stream.next().await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn redeclare_with_other_kind_fails() {
        let broker = LocalBroker::new();
        let ch = channel(&broker).await;
        declare(&ch, TopologyVariant::TeamDirect).await;
        declare(&ch, TopologyVariant::TeamDirect).await;

        let fanout = Topology::new(TopologyVariant::GlobalFanout).exchanges()[1];
        let err = ch.declare_exchange(&fanout).await.unwrap_err();
        assert!(matches!(err, BrokerError::Declare { .. }));
    }

    #[tokio::test]
    async fn closing_channel_deletes_queue_and_ends_stream() {
        let broker = LocalBroker::new();
        let ch = channel(&broker).await;
        declare(&ch, TopologyVariant::TeamDirect).await;
        let queue = ch.declare_private_queue().await.unwrap();
        let mut stream = ch.consume(&queue).await.unwrap();
        assert_eq!(broker.queue_count(), 1);

        ch.close().await.unwrap();
        assert_eq!(broker.queue_count(), 0);
        assert!(stream.next().await.is_none());
        assert_eq!(
            ch.publish("chat", "eng.x", OutboundMessage::default()).await,
            Err(BrokerError::Closed)
        );
    }

    #[tokio::test]
    async fn plain_broker_keeps_no_journal() {
        let broker = LocalBroker::new();
        let ch = channel(&broker).await;
        declare(&ch, TopologyVariant::TeamDirect).await;
        let queue = ch.declare_private_queue().await.unwrap();
        ch.bind_queue(&queue, "chat", "eng.alice").await.unwrap();
        let mut stream = ch.consume(&queue).await.unwrap();

        for _ in 0..100 {
            ch.publish("chat", "eng.alice", OutboundMessage::body("hello"))
                .await
                .unwrap();
        }
        assert!(stream.next().await.unwrap().is_ok());
        assert!(broker.published().is_empty());
        assert!(broker.published_to("chat").is_empty());
        assert!(broker.state().journal.is_none());
    }

    #[tokio::test]
    async fn dropped_channels_fail_but_connection_survives() {
        let broker = LocalBroker::new();
        let connection = broker.connector().connect().await.unwrap();
        let ch = connection.open_channel().await.unwrap();
        declare(&ch, TopologyVariant::TeamDirect).await;
        let queue = ch.declare_private_queue().await.unwrap();
        let mut stream = ch.consume(&queue).await.unwrap();

        broker.drop_channels();
        assert!(stream.next().await.is_none());
        assert_eq!(broker.queue_count(), 0);
        assert_eq!(
            ch.publish("chat", "eng.x", OutboundMessage::default()).await,
            Err(BrokerError::Closed)
        );

        assert!(connection.is_connected());
        let fresh = connection.open_channel().await.unwrap();
        assert!(fresh
            .publish("chat", "eng.x", OutboundMessage::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn disconnect_invalidates_connections() {
        let broker = LocalBroker::new();
        let connection = broker.connector().connect().await.unwrap();
        assert!(connection.is_connected());

        broker.disconnect();
        connection.closed().await;
        assert!(!connection.is_connected());
        assert!(broker.connector().connect().await.is_err());

        broker.restore();
        assert!(broker.connector().connect().await.is_ok());
    }
}
