//! 内存客户端传输，用于驱动完整会话

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use application::{
    ApplicationError, ClientSink, ClientStream, CloseReason, ConnectionSupervisor, LocalBroker,
    Session, SessionContext, SupervisorConfig, TransportError,
};
use async_trait::async_trait;
use domain::{Team, Topology, TopologyVariant};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub enum ClientEvent {
    Text(String),
    Close(CloseReason),
}

struct MemoryInbound {
    frames: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl ClientStream for MemoryInbound {
    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        self.frames.recv().await.map(Ok)
    }
}

struct MemoryOutbound {
    events: mpsc::UnboundedSender<ClientEvent>,
}

#[async_trait]
impl ClientSink for MemoryOutbound {
    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.events
            .send(ClientEvent::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&self, reason: CloseReason) -> Result<(), TransportError> {
        self.events
            .send(ClientEvent::Close(reason))
            .map_err(|_| TransportError::Closed)
    }
}

pub struct Relay {
    pub broker: LocalBroker,
    pub ctx: SessionContext,
}

impl Relay {
    pub async fn start() -> Self {
        Self::with_variant(TopologyVariant::TeamDirect).await
    }

    pub async fn with_variant(variant: TopologyVariant) -> Self {
        let broker = LocalBroker::recording();
        let config = SupervisorConfig {
            fetch_timeout: Duration::from_millis(300),
            reconnect_initial: Duration::from_millis(10),
            reconnect_max: Duration::from_millis(50),
        };
        let supervisor = ConnectionSupervisor::start(broker.connector(), config);
        let topology = Topology::new(variant);
        application::declare_topology(&supervisor, topology, WAIT)
            .await
            .expect("declare topology");
        Self {
            broker,
            ctx: SessionContext::new(supervisor, topology),
        }
    }

    pub fn connect(&self, team: &str) -> TestClient {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Session::new(
            self.ctx.clone(),
            Team::parse(team).expect("team"),
            MemoryInbound { frames: frames_rx },
            Arc::new(MemoryOutbound { events: events_tx }),
        );
        TestClient {
            frames: Some(frames_tx),
            events: events_rx,
            session: tokio::spawn(session.run()),
        }
    }

    /// 某个成员的在线状态广播次数
    pub fn presence_count(&self, name: &str, status: &str) -> usize {
        self.broker
            .published_to("presence")
            .iter()
            .filter(|message| message.headers["name"] == name && message.headers["status"] == status)
            .count()
    }

    pub fn probe_count(&self, from: &str) -> usize {
        self.broker
            .published_to("probe")
            .iter()
            .filter(|message| message.headers["from"] == from)
            .count()
    }
}

pub struct TestClient {
    frames: Option<mpsc::UnboundedSender<String>>,
    events: mpsc::UnboundedReceiver<ClientEvent>,
    session: JoinHandle<Result<(), ApplicationError>>,
}

impl TestClient {
    pub fn send(&self, frame: &str) {
        if let Some(frames) = &self.frames {
            frames.send(frame.to_string()).expect("session alive");
        }
    }

    /// 登录并等待自己的上线广播回到本会话
    pub async fn login(&mut self, name: &str) {
        self.send(&format!(r#"{{"type":"login","name":"{name}"}}"#));
        let own = self.next_json().await;
        assert_eq!(own["type"], "presence");
        assert_eq!(own["name"], name);
        assert_eq!(own["status"], "online");
    }

    pub async fn next_event(&mut self) -> ClientEvent {
        timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("session ended without close")
    }

    pub async fn next_text(&mut self) -> String {
        match self.next_event().await {
            ClientEvent::Text(text) => text,
            ClientEvent::Close(reason) => panic!("unexpected close: {reason:?}"),
        }
    }

    pub async fn next_json(&mut self) -> Value {
        serde_json::from_str(&self.next_text().await).expect("json frame")
    }

    pub async fn expect_close(&mut self) -> CloseReason {
        loop {
            if let ClientEvent::Close(reason) = self.next_event().await {
                return reason;
            }
        }
    }

    pub async fn expect_silence(&mut self, window: Duration) {
        if let Ok(Some(event)) = timeout(window, self.events.recv()).await {
            panic!("unexpected frame: {event:?}");
        }
    }

    /// 客户端主动断开，等待会话清理完成
    pub async fn disconnect(mut self) -> Result<(), ApplicationError> {
        self.frames.take();
        timeout(WAIT, self.session)
            .await
            .expect("session did not finish")
            .expect("session task panicked")
    }

    pub async fn finished(self) -> Result<(), ApplicationError> {
        timeout(WAIT, self.session)
            .await
            .expect("session did not finish")
            .expect("session task panicked")
    }
}
