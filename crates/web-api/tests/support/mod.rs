#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use application::{declare_topology, ConnectionSupervisor, LocalBroker, SessionContext, SupervisorConfig};
use domain::Topology;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::HOST, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use web_api::{router, AppState};

const WAIT: Duration = Duration::from_secs(2);

pub struct TestServer {
    pub addr: SocketAddr,
    pub broker: LocalBroker,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let broker = LocalBroker::recording();
        let supervisor = ConnectionSupervisor::start(broker.connector(), SupervisorConfig::default());
        let topology = Topology::default();
        declare_topology(&supervisor, topology, WAIT)
            .await
            .expect("declare topology");
        let app = router(AppState::new(SessionContext::new(supervisor, topology)));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            broker,
            shutdown: Some(shutdown_tx),
        }
    }

    /// 携带指定 Host 头的 WebSocket 握手请求
    pub fn request(&self, path: &str, host: &str) -> tokio_tungstenite::tungstenite::handshake::client::Request {
        let mut request = format!("ws://{}{}", self.addr, path)
            .into_client_request()
            .expect("request");
        request
            .headers_mut()
            .insert(HOST, HeaderValue::from_str(host).expect("host header"));
        request
    }

    pub async fn connect(&self, team: &str) -> WsClient {
        self.connect_path("/ws", team).await
    }

    pub async fn connect_path(&self, path: &str, team: &str) -> WsClient {
        let request = self.request(path, &format!("{team}.chat.test"));
        let (socket, _) = connect_async(request).await.expect("websocket handshake");
        WsClient { socket }
    }

    pub fn presence_count(&self, name: &str, status: &str) -> usize {
        self.broker
            .published_to("presence")
            .iter()
            .filter(|message| message.headers["name"] == name && message.headers["status"] == status)
            .count()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

pub struct WsClient {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    pub async fn send(&mut self, frame: &str) {
        self.socket
            .send(Message::Text(frame.into()))
            .await
            .expect("send frame");
    }

    pub async fn login(&mut self, name: &str) {
        self.send(&format!(r#"{{"type":"login","name":"{name}"}}"#)).await;
        let own = self.next_json().await;
        assert_eq!(own["type"], "presence");
        assert_eq!(own["name"], name);
        assert_eq!(own["status"], "online");
    }

    pub async fn next_text(&mut self) -> String {
        loop {
            let message = timeout(WAIT, self.socket.next())
                .await
                .expect("timed out waiting for frame")
                .expect("socket closed")
                .expect("websocket error");
            match message {
                Message::Text(text) => return text.as_str().to_owned(),
                Message::Close(frame) => panic!("unexpected close: {frame:?}"),
                _ => continue,
            }
        }
    }

    pub async fn next_json(&mut self) -> Value {
        serde_json::from_str(&self.next_text().await).expect("json frame")
    }

    pub async fn expect_close(&mut self) -> CloseFrame {
        loop {
            let message = timeout(WAIT, self.socket.next())
                .await
                .expect("timed out waiting for close")
                .expect("socket closed without close frame")
                .expect("websocket error");
            if let Message::Close(Some(frame)) = message {
                return frame;
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.socket.close(None).await;
        // 等待服务端回应关闭
        let _ = timeout(WAIT, async { while self.socket.next().await.is_some() {} }).await;
    }
}
