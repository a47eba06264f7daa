use std::sync::Arc;

use application::{ClientSink, ClientStream, CloseReason, Session, SessionContext, TransportError};
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket};
use domain::Team;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::Instrument;

/// 出站命令队列容量
const OUTBOUND_CAPACITY: usize = 64;

/// WebSocket 连接
///
/// 读取端交给会话驱动；所有写操作经由命令队列交给单独的发送任务，
/// 会话与投递转发任务因此可以并发写同一个连接。
pub struct WebSocketConnection {
    socket: WebSocket,
    ctx: SessionContext,
    team: Team,
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, ctx: SessionContext, team: Team) -> Self {
        Self { socket, ctx, team }
    }

    pub async fn run(self) {
        let (mut sender, incoming) = self.socket.split();
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(OUTBOUND_CAPACITY);

        // 发送任务：统一处理所有对 WebSocket sender 的写操作
        let send_task = tokio::spawn(
            async move {
                while let Some(cmd) = cmd_rx.recv().await {
                    match cmd {
                        WsCommand::SendText(text) => {
                            if sender.send(WsMessage::Text(text.into())).await.is_err() {
                                tracing::warn!("Failed to send text message");
                                break;
                            }
                        }
                        WsCommand::SendPong(data) => {
                            if sender.send(WsMessage::Pong(data)).await.is_err() {
                                tracing::warn!("Failed to send pong message");
                                break;
                            }
                        }
                        WsCommand::Close(reason) => {
                            let frame = CloseFrame {
                                code: reason.code,
                                reason: reason.reason.into(),
                            };
                            if let Err(err) = sender.send(WsMessage::Close(Some(frame))).await {
                                tracing::debug!(error = %err, "close frame not sent");
                            }
                            break;
                        }
                    }
                }
                let _ = sender.close().await;
                tracing::debug!("WebSocket发送任务结束");
            }
            .in_current_span(),
        );

        let inbound = WsInbound {
            incoming,
            commands: cmd_tx.clone(),
        };
        let outbound = Arc::new(WsOutbound { commands: cmd_tx });
        let session = Session::new(self.ctx, self.team, inbound, outbound);

        // 会话结束原因已在会话内记录
        let _ = session.run().await;

        if let Err(err) = send_task.await {
            tracing::warn!(error = %err, "WebSocket发送任务异常退出");
        }
    }
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendText(String),
    SendPong(Bytes),
    Close(CloseReason),
}

struct WsInbound {
    incoming: SplitStream<WebSocket>,
    commands: mpsc::Sender<WsCommand>,
}

#[async_trait]
impl ClientStream for WsInbound {
    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            let message = match self.incoming.next().await? {
                Ok(message) => message,
                Err(err) => return Some(Err(TransportError::Receive(err.to_string()))),
            };
            match message {
                WsMessage::Text(text) => return Some(Ok(text.as_str().to_owned())),
                WsMessage::Binary(data) => {
                    return Some(String::from_utf8(data.to_vec()).map_err(|_| {
                        TransportError::Receive("binary frame is not valid UTF-8".into())
                    }))
                }
                WsMessage::Ping(data) => {
                    tracing::debug!("收到ping消息，发送pong回应");
                    if self.commands.send(WsCommand::SendPong(data)).await.is_err() {
                        return Some(Err(TransportError::Closed));
                    }
                }
                WsMessage::Pong(_) => {}
                WsMessage::Close(_) => {
                    tracing::debug!("WebSocket收到关闭消息");
                    return None;
                }
            }
        }
    }
}

struct WsOutbound {
    commands: mpsc::Sender<WsCommand>,
}

#[async_trait]
impl ClientSink for WsOutbound {
    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.commands
            .send(WsCommand::SendText(text))
            .await
            .map_err(|_| TransportError::Send("WebSocket writer stopped".into()))
    }

    async fn close(&self, reason: CloseReason) -> Result<(), TransportError> {
        self.commands
            .send(WsCommand::Close(reason))
            .await
            .map_err(|_| TransportError::Closed)
    }
}
