//! 会话驱动
//!
//! 每个客户端连接一个 [`Session`]：读取客户端帧，驱动状态机，登录后启动投递转发。
//! 无论从哪条路径结束，清理（停止转发、下线广播、关闭通道）都只执行一次。

use std::sync::Arc;

use domain::{ClientFrame, ProtocolError, SessionState, Team, Topology};
use tokio::task::JoinHandle;
use tracing::{debug, error, field, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::broker::BrokerChannel;
use crate::delivery::{DeliveryForwarder, ForwarderExit};
use crate::error::ApplicationError;
use crate::presence::PresenceSession;
use crate::publisher::Publisher;
use crate::supervisor::ConnectionSupervisor;
use crate::transport::{ClientSink, ClientStream};

/// 所有会话共享的依赖，显式注入
#[derive(Clone)]
pub struct SessionContext {
    pub supervisor: ConnectionSupervisor,
    pub topology: Topology,
}

impl SessionContext {
    pub fn new(supervisor: ConnectionSupervisor, topology: Topology) -> Self {
        Self {
            supervisor,
            topology,
        }
    }
}

/// 登录成功后会话独占的代理资源
struct LiveSession {
    channel: Arc<dyn BrokerChannel>,
    presence: PresenceSession,
}

pub struct Session<S> {
    id: Uuid,
    ctx: SessionContext,
    team: Team,
    state: SessionState,
    inbound: S,
    outbound: Arc<dyn ClientSink>,
    live: Option<LiveSession>,
    forwarder: Option<JoinHandle<ForwarderExit>>,
}

impl<S: ClientStream> Session<S> {
    pub fn new(ctx: SessionContext, team: Team, inbound: S, outbound: Arc<dyn ClientSink>) -> Self {
        Self {
            id: Uuid::new_v4(),
            ctx,
            team,
            state: SessionState::default(),
            inbound,
            outbound,
            live: None,
            forwarder: None,
        }
    }

    /// 运行会话直到客户端断开或出错。客户端正常关闭时返回 `Ok(())`。
    pub async fn run(self) -> Result<(), ApplicationError> {
        let span = info_span!(
            "session",
            session_id = %self.id,
            team = %self.team,
            name = field::Empty
        );
        self.run_in_span().instrument(span).await
    }

    async fn run_in_span(mut self) -> Result<(), ApplicationError> {
        info!("session opened");
        let result = self.drive().await;

        match &result {
            Ok(()) => info!("client disconnected"),
            Err(err) if err.is_protocol_violation() => {
                warn!(error = %err, "protocol violation, terminating session")
            }
            Err(ApplicationError::Transport(err)) => info!(error = %err, "client transport closed"),
            Err(err) => error!(error = %err, "session failed"),
        }

        self.teardown().await;

        if let Some(reason) = result.as_ref().err().and_then(ApplicationError::close_reason) {
            if let Err(err) = self.outbound.close(reason).await {
                debug!(error = %err, "close frame not delivered");
            }
        }
        result
    }

    async fn drive(&mut self) -> Result<(), ApplicationError> {
        loop {
            tokio::select! {
                frame = self.inbound.recv() => match frame {
                    None => return Ok(()),
                    Some(Err(err)) => return Err(err.into()),
                    Some(Ok(text)) => self.handle_frame(&text).await?,
                },
                exit = forwarder_exit(&mut self.forwarder) => {
                    self.forwarder = None;
                    return Err(exit.into());
                }
            }
        }
    }

    async fn handle_frame(&mut self, text: &str) -> Result<(), ApplicationError> {
        match self.state.accept(text)? {
            ClientFrame::Login(login) => self.login(login.name).await,
            ClientFrame::Chat(chat) => self.route_chat(&chat.to, text).await,
        }
    }

    async fn login(&mut self, name: String) -> Result<(), ApplicationError> {
        self.state.authenticate()?;
        Span::current().record("name", name.as_str());
        info!("login");

        let connection = self.ctx.supervisor.current().await?;
        let channel = connection.open_channel().await?;
        let publisher = Publisher::new(channel.clone(), self.ctx.topology, self.team.clone());

        let live = self.live.insert(LiveSession {
            channel,
            presence: PresenceSession::new(publisher.clone(), name.clone()),
        });
        let deliveries = live.presence.join().await?;

        let forwarder = DeliveryForwarder::new(publisher, name, self.outbound.clone());
        self.forwarder = Some(forwarder.spawn(deliveries));
        Ok(())
    }

    async fn route_chat(&self, to: &str, frame: &str) -> Result<(), ApplicationError> {
        let live = self.live.as_ref().ok_or(ProtocolError::MustLoginFirst)?;
        live.presence
            .publisher()
            .route_chat(to, frame.as_bytes())
            .await?;
        Ok(())
    }

    /// 停止转发，补发下线广播，关闭通道
    async fn teardown(&mut self) {
        if let Some(handle) = self.forwarder.take() {
            handle.abort();
            let _ = handle.await;
        }

        let Some(mut live) = self.live.take() else {
            return;
        };

        if let Err(err) = live.presence.leave().await {
            warn!(error = %err, "offline publish failed, retrying on a fresh channel");
            match self.fresh_publisher().await {
                Ok(publisher) => {
                    if let Err(err) = live.presence.leave_with(&publisher).await {
                        error!(error = %err, "offline presence lost");
                    }
                    let _ = publisher.channel().close().await;
                }
                Err(err) => error!(error = %err, "offline presence lost"),
            }
        }

        if let Err(err) = live.channel.close().await {
            debug!(error = %err, "channel already closed");
        }
        info!("session cleaned up");
    }

    async fn fresh_publisher(&self) -> Result<Publisher, ApplicationError> {
        let connection = self.ctx.supervisor.current().await?;
        let channel = connection.open_channel().await?;
        Ok(Publisher::new(channel, self.ctx.topology, self.team.clone()))
    }
}

/// 转发任务结束时返回；尚未登录时永不返回
async fn forwarder_exit(forwarder: &mut Option<JoinHandle<ForwarderExit>>) -> ForwarderExit {
    match forwarder {
        Some(handle) => match handle.await {
            Ok(exit) => exit,
            Err(err) => ForwarderExit::Panicked(err.to_string()),
        },
        None => std::future::pending().await,
    }
}
