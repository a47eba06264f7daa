//! 应用层实现。
//!
//! 代理端口与进程内实现、连接监督、拓扑声明、发布路由、
//! 在线发现协议、投递转发以及驱动单个客户端连接的会话。

pub mod broker;
pub mod delivery;
pub mod error;
pub mod local_broker;
pub mod presence;
pub mod publisher;
pub mod retry;
pub mod session;
pub mod supervisor;
pub mod topology;
pub mod transport;

pub use broker::{
    Acker, BrokerChannel, BrokerConnection, BrokerError, Connector, Delivery, DeliveryStream,
    OutboundMessage,
};
pub use delivery::{DeliveryForwarder, ForwarderExit};
pub use error::ApplicationError;
pub use local_broker::{LocalBroker, PublishedMessage};
pub use presence::PresenceSession;
pub use publisher::Publisher;
pub use retry::Backoff;
pub use session::{Session, SessionContext};
pub use supervisor::{ConnectionSupervisor, SupervisorConfig};
pub use topology::declare_topology;
pub use transport::{ClientSink, ClientStream, CloseReason, TransportError};
