//! 团队聊天中继的核心领域模型
//!
//! 线路帧、在线状态、团队命名空间、交换机拓扑以及会话状态机。本 crate 不做任何 I/O。

pub mod errors;
pub mod message;
pub mod presence;
pub mod session;
pub mod topology;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use message::*;
pub use presence::*;
pub use session::*;
pub use topology::*;
pub use value_objects::*;
