use domain::{DecodeError, ProtocolError};
use thiserror::Error;

use crate::broker::BrokerError;
use crate::transport::{CloseReason, TransportError};

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("delivery forwarder stopped: {0}")]
    Forwarder(String),
}

impl ApplicationError {
    /// 发给客户端的关闭原因；客户端已断开时为 `None`
    pub fn close_reason(&self) -> Option<CloseReason> {
        match self {
            ApplicationError::Protocol(err) => Some(CloseReason::policy(err.to_string())),
            ApplicationError::Transport(_) => None,
            ApplicationError::Broker(BrokerError::Unavailable { .. }) => {
                Some(CloseReason::internal("cannot connect to backend"))
            }
            ApplicationError::Broker(_)
            | ApplicationError::Decode(_)
            | ApplicationError::Encode(_)
            | ApplicationError::Forwarder(_) => Some(CloseReason::internal("backend error")),
        }
    }

    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, ApplicationError::Protocol(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_violations_close_with_policy_code() {
        let close = ApplicationError::from(ProtocolError::MustLoginFirst)
            .close_reason()
            .unwrap();
        assert_eq!(close.code, CloseReason::POLICY_VIOLATION);
        assert_eq!(close.reason, "must send login message first");
    }

    #[test]
    fn transport_errors_have_no_close_reason() {
        assert!(ApplicationError::from(TransportError::Closed)
            .close_reason()
            .is_none());
    }

    #[test]
    fn outage_closes_with_backend_reason() {
        let close = ApplicationError::from(BrokerError::unavailable("timeout"))
            .close_reason()
            .unwrap();
        assert_eq!(close.code, CloseReason::INTERNAL_ERROR);
        assert_eq!(close.reason, "cannot connect to backend");
    }
}
