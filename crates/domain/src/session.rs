//! 会话协议状态机
//!
//! `Unauthenticated` 经一次成功的 `Login` 进入 `Authenticated`，之后不再迁移。
//! 先按 `type` 标签与当前状态判定，放行后才解码具体字段，
//! 因此登录前的任何非登录帧一律是 `MustLoginFirst`，登录后的任何登录帧一律是 `DuplicateLogin`。
//! 这里只做判定，不做 I/O；任何违规都以 [`ProtocolError`] 结束会话。

use crate::errors::ProtocolError;
use crate::message::{ChatMessage, ClientFrame, LoginMessage, MessageType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    Authenticated,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated)
    }

    /// 判定当前状态下能否接受这一帧，接受时返回解码后的帧
    pub fn accept(&self, text: &str) -> Result<ClientFrame, ProtocolError> {
        let kind = MessageType::of_frame(text)?;
        match (self, kind) {
            (SessionState::Unauthenticated, MessageType::Login) => {
                LoginMessage::decode(text).map(ClientFrame::Login)
            }
            (SessionState::Unauthenticated, _) => Err(ProtocolError::MustLoginFirst),
            (SessionState::Authenticated, MessageType::Login) => Err(ProtocolError::DuplicateLogin),
            (SessionState::Authenticated, MessageType::Chat) => {
                ChatMessage::decode(text).map(ClientFrame::Chat)
            }
            (SessionState::Authenticated, MessageType::Presence) => {
                Err(ProtocolError::PresenceFromClient)
            }
        }
    }

    /// 唯一一次迁移到 `Authenticated`
    pub fn authenticate(&mut self) -> Result<(), ProtocolError> {
        if self.is_authenticated() {
            return Err(ProtocolError::DuplicateLogin);
        }
        *self = SessionState::Authenticated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN: &str = r#"{"type":"login","name":"alice"}"#;
    const CHAT: &str = r#"{"type":"chat","from":"alice","to":"bob","body":"hi"}"#;
    const PRESENCE: &str = r#"{"type":"presence","name":"alice","status":"online"}"#;

    fn authenticated() -> SessionState {
        let mut state = SessionState::default();
        state.authenticate().unwrap();
        state
    }

    #[test]
    fn only_login_is_accepted_before_authentication() {
        let state = SessionState::default();
        assert_eq!(
            state.accept(LOGIN),
            Ok(ClientFrame::Login(LoginMessage {
                name: "alice".into()
            }))
        );
        assert_eq!(state.accept(CHAT), Err(ProtocolError::MustLoginFirst));
        assert_eq!(state.accept(PRESENCE), Err(ProtocolError::MustLoginFirst));
    }

    #[test]
    fn incomplete_chat_before_login_still_requires_login() {
        let state = SessionState::default();
        assert_eq!(
            state.accept(r#"{"type":"chat","body":"hi"}"#),
            Err(ProtocolError::MustLoginFirst)
        );
        assert_eq!(
            state.accept(r#"{"type":"presence"}"#),
            Err(ProtocolError::MustLoginFirst)
        );
    }

    #[test]
    fn authenticated_session_routes_chat_and_rejects_login() {
        let state = authenticated();
        assert!(matches!(state.accept(CHAT), Ok(ClientFrame::Chat(chat)) if chat.to == "bob"));
        assert_eq!(state.accept(LOGIN), Err(ProtocolError::DuplicateLogin));
        assert_eq!(
            state.accept(PRESENCE),
            Err(ProtocolError::PresenceFromClient)
        );
    }

    #[test]
    fn any_login_after_authentication_is_duplicate() {
        let state = authenticated();
        assert_eq!(
            state.accept(r#"{"type":"login","name":""}"#),
            Err(ProtocolError::DuplicateLogin)
        );
        assert_eq!(
            state.accept(r#"{"type":"login"}"#),
            Err(ProtocolError::DuplicateLogin)
        );
    }

    #[test]
    fn unknown_or_broken_frames_fail_in_any_state() {
        for state in [SessionState::default(), authenticated()] {
            assert_eq!(
                state.accept(r#"{"type":"typing"}"#),
                Err(ProtocolError::UnsupportedType("typing".into()))
            );
            assert!(matches!(
                state.accept("{not json"),
                Err(ProtocolError::MalformedFrame(_))
            ));
        }
        assert!(matches!(
            authenticated().accept(r#"{"type":"chat","body":"no recipient"}"#),
            Err(ProtocolError::MalformedFrame(_))
        ));
    }

    #[test]
    fn authentication_happens_once() {
        let mut state = authenticated();
        assert_eq!(state.authenticate(), Err(ProtocolError::DuplicateLogin));
        assert!(state.is_authenticated());
    }
}
