use application::{ConnectionSupervisor, SessionContext};

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionContext,
}

impl AppState {
    pub fn new(sessions: SessionContext) -> Self {
        Self { sessions }
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.sessions.supervisor
    }
}
