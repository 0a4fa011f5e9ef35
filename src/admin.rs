//! Admin control surface: bearerbox accepts admin commands as ordinary
//! `Message::Admin` frames over an already-connected box socket, rather
//! than through a separate HTTP listener (page rendering is out of scope
//! for this core).

use async_trait::async_trait;

use crate::message::AdminCommand;
use crate::supervisor::{RunState, Supervisor};

/// A sink for admin commands arriving over a box connection. The box
/// multiplexer hands any `Message::Admin` frame it reads (other than the
/// identify handshake) to this trait rather than interpreting it itself.
#[async_trait]
pub trait AdminSink: Send + Sync {
    async fn handle_command(&self, command: AdminCommand, boxc_id: Option<String>);
}

/// The default admin sink: drives the supervisor's run state directly.
pub struct SupervisorAdminSink {
    supervisor: std::sync::Arc<Supervisor>,
}

impl SupervisorAdminSink {
    pub fn new(supervisor: std::sync::Arc<Supervisor>) -> Self {
        SupervisorAdminSink { supervisor }
    }
}

#[async_trait]
impl AdminSink for SupervisorAdminSink {
    async fn handle_command(&self, command: AdminCommand, boxc_id: Option<String>) {
        match command {
            AdminCommand::Shutdown => self.supervisor.set_state(RunState::Shutdown),
            AdminCommand::Suspend => self.supervisor.set_state(RunState::Suspended),
            AdminCommand::Resume => self.supervisor.set_state(RunState::Running),
            AdminCommand::Identify => {
                tracing::debug!(?boxc_id, "identify command reached admin sink");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::AccessList;

    #[tokio::test]
    async fn shutdown_command_updates_supervisor_state() {
        let supervisor = std::sync::Arc::new(Supervisor::new(AccessList::default(), vec![]));
        let sink = SupervisorAdminSink::new(supervisor.clone());
        sink.handle_command(AdminCommand::Shutdown, None).await;
        assert_eq!(supervisor.state(), RunState::Shutdown);
    }

    #[tokio::test]
    async fn suspend_then_resume_round_trips() {
        let supervisor = std::sync::Arc::new(Supervisor::new(AccessList::default(), vec![]));
        let sink = SupervisorAdminSink::new(supervisor.clone());
        sink.handle_command(AdminCommand::Suspend, None).await;
        assert_eq!(supervisor.state(), RunState::Suspended);
        sink.handle_command(AdminCommand::Resume, None).await;
        assert_eq!(supervisor.state(), RunState::Running);
    }
}
