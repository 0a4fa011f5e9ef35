//! The supervisor: bearerbox's top-level process-state machine and the
//! holder of global configuration (unified prefix, access lists) that every
//! other component receives by reference rather than reaching for through
//! a hidden global.

use std::sync::atomic::{AtomicU8, Ordering};

use tracing::info;

use crate::admission::AccessList;

/// Overall process state, driven by admin commands and fatal conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Isolated,
    Suspended,
    Shutdown,
    Dead,
    Full,
}

impl RunState {
    fn to_u8(self) -> u8 {
        match self {
            RunState::Running => 0,
            RunState::Isolated => 1,
            RunState::Suspended => 2,
            RunState::Shutdown => 3,
            RunState::Dead => 4,
            RunState::Full => 5,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => RunState::Running,
            1 => RunState::Isolated,
            2 => RunState::Suspended,
            3 => RunState::Shutdown,
            4 => RunState::Dead,
            _ => RunState::Full,
        }
    }
}

/// Process exit codes, matched against what an init system or wrapper
/// script expects to see on termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Ok = 0,
    ConfigError = 1,
    FatalError = 2,
}

/// Bearerbox's top-level state holder. Constructed once at startup and
/// shared by reference (`Arc<Supervisor>`) with every component that needs
/// to check whether it should keep running or observe the configured
/// access lists — never accessed through ambient/global state.
pub struct Supervisor {
    state: AtomicU8,
    pub access: AccessList,
    pub unified_prefix_strip: Vec<String>,
}

impl Supervisor {
    pub fn new(access: AccessList, unified_prefix_strip: Vec<String>) -> Self {
        Supervisor {
            state: AtomicU8::new(RunState::Running.to_u8()),
            access,
            unified_prefix_strip,
        }
    }

    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn set_state(&self, state: RunState) {
        info!(?state, "supervisor state transition");
        self.state.store(state.to_u8(), Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state(), RunState::Running)
    }

    pub fn is_accepting_new_work(&self) -> bool {
        matches!(self.state(), RunState::Running | RunState::Isolated)
    }

    pub fn request_shutdown(&self) {
        self.set_state(RunState::Shutdown);
    }

    pub fn exit_code(&self) -> ExitCode {
        match self.state() {
            RunState::Dead => ExitCode::FatalError,
            _ => ExitCode::Ok,
        }
    }
}
