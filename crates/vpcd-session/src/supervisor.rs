use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{info, warn};
use vpcd_card::CardBackend;

use crate::cancel::CancelToken;
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::event::{EventSink, ExitReason};
use crate::session::Session;
use crate::state::{SessionState, StateHandle};

const WORKER_NAME: &str = "vpcd-session";

/// Owns at most one running session.
///
/// Starting a new session cancels the previous one first, so no two sessions
/// ever hold a live card backend at the same time.
#[derive(Debug, Default)]
pub struct Supervisor {
    active: Option<ActiveSession>,
}

#[derive(Debug)]
struct ActiveSession {
    cancel: CancelToken,
    state: StateHandle,
    worker: JoinHandle<ExitReason>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session on a dedicated worker thread.
    pub fn start(
        &mut self,
        config: SessionConfig,
        backend: Box<dyn CardBackend>,
        sink: Arc<dyn EventSink>,
    ) -> Result<()> {
        if let Some(previous) = self.cancel() {
            info!(%previous, "replaced running session");
        }

        let session = Session::new(config, backend, sink);
        let cancel = session.cancel_token();
        let state = session.state_handle();

        // On spawn failure the closure is dropped, which ejects the backend.
        let worker = std::thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || session.run())
            .map_err(SessionError::Spawn)?;

        self.active = Some(ActiveSession {
            cancel,
            state,
            worker,
        });
        Ok(())
    }

    /// Cancel the running session and wait until it released its resources.
    ///
    /// A blocked read or accept is interrupted promptly. A client-mode
    /// session still dialing its reader notices the cancel only when the
    /// connect attempt ends, so this can block for up to
    /// [`SessionConfig::connect_timeout`]. The dialed connection is then
    /// dropped without being served.
    ///
    /// Returns `None` when no session was running.
    pub fn cancel(&mut self) -> Option<ExitReason> {
        let active = self.active.take()?;
        active.cancel.cancel();
        Some(join(active.worker))
    }

    /// Wait for the running session to end on its own.
    pub fn wait(&mut self) -> Option<ExitReason> {
        let active = self.active.take()?;
        Some(join(active.worker))
    }

    /// Whether a session is running.
    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.worker.is_finished())
    }

    /// State of the current session, `Idle` when none was started.
    pub fn state(&self) -> SessionState {
        self.active
            .as_ref()
            .map_or(SessionState::Idle, |active| active.state.get())
    }

    /// Token cancelling the current session, usable from a signal handler.
    pub fn cancel_token(&self) -> Option<CancelToken> {
        self.active.as_ref().map(|active| active.cancel.clone())
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn join(worker: JoinHandle<ExitReason>) -> ExitReason {
    match worker.join() {
        Ok(reason) => reason,
        Err(_) => {
            warn!("session worker panicked");
            ExitReason::Failed("session worker panicked".to_string())
        }
    }
}
