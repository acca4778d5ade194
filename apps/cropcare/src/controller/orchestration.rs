//! Command orchestration from typed input to the backend command queue.

use crossbeam_channel::{Sender, TrySendError};

use crate::backend_bridge::commands::SessionCommand;

pub fn dispatch_session_command(
    cmd_tx: &Sender<SessionCommand>,
    cmd: SessionCommand,
    status: &mut String,
) {
    let cmd_name = cmd.name();

    match cmd_tx.try_send(cmd) {
        Ok(()) => tracing::debug!(command = cmd_name, "queued session command"),
        Err(TrySendError::Full(_)) => {
            *status = "Command queue is full; please retry".to_string();
        }
        Err(TrySendError::Disconnected(_)) => {
            *status = "Backend worker disconnected (possible startup failure); restart the session"
                .to_string();
        }
    }
}
