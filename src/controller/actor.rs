//! Controller actor - the single serialization point
//!
//! Every command source (HTTP, UDP, BLE) and every reader (broadcaster, page
//! render) goes through [`ControllerHandle`]. The actor task is the only
//! owner of the [`StateController`], so command applications — hardware
//! writes, persistence, flag updates — never interleave, regardless of which
//! surface they arrived on.

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::command::Command;
use super::snapshot::StateSnapshot;
use super::{PatchRef, StateController};

/// Queue depth for pending commands and queries. Remotes are human-paced;
/// a full queue means something is badly wrong and dropping is fine.
const COMMAND_QUEUE_DEPTH: usize = 64;

/// Messages understood by the controller actor.
pub enum ControllerMsg {
    /// Apply a command. `done` is used by surfaces that must respond only
    /// after the command took effect (HTTP POST); fire-and-forget surfaces
    /// pass `None`.
    Apply {
        command: Command,
        done: Option<oneshot::Sender<Option<PatchRef>>>,
    },
    Snapshot {
        reply: oneshot::Sender<StateSnapshot>,
    },
    HtmlContext {
        reply: oneshot::Sender<Vec<(String, String)>>,
    },
    Shutdown,
}

/// Actor owning the state controller.
pub struct ControllerActor {
    controller: StateController,
    command_rx: mpsc::Receiver<ControllerMsg>,
}

impl ControllerActor {
    /// Spawn the actor and return the shared handle.
    pub fn spawn(controller: StateController) -> ControllerHandle {
        let (cmd_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let actor = ControllerActor {
            controller,
            command_rx,
        };
        tokio::spawn(actor.run());
        ControllerHandle { cmd_tx }
    }

    async fn run(mut self) {
        debug!("controller actor started");

        while let Some(msg) = self.command_rx.recv().await {
            match msg {
                ControllerMsg::Apply { command, done } => {
                    let result = self.controller.apply(command);
                    if let Some(done) = done {
                        let _ = done.send(result);
                    }
                }
                ControllerMsg::Snapshot { reply } => {
                    let _ = reply.send(self.controller.snapshot());
                }
                ControllerMsg::HtmlContext { reply } => {
                    let _ = reply.send(self.controller.html_context());
                }
                ControllerMsg::Shutdown => break,
            }
        }

        debug!("controller actor stopped");
    }
}

/// Handle for submitting commands and queries to the controller actor.
/// Cheap to clone; one per surface.
#[derive(Clone)]
pub struct ControllerHandle {
    cmd_tx: mpsc::Sender<ControllerMsg>,
}

impl ControllerHandle {
    /// Apply a command and wait until it took effect.
    pub async fn apply(&self, command: Command) -> Option<PatchRef> {
        let (tx, rx) = oneshot::channel();
        let msg = ControllerMsg::Apply {
            command,
            done: Some(tx),
        };
        if self.cmd_tx.send(msg).await.is_err() {
            return None;
        }
        rx.await.ok().flatten()
    }

    /// Enqueue a command without waiting for the result. Used by the
    /// fire-and-forget surfaces (UDP, BLE).
    pub async fn apply_nowait(&self, command: Command) {
        let _ = self
            .cmd_tx
            .send(ControllerMsg::Apply {
                command,
                done: None,
            })
            .await;
    }

    /// Read-only snapshot for the broadcaster. `None` once the actor is gone.
    pub async fn snapshot(&self) -> Option<StateSnapshot> {
        let (tx, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ControllerMsg::Snapshot { reply: tx })
            .await
            .is_err()
        {
            return None;
        }
        rx.await.ok()
    }

    /// Template context for the web page; empty when the actor is gone.
    pub async fn html_context(&self) -> Vec<(String, String)> {
        let (tx, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ControllerMsg::HtmlContext { reply: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub fn is_alive(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    /// Signal the actor to stop. Fire-and-forget.
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.try_send(ControllerMsg::Shutdown);
    }
}
