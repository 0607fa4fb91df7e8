//! Requests from the transport layer into the controller task
//!
//! Every request carries a oneshot reply so that callers observe the outcome
//! of their own operation, processed in line with serial readings.

use super::{Controller, ControllerStatus};
use crate::command::Command;
use crate::error::{HeatshedError, Result};
use crate::notify::{HistorySnapshot, Notification, NotificationBus, SubscriberId};
use crate::persistence::{HeaterRow, HistoryRange};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Queue depth of pending requests
pub const COMMAND_BUFFER: usize = 32;

/// Request accepted by the controller task
#[derive(Debug)]
pub enum ControllerCommand {
    Heaters {
        reply: oneshot::Sender<Result<Vec<HeaterRow>>>,
    },
    SetCommandById {
        id: u32,
        command: Command,
        reply: oneshot::Sender<Result<()>>,
    },
    SetCommand {
        phase: u8,
        wire: u8,
        command: Command,
        reply: oneshot::Sender<Result<()>>,
    },
    SetCommandForAll {
        command: Command,
        reply: oneshot::Sender<Result<()>>,
    },
    History {
        range: HistoryRange,
        reply: oneshot::Sender<Result<HistorySnapshot>>,
    },
    Status {
        reply: oneshot::Sender<Result<ControllerStatus>>,
    },
}

impl Controller {
    pub(crate) fn handle_command(&mut self, cmd: ControllerCommand) {
        // A caller that stopped waiting is not an error
        match cmd {
            ControllerCommand::Heaters { reply } => {
                let _ = reply.send(self.heaters());
            }
            ControllerCommand::SetCommandById { id, command, reply } => {
                let _ = reply.send(self.set_command_for_heater_by_id(id, command));
            }
            ControllerCommand::SetCommand {
                phase,
                wire,
                command,
                reply,
            } => {
                let _ = reply.send(self.set_command_for_heater(phase, wire, command));
            }
            ControllerCommand::SetCommandForAll { command, reply } => {
                let _ = reply.send(self.set_command_for_all_heaters(command));
            }
            ControllerCommand::History { range, reply } => {
                let _ = reply.send(self.history(range));
            }
            ControllerCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }
}

/// Cloneable client side of the controller task
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<ControllerCommand>,
    notifications: Arc<NotificationBus>,
}

impl ControllerHandle {
    /// Handle plus the receiver to pass to [`Controller::run`]
    pub fn new(notifications: Arc<NotificationBus>) -> (Self, mpsc::Receiver<ControllerCommand>) {
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        (
            Self {
                commands,
                notifications,
            },
            rx,
        )
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> ControllerCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| HeatshedError::Stopped)?;
        rx.await.map_err(|_| HeatshedError::Stopped)?
    }

    pub async fn heaters(&self) -> Result<Vec<HeaterRow>> {
        self.request(|reply| ControllerCommand::Heaters { reply })
            .await
    }

    pub async fn set_command_for_heater_by_id(&self, id: u32, command: Command) -> Result<()> {
        self.request(|reply| ControllerCommand::SetCommandById { id, command, reply })
            .await
    }

    pub async fn set_command_for_heater(&self, phase: u8, wire: u8, command: Command) -> Result<()> {
        self.request(|reply| ControllerCommand::SetCommand {
            phase,
            wire,
            command,
            reply,
        })
        .await
    }

    pub async fn set_command_for_all_heaters(&self, command: Command) -> Result<()> {
        self.request(|reply| ControllerCommand::SetCommandForAll { command, reply })
            .await
    }

    pub async fn history(&self, range: HistoryRange) -> Result<HistorySnapshot> {
        self.request(|reply| ControllerCommand::History { range, reply })
            .await
    }

    pub async fn status(&self) -> Result<ControllerStatus> {
        self.request(|reply| ControllerCommand::Status { reply })
            .await
    }

    /// Notifications are fanned out directly, without a round trip
    pub fn subscribe(&self) -> (SubscriberId, mpsc::Receiver<Notification>) {
        self.notifications.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.notifications.unsubscribe(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.notifications.subscriber_count()
    }
}
