//! ---
//! fdy_section: "01-core-functionality"
//! fdy_subsection: "module"
//! fdy_type: "source"
//! fdy_scope: "code"
//! fdy_description: "Lifecycle orchestration core."
//! fdy_version: "v0.0.0-prealpha"
//! fdy_owner: "tbd"
//! ---
//! Fire-and-forget command dispatch.
//!
//! Delivery is at-most-once and unordered across concurrently executing
//! commands; handlers must tolerate late delivery.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::command::{Command, Envelope};

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("command bus is closed; {command} was not queued")]
    Closed { command: &'static str },
}

/// Queues commands for asynchronous execution.
#[async_trait]
pub trait CommandBus: Send + Sync {
    /// Queue a command, returning the id of its envelope.
    async fn dispatch(&self, command: Command) -> Result<Uuid, BusError>;
}

/// In-process bus backed by an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelBus {
    tx: mpsc::UnboundedSender<Envelope>,
}

/// Consuming side of a [`ChannelBus`].
#[derive(Debug)]
pub struct CommandReceiver {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

/// Create a connected bus and receiver.
pub fn channel() -> (ChannelBus, CommandReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelBus { tx }, CommandReceiver { rx })
}

#[async_trait]
impl CommandBus for ChannelBus {
    async fn dispatch(&self, command: Command) -> Result<Uuid, BusError> {
        let name = command.name();
        let envelope = Envelope::new(command);
        let id = envelope.id;
        self.tx
            .send(envelope)
            .map_err(|_| BusError::Closed { command: name })?;
        debug!(command = name, envelope = %id, "command queued");
        Ok(id)
    }
}

impl CommandReceiver {
    /// Wait for the next envelope; `None` once every bus handle is dropped.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Next envelope if one is already queued.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }

    /// Take everything currently queued.
    pub fn drain(&mut self) -> Vec<Envelope> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProjectId;

    #[tokio::test]
    async fn dispatched_commands_arrive_in_envelopes() {
        let (bus, mut rx) = channel();
        let id = bus.dispatch(Command::update(ProjectId(1))).await.unwrap();
        bus.dispatch(Command::backup(ProjectId(2))).await.unwrap();

        let queued = rx.drain();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].id, id);
        assert_eq!(queued[1].command, Command::backup(ProjectId(2)));
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn dispatch_fails_once_receiver_is_gone() {
        let (bus, rx) = channel();
        drop(rx);
        let err = bus.dispatch(Command::update(ProjectId(1))).await.unwrap_err();
        assert!(matches!(err, BusError::Closed { command: "update_project" }));
    }
}
