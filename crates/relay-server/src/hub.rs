//! Connection registry and fan-out.
//!
//! A single task owns the registry and applies commands in the order
//! they arrive. Everything else talks to it through a cloneable [`Hub`]
//! handle, so registry state is never shared behind a lock.
//!
//! Every registration carries a [`CancellationToken`] that fires when the hub
//! drops the entry (unregister, eviction, close-all). Sessions watch it to
//! tear down the transport instead of waiting on a peer that may never answer.

use std::collections::HashMap;

use relay_core::{ConnectionId, Frame, PresenceSnapshot, ServerFrame};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

/// Default capacity of each per-connection outbound queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

enum HubCommand {
    Register {
        id: ConnectionId,
        outbound: mpsc::Sender<Frame>,
        closed: DropGuard,
    },
    Unregister(ConnectionId),
    SetDisplayName {
        id: ConnectionId,
        name: String,
    },
    Broadcast(Frame),
    CloseAll,
    ConnectionCount(oneshot::Sender<usize>),
    Presence(oneshot::Sender<PresenceSnapshot>),
}

struct Entry {
    outbound: mpsc::Sender<Frame>,
    name: Option<String>,
    /// Cancels the connection's token when the entry is dropped.
    _closed: DropGuard,
}

/// Handle onto the hub loop. Cheap to clone.
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::UnboundedSender<HubCommand>,
    queue_capacity: usize,
}

impl Hub {
    /// Spawn the hub loop. The loop exits once every `Hub` clone is dropped.
    pub fn spawn(queue_capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = Registry {
            entries: HashMap::new(),
            commands: tx.downgrade(),
            closing: false,
        };
        let task = tokio::spawn(registry.run(rx));
        let hub = Self {
            commands: tx,
            queue_capacity: queue_capacity.max(1),
        };
        (hub, task)
    }

    /// Add a connection and hand back the receiving end of its outbound queue,
    /// plus a token that is cancelled once the hub lets go of the connection.
    ///
    /// If the loop has stopped, or the hub is closing, the receiver comes back
    /// closed and the token cancelled.
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<Frame>, CancellationToken) {
        let id = ConnectionId::new();
        let (outbound, rx) = mpsc::channel(self.queue_capacity);
        let closed = CancellationToken::new();
        self.send(HubCommand::Register {
            id: id.clone(),
            outbound,
            closed: closed.clone().drop_guard(),
        });
        (id, rx, closed)
    }

    /// Remove a connection and close its queue. Unknown ids are ignored.
    pub fn unregister(&self, id: &ConnectionId) {
        self.send(HubCommand::Unregister(id.clone()));
    }

    /// Record the name a connection announced. Unknown ids are ignored.
    pub fn set_display_name(&self, id: &ConnectionId, name: impl Into<String>) {
        self.send(HubCommand::SetDisplayName {
            id: id.clone(),
            name: name.into(),
        });
    }

    /// Fan a frame out to every registered connection. Connections whose
    /// queue cannot take it are evicted.
    pub fn broadcast(&self, frame: Frame) {
        self.send(HubCommand::Broadcast(frame));
    }

    /// Drop every connection, closing all outbound queues. Later
    /// registrations are refused.
    pub fn close_all(&self) {
        self.send(HubCommand::CloseAll);
    }

    /// Number of registered connections. Zero once the loop has stopped.
    pub async fn connection_count(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::ConnectionCount(reply));
        rx.await.unwrap_or(0)
    }

    /// Snapshot of the current member list.
    pub async fn presence(&self) -> PresenceSnapshot {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Presence(reply));
        rx.await.unwrap_or_default()
    }

    fn send(&self, command: HubCommand) {
        if self.commands.send(command).is_err() {
            debug!("hub loop stopped, dropping command");
        }
    }
}

struct Registry {
    entries: HashMap<ConnectionId, Entry>,
    /// Weak so that the loop does not keep itself alive.
    commands: mpsc::WeakUnboundedSender<HubCommand>,
    /// Set by `CloseAll`; no new entries after that.
    closing: bool,
}

impl Registry {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<HubCommand>) {
        debug!("hub loop started");
        while let Some(command) = rx.recv().await {
            self.apply(command);
        }
        debug!(remaining = self.entries.len(), "hub loop stopped");
    }

    fn apply(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register { id, outbound, closed } => {
                if self.closing {
                    // Dropping the guard and sender closes the new connection.
                    info!(conn_id = %id, "refusing registration while closing");
                    return;
                }
                info!(conn_id = %id, "connection registered");
                let entry = Entry {
                    outbound,
                    name: None,
                    _closed: closed,
                };
                let _ = self.entries.insert(id, entry);
                self.schedule_presence();
            }
            HubCommand::Unregister(id) => {
                if self.entries.remove(&id).is_some() {
                    info!(conn_id = %id, "connection unregistered");
                    self.schedule_presence();
                }
            }
            HubCommand::SetDisplayName { id, name } => match self.entries.get_mut(&id) {
                Some(entry) => {
                    debug!(conn_id = %id, name = %name, "display name set");
                    entry.name = Some(name);
                    self.schedule_presence();
                }
                None => debug!(conn_id = %id, "display name for unknown connection"),
            },
            HubCommand::Broadcast(frame) => self.broadcast(&frame),
            HubCommand::CloseAll => {
                info!(connections = self.entries.len(), "closing all connections");
                self.closing = true;
                self.entries.clear();
            }
            HubCommand::ConnectionCount(reply) => {
                let _ = reply.send(self.entries.len());
            }
            HubCommand::Presence(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn broadcast(&mut self, frame: &Frame) {
        let mut evicted = Vec::new();
        for (id, entry) in &self.entries {
            match entry.outbound.try_send(frame.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(conn_id = %id, "outbound queue full, evicting slow consumer");
                    evicted.push(id.clone());
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(conn_id = %id, "outbound queue closed, evicting");
                    evicted.push(id.clone());
                }
            }
        }
        debug!(
            recipients = self.entries.len() - evicted.len(),
            evicted = evicted.len(),
            "broadcast"
        );

        if evicted.is_empty() {
            return;
        }
        for id in &evicted {
            let _ = self.entries.remove(id);
        }
        self.schedule_presence();
    }

    fn snapshot(&self) -> PresenceSnapshot {
        PresenceSnapshot::from_names(self.entries.values().filter_map(|e| e.name.as_deref()))
    }

    /// Queue a presence broadcast behind whatever is already pending.
    fn schedule_presence(&self) {
        let frame = match ServerFrame::Presence(self.snapshot()).encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "failed to encode presence");
                return;
            }
        };
        if let Some(commands) = self.commands.upgrade() {
            let _ = commands.send(HubCommand::Broadcast(frame));
        }
    }
}
