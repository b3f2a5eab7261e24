//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.
//!
//! Each session runs two pumps. The inbound pump reads client frames and
//! hands them to the hub; the outbound pump is the sole consumer of the
//! connection's queue and writes whatever the hub enqueued. The pumps only
//! coordinate through that queue and the hub's closure token: once the hub
//! lets go of the connection, both pumps stop and the transport is dropped.

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::Message;
use chrono::{SubsecRound, Utc};
use futures::{Sink, SinkExt, Stream, StreamExt};
use relay_core::{ChatMessage, ClientFrame, ConnectionId, Frame, ServerFrame};
use relay_store::MessageStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::connection::{self, Inbound};
use crate::hub::Hub;

/// Drive one client connection until either side goes away.
///
/// Registers with the hub, spawns the outbound pump, then runs the inbound
/// pump on the current task. The inbound pump ends on peer close, read error,
/// or as soon as the hub closes the connection (eviction, shutdown, write
/// failure). It then unregisters once and waits for the outbound pump, after
/// which both halves of the transport are dropped.
pub async fn run_session<Tx, Rx, E>(sink: Tx, mut stream: Rx, hub: Hub, store: Arc<dyn MessageStore>)
where
    Tx: Sink<Message> + Unpin + Send + 'static,
    Tx::Error: Display + Send,
    Rx: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let (conn_id, outbound_rx, closed) = hub.register();
    info!(conn_id = %conn_id, "client connected");

    let outbound = tokio::spawn(outbound_pump(
        sink,
        outbound_rx,
        closed.clone(),
        hub.clone(),
        conn_id.clone(),
    ));

    loop {
        let next = tokio::select! {
            biased;
            () = closed.cancelled() => {
                debug!(conn_id = %conn_id, "hub closed the connection");
                break;
            }
            next = stream.next() => next,
        };
        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                debug!(conn_id = %conn_id, error = %e, "read failed");
                break;
            }
            None => break,
        };
        match connection::classify(message) {
            Inbound::Text(text) => handle_text(&text, &conn_id, &hub, store.as_ref()).await,
            Inbound::Close => {
                debug!(conn_id = %conn_id, "client sent close frame");
                break;
            }
            Inbound::Ignored => {}
        }
    }

    hub.unregister(&conn_id);
    if let Err(e) = outbound.await {
        warn!(conn_id = %conn_id, error = %e, "outbound pump panicked");
    }
    info!(conn_id = %conn_id, "client disconnected");
}

/// Write queued frames until the hub closes the queue, then say goodbye.
///
/// While the connection is live a write may wait on the transport for as long
/// as it takes. After `closed` fires, remaining frames and the Close are only
/// written if the transport takes them without waiting; a stalled peer is
/// abandoned.
async fn outbound_pump<Tx>(
    mut sink: Tx,
    mut rx: mpsc::Receiver<Frame>,
    closed: CancellationToken,
    hub: Hub,
    conn_id: ConnectionId,
) where
    Tx: Sink<Message> + Unpin,
    Tx::Error: Display + Send,
{
    while let Some(frame) = rx.recv().await {
        match write(&mut sink, connection::text_message(&frame), &closed).await {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                debug!(conn_id = %conn_id, error = %e, "write failed");
                hub.unregister(&conn_id);
                return;
            }
            None => {
                debug!(conn_id = %conn_id, "peer stalled after close, dropping transport");
                return;
            }
        }
    }
    match write(&mut sink, connection::close_message(), &closed).await {
        Some(Ok(())) => {}
        Some(Err(e)) => debug!(conn_id = %conn_id, error = %e, "close frame not delivered"),
        None => debug!(conn_id = %conn_id, "close frame not delivered, peer stalled"),
    }
}

/// `None` when the connection was closed while the write was still pending.
async fn write<Tx>(sink: &mut Tx, message: Message, closed: &CancellationToken) -> Option<Result<(), Tx::Error>>
where
    Tx: Sink<Message> + Unpin,
{
    tokio::select! {
        biased;
        result = sink.send(message) => Some(result),
        () = closed.cancelled() => None,
    }
}

#[instrument(skip_all, fields(conn_id = %conn_id))]
async fn handle_text(text: &str, conn_id: &ConnectionId, hub: &Hub, store: &dyn MessageStore) {
    let frame = match ClientFrame::decode(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "discarding undecodable frame");
            return;
        }
    };

    match frame {
        ClientFrame::Chat { sender, content } => {
            // Stored timestamps carry microseconds; broadcast the same value.
            let mut message = ChatMessage::new(sender, content, Utc::now().trunc_subsecs(6));
            match store.append(&message).await {
                Ok(id) => message.id = Some(id),
                Err(e) => warn!(error = %e, "failed to persist chat message, broadcasting without id"),
            }
            debug!(persisted = message.is_persisted(), "relaying chat message");
            match ServerFrame::Chat(message).encode() {
                Ok(frame) => hub.broadcast(frame),
                Err(e) => warn!(error = %e, "failed to encode chat message"),
            }
        }
        ClientFrame::Typing(_) => hub.broadcast(Frame::from(text)),
        ClientFrame::Presence { sender } => hub.set_display_name(conn_id, sender),
    }
}
