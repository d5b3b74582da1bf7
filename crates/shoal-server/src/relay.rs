//! Per-connection relay session.
//!
//! Each accepted connection runs one of these tasks: authenticate the first
//! frame, register, service messages, and clean up on the way out. A writer
//! task owns the socket's send half and drains the session's outbound queue,
//! so broadcasts from other sessions never block on this peer's socket.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use shoal_protocol::{Message, ProtocolError};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::broadcast;
use crate::registry::{CatalogOp, PeerHandle, Registry};

#[derive(Debug, Error)]
enum FrameError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("websocket error: {0}")]
    Transport(#[from] WsError),
}

/// How the session ended. Only a graceful `disconnect` earns the final
/// `disconnected` acknowledgment; on an error path the transport is assumed
/// unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Departure {
    Graceful,
    Closed,
    Errored,
}

/// Drive one accepted connection through its whole lifecycle.
pub async fn run(stream: TcpStream, addr: SocketAddr, registry: Arc<Registry>) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            // Health checks (like `nc -z`) connect and immediately close
            // without finishing the WebSocket handshake. Log these as
            // debug, not error.
            let err_str = e.to_string();
            if err_str.contains("Handshake not finished")
                || err_str.contains("Connection reset")
                || err_str.contains("unexpected EOF")
            {
                debug!("Connection closed before handshake from {}", addr);
            } else {
                error!("WebSocket upgrade failed for {}: {}", addr, e);
            }
            return;
        }
    };

    let (sink, mut frames) = ws.split();
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = PeerHandle::new(tx);
    tokio::spawn(write_loop(sink, rx));

    // Connecting: the first frame must be a well-formed auth.
    let (username, catalog) = match next_message(&mut frames).await {
        Ok(Some(Message::Auth { username, catalog })) => (username, catalog),
        Ok(Some(other)) => {
            warn!("{} sent {} before auth, closing", addr, other.tag());
            return;
        }
        Ok(None) => {
            debug!("Connection from {} closed before auth", addr);
            return;
        }
        Err(e) => {
            warn!("Failed to read auth from {}: {}", addr, e);
            return;
        }
    };

    let initial = match registry
        .register(&username, catalog.clone(), handle.clone())
        .await
    {
        Ok(initial) => initial,
        Err(e) => {
            warn!("Rejecting connection from {}: {}", addr, e);
            let _ = handle.send(Message::Error {
                message: e.to_string(),
            });
            return;
        }
    };

    info!(
        "{} connected from {} publishing {} file(s)",
        username,
        addr,
        catalog.len()
    );

    // The joiner's own snapshot is queued before anyone else hears about
    // the join, so it can never see itself announced.
    let _ = handle.send(Message::FilesUpdate { catalogs: initial });
    broadcast::notify_new_client(&registry, &username, &catalog).await;
    broadcast::catalog_update(&registry, Some(&username)).await;

    let departure = serve(&registry, &username, &handle, &mut frames).await;

    // Closing: remove self first, then tell everyone who remains.
    registry.deregister(&username).await;
    broadcast::notify_disconnection(&registry, &username).await;
    broadcast::catalog_update(&registry, None).await;

    if departure == Departure::Graceful {
        let _ = handle.send(Message::Disconnected);
    }
    info!("{} disconnected ({:?})", username, departure);
    // Dropping the handle lets the writer drain the queue and close the
    // socket; nothing is processed or sent for this session afterwards.
}

/// Active state: dispatch frames until the peer leaves or errors out.
async fn serve(
    registry: &Registry,
    username: &str,
    handle: &PeerHandle,
    frames: &mut SplitStream<WebSocketStream<TcpStream>>,
) -> Departure {
    loop {
        let message = match next_message(frames).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!("{} closed the connection", username);
                return Departure::Closed;
            }
            Err(e) => {
                warn!("Dropping {}: {}", username, e);
                return Departure::Errored;
            }
        };

        match message {
            Message::Disconnect => return Departure::Graceful,
            Message::AddFile { filename } => {
                if registry
                    .mutate_catalog(username, CatalogOp::Add, &filename)
                    .await
                {
                    broadcast::notify_new_file(registry, username, &filename).await;
                }
            }
            Message::DeleteFile { filename } => {
                if registry
                    .mutate_catalog(username, CatalogOp::Delete, &filename)
                    .await
                {
                    broadcast::notify_delete_file(registry, username, &filename).await;
                }
            }
            Message::RequestFile { owner, filename } => {
                let forwarded = match registry.lookup(&owner).await {
                    Some(target) => target
                        .send(Message::FileRequest {
                            from: username.to_string(),
                            filename,
                        })
                        .is_ok(),
                    None => false,
                };
                if !forwarded {
                    let _ = handle.send(Message::Error {
                        message: format!("Requested client {} not found", owner),
                    });
                }
            }
            Message::FileDelivery {
                to: Some(to),
                filename,
                content,
            } => {
                // Pure relay; if the requester vanished there is nobody
                // left to tell.
                match registry.lookup(&to).await {
                    Some(target) => {
                        let _ = target.send(Message::FileDelivery {
                            to: None,
                            filename,
                            content,
                        });
                    }
                    None => debug!(
                        "Dropping delivery of {} from {}: {} is gone",
                        filename, username, to
                    ),
                }
            }
            other => {
                warn!("Dropping {}: unexpected {} from a peer", username, other.tag());
                return Departure::Errored;
            }
        }
    }
}

/// Read the next whole protocol message off the socket.
///
/// `Ok(None)` means the peer closed cleanly. Decode failures and transport
/// errors surface as `Err` and end only this connection.
async fn next_message(
    frames: &mut SplitStream<WebSocketStream<TcpStream>>,
) -> Result<Option<Message>, FrameError> {
    loop {
        let data = match frames.next().await {
            Some(Ok(WsMessage::Binary(data))) => data.to_vec(),
            Some(Ok(WsMessage::Text(text))) => text.into_bytes(),
            Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => continue,
            Some(Ok(WsMessage::Close(_))) => return Ok(None),
            Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => return Ok(None),
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(None),
        };
        return Ok(Some(Message::from_bytes(&data)?));
    }
}

/// Writer task: drains the session's outbound queue into the socket, then
/// says goodbye on the wire once the queue closes.
async fn write_loop(
    mut sink: SplitSink<WebSocketStream<TcpStream>, WsMessage>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = rx.recv().await {
        if let Err(e) = sink.send(WsMessage::Binary(message.to_bytes().into())).await {
            debug!("Write failed, dropping outbound queue: {}", e);
            return;
        }
    }
    let _ = sink.send(WsMessage::Close(None)).await;
}
