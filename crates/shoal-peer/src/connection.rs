//! Connection to the rendezvous server.
//!
//! Wraps the WebSocket stream: the write half stays with the owner for
//! sending, while a spawned read task decodes inbound frames onto an event
//! channel.

use anyhow::{anyhow, Result};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use shoal_protocol::Message;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// A live connection to the server, registered under our username.
pub struct ServerConnection {
    write: WsSink,
    message_rx: mpsc::UnboundedReceiver<Message>,
    read_task: Option<JoinHandle<()>>,
}

impl ServerConnection {
    /// Connect to the server and register with the given identity and
    /// initial catalog.
    pub async fn connect(url: &str, username: &str, catalog: Vec<String>) -> Result<Self> {
        let (ws, _) = connect_async(url).await?;
        let (write, read) = ws.split();

        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let read_task = tokio::spawn(read_loop(read, message_tx));

        let mut connection = Self {
            write,
            message_rx,
            read_task: Some(read_task),
        };
        connection
            .send(Message::Auth {
                username: username.to_string(),
                catalog,
            })
            .await?;
        Ok(connection)
    }

    /// Send one message to the server.
    pub async fn send(&mut self, message: Message) -> Result<()> {
        let tag = message.tag();
        self.write
            .send(WsMessage::Binary(message.to_bytes().into()))
            .await
            .map_err(|e| anyhow!("Failed to send {}: {}", tag, e))
    }

    /// Next decoded message from the server; `None` once the stream ends.
    pub async fn recv(&mut self) -> Option<Message> {
        self.message_rx.recv().await
    }

    /// Close the connection.
    pub async fn close(&mut self) {
        let _ = self.write.send(WsMessage::Close(None)).await;
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
    }
}

impl Drop for ServerConnection {
    fn drop(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
    }
}

/// Read loop: decodes frames and forwards them to the owner. Dropping the
/// sender is how the owner learns the stream ended.
async fn read_loop(mut read: WsSource, message_tx: mpsc::UnboundedSender<Message>) {
    loop {
        match read.next().await {
            Some(Ok(frame)) => {
                let data = match frame {
                    WsMessage::Binary(data) => data.to_vec(),
                    WsMessage::Text(text) => text.into_bytes(),
                    WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
                    WsMessage::Close(_) => {
                        debug!("Server sent close frame");
                        break;
                    }
                };
                match Message::from_bytes(&data) {
                    Ok(message) => {
                        if message_tx.send(message).is_err() {
                            // Owner dropped the connection.
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Malformed frame from server: {}", e);
                        break;
                    }
                }
            }
            Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
                debug!("Server connection closed");
                break;
            }
            Some(Err(e)) => {
                error!("WebSocket error: {}", e);
                break;
            }
            None => {
                debug!("Server stream ended");
                break;
            }
        }
    }
}
