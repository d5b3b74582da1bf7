//! shoal-peer: peer client for the shoal file-sharing network.
//!
//! Publishes the files in a local share directory to the rendezvous server,
//! mirrors the rest of the network's catalogs, answers forwarded file
//! requests, and offers a small interactive prompt.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use shoal_protocol::Message;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use shoal_peer::commands::{self, Command, USAGE};
use shoal_peer::connection::ServerConnection;
use shoal_peer::library::Library;
use shoal_peer::watcher::{ShareEventKind, ShareWatcher};

#[derive(Parser, Debug)]
#[command(name = "shoal-peer")]
#[command(about = "Peer client for the shoal file-sharing network")]
struct Args {
    /// Username to claim on the server (generated if not provided)
    #[arg(short, long)]
    username: Option<String>,

    /// Directory whose files are published
    #[arg(short, long)]
    share: PathBuf,

    /// WebSocket URL of the rendezvous server
    #[arg(long, default_value = "ws://127.0.0.1:5555")]
    server: String,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

/// Whether the session loop keeps going after handling one input.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Respects RUST_LOG, defaults to info (or debug with --verbose).
    let default_filter = if args.verbose {
        "debug,shoal_peer=debug"
    } else {
        "info,shoal_peer=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let username = args.username.unwrap_or_else(|| {
        let generated = format!("peer-{}", uuid::Uuid::new_v4());
        info!("Generated username: {}", generated);
        generated
    });

    let mut library = Library::new(args.share.clone());
    let catalog = library.scan()?;
    info!(
        "Publishing {} file(s) from {:?}",
        catalog.len(),
        args.share
    );

    let mut watcher = ShareWatcher::new(args.share.clone(), catalog.iter().cloned())?;
    let mut connection = ServerConnection::connect(&args.server, &username, catalog).await?;
    info!("Connected to {} as {}", args.server, username);

    println!("{}", USAGE);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            // Messages from the server
            message = connection.recv() => {
                match message {
                    Some(message) => {
                        let flow =
                            on_server_message(&mut library, &mut connection, &username, message)
                                .await?;
                        if flow == Flow::Stop {
                            break;
                        }
                    }
                    None => {
                        warn!("Server closed the connection");
                        break;
                    }
                }
            }

            // Catalog changes detected in the share directory
            Some(event) = watcher.event_rx().recv() => {
                let message = match event.kind {
                    ShareEventKind::Added => Message::AddFile { filename: event.filename },
                    ShareEventKind::Removed => Message::DeleteFile { filename: event.filename },
                };
                connection.send(message).await?;
            }

            // Prompt input
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if on_command(&library, &mut connection, &line).await? == Flow::Stop {
                            leave(&mut connection).await;
                            break;
                        }
                    }
                    None => {
                        // stdin closed; leave like an `exit`
                        leave(&mut connection).await;
                        break;
                    }
                }
            }

            // Graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                leave(&mut connection).await;
                break;
            }
        }
    }

    connection.close().await;
    info!("Session ended");
    Ok(())
}

/// Apply one server message to the local state, answering relays inline.
async fn on_server_message(
    library: &mut Library,
    connection: &mut ServerConnection,
    our_username: &str,
    message: Message,
) -> Result<Flow> {
    match message {
        Message::FilesUpdate { catalogs } => {
            library.set_catalogs(catalogs);
            for (username, catalog) in library.catalogs() {
                println!("{} publishes: {}", username, catalog.join(", "));
            }
        }
        Message::NewClient { username, catalog } => {
            println!("{} connected, publishing: {}", username, catalog.join(", "));
            library.peer_joined(username, catalog);
        }
        Message::ClientDisconnected { username } => {
            println!("{} disconnected", username);
            library.peer_left(&username);
        }
        Message::NewFile { username, filename } => {
            // Our own additions echo back through the fan-out; the remote
            // view only tracks other peers.
            if username == our_username {
                debug!("Own add of {} confirmed", filename);
            } else {
                println!("{} added {}", username, filename);
                library.remote_file_added(&username, filename);
            }
        }
        Message::DeleteFileNotice { username, filename } => {
            if username == our_username {
                debug!("Own delete of {} confirmed", filename);
            } else {
                println!("{} removed {}", username, filename);
                library.remote_file_removed(&username, &filename);
            }
        }
        Message::FileRequest { from, filename } => {
            match library.read_shared(&filename) {
                Ok(content) => {
                    println!("Sending {} to {}", filename, from);
                    connection
                        .send(Message::FileDelivery {
                            to: Some(from),
                            filename,
                            content,
                        })
                        .await?;
                }
                Err(e) => {
                    // The protocol has no refusal message; the requester is
                    // simply left waiting.
                    warn!("Cannot serve {} requested by {}: {}", filename, from, e);
                }
            }
        }
        Message::FileDelivery {
            filename, content, ..
        } => match library.save_received(&filename, &content) {
            Ok(()) => println!("Received and saved {}", filename),
            Err(e) => warn!("Failed to save received {}: {}", filename, e),
        },
        Message::Error { message } => {
            println!("Server error: {}", message);
        }
        Message::Disconnected => {
            println!("Session ended by server");
            return Ok(Flow::Stop);
        }
        other => {
            warn!("Unexpected {} from server", other.tag());
        }
    }
    Ok(Flow::Continue)
}

/// Handle one prompt line.
async fn on_command(
    library: &Library,
    connection: &mut ServerConnection,
    line: &str,
) -> Result<Flow> {
    match commands::parse(line) {
        Ok(Some(Command::Request { owner, filename })) => {
            connection
                .send(Message::RequestFile { owner, filename })
                .await?;
        }
        Ok(Some(Command::Files)) => match library.scan() {
            Ok(published) => {
                println!("Published files:");
                for file in &published {
                    println!(" - {}", file);
                }
                println!("Received files:");
                for file in library.received() {
                    println!(" - {}", file);
                }
            }
            Err(e) => warn!("Failed to list share directory: {}", e),
        },
        Ok(Some(Command::Exit)) => return Ok(Flow::Stop),
        Ok(None) => {}
        Err(usage) => println!("{}", usage),
    }
    Ok(Flow::Continue)
}

/// Graceful exit: send `disconnect` and wait briefly for the final ack.
async fn leave(connection: &mut ServerConnection) {
    if connection.send(Message::Disconnect).await.is_err() {
        return;
    }
    let acked = timeout(Duration::from_secs(2), async {
        while let Some(message) = connection.recv().await {
            if message == Message::Disconnected {
                return true;
            }
        }
        false
    })
    .await;
    match acked {
        Ok(true) => debug!("Server acknowledged disconnect"),
        _ => debug!("No disconnect acknowledgment"),
    }
}
