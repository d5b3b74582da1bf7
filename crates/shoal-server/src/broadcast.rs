//! Broadcast engine: fan-out of catalog snapshots and typed events.
//!
//! Each recipient set is computed from one consistent registry snapshot and
//! the sends happen outside the registry lock. A failed send is logged and
//! treated as that peer already being gone; it never aborts the fan-out.

use shoal_protocol::Message;
use tracing::warn;

use crate::registry::Registry;

/// Push a personalized "other peers' catalogs" snapshot to every live
/// session except `exclude`.
pub async fn catalog_update(registry: &Registry, exclude: Option<&str>) {
    for (username, handle, catalogs) in registry.update_views(exclude).await {
        if handle.send(Message::FilesUpdate { catalogs }).is_err() {
            warn!("Failed to queue files_update for {}, treating as gone", username);
        }
    }
}

/// Announce a join to everyone except the joiner, who got its own initial
/// snapshot instead.
pub async fn notify_new_client(registry: &Registry, username: &str, catalog: &[String]) {
    fan_out(
        registry,
        Some(username),
        Message::NewClient {
            username: username.to_string(),
            catalog: catalog.to_vec(),
        },
    )
    .await;
}

/// Announce a departure. The departing session is already deregistered by
/// the time this runs, so no exclusion is needed.
pub async fn notify_disconnection(registry: &Registry, username: &str) {
    fan_out(
        registry,
        None,
        Message::ClientDisconnected {
            username: username.to_string(),
        },
    )
    .await;
}

/// Announce one newly published file to every live session.
pub async fn notify_new_file(registry: &Registry, username: &str, filename: &str) {
    fan_out(
        registry,
        None,
        Message::NewFile {
            username: username.to_string(),
            filename: filename.to_string(),
        },
    )
    .await;
}

/// Announce one unpublished file to every live session.
pub async fn notify_delete_file(registry: &Registry, username: &str, filename: &str) {
    fan_out(
        registry,
        None,
        Message::DeleteFileNotice {
            username: username.to_string(),
            filename: filename.to_string(),
        },
    )
    .await;
}

async fn fan_out(registry: &Registry, exclude: Option<&str>, message: Message) {
    for (username, handle) in registry.recipients_excluding(exclude).await {
        if handle.send(message.clone()).is_err() {
            warn!(
                "Failed to queue {} for {}, treating as gone",
                message.tag(),
                username
            );
        }
    }
}
