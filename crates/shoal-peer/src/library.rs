//! Local file state: the share directory on disk, the files received from
//! other peers, and the cached view of what everyone else publishes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use shoal_protocol::Catalogs;

/// The peer's local bookkeeping. Pure state plus share-directory I/O; all
/// network knowledge arrives through the update methods.
#[derive(Debug)]
pub struct Library {
    share_dir: PathBuf,
    remote: Catalogs,
    received: Vec<String>,
}

impl Library {
    pub fn new(share_dir: PathBuf) -> Self {
        Self {
            share_dir,
            remote: Catalogs::new(),
            received: Vec::new(),
        }
    }

    /// Filenames currently in the share directory, sorted so announcements
    /// are stable across runs. Hidden files and directories are skipped.
    pub fn scan(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.share_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Replace the whole view of other peers' catalogs (a `files_update`).
    pub fn set_catalogs(&mut self, catalogs: Catalogs) {
        self.remote = catalogs;
    }

    pub fn peer_joined(&mut self, username: String, catalog: Vec<String>) {
        self.remote.insert(username, catalog);
    }

    pub fn peer_left(&mut self, username: &str) {
        self.remote.remove(username);
    }

    pub fn remote_file_added(&mut self, username: &str, filename: String) {
        self.remote
            .entry(username.to_string())
            .or_default()
            .push(filename);
    }

    pub fn remote_file_removed(&mut self, username: &str, filename: &str) {
        if let Some(catalog) = self.remote.get_mut(username) {
            catalog.retain(|f| f != filename);
        }
    }

    /// The cached view of other peers' catalogs.
    pub fn catalogs(&self) -> &Catalogs {
        &self.remote
    }

    /// Files received from other peers this session.
    pub fn received(&self) -> &[String] {
        &self.received
    }

    pub fn share_dir(&self) -> &Path {
        &self.share_dir
    }

    /// Read a published file to answer a forwarded request.
    pub fn read_shared(&self, filename: &str) -> io::Result<Vec<u8>> {
        fs::read(self.shared_path(filename)?)
    }

    /// Store a delivered file in the share directory and record it. The
    /// watcher will pick the new file up and publish it.
    pub fn save_received(&mut self, filename: &str, content: &[u8]) -> io::Result<()> {
        fs::write(self.shared_path(filename)?, content)?;
        self.received.push(filename.to_string());
        Ok(())
    }

    /// Resolve a network-supplied filename, keeping it inside the share
    /// directory. Hidden files are never published, so they are not
    /// servable either.
    fn shared_path(&self, filename: &str) -> io::Result<PathBuf> {
        if filename.is_empty()
            || filename.contains('/')
            || filename.contains('\\')
            || filename.starts_with('.')
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing filename {:?}", filename),
            ));
        }
        Ok(self.share_dir.join(filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn library() -> (Library, TempDir) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        (Library::new(dir.path().to_path_buf()), dir)
    }

    #[test]
    fn test_scan_sorted_files_only() {
        let (library, dir) = library();
        fs::write(dir.path().join("b.txt"), b"b").unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::write(dir.path().join(".hidden"), b"x").unwrap();
        fs::create_dir(dir.path().join("subdir")).unwrap();

        assert_eq!(library.scan().unwrap(), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_remote_view_updates() {
        let (mut library, _dir) = library();

        let mut catalogs = Catalogs::new();
        catalogs.insert("alice".into(), vec!["a.txt".into()]);
        library.set_catalogs(catalogs);

        library.peer_joined("bob".into(), vec!["b.txt".into()]);
        library.remote_file_added("alice", "c.txt".into());
        library.remote_file_removed("alice", "a.txt");
        library.peer_left("bob");

        assert_eq!(library.catalogs().len(), 1);
        assert_eq!(library.catalogs()["alice"], vec!["c.txt".to_string()]);
    }

    #[test]
    fn test_remote_add_for_unseen_peer_creates_entry() {
        let (mut library, _dir) = library();
        library.remote_file_added("carol", "c.txt".into());
        assert_eq!(library.catalogs()["carol"], vec!["c.txt".to_string()]);
    }

    #[test]
    fn test_save_received_writes_and_records() {
        let (mut library, dir) = library();
        library.save_received("note.txt", b"hello").unwrap();

        assert_eq!(library.received(), ["note.txt"]);
        assert_eq!(fs::read(dir.path().join("note.txt")).unwrap(), b"hello");
        assert_eq!(library.read_shared("note.txt").unwrap(), b"hello");
    }

    #[test]
    fn test_network_filenames_stay_inside_share_dir() {
        let (mut library, _dir) = library();
        assert!(library.read_shared("../etc/passwd").is_err());
        assert!(library.read_shared("").is_err());
        assert!(library.read_shared(".hidden").is_err());
        assert!(library.save_received("..", b"x").is_err());
        assert!(library.save_received("a/b.txt", b"x").is_err());
    }

    #[test]
    fn test_read_missing_file_is_an_error() {
        let (library, _dir) = library();
        assert!(library.read_shared("nope.txt").is_err());
    }
}
