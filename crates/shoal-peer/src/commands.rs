//! Interactive command surface.
//!
//! The prompt exposes exactly three things: request a file from a peer,
//! show the local lists, and leave.

/// A parsed prompt command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ask the server to forward a file request to its owner.
    Request { owner: String, filename: String },
    /// Show published files and files received from others.
    Files,
    /// Send a graceful disconnect and stop.
    Exit,
}

pub const USAGE: &str = "Commands:\n \
    - request <owner> <filename>  (ask a peer for a file)\n \
    - files                       (show published and received files)\n \
    - exit                        (end the session)";

/// Parse one prompt line. Blank lines parse to `None`; anything else
/// unrecognized is an error carrying a usage hint.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };

    match command {
        "request" => match (words.next(), words.next(), words.next()) {
            (Some(owner), Some(filename), None) => Ok(Some(Command::Request {
                owner: owner.to_string(),
                filename: filename.to_string(),
            })),
            _ => Err(format!("usage: request <owner> <filename>\n{}", USAGE)),
        },
        "files" => Ok(Some(Command::Files)),
        "exit" | "quit" => Ok(Some(Command::Exit)),
        other => Err(format!("unknown command {:?}\n{}", other, USAGE)),
    }
}
