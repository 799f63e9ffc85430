use std::{fmt, io};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::CommandError;

/// Longest client line accepted, not counting the newline.
pub const MAX_LINE_BYTES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultsKind {
    /// Reply to `/results`.
    Current,
    /// Broadcast after a vote.
    Updated,
    /// Broadcast when the timer fires.
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionsKind {
    Available,
    Updated,
}

/// Every text block the server sends. `Display` renders the wire form; each
/// block ends with a newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    UsernamePrompt,
    Welcome { username: String },
    UsernameRejected,
    Options { kind: OptionsKind, names: Vec<String> },
    Results { kind: ResultsKind, tallies: Vec<(String, u64)> },
    VoteRecorded,
    InvalidOption,
    OptionAdded { option: String },
    OptionRemoved { option: String },
    UnknownCommand,
    Malformed(CommandError),
    VotingClosed,
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::UsernamePrompt => writeln!(f, "Enter your username:"),
            ServerMessage::Welcome { username } => writeln!(f, "Welcome, {username}!"),
            ServerMessage::UsernameRejected => {
                writeln!(f, "Username is invalid or already taken. Disconnecting...")
            }
            ServerMessage::Options { kind, names } => {
                let heading = match kind {
                    OptionsKind::Available => "Available options:",
                    OptionsKind::Updated => "Updated options:",
                };
                writeln!(f, "{heading}")?;
                for name in names {
                    writeln!(f, "{name}")?;
                }
                Ok(())
            }
            ServerMessage::Results { kind, tallies } => {
                let heading = match kind {
                    ResultsKind::Current => "Current results:",
                    ResultsKind::Updated => "Updated results:",
                    ResultsKind::Final => "Final results:",
                };
                writeln!(f, "{heading}")?;
                for (option, count) in tallies {
                    writeln!(f, "{option}: {count} votes")?;
                }
                Ok(())
            }
            ServerMessage::VoteRecorded => writeln!(f, "Your vote has been recorded."),
            ServerMessage::InvalidOption => writeln!(f, "Invalid option."),
            ServerMessage::OptionAdded { option } => {
                writeln!(f, "Option '{option}' added successfully.")
            }
            ServerMessage::OptionRemoved { option } => {
                writeln!(f, "Option '{option}' removed successfully.")
            }
            ServerMessage::UnknownCommand => writeln!(f, "Unknown command."),
            ServerMessage::Malformed(err) => writeln!(f, "Malformed command: {err}."),
            ServerMessage::VotingClosed => writeln!(f, "Voting is over. Disconnecting..."),
        }
    }
}

/// Reads client lines of at most [`MAX_LINE_BYTES`].
///
/// Partial input stays in `buf` between calls, so `next_line` is cancel safe
/// and can sit in a `select!` next to the outbox.
pub struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R> LineReader<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// Next line with surrounding whitespace trimmed; `None` on EOF. Invalid
    /// UTF-8 is replaced rather than rejected. A line longer than the limit is
    /// an `InvalidData` error.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            if self.buf.len() > MAX_LINE_BYTES {
                self.buf.clear();
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("line exceeds {MAX_LINE_BYTES} bytes"),
                ));
            }

            let limit = (MAX_LINE_BYTES + 1 - self.buf.len()) as u64;
            let read = (&mut self.reader)
                .take(limit)
                .read_until(b'\n', &mut self.buf)
                .await?;

            if self.buf.ends_with(b"\n") || (read == 0 && !self.buf.is_empty()) {
                let line = String::from_utf8_lossy(&self.buf).trim().to_string();
                self.buf.clear();
                return Ok(Some(line));
            }
            if read == 0 {
                return Ok(None);
            }
        }
    }
}

pub async fn write_text<W>(writer: &mut W, text: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(text.as_bytes()).await?;
    writer.flush().await
}

pub async fn write_message<W>(writer: &mut W, message: &ServerMessage) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_text(writer, &message.to_string()).await
}
