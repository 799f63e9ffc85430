//! Per-connection state machine: username prompt, command loop, cleanup.

use std::net::SocketAddr;

use anyhow::Result;
use tokio::{
    io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
    select,
    sync::mpsc,
};
use tracing::{debug, info, warn};

use crate::{
    command::Command,
    error::{AdminError, CommandError, RegisterError, VoteError},
    hub::{Hub, Membership},
    message::{LineReader, OptionsKind, ResultsKind, ServerMessage, write_message, write_text},
    roster::Outgoing,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

pub async fn handle_connection(stream: TcpStream, hub: &Hub) -> Result<()> {
    let peer = stream.peer_addr().ok();
    let (reader, writer) = stream.into_split();
    serve(BufReader::new(reader), writer, hub, peer).await
}

/// Runs one client session over any buffered reader and writer pair.
pub async fn serve<R, W>(reader: R, mut writer: W, hub: &Hub, peer: Option<SocketAddr>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = LineReader::new(reader);

    let Some(membership) = register(&mut lines, &mut writer, hub, peer).await? else {
        shutdown_writer(&mut writer).await;
        return Ok(());
    };
    let Membership {
        id,
        username,
        mut inbox,
        options,
    } = membership;
    info!(?peer, %username, "client joined");

    let outcome = run_session(&mut lines, &mut writer, &mut inbox, hub, &username, options).await;

    if let Some(username) = hub.leave(id).await {
        info!(?peer, %username, "client disconnected");
    }
    shutdown_writer(&mut writer).await;
    outcome
}

async fn register<R, W>(
    lines: &mut LineReader<R>,
    writer: &mut W,
    hub: &Hub,
    peer: Option<SocketAddr>,
) -> Result<Option<Membership>>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    write_message(writer, &ServerMessage::UsernamePrompt).await?;

    let Some(username) = lines.next_line().await? else {
        debug!(?peer, "connection closed before username");
        return Ok(None);
    };

    match hub.join(&username).await {
        Ok(membership) => Ok(Some(membership)),
        Err(err) => {
            info!(?peer, %username, error = %err, "registration rejected");
            let reply = match err {
                RegisterError::VotingClosed => ServerMessage::VotingClosed,
                RegisterError::EmptyName | RegisterError::NameTaken(_) => {
                    ServerMessage::UsernameRejected
                }
            };
            write_message(writer, &reply).await?;
            Ok(None)
        }
    }
}

async fn run_session<R, W>(
    lines: &mut LineReader<R>,
    writer: &mut W,
    inbox: &mut mpsc::UnboundedReceiver<Outgoing>,
    hub: &Hub,
    username: &str,
    options: Vec<String>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    write_message(
        writer,
        &ServerMessage::Welcome {
            username: username.to_string(),
        },
    )
    .await?;
    write_message(
        writer,
        &ServerMessage::Options {
            kind: OptionsKind::Available,
            names: options,
        },
    )
    .await?;

    loop {
        select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!(%username, "client closed the connection");
                    break;
                };
                if line.is_empty() {
                    continue;
                }
                if hub.is_closed() {
                    voting_closed(writer).await?;
                    break;
                }
                if handle_command(&line, writer, hub, username).await? == Flow::Exit {
                    break;
                }
            }
            outgoing = inbox.recv() => {
                match outgoing {
                    Some(text) => write_text(writer, &text).await?,
                    None => break,
                }
            }
        }
    }

    Ok(())
}

async fn handle_command<W>(line: &str, writer: &mut W, hub: &Hub, username: &str) -> Result<Flow>
where
    W: AsyncWrite + Unpin,
{
    debug!(%username, line, "command received");

    let reply = match Command::parse(line) {
        Ok(Command::Exit) => return Ok(Flow::Exit),
        Ok(Command::Results) => ServerMessage::Results {
            kind: ResultsKind::Current,
            tallies: hub.results().await,
        },
        Ok(Command::Vote(option)) => match hub.vote(username, &option).await {
            Ok(()) => ServerMessage::VoteRecorded,
            Err(VoteError::InvalidOption(_)) => ServerMessage::InvalidOption,
            Err(VoteError::VotingClosed) => return voting_closed(writer).await,
            Err(err @ VoteError::UnknownUser(_)) => return Err(err.into()),
        },
        Ok(Command::Add(option)) => match hub.add_option(username, &option).await {
            Ok(_) => ServerMessage::OptionAdded { option },
            Err(AdminError::VotingClosed) => return voting_closed(writer).await,
            Err(err @ AdminError::Unauthorized(_)) => unauthorized(&err),
        },
        Ok(Command::Remove(option)) => match hub.remove_option(username, &option).await {
            Ok(_) => ServerMessage::OptionRemoved { option },
            Err(AdminError::VotingClosed) => return voting_closed(writer).await,
            Err(err @ AdminError::Unauthorized(_)) => unauthorized(&err),
        },
        Ok(Command::Unknown) => ServerMessage::UnknownCommand,
        Err(CommandError::MalformedCommand { verb })
            if verb.is_admin_only() && !hub.is_admin(username) =>
        {
            ServerMessage::UnknownCommand
        }
        Err(err) => ServerMessage::Malformed(err),
    };

    write_message(writer, &reply).await?;
    Ok(Flow::Continue)
}

/// The timer may fire between the loop's stop check and the hub call, so the
/// hub's own refusal ends the session the same way.
async fn voting_closed<W>(writer: &mut W) -> Result<Flow>
where
    W: AsyncWrite + Unpin,
{
    write_message(writer, &ServerMessage::VotingClosed).await?;
    Ok(Flow::Exit)
}

/// Non-admins are not told that admin commands exist.
fn unauthorized(err: &AdminError) -> ServerMessage {
    debug!(error = %err, "admin command refused");
    ServerMessage::UnknownCommand
}

async fn shutdown_writer<W>(writer: &mut W)
where
    W: AsyncWrite + Unpin,
{
    if let Err(error) = writer.shutdown().await {
        warn!(?error, "failed to shut down client writer cleanly");
    }
}
