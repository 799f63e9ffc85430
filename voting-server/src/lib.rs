//! Multi-client voting over plain TCP.
//!
//! Clients connect, pick a username, then vote among a set of options that
//! admins may extend or shrink. Every vote is broadcast to all connected
//! clients, and a session timer closes the vote with a final broadcast.
//!
//! - [`cli`] parses the command line for server and client modes.
//! - [`config`] resolves flags and the optional JSON config file.
//! - [`ballot`] holds tallies and per-user selections.
//! - [`roster`] tracks registered connections and fans out broadcasts.
//! - [`hub`] is the shared context: ballot and roster behind one lock, the
//!   admin set and the stop flag.
//! - [`command`] parses client command lines.
//! - [`message`] renders server text blocks and reads client lines.
//! - [`session`] runs the per-connection state machine.
//! - [`timer`] ends the vote after the configured duration.
//! - [`server`] accepts connections and owns the run.
//! - [`client`] is a small terminal client.

pub mod ballot;
pub mod cli;
pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod hub;
pub mod message;
pub mod roster;
pub mod server;
pub mod session;
pub mod timer;
