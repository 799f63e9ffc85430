use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
};

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the voting server and accept TCP connections until the vote ends.
    Serve(ServeArgs),
    /// Connect to a voting server from the terminal.
    Client(ClientArgs),
}

/// Flags for `serve`. Anything left unset falls back to the config file and
/// then to the built-in defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// JSON file with `port`, `votingDurationSeconds`, `adminUsers` and
    /// `initialOptions` keys.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Address to bind.
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Port to listen on. Use 0 for an ephemeral port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Length of the voting session in seconds.
    #[arg(long = "duration-secs")]
    pub duration_secs: Option<u64>,

    /// Username allowed to add and remove options. Repeatable.
    #[arg(long = "admin")]
    pub admins: Vec<String>,

    /// Option available when the server starts. Repeatable.
    #[arg(long = "option")]
    pub options: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Username sent in reply to the server's prompt.
    #[arg(long)]
    pub username: String,

    /// Address of the voting server.
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub server: SocketAddr,
}
