use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    task::{JoinError, JoinSet},
};
use tracing::{info, warn};

use crate::{config::ServerConfig, hub::Hub, session, timer};

/// Accept loop for one voting session.
///
/// Each run owns its own [`Hub`], so several servers can live in one process.
pub struct VotingServer {
    listener: TcpListener,
    hub: Arc<Hub>,
    voting_duration: Duration,
}

impl VotingServer {
    pub fn new(listener: TcpListener, config: &ServerConfig) -> Self {
        Self {
            listener,
            hub: Arc::new(Hub::from_config(config)),
            voting_duration: config.voting_duration,
        }
    }

    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.listen)
            .await
            .with_context(|| format!("failed to bind {}", config.listen))?;
        Ok(Self::new(listener, config))
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn hub(&self) -> Arc<Hub> {
        Arc::clone(&self.hub)
    }

    /// Serves until the vote ends and every session has closed, or until
    /// `shutdown` resolves, which aborts the remaining sessions.
    ///
    /// The session timer starts here. Once it fires the listener is dropped;
    /// connected clients keep their sessions until their next command.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let VotingServer {
            listener,
            hub,
            voting_duration,
        } = self;
        tokio::pin!(shutdown);

        let timer = timer::spawn(Arc::clone(&hub), voting_duration);
        let mut sessions = JoinSet::new();

        let closed = hub.closed();
        tokio::pin!(closed);

        let interrupted = loop {
            select! {
                biased;
                _ = &mut shutdown => break true,
                _ = &mut closed => break false,
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &hub, &mut sessions);
                }
                Some(joined) = sessions.join_next() => log_session_end(joined),
            }
        };

        drop(listener);
        if interrupted {
            info!("voting server shutting down");
        } else {
            info!(sessions = sessions.len(), "no longer accepting connections");
            loop {
                select! {
                    _ = &mut shutdown => {
                        info!(sessions = sessions.len(), "voting server shutting down");
                        break;
                    }
                    joined = sessions.join_next() => match joined {
                        Some(joined) => log_session_end(joined),
                        None => break,
                    },
                }
            }
        }

        timer.abort();
        sessions.shutdown().await;
        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
                std::future::pending::<()>().await;
            }
        })
        .await
    }
}

fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    hub: &Arc<Hub>,
    sessions: &mut JoinSet<()>,
) {
    match result {
        Ok((stream, peer)) => spawn_session(stream, peer, hub, sessions),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_session(stream: TcpStream, peer: SocketAddr, hub: &Arc<Hub>, sessions: &mut JoinSet<()>) {
    let hub = Arc::clone(hub);
    sessions.spawn(async move {
        if let Err(err) = session::handle_connection(stream, &hub).await {
            warn!(peer = %peer, error = ?err, "client connection closed with error");
        }
    });
}

fn log_session_end(joined: Result<(), JoinError>) {
    if let Err(err) = joined
        && err.is_panic()
    {
        warn!(error = ?err, "client session panicked");
    }
}
