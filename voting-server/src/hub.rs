//! Shared context of one server run.
//!
//! Every session task, the accept loop and the session timer hold an
//! `Arc<Hub>`. The ballot and the roster sit behind a single mutex: each
//! operation below is one critical section, and broadcasts triggered by a
//! mutation are queued before the lock is released. Nothing performs socket
//! I/O while holding the lock; broadcasts only push into unbounded outboxes.

use std::{
    collections::HashSet,
    sync::atomic::{AtomicU64, Ordering},
};

use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, info};

use crate::{
    ballot::Ballot,
    config::ServerConfig,
    error::{AdminError, RegisterError, VoteError},
    message::{OptionsKind, ResultsKind, ServerMessage},
    roster::{ClientId, Outgoing, Roster},
};

struct HubState {
    ballot: Ballot,
    roster: Roster,
}

impl HubState {
    fn broadcast_results(&self, kind: ResultsKind) -> usize {
        let message = ServerMessage::Results {
            kind,
            tallies: self.ballot.results(),
        };
        self.roster.broadcast(&message.to_string())
    }

    fn broadcast_options(&self) -> usize {
        let message = ServerMessage::Options {
            kind: OptionsKind::Updated,
            names: self.ballot.option_names(),
        };
        self.roster.broadcast(&message.to_string())
    }
}

/// A registered connection: its roster id, the name it registered under, the
/// receiving end of its outbox and the option menu at the time of joining.
pub struct Membership {
    pub id: ClientId,
    pub username: String,
    pub inbox: mpsc::UnboundedReceiver<Outgoing>,
    pub options: Vec<String>,
}

pub struct Hub {
    state: Mutex<HubState>,
    admins: HashSet<String>,
    next_id: AtomicU64,
    closed: watch::Sender<bool>,
}

impl Hub {
    pub fn new<O, A>(options: O, admins: A) -> Self
    where
        O: IntoIterator<Item = String>,
        A: IntoIterator<Item = String>,
    {
        let (closed, _) = watch::channel(false);
        Self {
            state: Mutex::new(HubState {
                ballot: Ballot::with_options(options),
                roster: Roster::new(),
            }),
            admins: admins.into_iter().collect(),
            next_id: AtomicU64::new(1),
            closed,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.initial_options.iter().cloned(),
            config.admin_users.iter().cloned(),
        )
    }

    /// Registers `username` and adds the connection to the roster in one step.
    pub async fn join(&self, username: &str) -> Result<Membership, RegisterError> {
        let mut state = self.state.lock().await;
        if self.is_closed() {
            return Err(RegisterError::VotingClosed);
        }

        let username = state.ballot.register_user(username)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let inbox = state.roster.insert(id, username.clone());
        let options = state.ballot.option_names();

        Ok(Membership {
            id,
            username,
            inbox,
            options,
        })
    }

    /// Drops the connection from the roster and forgets its user record.
    pub async fn leave(&self, id: ClientId) -> Option<String> {
        let mut state = self.state.lock().await;
        let username = state.roster.remove(id)?;
        state.ballot.deregister_user(&username);
        Some(username)
    }

    pub fn is_admin(&self, username: &str) -> bool {
        self.admins.contains(username)
    }

    /// Casts a vote and broadcasts the updated tallies to every client.
    pub async fn vote(&self, username: &str, option: &str) -> Result<(), VoteError> {
        let mut state = self.state.lock().await;
        if self.is_closed() {
            return Err(VoteError::VotingClosed);
        }
        state.ballot.cast_vote(username, option)?;
        let delivered = state.broadcast_results(ResultsKind::Updated);
        debug!(username, option, delivered, "vote recorded");
        Ok(())
    }

    pub async fn add_option(&self, username: &str, option: &str) -> Result<bool, AdminError> {
        self.authorize(username)?;
        let mut state = self.state.lock().await;
        self.ensure_open()?;
        let added = state.ballot.add_option(option);
        state.broadcast_options();
        info!(username, option, added, "option added");
        Ok(added)
    }

    pub async fn remove_option(&self, username: &str, option: &str) -> Result<bool, AdminError> {
        self.authorize(username)?;
        let mut state = self.state.lock().await;
        self.ensure_open()?;
        let removed = state.ballot.remove_option(option);
        state.broadcast_options();
        info!(username, option, removed, "option removed");
        Ok(removed)
    }

    /// Checked with the state lock held, so nothing slips in after `finish`.
    fn ensure_open(&self) -> Result<(), AdminError> {
        if self.is_closed() {
            Err(AdminError::VotingClosed)
        } else {
            Ok(())
        }
    }

    fn authorize(&self, username: &str) -> Result<(), AdminError> {
        if self.is_admin(username) {
            Ok(())
        } else {
            Err(AdminError::Unauthorized(username.to_string()))
        }
    }

    pub async fn results(&self) -> Vec<(String, u64)> {
        self.state.lock().await.ballot.results()
    }

    pub async fn option_names(&self) -> Vec<String> {
        self.state.lock().await.ballot.option_names()
    }

    pub async fn selection(&self, username: &str) -> Option<String> {
        let state = self.state.lock().await;
        state.ballot.selection(username).map(str::to_string)
    }

    pub async fn connected_users(&self) -> Vec<String> {
        self.state.lock().await.roster.usernames()
    }

    /// Broadcasts the final tallies and sets the stop flag. Only the first
    /// call has any effect.
    pub async fn finish(&self) -> bool {
        let state = self.state.lock().await;
        if self.is_closed() {
            return false;
        }
        let delivered = state.broadcast_results(ResultsKind::Final);
        self.closed.send_replace(true);
        info!(delivered, "final results broadcast");
        true
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once [`finish`](Self::finish) has run.
    pub async fn closed(&self) {
        let mut closed = self.closed.subscribe();
        let _ = closed.wait_for(|closed| *closed).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn hub(options: &[&str]) -> Hub {
        Hub::new(
            options.iter().map(|option| option.to_string()),
            ["admin".to_string()],
        )
    }

    #[tokio::test]
    async fn concurrent_joins_with_one_name_admit_exactly_one() {
        let hub = Arc::new(hub(&["red"]));
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let hub = Arc::clone(&hub);
            tasks.spawn(async move { hub.join("bob").await.map(|membership| membership.id) });
        }

        let mut admitted = 0;
        let mut rejected = 0;
        while let Some(result) = tasks.join_next().await {
            match result.expect("join task") {
                Ok(_) => admitted += 1,
                Err(RegisterError::NameTaken(name)) => {
                    assert_eq!(name, "bob");
                    rejected += 1;
                }
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!((admitted, rejected), (1, 15));
    }

    #[tokio::test]
    async fn vote_is_broadcast_to_every_member() {
        let hub = hub(&["red", "blue"]);
        let mut alice = hub.join("alice").await.expect("alice joins");
        let mut bob = hub.join("bob").await.expect("bob joins");

        hub.vote("alice", "red").await.expect("vote");

        let expected = "Updated results:\nblue: 0 votes\nred: 1 votes\n";
        assert_eq!(alice.inbox.recv().await.as_deref(), Some(expected));
        assert_eq!(bob.inbox.recv().await.as_deref(), Some(expected));
    }

    #[tokio::test]
    async fn rejected_vote_broadcasts_nothing() {
        let hub = hub(&["red"]);
        let mut alice = hub.join("alice").await.expect("alice joins");

        let err = hub.vote("alice", "green").await.unwrap_err();
        assert_eq!(err, VoteError::InvalidOption("green".into()));
        assert!(alice.inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn only_admins_edit_options() {
        let hub = hub(&["red"]);
        let mut carol = hub.join("carol").await.expect("carol joins");

        assert_eq!(
            hub.add_option("carol", "pizza").await,
            Err(AdminError::Unauthorized("carol".into()))
        );
        assert_eq!(hub.option_names().await, vec!["red"]);
        assert!(carol.inbox.try_recv().is_err());

        assert_eq!(hub.add_option("admin", "pizza").await, Ok(true));
        assert_eq!(
            carol.inbox.recv().await.as_deref(),
            Some("Updated options:\npizza\nred\n")
        );
        assert_eq!(hub.remove_option("admin", "tacos").await, Ok(false));
    }

    #[tokio::test]
    async fn leave_frees_name_but_keeps_vote() {
        let hub = hub(&["red"]);
        let alice = hub.join("alice").await.expect("alice joins");
        hub.vote("alice", "red").await.expect("vote");

        assert_eq!(hub.leave(alice.id).await, Some("alice".to_string()));
        assert_eq!(hub.leave(alice.id).await, None);
        assert!(hub.connected_users().await.is_empty());
        assert_eq!(hub.results().await, vec![("red".to_string(), 1)]);

        hub.join("alice").await.expect("name reusable");
        assert_eq!(hub.selection("alice").await, None);
    }

    #[tokio::test]
    async fn finish_broadcasts_once_and_closes() {
        let hub = hub(&["red"]);
        let mut alice = hub.join("alice").await.expect("alice joins");

        assert!(hub.finish().await);
        assert!(!hub.finish().await);
        hub.closed().await;

        assert!(hub.is_closed());
        assert_eq!(
            alice.inbox.recv().await.as_deref(),
            Some("Final results:\nred: 0 votes\n")
        );
        assert!(alice.inbox.try_recv().is_err());
        assert!(matches!(
            hub.join("late").await,
            Err(RegisterError::VotingClosed)
        ));
    }

    #[tokio::test]
    async fn mutations_after_finish_are_rejected() {
        let hub = hub(&["red", "blue"]);
        let mut alice = hub.join("alice").await.expect("alice joins");
        let _admin = hub.join("admin").await.expect("admin joins");

        hub.finish().await;

        assert_eq!(hub.vote("alice", "red").await, Err(VoteError::VotingClosed));
        assert_eq!(
            hub.add_option("admin", "pizza").await,
            Err(AdminError::VotingClosed)
        );
        assert_eq!(
            hub.remove_option("admin", "red").await,
            Err(AdminError::VotingClosed)
        );

        assert_eq!(
            alice.inbox.recv().await.as_deref(),
            Some("Final results:\nblue: 0 votes\nred: 0 votes\n")
        );
        assert!(alice.inbox.try_recv().is_err());
        assert_eq!(
            hub.results().await,
            vec![("blue".to_string(), 0), ("red".to_string(), 0)]
        );
    }
}
