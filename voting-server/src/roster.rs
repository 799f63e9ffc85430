use std::{collections::HashMap, sync::Arc};

use tokio::sync::mpsc;
use tracing::debug;

pub type ClientId = u64;

/// Text queued for one client. Rendered once per broadcast and shared.
pub type Outgoing = Arc<str>;

struct ClientRecord {
    username: String,
    outbox: mpsc::UnboundedSender<Outgoing>,
}

/// Registered connections and their outboxes.
///
/// Lives inside the hub lock next to the ballot, so a broadcast sees the
/// roster and the tallies at the same instant. A connection is added only
/// once its username registers, so clients still at the username prompt get
/// no broadcasts.
#[derive(Default)]
pub struct Roster {
    clients: HashMap<ClientId, ClientRecord>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a client and returns the receiving end of its outbox.
    pub fn insert(&mut self, id: ClientId, username: String) -> mpsc::UnboundedReceiver<Outgoing> {
        let (outbox, inbox) = mpsc::unbounded_channel();
        self.clients.insert(id, ClientRecord { username, outbox });
        inbox
    }

    /// Removes a client, returning its username.
    pub fn remove(&mut self, id: ClientId) -> Option<String> {
        self.clients.remove(&id).map(|record| record.username)
    }

    /// Queues `message` for every client. A client whose session already
    /// ended is skipped; delivery to the others continues.
    pub fn broadcast(&self, message: &str) -> usize {
        let message: Outgoing = Arc::from(message);
        let mut delivered = 0;
        for (id, client) in &self.clients {
            match client.outbox.send(Arc::clone(&message)) {
                Ok(()) => delivered += 1,
                Err(_) => debug!(client = id, username = %client.username, "outbox closed, skipping"),
            }
        }
        delivered
    }

    pub fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .clients
            .values()
            .map(|client| client.username.clone())
            .collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
