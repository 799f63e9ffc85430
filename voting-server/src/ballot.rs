//! In-memory tallies and per-user selections.
//!
//! `Ballot` holds no lock of its own. The [`Hub`](crate::hub::Hub) owns the
//! single ballot of a server run behind its mutex, so every method here runs
//! inside that critical section.

use std::collections::{BTreeMap, HashMap};

use crate::error::{RegisterError, VoteError};

/// Option tallies plus the current selection of every registered user.
///
/// # Why BTreeMap for options?
///
/// Menus and result blocks are rendered by iterating the options. A sorted
/// map gives every client the same, stable ordering.
#[derive(Debug, Default, Clone)]
pub struct Ballot {
    options: BTreeMap<String, u64>,
    users: HashMap<String, Option<String>>,
}

impl Ballot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ballot seeded with `options`, each starting at zero votes.
    pub fn with_options<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ballot = Self::new();
        for option in options {
            ballot.add_option(option);
        }
        ballot
    }

    /// Records `option` as the user's selection.
    ///
    /// A prior selection is decremented first. When that option has been
    /// removed in the meantime nothing is decremented; the stale reference
    /// is simply replaced.
    pub fn cast_vote(&mut self, user: &str, option: &str) -> Result<(), VoteError> {
        if !self.options.contains_key(option) {
            return Err(VoteError::InvalidOption(option.to_string()));
        }
        let Some(selection) = self.users.get_mut(user) else {
            return Err(VoteError::UnknownUser(user.to_string()));
        };

        if let Some(previous) = selection.replace(option.to_string())
            && let Some(count) = self.options.get_mut(&previous)
        {
            // A removed-then-re-added option can sit at zero with stale
            // selections still pointing at it.
            *count = count.saturating_sub(1);
        }
        if let Some(count) = self.options.get_mut(option) {
            *count += 1;
        }
        Ok(())
    }

    /// Inserts `name` with zero votes. Returns `false` if it already existed.
    pub fn add_option(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.options.contains_key(&name) {
            return false;
        }
        self.options.insert(name, 0);
        true
    }

    /// Deletes `name`. User selections pointing at it are left untouched.
    pub fn remove_option(&mut self, name: &str) -> bool {
        self.options.remove(name).is_some()
    }

    pub fn results(&self) -> Vec<(String, u64)> {
        self.options
            .iter()
            .map(|(name, count)| (name.clone(), *count))
            .collect()
    }

    pub fn option_names(&self) -> Vec<String> {
        self.options.keys().cloned().collect()
    }

    /// Registers a user with no selection. Names are trimmed first.
    pub fn register_user(&mut self, name: &str) -> Result<String, RegisterError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RegisterError::EmptyName);
        }
        if self.users.contains_key(name) {
            return Err(RegisterError::NameTaken(name.to_string()));
        }
        self.users.insert(name.to_string(), None);
        Ok(name.to_string())
    }

    /// Forgets the user. Their last vote stays counted.
    pub fn deregister_user(&mut self, name: &str) -> bool {
        self.users.remove(name).is_some()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.users.contains_key(name)
    }

    pub fn selection(&self, name: &str) -> Option<&str> {
        self.users.get(name).and_then(|selection| selection.as_deref())
    }

    pub fn total_votes(&self) -> u64 {
        self.options.values().sum()
    }
}
