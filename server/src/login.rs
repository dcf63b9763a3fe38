//! Credential checks and the set of accounts currently in play

use log::{info, warn};
use shared::AuthResult;
use std::collections::{HashMap, HashSet};

pub trait LoginService {
    /// Checks credentials only; never reports `AlreadyLoggedIn`
    fn authenticate(&self, username: &str, password: &str) -> AuthResult;
    fn is_logged_in(&self, username: &str) -> bool;
    fn login(&mut self, username: &str);
    fn logout(&mut self, username: &str);
}

/// Plain-text credential table seeded at startup
#[derive(Debug, Default)]
pub struct InMemoryLogins {
    credentials: HashMap<String, String>,
    active: HashSet<String>,
}

impl InMemoryLogins {
    pub fn new(accounts: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            credentials: accounts.into_iter().collect(),
            active: HashSet::new(),
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

impl LoginService for InMemoryLogins {
    fn authenticate(&self, username: &str, password: &str) -> AuthResult {
        match self.credentials.get(username) {
            None => AuthResult::InvalidUsername,
            Some(expected) if expected != password => AuthResult::InvalidPassword,
            Some(_) => AuthResult::Valid,
        }
    }

    fn is_logged_in(&self, username: &str) -> bool {
        self.active.contains(username)
    }

    fn login(&mut self, username: &str) {
        if self.active.insert(username.to_string()) {
            info!("Account '{}' logged in", username);
        }
    }

    fn logout(&mut self, username: &str) {
        if self.active.remove(username) {
            info!("Account '{}' logged out", username);
        } else {
            warn!("Logout for account '{}' that was not logged in", username);
        }
    }
}
